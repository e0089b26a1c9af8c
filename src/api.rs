use std::sync::Arc;

use anyhow::Context;
use axum::{Router, extract::DefaultBodyLimit};
use glraw_driver::ConversionPipeline;
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{config::ServiceConfig, handler};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) pipeline: Arc<ConversionPipeline>,
}

pub(crate) fn app_router(pipeline: Arc<ConversionPipeline>, max_upload_bytes: usize) -> Router {
    Router::new()
        .merge(handler::root::root_router())
        .nest("/v1", handler::convert::convert_router(AppState { pipeline }))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}

/// Serves until `cancel` fires. The token is also cancelled when the server
/// stops on its own, so the caller's select loop wakes up.
pub(crate) fn start_api_server(
    config: Arc<ServiceConfig>,
    cancel: CancellationToken,
) -> JoinHandle<anyhow::Result<()>> {
    tokio::spawn(async move {
        let result = serve(&config, cancel.clone()).await;
        cancel.cancel();
        result
    })
}

async fn serve(config: &ServiceConfig, cancel: CancellationToken) -> anyhow::Result<()> {
    let pipeline = Arc::new(ConversionPipeline::new(config.pipeline_config()));
    let app = app_router(pipeline, config.max_upload_bytes());

    let addr = config.listen_addr();
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding API server to {}", addr))?;
    log::info!("API server started on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel))
        .await
        .context("API server stopped")
}

async fn shutdown_signal(cancel: CancellationToken) {
    cancel.cancelled().await;
    log::info!("Shutting down API server...");
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode},
    };
    use glraw_driver::{EncoderCommand, PipelineConfig};
    use tower::ServiceExt;

    use super::*;

    fn router() -> Router {
        let pipeline = ConversionPipeline::new(PipelineConfig {
            encoder: EncoderCommand::new("glraw-cmd", "/nonexistent"),
            result_dir: PathBuf::from("/nonexistent/results"),
            staging_dir: PathBuf::from("/nonexistent/staging"),
            keep_artifacts: false,
        });
        app_router(Arc::new(pipeline), 1024)
    }

    #[tokio::test]
    async fn test_root_returns_empty_object() {
        let response = router()
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"{}");
    }

    #[tokio::test]
    async fn test_root_head() {
        let request = Request::builder()
            .method(Method::HEAD)
            .uri("/")
            .body(Body::empty())
            .unwrap();
        let response = router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let response = router()
            .oneshot(Request::get("/v2/convert/raw").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bind_failure_cancels() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap().to_string();
        let config = ServiceConfig::from_lookup(|key| match key {
            "LISTEN_ADDR" => Some(addr.clone()),
            _ => None,
        })
        .unwrap();

        let cancel = CancellationToken::new();
        let result = start_api_server(Arc::new(config), cancel.clone())
            .await
            .unwrap();
        assert!(result.is_err());
        assert!(cancel.is_cancelled());
    }
}
