use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use glraw_driver::{ConversionError, ValidationError};
use serde::Serialize;

pub mod convert;
pub mod root;

pub type ApiResult<T> = Result<T, ApiError>;

/// Problems with the shape of the request itself, before any conversion.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("multipart field 'file' is required")]
    MissingFile,
    #[error("malformed multipart body: {}", .0.body_text())]
    Multipart(#[from] MultipartError),
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

pub struct ApiError(anyhow::Error);

impl ApiError {
    fn status_and_detail(&self) -> (StatusCode, String) {
        if let Some(err) = self.0.downcast_ref::<ConversionError>() {
            let status = if err.is_validation() {
                StatusCode::UNPROCESSABLE_ENTITY
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            return (status, err.detail());
        }
        if let Some(err) = self.0.downcast_ref::<ValidationError>() {
            return (StatusCode::UNPROCESSABLE_ENTITY, err.to_string());
        }
        if let Some(err) = self.0.downcast_ref::<RequestError>() {
            let status = match err {
                RequestError::MissingFile => StatusCode::BAD_REQUEST,
                RequestError::Multipart(e) => e.status(),
            };
            return (status, err.to_string());
        }
        (StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", self.0))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = self.status_and_detail();
        if status.is_server_error() {
            log::error!("ApiError: {:#}", self.0);
        } else {
            log::warn!("rejected request ({}): {}", status, detail);
        }
        (status, Json(ErrorBody { detail })).into_response()
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
