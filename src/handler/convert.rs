use std::{
    io,
    pin::Pin,
    task::{Context, Poll},
};

use axum::{
    Router,
    body::Body,
    extract::{Multipart, Query, State},
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
    routing::post,
};
use bytes::Bytes;
use futures::Stream;
use glraw_driver::{
    ConversionJob, ConversionParams, ConversionRequest, ConvertedArtifact, OutputMode,
    ParameterSpec,
};
use tokio::fs::File;
use tokio_util::io::ReaderStream;

use crate::{
    api::AppState,
    handler::{ApiResult, RequestError},
};

const FILE_FIELD: &str = "file";

pub fn convert_router(state: AppState) -> Router {
    Router::new()
        .route("/convert/raw", post(convert_raw))
        .route("/convert/glraw", post(convert_glraw))
        .with_state(state)
}

async fn convert_raw(
    State(state): State<AppState>,
    Query(query): Query<Vec<(String, String)>>,
    multipart: Multipart,
) -> ApiResult<Response> {
    convert(state, OutputMode::Raw, query, multipart).await
}

async fn convert_glraw(
    State(state): State<AppState>,
    Query(query): Query<Vec<(String, String)>>,
    multipart: Multipart,
) -> ApiResult<Response> {
    convert(state, OutputMode::Packaged, query, multipart).await
}

struct Upload {
    file_name: String,
    data: Bytes,
    fields: Vec<(String, String)>,
}

async fn convert(
    state: AppState,
    mode: OutputMode,
    query: Vec<(String, String)>,
    multipart: Multipart,
) -> ApiResult<Response> {
    let upload = read_upload(multipart, query).await?;
    let params = ConversionParams::from_pairs(
        upload.fields.iter().map(|(k, v)| (k.as_str(), v.as_str())),
    )?;
    let params = ParameterSpec::try_from(params)?;

    let artifact = state
        .pipeline
        .convert(ConversionRequest {
            data: upload.data,
            file_name: upload.file_name,
            params,
            mode,
        })
        .await?;
    artifact_response(artifact)
}

/// Collects the `file` part and every other text part. Form fields come after
/// the query pairs, so they win when both name the same parameter.
async fn read_upload(
    mut multipart: Multipart,
    mut fields: Vec<(String, String)>,
) -> ApiResult<Upload> {
    let mut file = None;
    while let Some(field) = multipart.next_field().await.map_err(RequestError::from)? {
        let name = field.name().unwrap_or_default().to_string();
        if name == FILE_FIELD {
            let file_name = field.file_name().unwrap_or("upload").to_string();
            let data = field.bytes().await.map_err(RequestError::from)?;
            file = Some((file_name, data));
        } else {
            let value = field.text().await.map_err(RequestError::from)?;
            fields.push((name, value));
        }
    }

    let (file_name, data) = file.ok_or(RequestError::MissingFile)?;
    Ok(Upload {
        file_name,
        data,
        fields,
    })
}

/// Response body that owns the job while the artifact is being sent. The job
/// is released when the body is dropped, and counts as delivered only once
/// the file reached EOF.
struct JobBody {
    stream: ReaderStream<File>,
    job: ConversionJob,
}

impl JobBody {
    fn new(file: File, job: ConversionJob) -> Self {
        Self {
            stream: ReaderStream::new(file),
            job,
        }
    }
}

impl Stream for JobBody {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let next = Pin::new(&mut this.stream).poll_next(cx);
        if let Poll::Ready(None) = next {
            this.job.mark_delivered();
        }
        next
    }
}

fn artifact_response(artifact: ConvertedArtifact) -> ApiResult<Response> {
    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        header_safe(artifact.download_name())
    ))?;
    let content_type = HeaderValue::from_static(artifact.content_type());
    let len = artifact.len();

    let (file, job) = artifact.into_parts();

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CONTENT_LENGTH, HeaderValue::from(len)),
        ],
        Body::from_stream(JobBody::new(file, job)),
    )
        .into_response())
}

fn header_safe(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect()
}
