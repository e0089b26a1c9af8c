//! Conversion job orchestration.
//!
//! ```text
//! Received ─► InputStaged ─► Executed ─► Parsed ─► Resolved ─► Responding ─► Cleaned
//!     │            │             │          │          │            │
//!     └────────────┴─────────────┴──────────┴──────────┴────────────┴─► Failed
//! ```
//!
//! A [`ConversionJob`] owns the temporary files of one request. Every path out
//! of the pipeline drops it exactly once: on error inside [`ConversionPipeline::convert`],
//! or after delivery when the caller drops the job returned by
//! [`ConvertedArtifact::into_parts`].

use std::{
    fmt::{Display, Formatter},
    path::{Path, PathBuf},
};

use bytes::Bytes;
use tokio::io::AsyncWriteExt;

use crate::{
    args::{OutputMode, build_args},
    error::ConversionError,
    executor::EncoderCommand,
    params::ParameterSpec,
    parser::parse_created,
    resolver::{ArtifactReference, resolve_artifact},
    temp::TempTracker,
};

pub const CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub encoder: EncoderCommand,
    /// Where the encoder writes artifacts (`-o`).
    pub result_dir: PathBuf,
    /// Where uploads are staged before the encoder reads them.
    pub staging_dir: PathBuf,
    /// Keep artifacts in `result_dir` after they were delivered.
    pub keep_artifacts: bool,
}

/// One upload to convert.
#[derive(Clone, Debug)]
pub struct ConversionRequest {
    pub data: Bytes,
    /// Client-supplied file name, used for the staged suffix and the
    /// download name.
    pub file_name: String,
    pub params: ParameterSpec,
    pub mode: OutputMode,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobState {
    Received,
    InputStaged,
    Executed,
    Parsed,
    Resolved,
    Responding,
    Cleaned,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Cleaned | JobState::Failed)
    }
}

impl Display for JobState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// Request-scoped state: id, progress and the temporary files to release.
pub struct ConversionJob {
    id: String,
    state: JobState,
    tracker: TempTracker,
    delivered: bool,
    closed: bool,
}

impl ConversionJob {
    fn new(staging_dir: &Path) -> Self {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let tracker = TempTracker::new(id.clone(), staging_dir);
        Self {
            id,
            state: JobState::Received,
            tracker,
            delivered: false,
            closed: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    fn advance(&mut self, next: JobState) {
        log::debug!("[{}] {} -> {}", self.id, self.state, next);
        self.state = next;
    }

    fn fail(&mut self, err: &ConversionError) {
        log::error!("[{}] failed in state {}: {}", self.id, self.state, err);
        self.state = JobState::Failed;
    }

    /// Records that the last byte of the artifact was handed to the client.
    pub fn mark_delivered(&mut self) {
        self.delivered = true;
    }

    pub fn is_delivered(&self) -> bool {
        self.delivered
    }

    /// Releases the job's files and returns its final state: `Cleaned` for a
    /// fully delivered artifact, `Failed` for anything else. Dropping the job
    /// does the same.
    pub fn close(mut self) -> JobState {
        self.finish();
        self.state
    }

    fn finish(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        match self.state {
            JobState::Failed => {}
            JobState::Responding if self.delivered => {}
            JobState::Responding => {
                log::warn!("[{}] delivery interrupted", self.id);
                self.state = JobState::Failed;
            }
            state => {
                log::warn!("[{}] abandoned in state {}", self.id, state);
                self.state = JobState::Failed;
            }
        }
        self.tracker.release();
        if self.state != JobState::Failed {
            self.advance(JobState::Cleaned);
            log::info!("[{}] done", self.id);
        }
    }
}

impl Drop for ConversionJob {
    fn drop(&mut self) {
        self.finish();
    }
}

/// A successfully produced artifact, opened and ready to stream.
pub struct ConvertedArtifact {
    file: tokio::fs::File,
    len: u64,
    download_name: String,
    artifact: ArtifactReference,
    job: ConversionJob,
}

impl ConvertedArtifact {
    pub fn path(&self) -> &Path {
        &self.artifact.resolved_path
    }

    pub fn artifact(&self) -> &ArtifactReference {
        &self.artifact
    }

    /// `<original base name>.<artifact extension>`.
    pub fn download_name(&self) -> &str {
        &self.download_name
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn content_type(&self) -> &'static str {
        CONTENT_TYPE
    }

    pub fn job_id(&self) -> &str {
        self.job.id()
    }

    /// Hands out the open file and the job. Keep the job alive until the last
    /// byte has been sent and call [`ConversionJob::mark_delivered`]; dropping
    /// it removes the staged input and, unless artifacts are kept, the
    /// artifact itself.
    pub fn into_parts(mut self) -> (tokio::fs::File, ConversionJob) {
        self.job.advance(JobState::Responding);
        (self.file, self.job)
    }
}

pub struct ConversionPipeline {
    config: PipelineConfig,
}

impl ConversionPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub async fn convert(
        &self,
        request: ConversionRequest,
    ) -> Result<ConvertedArtifact, ConversionError> {
        let mut job = ConversionJob::new(&self.config.staging_dir);
        log::info!(
            "[{}] converting '{}' ({} bytes, {:?})",
            job.id,
            request.file_name,
            request.data.len(),
            request.mode
        );

        match self.run(&mut job, &request).await {
            Ok((artifact, file, len)) => {
                let download_name = download_name(&request.file_name, &artifact.extension);
                log::info!(
                    "[{}] produced {} as '{}'",
                    job.id,
                    artifact.resolved_path.display(),
                    download_name
                );
                Ok(ConvertedArtifact {
                    file,
                    len,
                    download_name,
                    artifact,
                    job,
                })
            }
            Err(e) => {
                job.fail(&e);
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        job: &mut ConversionJob,
        request: &ConversionRequest,
    ) -> Result<(ArtifactReference, tokio::fs::File, u64), ConversionError> {
        let input = self.stage_input(job, request).await?;
        job.advance(JobState::InputStaged);

        let args = build_args(
            &input,
            &self.config.result_dir,
            request.mode,
            &request.params,
        );
        log::debug!("[{}] {} {:?}", job.id, self.config.encoder.program().display(), args);
        let outcome = match self.config.encoder.run(&args).await {
            Ok(outcome) => outcome,
            Err(e) => {
                // A failed run may still have written what it announced.
                if let Some(stderr) = e.stderr() {
                    self.track_outputs(job, &parse_created(stderr));
                }
                return Err(e.into());
            }
        };
        job.advance(JobState::Executed);

        let stderr = outcome.stderr_text();
        let names = parse_created(&stderr);
        job.advance(JobState::Parsed);
        self.track_outputs(job, &names);
        if names.len() != 1 {
            log::debug!("[{}] encoder stderr:\n{}", job.id, stderr);
        }

        let artifact = resolve_artifact(&names, &self.config.result_dir)?;
        let file = tokio::fs::File::open(&artifact.resolved_path)
            .await
            .map_err(|source| ConversionError::ArtifactUnreadable {
                path: artifact.resolved_path.clone(),
                source,
            })?;
        let len = file
            .metadata()
            .await
            .map_err(|source| ConversionError::ArtifactUnreadable {
                path: artifact.resolved_path.clone(),
                source,
            })?
            .len();
        job.advance(JobState::Resolved);
        Ok((artifact, file, len))
    }

    fn track_outputs(&self, job: &mut ConversionJob, names: &[String]) {
        if self.config.keep_artifacts {
            return;
        }
        for name in names {
            job.tracker.track_output(self.config.result_dir.join(name));
        }
    }

    async fn stage_input(
        &self,
        job: &mut ConversionJob,
        request: &ConversionRequest,
    ) -> Result<PathBuf, ConversionError> {
        let staged = job
            .tracker
            .acquire(&staging_suffix(&request.file_name))
            .map_err(ConversionError::Staging)?;
        let path = staged.path().to_path_buf();
        let writer = staged.reopen().map_err(ConversionError::Staging)?;

        let mut writer = tokio::fs::File::from_std(writer);
        writer
            .write_all(&request.data)
            .await
            .map_err(ConversionError::Staging)?;
        writer.flush().await.map_err(ConversionError::Staging)?;
        Ok(path)
    }
}

/// `.ext` of the upload when it is a plain alphanumeric extension, so the
/// encoder can pick the image reader; empty otherwise.
fn staging_suffix(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| ext.len() <= 16 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext))
        .unwrap_or_default()
}

fn download_name(file_name: &str, extension: &str) -> String {
    let base = Path::new(file_name)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| "artifact".to_string());
    if extension.is_empty() {
        base
    } else {
        format!("{}.{}", base, extension)
    }
}

#[cfg(test)]
#[path = "pipeline_test.rs"]
mod pipeline_test;
