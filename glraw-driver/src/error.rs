//! Error taxonomy of a conversion job.
//!
//! Every variant is terminal for the request that produced it; nothing here is
//! retried. Cleanup failures never surface as errors, they are only logged.

use std::{path::PathBuf, time::Duration};

use thiserror::Error;

/// Malformed conversion parameters. Raised before anything touches disk.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid value for '{field}': {reason}")]
pub struct ValidationError {
    field: String,
    reason: String,
}

impl ValidationError {
    pub fn new(field: &str, reason: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The encoder could not be started at all (missing binary, bad working
    /// directory, permission denied).
    #[error("failed to spawn '{}': {source}", .program.display())]
    SpawnFailed {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The encoder ran and exited unsuccessfully. `stderr` is kept verbatim.
    #[error("{stderr}")]
    NonZeroExit { code: Option<i32>, stderr: String },

    /// The encoder exceeded the configured time limit and was killed.
    /// `stderr` holds whatever it printed before that.
    #[error("encoder did not finish within {limit:?}")]
    TimedOut { limit: Duration, stderr: String },

    /// Waiting on a running child failed (pipe read error and the like).
    #[error("failed to collect encoder output: {0}")]
    Wait(#[source] std::io::Error),
}

impl ExecutionError {
    /// Diagnostic output captured from a child that did run.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            ExecutionError::NonZeroExit { stderr, .. } | ExecutionError::TimedOut { stderr, .. } => {
                Some(stderr)
            }
            _ => None,
        }
    }
}

/// The encoder output did not name exactly one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("expected exactly one created artifact, found {count}: [{}]", .lines.join(", "))]
pub struct ArtifactAmbiguityError {
    pub count: usize,
    pub lines: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("failed to stage input file: {0}")]
    Staging(#[source] std::io::Error),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Ambiguity(#[from] ArtifactAmbiguityError),

    /// The announced artifact could not be opened for delivery.
    #[error("artifact '{}' is not readable: {source}", .path.display())]
    ArtifactUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConversionError {
    /// The most diagnostic text available for the caller: the encoder's
    /// stderr for a failed run, the rendered error otherwise.
    pub fn detail(&self) -> String {
        match self {
            ConversionError::Execution(ExecutionError::NonZeroExit { stderr, code })
                if stderr.trim().is_empty() =>
            {
                match code {
                    Some(code) => format!("encoder exited with status {} and no output", code),
                    None => "encoder was terminated by a signal".to_string(),
                }
            }
            ConversionError::Execution(ExecutionError::NonZeroExit { stderr, .. }) => {
                stderr.clone()
            }
            other => other.to_string(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, ConversionError::Validation(_))
    }
}
