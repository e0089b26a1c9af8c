//! Drives the `glraw-cmd` texture encoder as a child process.
//!
//! Data Flow:
//! ```text
//! upload ─► TempTracker (staged input) ─► build_args ─► EncoderCommand::run
//!                                                            │ stderr
//!                                                            ▼
//!     response ◄─ ConvertedArtifact ◄─ resolve_artifact ◄─ parse_created
//! ```

pub mod args;
pub mod error;
pub mod executor;
pub mod params;
pub mod parser;
pub mod pipeline;
pub mod resolver;
pub mod temp;

pub use args::OutputMode;
pub use error::{ArtifactAmbiguityError, ConversionError, ExecutionError, ValidationError};
pub use executor::{EncoderCommand, ProcessOutcome};
pub use params::{ConversionParams, ParameterSpec};
pub use pipeline::{
    ConversionJob, ConversionPipeline, ConversionRequest, ConvertedArtifact, JobState,
    PipelineConfig,
};
