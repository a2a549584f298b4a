// error.rs

use std::path::PathBuf;
use thiserror::Error;

pub(crate) type Result<T> = std::result::Result<T, PipelineError>;

/// Error taxonomy for the pipeline.
///
/// Core stages (normalize, reduce, present) raise synchronously to the caller;
/// only the batch dump loop catches `ExternalTool` per item and continues.
#[derive(Debug, Error)]
pub(crate) enum PipelineError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("dimensionality error: {0}")]
    Dimensionality(String),

    #[error("projection requires {needed} principal components but only {available} were computed")]
    InsufficientComponents { needed: usize, available: usize },

    #[error("external tool '{tool}' failed on {input}: {message}")]
    ExternalTool {
        tool: String,
        input: PathBuf,
        message: String,
    },

    #[error("enrichment service returned HTTP status {status}")]
    ExternalService { status: u16 },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}
