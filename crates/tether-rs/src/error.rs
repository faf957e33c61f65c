//! Error type for the prediction and reduction pipeline.
//!
//! Tool and reply-client boundaries keep plain `Result<String, String>`
//! results; everything the orchestrator treats as a recoverable pipeline
//! failure is a [`PipelineError`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid pattern for '{family}': {source}")]
    InvalidPattern {
        family: String,
        #[source]
        source: regex::Error,
    },

    #[error("empty input: nothing to classify")]
    EmptyInput,

    #[error("invalid reduction policy: {0}")]
    InvalidPolicy(String),

    #[error("invalid scoring configuration: {0}")]
    InvalidScoring(String),

    #[error("invalid intent: {0}")]
    InvalidIntent(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
