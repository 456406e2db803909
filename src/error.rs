//! Error types for the episode pipeline.
//!
//! Two channels exist. [`PipelineError`] aborts the whole run and leaves the
//! state file untouched. [`SkipReason`] drops a single article from the
//! episode; it is logged and reported but never propagated.

use chrono::NaiveDate;
use thiserror::Error;

/// A failure that aborts the run.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// No Links post for the run date was found on the source site.
    #[error("no Links post found for {0}")]
    NotFound(NaiveDate),

    /// The source site or the Links post could not be read.
    #[error("link discovery failed: {0}")]
    Discovery(String),

    /// Every candidate article was skipped (or there were none).
    #[error("no usable articles for {0}")]
    NoContent(NaiveDate),

    /// The state file could not be read or written.
    #[error("state persistence error: {0}")]
    Persistence(String),

    /// The encoder could not produce the episode audio.
    #[error("episode assembly failed: {0}")]
    Assembly(String),

    /// The audio file or the feed could not be published.
    #[error("publish failed: {0}")]
    Publish(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why an article was left out of the episode.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    #[error("no text extracted")]
    NoTextExtracted,

    #[error("text too short ({chars} chars, need {min})")]
    TooShort { chars: usize, min: usize },

    #[error("fetch error: {0}")]
    FetchError(String),

    #[error("synthesis error: {0}")]
    SynthesisError(String),
}

impl SkipReason {
    /// Stable machine-readable code used in logs.
    pub fn code(&self) -> &'static str {
        match self {
            SkipReason::NoTextExtracted => "no_text_extracted",
            SkipReason::TooShort { .. } => "too_short",
            SkipReason::FetchError(_) => "fetch_error",
            SkipReason::SynthesisError(_) => "synthesis_error",
        }
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
