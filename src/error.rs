//! Custom error types for gemprobe.
//!
//! This module defines the errors that can abort a run before or outside
//! of sampling, following Rust best practices with `thiserror`.
//!
//! Faults inside a single sample (transport errors, timeouts, bad HTTP
//! statuses) are deliberately NOT represented here — they are carried as
//! the `error` field of a failed [`crate::SampleResult`] so that one bad
//! call never aborts the experiment.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during setup, planning, or report output.
#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum ProbeError {
    /// The API key is missing. The only fault that aborts a run early.
    #[error("GEMINI_API_KEY is not set - pass --api-key or export the environment variable")]
    MissingApiKey,

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failed to read the prompt file.
    #[error("failed to read prompt file '{path}': {source}")]
    PromptFileRead {
        /// Path to the file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse a JSONL prompt record.
    #[error("failed to parse JSON at line {line}: {source}")]
    JsonParse {
        /// Line number where the error occurred.
        line: usize,
        /// The underlying JSON parsing error.
        #[source]
        source: serde_json::Error,
    },

    /// Failed to write a report file.
    #[error("failed to write report '{path}': {source}")]
    ReportWrite {
        /// Path to the file that could not be written.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to serialize results for JSON export.
    #[error("failed to serialize results: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// Failed to construct the HTTP client.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Listing models failed. Unlike sampling, this is a direct query the
    /// user asked for, so the fault surfaces as an error.
    #[error("failed to list models: {0}")]
    ListModels(String),
}

/// Result type alias for gemprobe operations.
pub type Result<T> = std::result::Result<T, ProbeError>;
