//! Error types for the timesheet-extract library.
//!
//! Failures are layered by how far they are allowed to travel:
//!
//! * [`BatchError`]: **Non-fatal**: one inference batch failed (transport
//!   error, timeout, unparsable reply). Stored inside
//!   [`crate::output::BatchReport`]; the remaining batches of the file
//!   still contribute their entries.
//!
//! * [`ExtractError`]: **Per file**: the document could not be opened or
//!   its images could not be read. The worker logs it and reports an empty
//!   result for that file; the job carries on.
//!
//! * [`JobError`]: **Client-visible**: rejections returned by the
//!   orchestrator's submit / status / retrieve operations. Every variant is
//!   distinct so a caller can tell "never existed" from "not finished yet".
//!
//! * [`TimesheetError`]: **Fatal**: setup cannot proceed (no provider,
//!   invalid configuration).

use std::path::PathBuf;
use thiserror::Error;

use crate::job::JobStatus;

/// Fatal errors raised while wiring up the pipeline.
#[derive(Debug, Error)]
pub enum TimesheetError {
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure to read images out of one document.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Writing the uploaded bytes to the transient store failed.
    #[error("Failed to materialise '{file}': {source}")]
    Materialise {
        file: String,
        #[source]
        source: std::io::Error,
    },

    /// The document could not be read from disk.
    #[error("Failed to read '{path}': {source}")]
    ReadDocument {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not a zip-based office container.
    #[error("'{path}' is not an Office Open XML container: {detail}")]
    NotAContainer { path: PathBuf, detail: String },

    /// A part listed in the relationships could not be read.
    #[error("Failed to read part '{part}': {detail}")]
    Part { part: String, detail: String },

    /// The relationships XML is malformed.
    #[error("Malformed relationships XML: {0}")]
    Xml(String),

    /// The blocking extraction task panicked or was cancelled.
    #[error("Extraction task failed: {0}")]
    Task(String),
}

/// A non-fatal error for a single inference batch.
///
/// Stored alongside [`crate::output::BatchReport`] when a batch is skipped.
/// The file continues with its next batch.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum BatchError {
    /// An image in the batch could not be encoded for transmission.
    #[error("Batch {batch}: image encoding failed: {detail}")]
    Encode { batch: usize, detail: String },

    /// The inference service returned an error on every attempt.
    #[error("Batch {batch}: inference failed after {retries} retries: {detail}")]
    Inference {
        batch: usize,
        retries: u32,
        detail: String,
    },

    /// The inference call did not return within the configured timeout.
    #[error("Batch {batch}: inference timed out after {secs}s")]
    Timeout { batch: usize, secs: u64 },

    /// The reply decoded as JSON, but not as an array.
    #[error("Batch {batch}: response is not a JSON array")]
    NotAnArray { batch: usize },

    /// Neither the strict decode nor the recovery scan produced an array.
    #[error("Batch {batch}: could not parse response: {detail}")]
    Unparsable { batch: usize, detail: String },
}

/// Rejections surfaced to callers of the job orchestrator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum JobError {
    /// The submission carried no files at all.
    #[error("No files provided")]
    NoFiles,

    /// None of the submitted files has an accepted document extension.
    #[error("No valid documents found (rejected: {})", rejected.join(", "))]
    NoValidFiles { rejected: Vec<String> },

    /// The job id is unknown, or its result was already downloaded.
    #[error("Job '{job_id}' not found")]
    NotFound { job_id: String },

    /// The job is still running.
    #[error("Job '{job_id}' is not complete (status: {status})")]
    NotReady { job_id: String, status: JobStatus },

    /// The job ended in the error state; it has no result.
    #[error("Job '{job_id}' failed: {message}")]
    Failed { job_id: String, message: String },

    /// The job completed but extracted no entries.
    #[error("Job '{job_id}' produced no data")]
    NoData { job_id: String },

    /// A status change that would break the job lifecycle.
    #[error("Job '{job_id}': invalid transition {from} -> {to}")]
    InvalidTransition {
        job_id: String,
        from: JobStatus,
        to: JobStatus,
    },

    /// No tokio runtime is available to run the job.
    #[error("No async runtime available to run the job")]
    NoRuntime,

    /// Rendering the result spreadsheet failed.
    #[error("Export failed: {0}")]
    Export(String),
}

impl JobError {
    /// `true` for errors caused by the caller's request rather than the job.
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            JobError::Export(_) | JobError::InvalidTransition { .. } | JobError::NoRuntime
        )
    }
}

/// Failure while rendering entries to a spreadsheet.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("zip: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ExportError> for JobError {
    fn from(e: ExportError) -> Self {
        JobError::Export(e.to_string())
    }
}
