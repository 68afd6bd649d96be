//! # timesheet-extract
//!
//! Pull timesheet entries out of screenshots pasted into Word documents,
//! using Vision Language Models, and hand them back as a spreadsheet.
//!
//! Each week someone screenshots the timesheet tool, drops the images into a
//! `.docx`, and a person retypes the rows. This crate reads the embedded
//! pictures directly, asks a VLM to transcribe the visible rows as JSON, and
//! collects the results into one `.xlsx` per job.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload (.docx)
//!  │
//!  ├─ 1. Container  read word/_rels/document.xml.rels, collect image parts
//!  ├─ 2. Normalise  decode, drop alpha, downscale to ≤1500 px (spawn_blocking)
//!  ├─ 3. Batch      ≤4 images per request, JPEG q90 → base64 ImageData
//!  ├─ 4. VLM        one call per batch, retry with backoff, per-call timeout
//!  ├─ 5. Parse      strict JSON array, else recover the first [...] block
//!  └─ 6. Export     single-sheet workbook, retrievable exactly once
//! ```
//!
//! Files of a job run one after another with a short pause between them;
//! batches of a file run in order. A failed batch or file costs only its own
//! entries.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use timesheet_extract::{ExtractionConfig, JobOrchestrator, JobStatus, UploadedFile};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from ANTHROPIC_API_KEY / OPENAI_API_KEY / …
//!     let orchestrator = JobOrchestrator::from_config(ExtractionConfig::default())?;
//!
//!     let bytes = std::fs::read("week23.docx")?;
//!     let submission = orchestrator.submit(vec![UploadedFile::new("week23.docx", bytes)])?;
//!
//!     while orchestrator.status(&submission.job_id)?.status == JobStatus::Processing {
//!         tokio::time::sleep(std::time::Duration::from_secs(2)).await;
//!     }
//!
//!     let export = orchestrator.retrieve(&submission.job_id)?;
//!     std::fs::write(&export.file_name, &export.bytes)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `timesheet-extract` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! timesheet-extract = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod job;
pub mod output;
pub mod pipeline;
pub mod prompts;
pub mod worker;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder};
pub use engine::BatchExtractionEngine;
pub use error::{BatchError, ExportError, ExtractError, JobError, TimesheetError};
pub use export::{SpreadsheetExporter, XlsxExporter};
pub use job::{
    EnvironmentInfo, Job, JobOrchestrator, JobStatus, MetricsSnapshot, SpreadsheetExport,
    Submission,
};
pub use output::{BatchReport, BatchStatus, FileExtraction, TimesheetEntry};
pub use pipeline::container::{DocxImageExtractor, ImageExtractor};
pub use pipeline::inference::{ExtractionRequest, InferenceResponse, InferenceService, LlmInference};
pub use worker::{FileExtractionWorker, UploadedFile};
