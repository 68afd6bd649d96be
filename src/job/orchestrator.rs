//! Job orchestration: accept uploads, run them in the background, hand out
//! the spreadsheet exactly once.

use super::environment::EnvironmentInfo;
use super::store::{Job, JobStore, MetricsSnapshot};
use crate::config::ExtractionConfig;
use crate::engine::BatchExtractionEngine;
use crate::error::{JobError, TimesheetError};
use crate::export::{SpreadsheetExporter, XlsxExporter};
use crate::output::FileExtraction;
use crate::pipeline::container::{DocxImageExtractor, ImageExtractor};
use crate::pipeline::inference::{InferenceService, LlmInference};
use crate::worker::{FileExtractionWorker, UploadedFile};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{error, info, warn};

/// Returned by [`JobOrchestrator::submit`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub job_id: String,
    /// Number of files accepted into the job.
    pub total_files: usize,
}

/// A rendered result ready for download.
#[derive(Debug, Clone)]
pub struct SpreadsheetExport {
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

struct Inner {
    store: JobStore,
    worker: FileExtractionWorker,
    exporter: Arc<dyn SpreadsheetExporter>,
    config: ExtractionConfig,
}

/// Front door for clients. Cheap to clone; clones share one job store.
///
/// `submit`, `status` and `retrieve` are plain synchronous calls and may be
/// made from any thread. Background work runs on the tokio runtime that was
/// current when the orchestrator was built, or the one given through
/// [`JobOrchestrator::with_runtime`].
#[derive(Clone)]
pub struct JobOrchestrator {
    inner: Arc<Inner>,
    runtime: Option<Handle>,
}

impl JobOrchestrator {
    pub fn new(
        config: ExtractionConfig,
        extractor: Arc<dyn ImageExtractor>,
        service: Arc<dyn InferenceService>,
        exporter: Arc<dyn SpreadsheetExporter>,
    ) -> Self {
        let engine = BatchExtractionEngine::new(service, config.clone());
        Self {
            inner: Arc::new(Inner {
                store: JobStore::new(),
                worker: FileExtractionWorker::new(extractor, engine),
                exporter,
                config,
            }),
            runtime: Handle::try_current().ok(),
        }
    }

    /// Run background jobs on `runtime` instead of the ambient one.
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// `.docx` extraction, the configured LLM provider and `.xlsx` export.
    pub fn from_config(config: ExtractionConfig) -> Result<Self, TimesheetError> {
        let service = LlmInference::from_config(&config)?;
        Ok(Self::new(
            config,
            Arc::new(DocxImageExtractor::new()),
            Arc::new(service),
            Arc::new(XlsxExporter::new()),
        ))
    }

    /// Accept a batch of uploads and start processing in the background.
    ///
    /// Files without an accepted extension are dropped with a warning; the
    /// job's `total` counts only the accepted ones.
    pub fn submit(&self, files: Vec<UploadedFile>) -> Result<Submission, JobError> {
        if files.is_empty() {
            return Err(JobError::NoFiles);
        }

        let (accepted, rejected): (Vec<UploadedFile>, Vec<UploadedFile>) = files
            .into_iter()
            .partition(|f| self.inner.config.accepts(&f.name));

        let rejected: Vec<String> = rejected.into_iter().map(|f| f.name).collect();
        if accepted.is_empty() {
            return Err(JobError::NoValidFiles { rejected });
        }
        if !rejected.is_empty() {
            warn!("Ignoring unsupported files: {}", rejected.join(", "));
        }

        // Resolve the runtime before registering, so a refusal leaves no job behind.
        let runtime = self
            .runtime
            .clone()
            .or_else(|| Handle::try_current().ok())
            .ok_or(JobError::NoRuntime)?;

        let job = self.inner.store.create(accepted.len(), EnvironmentInfo::detect());
        info!("Job {}: accepted {} files", job.id, accepted.len());

        let inner = Arc::clone(&self.inner);
        let job_id = job.id.clone();
        runtime.spawn(async move {
            run_job(inner, job_id, accepted).await;
        });

        Ok(Submission {
            job_id: job.id,
            total_files: job.total,
        })
    }

    pub fn status(&self, job_id: &str) -> Result<Job, JobError> {
        self.inner.store.get(job_id)
    }

    /// Render and hand over the result, then forget the job.
    ///
    /// Succeeds at most once per job. If rendering fails the job is left in
    /// place so the caller may retry.
    pub fn retrieve(&self, job_id: &str) -> Result<SpreadsheetExport, JobError> {
        let entries = self.inner.store.peek_result(job_id)?;
        let exporter = &self.inner.exporter;
        let bytes = exporter.render(&entries)?;
        let file_name = exporter.file_name(chrono::Local::now());

        self.inner.store.consume(job_id)?;
        info!("Job {}: delivered {} ({} entries)", job_id, file_name, entries.len());

        Ok(SpreadsheetExport {
            file_name,
            content_type: exporter.content_type(),
            bytes,
        })
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.store.metrics()
    }

    /// Jobs still held: running, or finished but not yet retrieved.
    pub fn active_jobs(&self) -> usize {
        self.inner.store.len()
    }
}

async fn run_job(inner: Arc<Inner>, job_id: String, files: Vec<UploadedFile>) {
    let outcome = AssertUnwindSafe(process_files(&inner, &job_id, &files))
        .catch_unwind()
        .await;

    let message = match outcome {
        Ok(Ok(())) => return,
        Ok(Err(e)) => e.to_string(),
        Err(panic) => match panic.downcast_ref::<&str>() {
            Some(s) => format!("panic: {s}"),
            None => match panic.downcast_ref::<String>() {
                Some(s) => format!("panic: {s}"),
                None => "panic during job processing".to_string(),
            },
        },
    };

    error!("Job {} failed: {}", job_id, message);
    if let Err(e) = inner.store.fail(&job_id, message) {
        error!("Job {}: could not record failure: {}", job_id, e);
    }
}

async fn process_files(
    inner: &Inner,
    job_id: &str,
    files: &[UploadedFile],
) -> Result<(), JobError> {
    let pause = inner.config.file_pause();
    let mut results: Vec<FileExtraction> = Vec::with_capacity(files.len());

    for (i, file) in files.iter().enumerate() {
        inner.store.begin_file(job_id, &file.name)?;
        info!("Job {}: file {}/{}: {}", job_id, i + 1, files.len(), file.name);

        results.push(inner.worker.process(job_id, file).await);

        if i + 1 < files.len() && !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
    }

    let images: usize = results.iter().map(|r| r.image_count).sum();
    let entries = results.into_iter().flat_map(|r| r.entries).collect();
    inner.store.complete(job_id, entries, files.len(), images)
}
