//! Batch extraction engine: images → inference batches → timesheet entries.
//!
//! A file's images are cut into contiguous batches of at most
//! `batch_size`. Each batch becomes one inference request and is handled in
//! isolation: a transport failure, a timeout or an unparsable reply drops
//! that batch only, never entries already collected from earlier batches of
//! the same file. Batches run one after another in extraction order, which
//! keeps the request rate of a single job flat.

use crate::config::ExtractionConfig;
use crate::error::BatchError;
use crate::output::{BatchReport, BatchStatus, FileExtraction, TimesheetEntry};
use crate::pipeline::encode;
use crate::pipeline::inference::{ExtractionRequest, InferenceResponse, InferenceService};
use crate::pipeline::parse::{parse_entries, ParseFailure, ParseOutcome};
use crate::prompts;
use image::RgbImage;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

/// Split `items` into contiguous batches of at most `batch_size`.
///
/// Produces `ceil(len / batch_size)` batches; concatenating them yields the
/// input unchanged. A `batch_size` of zero is treated as one.
pub fn partition<T>(items: &[T], batch_size: usize) -> std::slice::Chunks<'_, T> {
    items.chunks(batch_size.max(1))
}

/// Number of batches [`partition`] will produce.
pub fn batch_count(len: usize, batch_size: usize) -> usize {
    len.div_ceil(batch_size.max(1))
}

/// Delay before retry number `attempt` (1-based): `base * 2^(attempt - 1)`,
/// saturating instead of overflowing.
fn backoff_ms(base: u64, attempt: u32) -> u64 {
    base.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
}

/// Turns images into timesheet entries through an [`InferenceService`].
#[derive(Clone)]
pub struct BatchExtractionEngine {
    service: Arc<dyn InferenceService>,
    config: ExtractionConfig,
}

impl BatchExtractionEngine {
    pub fn new(service: Arc<dyn InferenceService>, config: ExtractionConfig) -> Self {
        Self { service, config }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Extract entries from `images`, tagging each with `label` as its source.
    ///
    /// Never fails: skipped batches are recorded in the returned
    /// [`FileExtraction::batches`] and contribute no entries.
    pub async fn extract(&self, images: &[RgbImage], label: &str) -> FileExtraction {
        let total_batches = batch_count(images.len(), self.config.batch_size);
        info!(
            "Processing {} images from {} in {} batches",
            images.len(),
            label,
            total_batches
        );

        let mut entries: Vec<TimesheetEntry> = Vec::new();
        let mut batches = Vec::with_capacity(total_batches);

        for (i, batch) in partition(images, self.config.batch_size).enumerate() {
            let batch_num = i + 1;
            debug!("Batch {}/{} for {}", batch_num, total_batches, label);

            let (report, batch_entries) = self.run_batch(batch, batch_num, label).await;
            match &report.status {
                BatchStatus::Skipped(e) => warn!("{}: {}", label, e),
                BatchStatus::Parsed => {
                    info!("Batch {}: found {} entries", batch_num, report.entry_count)
                }
                BatchStatus::Recovered => info!(
                    "Batch {}: found {} entries (recovered)",
                    batch_num, report.entry_count
                ),
            }
            entries.extend(batch_entries);
            batches.push(report);
        }

        for entry in &mut entries {
            entry.source_file = label.to_string();
        }

        info!("Total entries extracted from {}: {}", label, entries.len());

        FileExtraction {
            file_name: label.to_string(),
            image_count: images.len(),
            entries,
            batches,
            error: None,
        }
    }

    async fn run_batch(
        &self,
        batch: &[RgbImage],
        batch_num: usize,
        label: &str,
    ) -> (BatchReport, Vec<TimesheetEntry>) {
        let start = Instant::now();
        let mut report = BatchReport {
            batch_num,
            image_count: batch.len(),
            entry_count: 0,
            status: BatchStatus::Parsed,
            input_tokens: 0,
            output_tokens: 0,
            duration_ms: 0,
            retries: 0,
        };

        let images = match batch
            .iter()
            .map(|img| encode::encode_image(img, self.config.jpeg_quality))
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(images) => images,
            Err(e) => {
                report.status = BatchStatus::Skipped(BatchError::Encode {
                    batch: batch_num,
                    detail: e.to_string(),
                });
                report.duration_ms = start.elapsed().as_millis() as u64;
                return (report, Vec::new());
            }
        };

        let request = ExtractionRequest {
            instruction: prompts::batch_instruction(
                label,
                batch_num,
                self.config.instruction.as_deref(),
            ),
            images,
        };

        let response = match self.call_with_retry(&request, batch_num).await {
            Ok((response, retries)) => {
                report.retries = retries;
                response
            }
            Err(e) => {
                report.retries = self.config.max_retries;
                report.status = BatchStatus::Skipped(e);
                report.duration_ms = start.elapsed().as_millis() as u64;
                return (report, Vec::new());
            }
        };

        report.input_tokens = response.input_tokens;
        report.output_tokens = response.output_tokens;
        report.duration_ms = start.elapsed().as_millis() as u64;

        let entries = match parse_entries(&response.text) {
            ParseOutcome::Parsed(entries) => entries,
            ParseOutcome::Recovered(entries) => {
                report.status = BatchStatus::Recovered;
                entries
            }
            ParseOutcome::Failed(ParseFailure::NotAnArray) => {
                report.status = BatchStatus::Skipped(BatchError::NotAnArray { batch: batch_num });
                Vec::new()
            }
            ParseOutcome::Failed(failure) => {
                report.status = BatchStatus::Skipped(BatchError::Unparsable {
                    batch: batch_num,
                    detail: failure.to_string(),
                });
                Vec::new()
            }
        };

        report.entry_count = entries.len();
        (report, entries)
    }

    /// Call the service with per-attempt timeout and exponential backoff.
    ///
    /// Returns the response and the number of retries it took.
    async fn call_with_retry(
        &self,
        request: &ExtractionRequest,
        batch_num: usize,
    ) -> Result<(InferenceResponse, u32), BatchError> {
        let limit = Duration::from_secs(self.config.api_timeout_secs);
        let mut last_err = BatchError::Inference {
            batch: batch_num,
            retries: self.config.max_retries,
            detail: "Unknown error".to_string(),
        };

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let backoff = backoff_ms(self.config.retry_backoff_ms, attempt);
                warn!(
                    "Batch {}: retry {}/{} after {}ms",
                    batch_num, attempt, self.config.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match timeout(limit, self.service.infer(request)).await {
                Ok(Ok(response)) => return Ok((response, attempt)),
                Ok(Err(detail)) => {
                    warn!("Batch {}: attempt {} failed: {}", batch_num, attempt + 1, detail);
                    last_err = BatchError::Inference {
                        batch: batch_num,
                        retries: self.config.max_retries,
                        detail,
                    };
                }
                Err(_) => {
                    warn!(
                        "Batch {}: attempt {} timed out after {}s",
                        batch_num,
                        attempt + 1,
                        self.config.api_timeout_secs
                    );
                    last_err = BatchError::Timeout {
                        batch: batch_num,
                        secs: self.config.api_timeout_secs,
                    };
                }
            }
        }

        Err(last_err)
    }
}
