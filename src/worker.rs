//! File extraction worker: one uploaded document → one [`FileExtraction`].
//!
//! The uploaded bytes are written to a private temporary file so the
//! container reader can seek, then the blocking zip/decode work runs on
//! tokio's blocking pool. The temporary file is removed when its guard
//! drops, on every path out of [`FileExtractionWorker::process`].

use crate::config::ExtractionConfig;
use crate::engine::BatchExtractionEngine;
use crate::error::ExtractError;
use crate::output::FileExtraction;
use crate::pipeline::container::ImageExtractor;
use crate::pipeline::normalize::normalize_image;
use futures::FutureExt;
use image::RgbImage;
use std::io::Write;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{debug, error, info, warn};

/// A document as submitted by a client.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Client-supplied display name, e.g. `week23.docx`.
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

#[derive(Clone)]
pub struct FileExtractionWorker {
    extractor: Arc<dyn ImageExtractor>,
    engine: BatchExtractionEngine,
}

impl FileExtractionWorker {
    pub fn new(extractor: Arc<dyn ImageExtractor>, engine: BatchExtractionEngine) -> Self {
        Self { extractor, engine }
    }

    fn config(&self) -> &ExtractionConfig {
        self.engine.config()
    }

    /// Run a document through container parsing, normalisation and the
    /// batch engine.
    ///
    /// Never fails: errors and panics are logged and reported as an empty
    /// extraction carrying the message.
    pub async fn process(&self, job_id: &str, file: &UploadedFile) -> FileExtraction {
        info!("Job {}: processing {}", job_id, file.name);

        let outcome = AssertUnwindSafe(self.process_inner(file))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(extraction)) => extraction,
            Ok(Err(e)) => {
                error!("Job {}: {}: {}", job_id, file.name, e);
                FileExtraction::failed(&file.name, e.to_string())
            }
            Err(panic) => {
                let msg = panic_message(panic.as_ref());
                error!("Job {}: {} panicked: {}", job_id, file.name, msg);
                FileExtraction::failed(&file.name, format!("panic: {msg}"))
            }
        }
    }

    async fn process_inner(&self, file: &UploadedFile) -> Result<FileExtraction, ExtractError> {
        let temp = materialise(file)?;

        let extractor = Arc::clone(&self.extractor);
        let path = temp.path().to_path_buf();
        let max_dim = self.config().max_image_dimension;

        let images = tokio::task::spawn_blocking(move || load_images(extractor.as_ref(), &path, max_dim))
            .await
            .map_err(|e| ExtractError::Task(e.to_string()))??;

        // Images are decoded into memory; the document is no longer needed.
        drop(temp);

        if images.is_empty() {
            warn!("No images found in {}", file.name);
            return Ok(FileExtraction::empty(&file.name));
        }

        Ok(self.engine.extract(&images, &file.name).await)
    }
}

/// Write the uploaded bytes to a temporary file named with the original
/// extension.
fn materialise(file: &UploadedFile) -> Result<NamedTempFile, ExtractError> {
    let suffix = Path::new(&file.name)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();

    let wrap = |e: std::io::Error| ExtractError::Materialise {
        file: file.name.clone(),
        source: e,
    };

    let mut temp = tempfile::Builder::new()
        .prefix("timesheet-")
        .suffix(&suffix)
        .tempfile()
        .map_err(wrap)?;
    temp.write_all(&file.bytes).map_err(wrap)?;
    temp.flush().map_err(wrap)?;
    Ok(temp)
}

/// Extract and normalise every image; undecodable blobs are skipped.
fn load_images(
    extractor: &dyn ImageExtractor,
    path: &Path,
    max_dim: u32,
) -> Result<Vec<RgbImage>, ExtractError> {
    let blobs = extractor.extract_images(path)?;
    let total = blobs.len();

    let images: Vec<RgbImage> = blobs
        .iter()
        .enumerate()
        .filter_map(|(i, blob)| match normalize_image(blob, max_dim) {
            Ok(img) => {
                debug!("Image {}/{}: {}x{}", i + 1, total, img.width(), img.height());
                Some(img)
            }
            Err(e) => {
                warn!("Image {}/{} could not be decoded: {}", i + 1, total, e);
                None
            }
        })
        .collect();

    Ok(images)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
