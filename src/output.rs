//! Result types produced by the extraction pipeline.

use crate::error::BatchError;
use serde::{Deserialize, Serialize};

/// One timesheet row read from a screenshot.
///
/// Entries are built by [`crate::pipeline::parse`] from the model's reply and
/// are not modified afterwards, apart from the engine stamping
/// `source_file` before handing them to the caller.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TimesheetEntry {
    pub employee_name: String,
    /// Calendar date as `MM/DD/YYYY`.
    pub date: String,
    pub hours: f64,
    /// "Closed", "Open", "Submitted", "Pending", "Approved", or whatever the
    /// status panel showed.
    pub submission_status: String,
    pub week: String,
    pub total_hours: f64,
    /// Display name of the document the entry came from.
    pub source_file: String,
}

impl TimesheetEntry {
    /// `true` when the status is exactly "closed", ignoring case.
    pub fn is_closed(&self) -> bool {
        self.submission_status.eq_ignore_ascii_case("closed")
    }
}

/// How a single batch ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BatchStatus {
    /// The reply was a well-formed JSON array.
    Parsed,
    /// The array had to be recovered from surrounding text.
    Recovered,
    /// The batch contributed nothing.
    Skipped(BatchError),
}

/// Per-batch accounting kept alongside the entries of a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    /// 1-indexed batch number within the file.
    pub batch_num: usize,
    pub image_count: usize,
    pub entry_count: usize,
    pub status: BatchStatus,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
    pub retries: u32,
}

impl BatchReport {
    pub fn is_skipped(&self) -> bool {
        matches!(self.status, BatchStatus::Skipped(_))
    }
}

/// Everything one document yielded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileExtraction {
    pub file_name: String,
    /// Images that survived normalisation and were sent for inference.
    pub image_count: usize,
    pub entries: Vec<TimesheetEntry>,
    pub batches: Vec<BatchReport>,
    /// Set when the file failed before or outside batch processing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileExtraction {
    /// An empty result for a file that produced nothing.
    pub fn empty(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            ..Default::default()
        }
    }

    /// An empty result that records why the file produced nothing.
    pub fn failed(file_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn skipped_batches(&self) -> usize {
        self.batches.iter().filter(|b| b.is_skipped()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_status_is_case_insensitive_exact_match() {
        let mut e = TimesheetEntry {
            submission_status: "CLOSED".into(),
            ..Default::default()
        };
        assert!(e.is_closed());
        e.submission_status = " CLOSED ".into();
        assert!(!e.is_closed());
        e.submission_status = "Closed pending review".into();
        assert!(!e.is_closed());
    }

    #[test]
    fn failed_extraction_counts() {
        let f = FileExtraction::failed("a.docx", "not a zip");
        assert_eq!(f.entries.len(), 0);
        assert_eq!(f.error.as_deref(), Some("not a zip"));
        assert_eq!(f.skipped_batches(), 0);
    }

    #[test]
    fn entry_serialises_with_snake_case_fields() {
        let e = TimesheetEntry {
            employee_name: "A".into(),
            hours: 8.0,
            ..Default::default()
        };
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["employee_name"], "A");
        assert_eq!(json["hours"], 8.0);
    }
}
