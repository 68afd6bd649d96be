//! In-memory job registry and aggregate metrics.
//!
//! The outer map lock is only held long enough to look up, insert or remove
//! a record; each record has its own mutex. A status poll therefore never
//! waits on another job's update. Lock order is always map → record →
//! metrics. A consumed job is dropped entirely; its id is a UUID v4 and is
//! not handed out again in practice.

use super::environment::EnvironmentInfo;
use crate::error::JobError;
use crate::output::TimesheetEntry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Processing,
    Completed,
    Error,
}

impl JobStatus {
    /// Only `processing` may move, and only to a terminal state.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Processing, JobStatus::Completed) | (JobStatus::Processing, JobStatus::Error)
        )
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Processing)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
        })
    }
}

/// Client-visible snapshot of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    /// Number of accepted files.
    pub total: usize,
    /// Files started so far; never exceeds `total`.
    pub processed: usize,
    pub current_file: Option<String>,
    pub total_entries: usize,
    pub error: Option<String>,
    pub environment: EnvironmentInfo,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Aggregate counters across every completed job.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub documents_processed: u64,
    pub entries_found: u64,
    pub images_processed: u64,
    pub hours_extracted: f64,
}

struct JobRecord {
    job: Job,
    result: Option<Vec<TimesheetEntry>>,
}

#[derive(Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<String, Arc<Mutex<JobRecord>>>>,
    metrics: Mutex<MetricsSnapshot>,
}

/// Poisoning only means another task panicked mid-update; the data is
/// still the last consistent write, so keep serving it.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new `processing` job with a fresh id.
    pub fn create(&self, total: usize, environment: EnvironmentInfo) -> Job {
        let mut jobs = self
            .jobs
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let id = loop {
            let candidate = uuid::Uuid::new_v4().to_string();
            if !jobs.contains_key(&candidate) {
                break candidate;
            }
        };

        let job = Job {
            id: id.clone(),
            status: JobStatus::Processing,
            total,
            processed: 0,
            current_file: None,
            total_entries: 0,
            error: None,
            environment,
            created_at: Utc::now(),
            finished_at: None,
        };

        jobs.insert(
            id,
            Arc::new(Mutex::new(JobRecord {
                job: job.clone(),
                result: None,
            })),
        );
        debug!("Job {} created with {} files", job.id, total);
        job
    }

    fn record(&self, id: &str) -> Result<Arc<Mutex<JobRecord>>, JobError> {
        let jobs = self
            .jobs
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        jobs.get(id).cloned().ok_or_else(|| JobError::NotFound {
            job_id: id.to_string(),
        })
    }

    pub fn get(&self, id: &str) -> Result<Job, JobError> {
        let record = self.record(id)?;
        let job = lock(&record).job.clone();
        Ok(job)
    }

    /// Mark the start of the next file.
    pub fn begin_file(&self, id: &str, file_name: &str) -> Result<(), JobError> {
        let record = self.record(id)?;
        let mut rec = lock(&record);
        if rec.job.status != JobStatus::Processing {
            return Err(JobError::InvalidTransition {
                job_id: id.to_string(),
                from: rec.job.status,
                to: JobStatus::Processing,
            });
        }
        rec.job.processed = (rec.job.processed + 1).min(rec.job.total);
        rec.job.current_file = Some(file_name.to_string());
        Ok(())
    }

    /// Store the result, finish the job and fold it into the metrics.
    ///
    /// `documents` and `images` describe the work done for this job.
    pub fn complete(
        &self,
        id: &str,
        entries: Vec<TimesheetEntry>,
        documents: usize,
        images: usize,
    ) -> Result<(), JobError> {
        let record = self.record(id)?;
        let mut rec = lock(&record);
        Self::transition(&mut rec.job, JobStatus::Completed)?;

        let hours: f64 = entries.iter().map(|e| e.hours).sum();
        rec.job.total_entries = entries.len();
        rec.job.processed = rec.job.total;
        rec.job.current_file = None;

        {
            let mut metrics = lock(&self.metrics);
            metrics.documents_processed += documents as u64;
            metrics.entries_found += entries.len() as u64;
            metrics.images_processed += images as u64;
            metrics.hours_extracted += hours;
        }

        info!("Job {} completed with {} entries", id, entries.len());
        rec.result = Some(entries);
        Ok(())
    }

    /// Finish the job in the error state. No result is kept.
    pub fn fail(&self, id: &str, message: impl Into<String>) -> Result<(), JobError> {
        let record = self.record(id)?;
        let mut rec = lock(&record);
        Self::transition(&mut rec.job, JobStatus::Error)?;
        rec.job.error = Some(message.into());
        rec.job.current_file = None;
        rec.result = None;
        Ok(())
    }

    fn transition(job: &mut Job, next: JobStatus) -> Result<(), JobError> {
        if !job.status.can_transition_to(next) {
            return Err(JobError::InvalidTransition {
                job_id: job.id.clone(),
                from: job.status,
                to: next,
            });
        }
        job.status = next;
        job.finished_at = Some(Utc::now());
        Ok(())
    }

    fn check_retrievable(rec: &JobRecord) -> Result<&Vec<TimesheetEntry>, JobError> {
        let job_id = rec.job.id.clone();
        match rec.job.status {
            JobStatus::Processing => Err(JobError::NotReady {
                job_id,
                status: JobStatus::Processing,
            }),
            JobStatus::Error => Err(JobError::Failed {
                job_id,
                message: rec.job.error.clone().unwrap_or_default(),
            }),
            JobStatus::Completed => match &rec.result {
                Some(entries) if !entries.is_empty() => Ok(entries),
                _ => Err(JobError::NoData { job_id }),
            },
        }
    }

    /// Copy of the result, leaving the job in place.
    pub fn peek_result(&self, id: &str) -> Result<Vec<TimesheetEntry>, JobError> {
        let record = self.record(id)?;
        let rec = lock(&record);
        Self::check_retrievable(&rec).cloned()
    }

    /// Remove a completed job and its result. Nothing about the job is kept.
    ///
    /// Exactly one caller succeeds for a given job; later calls see
    /// `NotFound`.
    pub fn consume(&self, id: &str) -> Result<Vec<TimesheetEntry>, JobError> {
        let mut jobs = self
            .jobs
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let record = jobs.get(id).cloned().ok_or_else(|| JobError::NotFound {
            job_id: id.to_string(),
        })?;

        let entries = {
            let mut rec = lock(&record);
            Self::check_retrievable(&rec)?;
            rec.result.take().unwrap_or_default()
        };

        jobs.remove(id);
        debug!("Job {} consumed", id);
        Ok(entries)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        *lock(&self.metrics)
    }

    /// Number of jobs currently held, consumed ones excluded.
    pub fn len(&self) -> usize {
        self.jobs
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
