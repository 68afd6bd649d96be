//! Job lifecycle: submission, background processing, status and one-shot
//! retrieval.

pub mod environment;
pub mod orchestrator;
pub mod store;

pub use environment::EnvironmentInfo;
pub use orchestrator::{JobOrchestrator, SpreadsheetExport, Submission};
pub use store::{Job, JobStatus, JobStore, MetricsSnapshot};
