//! End-to-end tests for timesheet-extract.
//!
//! Every test drives the public `JobOrchestrator` with generated `.docx`
//! fixtures and a scripted `InferenceService`, so no network access or API
//! key is needed.
//!
//! Run with:
//!   cargo test --test e2e -- --nocapture

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::collections::VecDeque;
use std::io::{Cursor, Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use timesheet_extract::{
    DocxImageExtractor, ExtractionConfig, ExtractionRequest, InferenceResponse, InferenceService,
    Job, JobError, JobOrchestrator, JobStatus, UploadedFile, XlsxExporter,
};
use tokio_test::{assert_err, assert_ok};
use zip::write::SimpleFileOptions;

// ── Test helpers ─────────────────────────────────────────────────────────────

const ENTRY_A: &str = r#"{"employee_name":"A","date":"06/09/2025","hours":8.0,"submission_status":"Closed","week":"W23","total_hours":40.0}"#;
const ENTRY_B: &str = r#"{"employee_name":"B","date":"06/10/2025","hours":7.5,"submission_status":"Open","week":"W23","total_hours":37.5}"#;

fn array(entries: &[&str]) -> String {
    format!("[{}]", entries.join(","))
}

/// Replies from a queue and records the image count of every request.
struct ScriptedService {
    replies: Mutex<VecDeque<Result<String, String>>>,
    image_counts: Mutex<Vec<usize>>,
    delay: Duration,
}

impl ScriptedService {
    fn new(replies: Vec<Result<String, String>>) -> Arc<Self> {
        Self::with_delay(replies, Duration::ZERO)
    }

    fn with_delay(replies: Vec<Result<String, String>>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            image_counts: Mutex::new(Vec::new()),
            delay,
        })
    }

    fn calls(&self) -> Vec<usize> {
        self.image_counts.lock().unwrap().clone()
    }
}

#[async_trait]
impl InferenceService for ScriptedService {
    async fn infer(&self, request: &ExtractionRequest) -> Result<InferenceResponse, String> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.image_counts.lock().unwrap().push(request.images.len());
        let next = self.replies.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok("[]".to_string()))
            .map(InferenceResponse::text)
    }
}

/// Panics on the first call, then behaves.
struct PanicsOnce(AtomicUsize);

#[async_trait]
impl InferenceService for PanicsOnce {
    async fn infer(&self, _request: &ExtractionRequest) -> Result<InferenceResponse, String> {
        if self.0.fetch_add(1, Ordering::SeqCst) == 0 {
            panic!("provider client bug");
        }
        Ok(InferenceResponse::text(array(&[ENTRY_B])))
    }
}

fn png(shade: u8) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 12, Rgb([shade, 255 - shade, 0])));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

/// A minimal `.docx` holding `images` screenshots.
fn docx(images: usize) -> Vec<u8> {
    let mut rels = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>"#,
    );
    for i in 1..=images {
        rels.push_str(&format!(
            r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="media/image{}.png"/>"#,
            i + 10,
            i
        ));
    }
    rels.push_str("</Relationships>");

    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    zip.start_file("word/document.xml", options).unwrap();
    zip.write_all(b"<w:document/>").unwrap();
    zip.start_file("word/_rels/document.xml.rels", options).unwrap();
    zip.write_all(rels.as_bytes()).unwrap();
    for i in 1..=images {
        zip.start_file(format!("word/media/image{i}.png"), options)
            .unwrap();
        zip.write_all(&png(i as u8 * 20)).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

fn config() -> ExtractionConfig {
    ExtractionConfig::builder()
        .max_retries(0)
        .file_pause_ms(0)
        .build()
        .unwrap()
}

fn orchestrator(service: Arc<dyn InferenceService>) -> JobOrchestrator {
    orchestrator_with(config(), service)
}

fn orchestrator_with(config: ExtractionConfig, service: Arc<dyn InferenceService>) -> JobOrchestrator {
    JobOrchestrator::new(
        config,
        Arc::new(DocxImageExtractor::new()),
        service,
        Arc::new(XlsxExporter::new()),
    )
}

/// Poll until the job leaves `processing`, checking progress invariants on
/// every observation.
async fn wait_for(orch: &JobOrchestrator, job_id: &str) -> Job {
    let mut last_processed = 0;
    for _ in 0..1000 {
        let job = assert_ok!(orch.status(job_id));
        assert!(job.processed <= job.total, "processed exceeded total: {job:?}");
        assert!(job.processed >= last_processed, "processed went backwards");
        last_processed = job.processed;
        if job.status != JobStatus::Processing {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("job {job_id} did not finish");
}

fn sheet_xml(bytes: &[u8]) -> String {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut out = String::new();
    archive
        .by_name("xl/worksheets/sheet1.xml")
        .unwrap()
        .read_to_string(&mut out)
        .unwrap();
    out
}

// ── Scenarios ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn two_documents_one_entry_each() {
    let service = ScriptedService::new(vec![Ok(array(&[ENTRY_A])), Ok(array(&[ENTRY_B]))]);
    let orch = orchestrator(service.clone());

    let submission = assert_ok!(orch.submit(vec![
        UploadedFile::new("week23.docx", docx(1)),
        UploadedFile::new("week24.docx", docx(1)),
    ]));
    assert_eq!(submission.total_files, 2);

    let job = wait_for(&orch, &submission.job_id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.total_entries, 2);
    assert_eq!(job.processed, 2);
    assert!(job.finished_at.is_some());
    assert_eq!(service.calls(), vec![1, 1]);

    let export = assert_ok!(orch.retrieve(&submission.job_id));
    assert!(export.file_name.starts_with("timesheet_data_"));
    assert!(export.file_name.ends_with(".xlsx"));
    let sheet = sheet_xml(&export.bytes);
    assert!(sheet.contains("week23.docx"));
    assert!(sheet.contains("week24.docx"));
}

#[tokio::test]
async fn bad_second_batch_keeps_first_batch_entries() {
    let service = ScriptedService::new(vec![
        Ok(array(&[ENTRY_A, ENTRY_B])),
        Ok(r#"[{"employee_name": "C", "hours": 4"#.to_string()),
    ]);
    let orch = orchestrator(service.clone());

    let submission = assert_ok!(orch.submit(vec![UploadedFile::new("five.docx", docx(5))]));
    let job = wait_for(&orch, &submission.job_id).await;

    assert_eq!(service.calls(), vec![4, 1]);
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.total_entries, 2);
}

#[tokio::test]
async fn document_without_images_completes_empty() {
    let service = ScriptedService::new(Vec::new());
    let orch = orchestrator(service.clone());

    let submission = assert_ok!(orch.submit(vec![UploadedFile::new("blank.docx", docx(0))]));
    let job = wait_for(&orch, &submission.job_id).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.total_entries, 0);
    assert!(job.error.is_none());
    assert!(service.calls().is_empty());

    let err = assert_err!(orch.retrieve(&submission.job_id));
    assert!(matches!(err, JobError::NoData { .. }));
}

#[tokio::test]
async fn prose_wrapped_reply_is_recovered() {
    let reply = format!("Here you go: {} Thanks.", array(&[ENTRY_A]));
    let orch = orchestrator(ScriptedService::new(vec![Ok(reply)]));

    let submission = assert_ok!(orch.submit(vec![UploadedFile::new("a.docx", docx(1))]));
    let job = wait_for(&orch, &submission.job_id).await;
    assert_eq!(job.total_entries, 1);

    let sheet = sheet_xml(&assert_ok!(orch.retrieve(&submission.job_id)).bytes);
    assert!(sheet.contains("06/09/2025"));
    // Closed rows get the highlighted status style.
    assert!(sheet.contains(r#"<c r="D2" s="3""#));
}

#[tokio::test]
async fn unknown_job_is_not_found_and_running_job_is_not_ready() {
    let service = ScriptedService::with_delay(vec![Ok(array(&[ENTRY_A]))], Duration::from_millis(300));
    let orch = orchestrator(service);

    let err = assert_err!(orch.retrieve("never-submitted"));
    assert_eq!(
        err,
        JobError::NotFound {
            job_id: "never-submitted".into()
        }
    );
    assert!(matches!(
        orch.status("never-submitted"),
        Err(JobError::NotFound { .. })
    ));

    let submission = assert_ok!(orch.submit(vec![UploadedFile::new("a.docx", docx(1))]));
    let err = assert_err!(orch.retrieve(&submission.job_id));
    assert!(matches!(
        err,
        JobError::NotReady {
            status: JobStatus::Processing,
            ..
        }
    ));

    wait_for(&orch, &submission.job_id).await;
    assert_ok!(orch.retrieve(&submission.job_id));
}

// ── Retrieval ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn result_is_delivered_exactly_once() {
    let orch = orchestrator(ScriptedService::new(vec![Ok(array(&[ENTRY_A]))]));
    let submission = assert_ok!(orch.submit(vec![UploadedFile::new("a.docx", docx(1))]));
    wait_for(&orch, &submission.job_id).await;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let orch = orch.clone();
            let id = submission.job_id.clone();
            std::thread::spawn(move || orch.retrieve(&id).is_ok())
        })
        .collect();
    let delivered = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();
    assert_eq!(delivered, 1);

    assert!(matches!(
        orch.retrieve(&submission.job_id),
        Err(JobError::NotFound { .. })
    ));
    assert!(matches!(
        orch.status(&submission.job_id),
        Err(JobError::NotFound { .. })
    ));
}

// ── Submission ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn empty_submission_is_rejected() {
    let orch = orchestrator(ScriptedService::new(Vec::new()));
    assert_eq!(assert_err!(orch.submit(Vec::new())), JobError::NoFiles);
}

#[tokio::test]
async fn submission_without_documents_is_rejected() {
    let orch = orchestrator(ScriptedService::new(Vec::new()));
    let err = assert_err!(orch.submit(vec![
        UploadedFile::new("notes.txt", b"hi".to_vec()),
        UploadedFile::new("scan.pdf", b"%PDF".to_vec()),
    ]));
    assert_eq!(
        err,
        JobError::NoValidFiles {
            rejected: vec!["notes.txt".into(), "scan.pdf".into()]
        }
    );
}

#[tokio::test]
async fn unsupported_files_are_dropped_from_total() {
    let orch = orchestrator(ScriptedService::new(vec![Ok(array(&[ENTRY_A]))]));
    let submission = assert_ok!(orch.submit(vec![
        UploadedFile::new("notes.txt", b"hi".to_vec()),
        UploadedFile::new("WEEK23.DOCX", docx(1)),
    ]));
    assert_eq!(submission.total_files, 1);

    let job = wait_for(&orch, &submission.job_id).await;
    assert_eq!(job.total, 1);
    assert_eq!(job.total_entries, 1);
}

// ── Fault isolation ──────────────────────────────────────────────────────────

#[tokio::test]
async fn corrupt_document_does_not_fail_the_job() {
    let orch = orchestrator(ScriptedService::new(vec![Ok(array(&[ENTRY_B]))]));
    let submission = assert_ok!(orch.submit(vec![
        UploadedFile::new("broken.docx", b"this is not a zip archive".to_vec()),
        UploadedFile::new("good.docx", docx(1)),
    ]));

    let job = wait_for(&orch, &submission.job_id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.processed, 2);
    assert_eq!(job.total_entries, 1);
}

#[tokio::test]
async fn inference_failure_skips_only_that_batch() {
    let service = ScriptedService::new(vec![
        Err("503 overloaded".to_string()),
        Ok(array(&[ENTRY_A])),
    ]);
    let orch = orchestrator(service.clone());

    let submission = assert_ok!(orch.submit(vec![UploadedFile::new("eight.docx", docx(8))]));
    let job = wait_for(&orch, &submission.job_id).await;

    assert_eq!(service.calls(), vec![4, 4]);
    assert_eq!(job.total_entries, 1);
}

#[tokio::test]
async fn panic_in_service_is_contained_per_file() {
    let orch = orchestrator(Arc::new(PanicsOnce(AtomicUsize::new(0))));
    let submission = assert_ok!(orch.submit(vec![
        UploadedFile::new("first.docx", docx(1)),
        UploadedFile::new("second.docx", docx(1)),
    ]));

    let job = wait_for(&orch, &submission.job_id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.total_entries, 1);
}

// ── Progress & metrics ───────────────────────────────────────────────────────

#[tokio::test]
async fn progress_is_monotonic_while_polling() {
    let service = ScriptedService::with_delay(
        vec![
            Ok(array(&[ENTRY_A])),
            Ok(array(&[ENTRY_A])),
            Ok(array(&[ENTRY_A])),
        ],
        Duration::from_millis(30),
    );
    let cfg = ExtractionConfig::builder()
        .max_retries(0)
        .file_pause_ms(20)
        .build()
        .unwrap();
    let orch = orchestrator_with(cfg, service);

    let files = (1..=3)
        .map(|i| UploadedFile::new(format!("w{i}.docx"), docx(1)))
        .collect();
    let submission = assert_ok!(orch.submit(files));

    let job = wait_for(&orch, &submission.job_id).await;
    assert_eq!(job.processed, 3);
    assert_eq!(job.total_entries, 3);
    assert!(job.current_file.is_none());
}

#[tokio::test]
async fn metrics_accumulate_per_completed_job() {
    let service = ScriptedService::new(vec![
        Ok(array(&[ENTRY_A, ENTRY_B])),
        Ok(array(&[ENTRY_B])),
    ]);
    let orch = orchestrator(service);
    assert_eq!(orch.metrics().documents_processed, 0);

    let first = assert_ok!(orch.submit(vec![UploadedFile::new("a.docx", docx(2))]));
    wait_for(&orch, &first.job_id).await;
    let second = assert_ok!(orch.submit(vec![UploadedFile::new("b.docx", docx(1))]));
    wait_for(&orch, &second.job_id).await;

    let m = orch.metrics();
    assert_eq!(m.documents_processed, 2);
    assert_eq!(m.entries_found, 3);
    assert_eq!(m.images_processed, 3);
    assert_eq!(m.hours_extracted, 23.0);

    // Downloading does not count again.
    assert_ok!(orch.retrieve(&first.job_id));
    assert_eq!(orch.metrics(), m);
}

#[tokio::test]
async fn job_records_environment() {
    let orch = orchestrator(ScriptedService::new(Vec::new()));
    let submission = assert_ok!(orch.submit(vec![UploadedFile::new("a.docx", docx(0))]));
    let job = assert_ok!(orch.status(&submission.job_id));
    assert!(job.environment.platform.contains(std::env::consts::OS));
}

// ── Synchronous callers ──────────────────────────────────────────────────────

#[test]
fn submit_from_plain_thread_runs_on_given_runtime() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let orch = orchestrator(ScriptedService::new(vec![Ok(array(&[ENTRY_A]))]))
        .with_runtime(rt.handle().clone());

    let worker = orch.clone();
    let export = std::thread::spawn(move || {
        let submission = worker
            .submit(vec![UploadedFile::new("a.docx", docx(1))])
            .unwrap();
        for _ in 0..1000 {
            let job = worker.status(&submission.job_id).unwrap();
            if job.status.is_terminal() {
                assert_eq!(job.status, JobStatus::Completed);
                return worker.retrieve(&submission.job_id).unwrap();
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("job did not finish");
    })
    .join()
    .unwrap();

    assert!(sheet_xml(&export.bytes).contains("06/09/2025"));
    assert_eq!(orch.active_jobs(), 0);
}

#[test]
fn submit_without_runtime_is_refused_and_registers_nothing() {
    let orch = orchestrator(ScriptedService::new(Vec::new()));

    let err = orch
        .submit(vec![UploadedFile::new("a.docx", docx(1))])
        .unwrap_err();

    assert_eq!(err, JobError::NoRuntime);
    assert_eq!(orch.active_jobs(), 0);
}
