//! CLI binary for timesheet-extract.
//!
//! A thin shim over the library crate: maps CLI flags to
//! `ExtractionConfig`, submits the documents as one job, follows it with a
//! progress bar and writes the resulting spreadsheet.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use timesheet_extract::{
    ExtractionConfig, Job, JobError, JobOrchestrator, JobStatus, MetricsSnapshot, UploadedFile,
};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

const AFTER_HELP: &str = r#"EXAMPLES:
  # One week's document
  timesheet-extract week23.docx -o week23.xlsx

  # A whole folder, written to the default timestamped name
  timesheet-extract timesheets/*.docx

  # Use a specific model
  timesheet-extract --provider openai --model gpt-4.1 week23.docx

  # Machine-readable summary
  timesheet-extract --json week23.docx > summary.json

ENVIRONMENT VARIABLES:
  ANTHROPIC_API_KEY       Anthropic API key (default provider)
  OPENAI_API_KEY          OpenAI API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  TIMESHEET_*             Fallback for every flag, e.g. TIMESHEET_BATCH_SIZE=2
"#;

/// Extract timesheet entries from screenshots in Word documents.
#[derive(Parser, Debug)]
#[command(
    name = "timesheet-extract",
    version,
    about = "Extract timesheet entries from screenshots in Word documents using Vision LLMs",
    long_about = "Reads the screenshots embedded in .docx files, asks a Vision Language Model \
to transcribe every visible timesheet row, and writes all rows into a single .xlsx workbook.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Documents to process (.docx).
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Write the workbook here instead of the default timestamped name.
    #[arg(short, long, env = "TIMESHEET_OUTPUT")]
    output: Option<PathBuf>,

    /// LLM model ID (e.g. claude-sonnet-4-20250514, gpt-4.1).
    #[arg(long, env = "TIMESHEET_MODEL")]
    model: Option<String>,

    /// LLM provider: anthropic, openai, gemini, ollama, azure.
    #[arg(long, env = "TIMESHEET_PROVIDER")]
    provider: Option<String>,

    /// Images per inference call (1–16).
    #[arg(long, env = "TIMESHEET_BATCH_SIZE", default_value_t = 4)]
    batch_size: usize,

    /// Longest image side in pixels before downscaling.
    #[arg(long, env = "TIMESHEET_MAX_IMAGE_DIMENSION", default_value_t = 1500)]
    max_image_dimension: u32,

    /// JPEG quality for images sent to the model (1–100).
    #[arg(long, env = "TIMESHEET_JPEG_QUALITY", default_value_t = 90)]
    jpeg_quality: u8,

    /// Max LLM output tokens per batch.
    #[arg(long, env = "TIMESHEET_MAX_TOKENS", default_value_t = 2000)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "TIMESHEET_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Retries per batch on LLM failure (0–10).
    #[arg(long, env = "TIMESHEET_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Per-call LLM timeout in seconds.
    #[arg(long, env = "TIMESHEET_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Pause between files in milliseconds.
    #[arg(long, env = "TIMESHEET_FILE_PAUSE_MS", default_value_t = 1000)]
    file_pause_ms: u64,

    /// Path to a text file replacing the extraction instruction.
    #[arg(long, env = "TIMESHEET_INSTRUCTION")]
    instruction: Option<PathBuf>,

    /// Print the final job record and metrics as JSON.
    #[arg(long, env = "TIMESHEET_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "TIMESHEET_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "TIMESHEET_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "TIMESHEET_QUIET")]
    quiet: bool,
}

#[derive(Serialize)]
struct Summary<'a> {
    job: &'a Job,
    metrics: MetricsSnapshot,
    output: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Library INFO logs would fight with the progress bar for the terminal.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli).await?;
    let orchestrator =
        JobOrchestrator::from_config(config).context("Failed to initialise LLM provider")?;

    let files = read_files(&cli.files).await?;
    let submission = orchestrator.submit(files).context("Submission rejected")?;

    let bar = show_progress.then(|| progress_bar(submission.total_files));
    let job = follow(&orchestrator, &submission.job_id, bar.as_ref()).await?;

    if let Some(ref bar) = bar {
        bar.finish_and_clear();
    }

    let written = match job.status {
        JobStatus::Completed => save(&orchestrator, &cli, &job).await?,
        JobStatus::Error | JobStatus::Processing => {
            anyhow::bail!(
                "Job failed: {}",
                job.error.as_deref().unwrap_or("unknown error")
            );
        }
    };

    if cli.json {
        let summary = Summary {
            job: &job,
            metrics: orchestrator.metrics(),
            output: written.as_ref().map(|p| p.display().to_string()),
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?
        );
    } else if !cli.quiet {
        match written {
            Some(path) => eprintln!(
                "{}  {} entries from {} files  →  {}",
                green("✔"),
                bold(&job.total_entries.to_string()),
                job.total,
                bold(&path.display().to_string()),
            ),
            None => eprintln!(
                "{}  no entries found in {} files",
                red("✘"),
                job.total
            ),
        }
        let m = orchestrator.metrics();
        eprintln!(
            "   {}",
            dim(&format!(
                "{} images  /  {:.1} hours extracted",
                m.images_processed, m.hours_extracted
            )),
        );
    }

    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(cli: &Cli) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .batch_size(cli.batch_size)
        .max_image_dimension(cli.max_image_dimension)
        .jpeg_quality(cli.jpeg_quality)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout)
        .file_pause_ms(cli.file_pause_ms);

    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref path) = cli.instruction {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read instruction from {:?}", path))?;
        builder = builder.instruction(text);
    }

    builder.build().context("Invalid configuration")
}

async fn read_files(paths: &[PathBuf]) -> Result<Vec<UploadedFile>> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        files.push(UploadedFile::new(name, bytes));
    }
    Ok(files)
}

fn progress_bar(total: usize) -> ProgressBar {
    let bar = ProgressBar::new(total as u64);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS),
    );
    bar.set_prefix("Extracting");
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

/// Poll until the job leaves `processing`.
async fn follow(
    orchestrator: &JobOrchestrator,
    job_id: &str,
    bar: Option<&ProgressBar>,
) -> Result<Job> {
    loop {
        let job = orchestrator.status(job_id).context("Lost track of job")?;

        if let Some(bar) = bar {
            bar.set_position(job.processed as u64);
            if let Some(ref name) = job.current_file {
                bar.set_message(name.clone());
            }
        }

        if job.status.is_terminal() {
            return Ok(job);
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}

/// Retrieve the workbook and write it atomically. `None` when the job
/// produced no entries.
async fn save(orchestrator: &JobOrchestrator, cli: &Cli, job: &Job) -> Result<Option<PathBuf>> {
    let export = match orchestrator.retrieve(&job.id) {
        Ok(export) => export,
        Err(JobError::NoData { .. }) => return Ok(None),
        Err(e) => return Err(e).context("Failed to retrieve result"),
    };

    let path = cli
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(&export.file_name));
    write_atomic(&path, &export.bytes).await?;
    Ok(Some(path))
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let tmp = path.with_extension("xlsx.tmp");
    tokio::fs::write(&tmp, bytes)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to move {} into place", tmp.display()))?;
    Ok(())
}
