//! Download command implementation

use crate::credentials::EnvCredentials;
use crate::downloader::config::{
    DEFAULT_API_TIMEOUT_SECS, DEFAULT_CONCURRENCY, DEFAULT_MAX_ATTEMPTS, DEFAULT_RATE_LIMIT,
    MAX_ATTEMPTS_LIMIT, MAX_CONCURRENCY,
};
use crate::downloader::{run_with_progress, DownloadError, FetchConfig, JobSummary};
use crate::fetcher::RetryPolicy;
use crate::filter::TitleFilter;
use crate::output::{DirectorySink, OutputOptions};
use crate::resume::verify_dir;
use crate::DateRange;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::{CliError, InfoArgs, ListCallsArgs, TestArgs};

/// Parse and validate concurrency value
fn parse_concurrency(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if value == 0 {
        return Err("concurrency must be at least 1".to_string());
    }
    if value > MAX_CONCURRENCY {
        return Err(format!(
            "concurrency {value} exceeds maximum of {MAX_CONCURRENCY}"
        ));
    }
    Ok(value)
}

/// Parse a calls-per-second budget
fn parse_rate_limit(s: &str) -> Result<f64, String> {
    let value: f64 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;
    if !value.is_finite() || value <= 0.0 {
        return Err("rate limit must be a positive number of calls per second".to_string());
    }
    Ok(value)
}

/// Resume modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeMode {
    /// Keep progress in memory only
    Off,
    /// Resume from checkpoints if available
    On,
    /// Reset resume state and start fresh
    Reset,
    /// Verify resume state integrity before starting
    Verify,
}

impl FromStr for ResumeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "off" => Ok(ResumeMode::Off),
            "on" => Ok(ResumeMode::On),
            "reset" => Ok(ResumeMode::Reset),
            "verify" => Ok(ResumeMode::Verify),
            _ => Err(format!(
                "Invalid resume mode: {s}. Valid options: on, off, reset, verify"
            )),
        }
    }
}

/// Handle Reset mode: delete existing resume directory
fn handle_resume_reset(resume_dir: &Path) -> Result<(), CliError> {
    if resume_dir.exists() {
        info!(dir = %resume_dir.display(), "Reset mode: deleting existing resume directory");
        std::fs::remove_dir_all(resume_dir).map_err(|e| {
            CliError::InvalidArgument(format!(
                "Failed to delete resume directory {}: {e}",
                resume_dir.display()
            ))
        })?;
    }
    Ok(())
}

/// Handle Verify mode: check every checkpoint file in the directory
fn handle_resume_verify(resume_dir: &Path) -> Result<(), CliError> {
    if !resume_dir.exists() {
        info!("Verify mode: resume directory does not exist, nothing to verify");
        return Ok(());
    }

    let mut valid_count = 0;
    let mut error_count = 0;
    for (path, result) in verify_dir(resume_dir)? {
        match result {
            Ok(checkpoint) => {
                info!(
                    path = %path.display(),
                    range = %checkpoint.range,
                    completed = checkpoint.completed.len(),
                    "Valid checkpoint"
                );
                valid_count += 1;
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "Invalid checkpoint");
                error_count += 1;
            }
        }
    }

    if error_count > 0 {
        return Err(CliError::InvalidArgument(format!(
            "Verify failed: {error_count} invalid checkpoint file(s) found. Use --resume reset to clear."
        )));
    }

    info!("Verify passed: {} valid checkpoint file(s)", valid_count);
    Ok(())
}

/// Gong transcript downloader CLI
#[derive(Parser, Debug)]
#[command(name = "transcript-downloader")]
#[command(about = "Download Gong call transcripts with resume and rate limiting", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (json or human)
    #[arg(long, global = true, default_value = "human")]
    pub output_format: OutputFormat,

    /// Resume mode: on, off, reset, or verify
    #[arg(long, global = true, default_value = "on")]
    pub resume: ResumeMode,

    /// Checkpoint directory (default: <output-dir>/.resume)
    #[arg(long, global = true)]
    pub resume_dir: Option<PathBuf>,

    /// Concurrent transcript fetches (max: 32)
    ///
    /// Every request still waits on the shared rate limit, so raising this
    /// only helps while responses are slower than the budget.
    #[arg(
        long,
        global = true,
        env = "MAX_CONCURRENT_DOWNLOADS",
        default_value_t = DEFAULT_CONCURRENCY,
        value_parser = parse_concurrency
    )]
    pub concurrency: usize,

    /// Attempts per request before giving up on transient errors (range: 1-20)
    #[arg(
        long,
        global = true,
        env = "MAX_RETRIES",
        default_value_t = DEFAULT_MAX_ATTEMPTS,
        value_parser = clap::value_parser!(u32).range(1..=MAX_ATTEMPTS_LIMIT as i64)
    )]
    pub max_retries: u32,

    /// API calls per second, shared by listing and transcript requests
    #[arg(
        long,
        global = true,
        env = "API_RATE_LIMIT",
        default_value_t = DEFAULT_RATE_LIMIT,
        value_parser = parse_rate_limit
    )]
    pub rate_limit: f64,

    /// Per-request timeout in seconds
    #[arg(long, global = true, env = "API_TIMEOUT", default_value_t = DEFAULT_API_TIMEOUT_SECS)]
    pub api_timeout: u64,

    /// Serve Prometheus metrics on this address (e.g. 127.0.0.1:9000)
    #[arg(long, global = true, env = "METRICS_ADDR")]
    pub metrics_addr: Option<SocketAddr>,

    /// Send API requests here instead of https://<subdomain>.api.gong.io
    #[arg(long, global = true, env = "GONG_API_BASE_URL")]
    pub api_base_url: Option<String>,
}

impl Cli {
    /// Job settings shared by every command that talks to the API
    pub fn base_config(&self, range: DateRange) -> FetchConfig {
        FetchConfig::new(range)
            .with_concurrency(self.concurrency)
            .with_rate_limit(self.rate_limit)
            .with_retry(RetryPolicy::with_max_attempts(self.max_retries))
            .with_api_timeout(Duration::from_secs(self.api_timeout))
            .with_api_base_url(self.api_base_url.clone())
    }
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download transcripts for a date range
    Download(DownloadArgs),

    /// List calls in a date range without downloading transcripts
    ListCalls(ListCallsArgs),

    /// Check credentials and connectivity
    Test(TestArgs),

    /// Show the effective configuration
    Info(InfoArgs),
}

/// Download command arguments
#[derive(Parser, Debug)]
pub struct DownloadArgs {
    /// First day to download (YYYY-MM-DD)
    #[arg(long, env = "DOWNLOAD_START_DATE", default_value = "2022-01-01")]
    pub start_date: String,

    /// Last day to download, inclusive (YYYY-MM-DD)
    #[arg(long, env = "DOWNLOAD_END_DATE", default_value = "2024-12-31")]
    pub end_date: String,

    /// Root directory for downloaded files
    #[arg(long, env = "OUTPUT_DIRECTORY", default_value = "./transcripts")]
    pub output_dir: PathBuf,

    /// Only fetch calls whose title matches ("a and b" needs both, "a, b" needs either)
    #[arg(long)]
    pub title_filter: Option<TitleFilter>,

    /// List calls without fetching transcripts or writing files
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// Skip raw JSON files
    #[arg(long, default_value_t = false)]
    pub no_raw_json: bool,

    /// Skip formatted text transcripts
    #[arg(long, default_value_t = false)]
    pub no_text: bool,

    /// Skip the metadata and participant CSV files
    #[arg(long, default_value_t = false)]
    pub no_metadata_csv: bool,
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Human-readable output
    Human,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "human" => Ok(OutputFormat::Human),
            _ => Err(format!("Invalid output format: {s}")),
        }
    }
}

impl DownloadArgs {
    /// Parsed, validated date range
    pub fn range(&self) -> Result<DateRange, CliError> {
        DateRange::parse(&self.start_date, &self.end_date).map_err(CliError::InvalidArgument)
    }

    fn output_options(&self) -> OutputOptions {
        OutputOptions {
            raw_json: !self.no_raw_json,
            formatted_text: !self.no_text,
            metadata_csv: !self.no_metadata_csv,
        }
    }

    /// Build the library configuration from CLI flags
    pub fn fetch_config(&self, cli: &Cli) -> Result<FetchConfig, CliError> {
        let range = self.range()?;
        let mut config = cli
            .base_config(range)
            .with_title_filter(self.title_filter.clone())
            .with_dry_run(self.dry_run);
        if cli.resume != ResumeMode::Off {
            config = config.with_checkpoint_dir(self.resume_dir(cli));
        }
        config.validate().map_err(CliError::ConfigurationError)?;
        Ok(config)
    }

    /// Checkpoint directory: `--resume-dir`, else `<output-dir>/.resume`
    pub fn resume_dir(&self, cli: &Cli) -> PathBuf {
        cli.resume_dir
            .clone()
            .unwrap_or_else(|| self.output_dir.join(".resume"))
    }

    /// Execute the download
    pub async fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let config = self.fetch_config(cli)?;
        let range = config.range;

        let resume_dir = self.resume_dir(cli);
        match cli.resume {
            ResumeMode::Reset => handle_resume_reset(&resume_dir)?,
            ResumeMode::Verify => handle_resume_verify(&resume_dir)?,
            ResumeMode::On | ResumeMode::Off => {}
        }

        let sink = DirectorySink::open(&self.output_dir, &range, self.output_options())?;
        let root = sink.layout().root().to_path_buf();

        info!(
            range = %range,
            output = %root.display(),
            dry_run = self.dry_run,
            "Starting transcript download"
        );

        let progress = create_progress_bar(&range, cli.output_format);
        let result =
            run_with_progress(config, &EnvCredentials, Arc::new(sink), Some(progress.clone()))
                .await;
        progress.finish_and_clear();

        match cli.output_format {
            OutputFormat::Json => output_json(&range, &root, &result)?,
            OutputFormat::Human => output_human(&root, &result),
        }

        if let Err(DownloadError::Cancelled { .. }) = &result {
            warn!("Download interrupted; run the same command again to resume");
        }
        result.map(|_| ()).map_err(CliError::DownloadError)
    }
}

/// Output result as JSON
fn output_json(
    range: &DateRange,
    root: &Path,
    result: &Result<JobSummary, DownloadError>,
) -> Result<(), CliError> {
    let output = match result {
        Ok(summary) => serde_json::json!({
            "success": true,
            "start_date": range.start.to_string(),
            "end_date": range.end.to_string(),
            "output_path": root.display().to_string(),
            "dry_run": summary.dry_run,
            "pages": summary.pages,
            "listed": summary.listed,
            "transcribed": summary.transcribed,
            "unavailable": summary.unavailable,
            "already_completed": summary.already_completed,
            "filtered": summary.filtered,
            "failed_ids": summary.failed_ids,
            "error": null,
        }),
        Err(e) => serde_json::json!({
            "success": false,
            "start_date": range.start.to_string(),
            "end_date": range.end.to_string(),
            "output_path": root.display().to_string(),
            "resumable": e.is_resumable(),
            "error": e.to_string(),
        }),
    };
    let line = serde_json::to_string(&output)
        .map_err(|e| CliError::ConfigurationError(format!("failed to encode output: {e}")))?;
    println!("{line}");
    Ok(())
}

/// Output result in human-readable format
fn output_human(root: &Path, result: &Result<JobSummary, DownloadError>) {
    match result {
        Ok(summary) => {
            if summary.dry_run {
                println!("\nDry run completed: nothing was downloaded.");
            } else {
                println!("\nDownload completed successfully!");
            }
            println!("Output: {}", root.display());
            println!("Pages listed: {}", summary.pages);
            println!("Calls listed: {}", summary.listed);
            println!("Transcripts downloaded: {}", summary.transcribed);
            println!("Calls without transcript: {}", summary.unavailable);
            if summary.already_completed > 0 {
                println!("Already downloaded: {}", summary.already_completed);
            }
            if summary.filtered > 0 {
                println!("Filtered by title: {}", summary.filtered);
            }
            if !summary.failed_ids.is_empty() {
                println!(
                    "Failed calls ({}): {}",
                    summary.failed_ids.len(),
                    summary.failed_ids.join(", ")
                );
            }
        }
        Err(e) => {
            eprintln!("\nDownload failed!");
            eprintln!("Error: {e}");
            if e.is_resumable() {
                eprintln!("Progress was saved; rerun the same command to resume.");
            }
        }
    }
}

/// Progress bar over processed calls; length is set once the API reports a total
fn create_progress_bar(range: &DateRange, format: OutputFormat) -> ProgressBar {
    if format == OutputFormat::Json {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::default_bar().template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
    ) {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_message(format!("Downloading calls {range}"));
    pb
}
