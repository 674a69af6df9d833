//! Effective configuration report

use super::{Cli, CliError, OutputFormat};
use crate::credentials::{CredentialSupplier, EnvCredentials};
use crate::downloader::FetchConfig;
use crate::DateRange;
use clap::Parser;
use std::path::{Path, PathBuf};

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// First day of the configured range (YYYY-MM-DD)
    #[arg(long, env = "DOWNLOAD_START_DATE", default_value = "2022-01-01")]
    pub start_date: String,

    /// Last day of the configured range (YYYY-MM-DD)
    #[arg(long, env = "DOWNLOAD_END_DATE", default_value = "2024-12-31")]
    pub end_date: String,

    /// Root directory for downloaded files
    #[arg(long, env = "OUTPUT_DIRECTORY", default_value = "./transcripts")]
    pub output_dir: PathBuf,
}

impl InfoArgs {
    /// Report with credentials from the environment
    pub fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        self.execute_with(cli, &EnvCredentials)
    }

    /// Print the settings a `download` with the same flags would use.
    ///
    /// Missing credentials are reported, not treated as an error.
    pub fn execute_with(
        &self,
        cli: &Cli,
        credentials: &dyn CredentialSupplier,
    ) -> Result<(), CliError> {
        let range =
            DateRange::parse(&self.start_date, &self.end_date).map_err(CliError::InvalidArgument)?;
        let config = cli.base_config(range);
        let resume_dir = cli
            .resume_dir
            .clone()
            .unwrap_or_else(|| self.output_dir.join(".resume"));
        let (subdomain, base_url, credential_error) = match credentials.credentials() {
            Ok(creds) => {
                let base_url = config.api_base_url.clone().unwrap_or_else(|| creds.base_url());
                (Some(creds.subdomain().to_string()), Some(base_url), None)
            }
            Err(e) => (None, config.api_base_url.clone(), Some(e.to_string())),
        };

        match cli.output_format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "credentials_ok": credential_error.is_none(),
                    "credential_error": credential_error,
                    "subdomain": subdomain,
                    "base_url": base_url,
                    "start_date": range.start.to_string(),
                    "end_date": range.end.to_string(),
                    "output_dir": self.output_dir.display().to_string(),
                    "resume": format!("{:?}", cli.resume).to_lowercase(),
                    "resume_dir": resume_dir.display().to_string(),
                    "concurrency": config.concurrency,
                    "rate_limit": config.rate_limit_per_sec,
                    "max_retries": config.retry.max_attempts,
                    "api_timeout_secs": config.api_timeout.as_secs(),
                });
                println!("{output}");
            }
            OutputFormat::Human => {
                match (&subdomain, &credential_error) {
                    (Some(subdomain), _) => println!("Credentials: OK (subdomain {subdomain})"),
                    (None, Some(e)) => println!("Credentials: {e}"),
                    (None, None) => {}
                }
                if let Some(url) = &base_url {
                    println!("API base URL: {url}");
                }
                print_settings(&config, &self.output_dir, &resume_dir);
            }
        }
        Ok(())
    }
}

fn print_settings(config: &FetchConfig, output_dir: &Path, resume_dir: &Path) {
    println!("Date range: {} to {}", config.range.start, config.range.end);
    println!("Output directory: {}", output_dir.display());
    println!("Checkpoint directory: {}", resume_dir.display());
    println!("Concurrency: {}", config.concurrency);
    println!("Rate limit: {} calls/sec", config.rate_limit_per_sec);
    println!("Max attempts: {}", config.retry.max_attempts);
    println!("API timeout: {}s", config.api_timeout.as_secs());
}
