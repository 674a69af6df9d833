//! List-calls command

use super::{Cli, CliError, OutputFormat};
use crate::credentials::{CredentialSupplier, EnvCredentials};
use crate::downloader::{list_calls, CallListing, FetchConfig};
use crate::filter::TitleFilter;
use crate::output::{write_call_list, ListFormat};
use crate::DateRange;
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::info;

/// Arguments for the `list-calls` command
#[derive(Parser, Debug)]
pub struct ListCallsArgs {
    /// First day to list (YYYY-MM-DD)
    #[arg(long, env = "DOWNLOAD_START_DATE", default_value = "2022-01-01")]
    pub start_date: String,

    /// Last day to list, inclusive (YYYY-MM-DD)
    #[arg(long, env = "DOWNLOAD_END_DATE", default_value = "2024-12-31")]
    pub end_date: String,

    /// Directory receiving calls_list.<format>
    #[arg(long, env = "OUTPUT_DIRECTORY", default_value = "./transcripts")]
    pub output_dir: PathBuf,

    /// List file format: csv, json or txt
    #[arg(long, default_value = "csv")]
    pub format: ListFormat,

    /// Only list calls whose title matches ("a and b" needs both, "a, b" needs either)
    #[arg(long)]
    pub title_filter: Option<TitleFilter>,
}

impl ListCallsArgs {
    /// Listing settings from CLI flags
    pub fn fetch_config(&self, cli: &Cli) -> Result<FetchConfig, CliError> {
        let range =
            DateRange::parse(&self.start_date, &self.end_date).map_err(CliError::InvalidArgument)?;
        let config = cli
            .base_config(range)
            .with_title_filter(self.title_filter.clone());
        config.validate().map_err(CliError::ConfigurationError)?;
        Ok(config)
    }

    /// List with credentials from the environment
    pub async fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        self.execute_with(cli, &EnvCredentials).await
    }

    /// List every call in the range and write the list file
    pub async fn execute_with(
        &self,
        cli: &Cli,
        credentials: &dyn CredentialSupplier,
    ) -> Result<(), CliError> {
        let config = self.fetch_config(cli)?;
        let range = config.range;
        info!(range = %range, format = %self.format, "Listing calls");

        let listing = list_calls(&config, credentials).await?;
        let written = if listing.calls.is_empty() {
            None
        } else {
            Some(write_call_list(
                &self.output_dir,
                &range,
                &listing.calls,
                self.format,
            )?)
        };

        match cli.output_format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "success": true,
                    "start_date": range.start.to_string(),
                    "end_date": range.end.to_string(),
                    "pages": listing.pages,
                    "listed": listing.listed,
                    "filtered": listing.filtered,
                    "matched": listing.calls.len(),
                    "output_file": written.as_ref().map(|p| p.display().to_string()),
                });
                println!("{output}");
            }
            OutputFormat::Human => {
                output_human(&listing, written.as_deref(), self.title_filter.is_some())
            }
        }
        Ok(())
    }
}

fn output_human(listing: &CallListing, written: Option<&Path>, filtered: bool) {
    match written {
        Some(path) => {
            println!("Calls list saved to {}", path.display());
            println!("\nFound {} calls total", listing.calls.len());
        }
        None if filtered && listing.listed > 0 => {
            println!("No calls matched the title filter.");
        }
        None => println!("No calls found in the specified date range."),
    }
}
