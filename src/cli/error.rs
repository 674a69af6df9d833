//! CLI error types and conversions

use crate::credentials::CredentialError;
use crate::downloader::DownloadError;
use crate::fetcher::ApiError;
use crate::output::SinkError;
use crate::resume::ResumeError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Download error
    #[error("download error: {0}")]
    DownloadError(#[from] DownloadError),

    /// Credential error
    #[error("credential error: {0}")]
    CredentialError(#[from] CredentialError),

    /// API error outside a download job
    #[error("API error: {0}")]
    ApiError(#[from] ApiError),

    /// Output error
    #[error("output error: {0}")]
    OutputError(#[from] SinkError),

    /// Resume error
    #[error("resume error: {0}")]
    ResumeError(#[from] ResumeError),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigurationError(String),
}
