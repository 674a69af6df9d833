//! CLI command implementations

pub mod download;
pub mod error;
pub mod info;
pub mod list;

pub use download::{Cli, Commands, DownloadArgs, OutputFormat, ResumeMode};
pub use error::CliError;
pub use info::InfoArgs;
pub use list::ListCallsArgs;
pub use test::TestArgs;
