//! Error types emitted by the fetchsink CLI.
//!
//! Keep this error type reasonably small, as many CLI helpers return
//! `Result<_, CliError>` and the workspace enables `clippy::result_large_err`.

use camino::Utf8PathBuf;
use fetchsink_core::PipelineError;
use fetchsink_data::HttpTransportBuildError;
use thiserror::Error;

/// Errors emitted by the fetchsink CLI. Each one aborts the run before or
/// instead of any sink reporting.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration layering failed (defaults, file, environment).
    #[error("failed to load configuration: {0}")]
    Configuration(#[source] Box<figment::Error>),
    /// The explicitly named configuration file does not exist.
    #[error("configuration file {path} does not exist (set by {env})")]
    MissingConfigFile {
        path: Utf8PathBuf,
        env: &'static str,
    },
    /// A merged configuration value cannot drive a run.
    #[error("invalid configuration: {field} {reason}")]
    InvalidConfig {
        field: &'static str,
        reason: &'static str,
    },
    /// The HTTP transport could not be constructed.
    #[error("failed to build HTTP transport: {0}")]
    Transport(#[from] HttpTransportBuildError),
    /// Fetching or normalising the response failed.
    #[error("run aborted: {0}")]
    Pipeline(#[from] PipelineError),
}
