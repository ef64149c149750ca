//! Command-line runner for the fetchsink pipeline.
//!
//! The binary takes no arguments: everything comes from [`AppConfig`], so the
//! library entry points here are what tests and embedders call.
#![forbid(unsafe_code)]

pub mod config;
mod error;
mod logging;
mod wiring;

use std::process::ExitCode;

use fetchsink_core::Transport;

pub use config::AppConfig;
pub use error::CliError;
pub use logging::{DEFAULT_FILTER, init_logging};
pub use wiring::{POSTGRES_CONNECTION, SQLITE_CONNECTION};

/// How a completed run went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every sink succeeded.
    Complete,
    /// At least one sink failed.
    Partial,
}

impl RunOutcome {
    /// Process exit code: `0` when complete, `2` when partial.
    #[must_use]
    pub fn exit_code(self) -> ExitCode {
        match self {
            Self::Complete => ExitCode::SUCCESS,
            Self::Partial => ExitCode::from(2),
        }
    }
}

impl CliError {
    /// Process exit code for a run that never reached the sinks.
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(1)
    }
}

/// Load configuration and run once against the live HTTP transport.
///
/// # Errors
///
/// Returns [`CliError`] when configuration, transport construction, fetching
/// or normalisation fails.
pub fn run() -> Result<RunOutcome, CliError> {
    let config = AppConfig::load()?;
    let transport = wiring::http_transport(&config)?;
    run_with(&config, transport)
}

/// Run once with `config` over `transport`.
///
/// # Errors
///
/// Returns [`CliError`] when `config` is invalid or the run aborts before
/// reaching the sinks.
pub fn run_with<T: Transport>(config: &AppConfig, transport: T) -> Result<RunOutcome, CliError> {
    config.validate()?;
    let pipeline = wiring::build_pipeline(config, transport);
    let report = pipeline.run(&config.request())?;
    if config.echo_tables {
        wiring::echo_tables(&pipeline, &report);
    }
    Ok(if report.all_succeeded() {
        RunOutcome::Complete
    } else {
        RunOutcome::Partial
    })
}

#[cfg(test)]
mod tests;
