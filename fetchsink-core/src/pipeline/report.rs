//! Per-run reporting.

use crate::connection::ConnectionError;
use crate::identifier::Identifier;
use crate::sink::{PersistError, PersistOutcome, SinkTarget};

/// Result of one sink within a run.
#[derive(Debug)]
pub enum SinkStatus {
    /// The sink persisted (or deliberately skipped) the payload.
    Succeeded(PersistOutcome),
    /// The sink failed; siblings were unaffected.
    Failed(PersistError),
}

impl SinkStatus {
    /// Whether the sink succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }
}

/// One entry of a [`RunReport`].
#[derive(Debug)]
pub struct SinkReport {
    /// Sink name.
    pub name: String,
    /// Where the sink writes.
    pub target: SinkTarget,
    /// What happened.
    pub status: SinkStatus,
}

/// Outcome of [`crate::Pipeline::run`], one entry per sink in execution order.
#[derive(Debug)]
pub struct RunReport {
    /// Identifier derived for the run.
    pub identifier: Identifier,
    /// Per-sink results.
    pub sinks: Vec<SinkReport>,
    /// Connections whose close reported an error, by registered name.
    pub close_failures: Vec<(String, ConnectionError)>,
}

impl RunReport {
    /// Whether every sink succeeded.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.sinks.iter().all(|sink| sink.status.is_success())
    }

    /// Reports of sinks that succeeded.
    pub fn succeeded(&self) -> impl Iterator<Item = &SinkReport> {
        self.sinks.iter().filter(|sink| sink.status.is_success())
    }

    /// Reports of sinks that failed.
    pub fn failures(&self) -> impl Iterator<Item = &SinkReport> {
        self.sinks.iter().filter(|sink| !sink.status.is_success())
    }

    /// Look up a sink's report by name.
    #[must_use]
    pub fn sink(&self, name: &str) -> Option<&SinkReport> {
        self.sinks.iter().find(|sink| sink.name == name)
    }
}
