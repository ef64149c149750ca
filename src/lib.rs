//! Facade crate for the fetchsink pipeline.
//!
//! This crate re-exports the core domain types and exposes the transport,
//! sinks and storage backends behind feature flags.

#![forbid(unsafe_code)]

pub use fetchsink_core::{
    ArtefactPath, Cell, ColumnKind, Connection, ConnectionError, ConnectionHandle,
    ConnectionManager, FileFormat, FlattenOptions, Identifier, IdentifierRule, NormalizeError,
    Payload, PersistError, PersistOutcome, Pipeline, PipelineBuilder, PipelineError, RawResponse,
    Record, RelationalSink, RequestSpec, ResponseFormat, RetryPolicy, RetryingTransport,
    RunReport, Sink, SinkContext, SinkReport, SinkStatus, SinkTarget, StatusPolicy, Table,
    Transport, TransportError, normalize,
};

#[cfg(feature = "test-support")]
pub use fetchsink_core::test_support;

#[cfg(feature = "http")]
pub use fetchsink_data::{HttpTransport, HttpTransportBuildError, HttpTransportConfig};

#[cfg(feature = "files")]
pub use fetchsink_data::{JsonFileSink, TabularExportSink};

#[cfg(feature = "store-sqlite")]
pub use fetchsink_data::SqliteManager;

#[cfg(feature = "store-postgres")]
pub use fetchsink_data::{PostgresConfig, PostgresManager};
