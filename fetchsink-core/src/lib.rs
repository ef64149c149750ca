//! Core types for the fetchsink pipeline.
//!
//! A run fetches one [`RequestSpec`] through a [`Transport`], normalises the
//! body into a [`Payload`] named by an [`Identifier`], and hands it to every
//! configured [`Sink`]. Relational sinks reach their stores through
//! [`ConnectionManager`]s registered with the [`Pipeline`].
//!
//! Concrete transports, file sinks and database backends live in
//! `fetchsink-data`; this crate holds the seams and the driver.

pub mod connection;
pub mod identifier;
pub mod normalize;
pub mod pipeline;
pub mod record;
pub mod request;
pub mod sink;
pub mod tabular;
pub mod transport;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use connection::{BoxError, Connection, ConnectionError, ConnectionHandle, ConnectionManager};
pub use identifier::{Identifier, IdentifierError, IdentifierRule};
pub use normalize::{NormalizeError, normalize};
pub use pipeline::{
    Pipeline, PipelineBuilder, PipelineError, RunReport, SinkReport, SinkStatus, StatusPolicy,
};
pub use record::{Payload, Record};
pub use request::{OrderedPairs, RawResponse, RequestSpec, ResponseFormat};
pub use sink::{
    ArtefactPath, ConnectionRegistry, FileFormat, PersistError, PersistOutcome, RelationalSink,
    Sink, SinkContext, SinkTarget,
};
pub use tabular::{
    Cell, ColumnKind, DEFAULT_MAX_DEPTH, FlattenError, FlattenOptions, Table, VALUE_COLUMN,
};
pub use transport::{RetryPolicy, RetryingTransport, Transport, TransportError};
