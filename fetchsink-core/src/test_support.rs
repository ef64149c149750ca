//! Test doubles for transports, connections and sinks.
//!
//! Available to unit tests and, behind the `test-support` feature, to other
//! crates in the workspace.

use std::cell::{Cell as StdCell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::connection::{Connection, ConnectionError, ConnectionHandle, ConnectionManager};
use crate::record::{Payload, Record};
use crate::request::{RawResponse, RequestSpec};
use crate::sink::{ArtefactPath, PersistError, PersistOutcome, Sink, SinkContext, SinkTarget};
use crate::tabular::{Cell, Table};
use crate::transport::{Transport, TransportError};

/// Transport replaying a scripted sequence of results.
///
/// The final entry repeats once the script is exhausted.
///
/// # Examples
///
/// ```
/// use fetchsink_core::{RequestSpec, Transport, test_support::StubTransport};
///
/// let stub = StubTransport::always(StubTransport::json_response(200, b"[]"));
/// let response = stub.fetch(&RequestSpec::new("http://example.test")).expect("scripted");
/// assert_eq!(response.body, b"[]");
/// assert_eq!(stub.calls(), 1);
/// ```
#[derive(Debug)]
pub struct StubTransport {
    script: RefCell<VecDeque<Result<RawResponse, TransportError>>>,
    calls: StdCell<usize>,
}

impl StubTransport {
    /// Replay `results` in order.
    #[must_use]
    pub fn sequence(results: Vec<Result<RawResponse, TransportError>>) -> Self {
        Self {
            script: RefCell::new(results.into()),
            calls: StdCell::new(0),
        }
    }

    /// Always answer with `response`.
    #[must_use]
    pub fn always(response: RawResponse) -> Self {
        Self::sequence(vec![Ok(response)])
    }

    /// A JSON response with the given status and body.
    #[must_use]
    pub fn json_response(status: u16, body: &[u8]) -> RawResponse {
        RawResponse {
            url: "http://example.test/words".to_owned(),
            status,
            content_type: Some("application/json".to_owned()),
            body: body.to_vec(),
        }
    }

    /// Number of fetches performed so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl Transport for StubTransport {
    fn fetch(&self, request: &RequestSpec) -> Result<RawResponse, TransportError> {
        self.calls.set(self.calls.get() + 1);
        let mut script = self.script.borrow_mut();
        let next = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        };
        next.unwrap_or_else(|| {
            Err(TransportError::Network {
                url: request.url.clone(),
                message: "stub transport has no scripted response".to_owned(),
            })
        })
    }
}

#[derive(Debug, Default)]
struct MemoryTable {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

#[derive(Debug, Default)]
struct StoreState {
    tables: IndexMap<String, MemoryTable>,
    opens: usize,
    closes: usize,
}

/// Shared in-memory relational store. Clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Rc<RefCell<StoreState>>,
}

impl MemoryStore {
    /// Connections opened so far.
    #[must_use]
    pub fn opens(&self) -> usize {
        self.state.borrow().opens
    }

    /// Connections closed so far.
    #[must_use]
    pub fn closes(&self) -> usize {
        self.state.borrow().closes
    }

    /// Rows stored in `table`, zero when it does not exist.
    #[must_use]
    pub fn row_count(&self, table: &str) -> usize {
        self.state
            .borrow()
            .tables
            .get(table)
            .map_or(0, |stored| stored.rows.len())
    }
}

/// [`ConnectionManager`] backed by a [`MemoryStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryConnectionManager {
    store: MemoryStore,
    unreachable: bool,
    failing_close: bool,
}

impl MemoryConnectionManager {
    /// A manager whose `open` always fails with [`ConnectionError::Connect`].
    #[must_use]
    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::default()
        }
    }

    /// A manager whose connections work but report an error when closed.
    #[must_use]
    pub fn failing_close() -> Self {
        Self {
            failing_close: true,
            ..Self::default()
        }
    }

    /// Handle on the shared store for assertions.
    #[must_use]
    pub fn store(&self) -> MemoryStore {
        self.store.clone()
    }
}

impl ConnectionManager for MemoryConnectionManager {
    fn describe(&self) -> String {
        "memory".to_owned()
    }

    fn open(&self) -> Result<ConnectionHandle, ConnectionError> {
        if self.unreachable {
            return Err(ConnectionError::Connect {
                target: self.describe(),
                message: "store is unreachable".to_owned(),
            });
        }
        self.store.state.borrow_mut().opens += 1;
        Ok(ConnectionHandle::new(
            self.describe(),
            Box::new(MemoryConnection {
                store: self.store.clone(),
                failing_close: self.failing_close,
            }),
        ))
    }
}

struct MemoryConnection {
    store: MemoryStore,
    failing_close: bool,
}

impl Connection for MemoryConnection {
    fn append(&mut self, table: &str, rows: &Table) -> Result<usize, PersistError> {
        let mut state = self.store.state.borrow_mut();
        let stored = state
            .tables
            .entry(table.to_owned())
            .or_insert_with(|| MemoryTable {
                columns: rows.columns().to_vec(),
                rows: Vec::new(),
            });
        let missing: Vec<String> = rows
            .columns()
            .iter()
            .filter(|column| !stored.columns.contains(column))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(PersistError::SchemaMismatch {
                table: table.to_owned(),
                missing,
            });
        }
        for row in rows.rows() {
            let aligned = stored
                .columns
                .iter()
                .map(|column| {
                    rows.columns()
                        .iter()
                        .position(|candidate| candidate == column)
                        .and_then(|index| row.get(index).cloned())
                        .unwrap_or(Cell::Null)
                })
                .collect();
            stored.rows.push(aligned);
        }
        Ok(rows.len())
    }

    fn read_table(&mut self, table: &str) -> Result<Vec<Record>, PersistError> {
        let state = self.store.state.borrow();
        let stored = state.tables.get(table).ok_or_else(|| PersistError::Sql {
            backend: "memory",
            table: table.to_owned(),
            source: format!("no such table: {table}").into(),
        })?;
        Ok(Table::from_parts(stored.columns.clone(), stored.rows.clone()).to_records())
    }

    fn close(self: Box<Self>) -> Result<(), ConnectionError> {
        self.store.state.borrow_mut().closes += 1;
        if self.failing_close {
            return Err(ConnectionError::Close {
                target: "memory".to_owned(),
                message: "store refused to close".to_owned(),
            });
        }
        Ok(())
    }
}

/// Sink that always fails with [`PersistError::UnsupportedFormat`].
#[derive(Debug, Clone)]
pub struct FailingSink {
    name: String,
    target: SinkTarget,
}

impl FailingSink {
    /// Failing file sink.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: SinkTarget::file(ArtefactPath::Fixed("unsupported.parquet".into())),
        }
    }

    /// Failing sink that claims to write through `connection`, so it opens
    /// the connection before failing.
    pub fn on_connection(name: impl Into<String>, connection: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: SinkTarget::Table {
                connection: connection.into(),
                table: "unused".to_owned(),
            },
        }
    }
}

impl Sink for FailingSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn target(&self) -> SinkTarget {
        self.target.clone()
    }

    fn persist(
        &self,
        _payload: &Payload,
        ctx: &mut SinkContext<'_>,
    ) -> Result<PersistOutcome, PersistError> {
        if let Some(connection) = self.target.connection() {
            ctx.connection(connection)?;
        }
        Err(PersistError::UnsupportedFormat {
            path: "unsupported.parquet".into(),
        })
    }
}

/// Sink recording every payload it receives.
#[derive(Debug, Clone)]
pub struct CapturingSink {
    name: String,
    received: Rc<RefCell<Vec<(String, Payload)>>>,
}

impl CapturingSink {
    /// New sink with an empty capture log.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            received: Rc::default(),
        }
    }

    /// Identifier file names and payloads received so far.
    #[must_use]
    pub fn received(&self) -> Vec<(String, Payload)> {
        self.received.borrow().clone()
    }
}

impl Sink for CapturingSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn target(&self) -> SinkTarget {
        SinkTarget::file(ArtefactPath::derived("memory", None))
    }

    fn persist(
        &self,
        payload: &Payload,
        ctx: &mut SinkContext<'_>,
    ) -> Result<PersistOutcome, PersistError> {
        let identifier = ctx.identifier();
        self.received
            .borrow_mut()
            .push((identifier.file_name(), payload.clone()));
        Ok(PersistOutcome::Created {
            path: ArtefactPath::derived("memory", None).resolve(identifier),
        })
    }
}
