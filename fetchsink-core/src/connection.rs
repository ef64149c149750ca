//! Relational connection lifecycle.
//!
//! A [`ConnectionManager`] knows how to reach one store and hands out
//! [`ConnectionHandle`]s. A handle owns a boxed [`Connection`] and releases it
//! exactly once: [`ConnectionHandle::close`] is idempotent and dropping an
//! open handle closes it.

use std::fmt;

use log::{debug, warn};
use thiserror::Error;

use crate::record::Record;
use crate::sink::PersistError;
use crate::tabular::Table;

/// Boxed error used where a backend's own error type cannot be named here.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failures while opening, using or closing a connection.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConnectionError {
    /// Authentication failure, unreachable host or connect timeout.
    #[error("failed to connect to {target}: {message}")]
    Connect {
        /// Human-readable description of the store.
        target: String,
        /// Description reported by the client.
        message: String,
    },
    /// The embedded store could not be opened or created.
    #[error("storage at {target} is unavailable")]
    StorageUnavailable {
        /// Path or description of the store.
        target: String,
        /// Underlying failure.
        #[source]
        source: BoxError,
    },
    /// The handle was already closed.
    #[error("connection to {target} is closed")]
    Closed {
        /// Human-readable description of the store.
        target: String,
    },
    /// A sink referenced a connection that was never registered.
    #[error("no connection named `{name}` is registered")]
    UnknownConnection {
        /// Name the sink asked for.
        name: String,
    },
    /// Closing the underlying connection reported an error.
    #[error("failed to close connection to {target}: {message}")]
    Close {
        /// Human-readable description of the store.
        target: String,
        /// Description reported by the client.
        message: String,
    },
}

/// An open connection to a relational store.
///
/// Implementations are created by a [`ConnectionManager`] and only ever used
/// through a [`ConnectionHandle`].
pub trait Connection {
    /// Append `rows` to `table`, creating the table on first use.
    ///
    /// All rows are written in one transaction. Returns the number of rows
    /// written.
    fn append(&mut self, table: &str, rows: &Table) -> Result<usize, PersistError>;

    /// Read every row of `table` as flat records.
    fn read_table(&mut self, table: &str) -> Result<Vec<Record>, PersistError>;

    /// Release the connection.
    fn close(self: Box<Self>) -> Result<(), ConnectionError>;
}

/// Opens connections to one configured store.
pub trait ConnectionManager {
    /// Description used in logs and errors. Never includes credentials.
    fn describe(&self) -> String;

    /// Open a new connection.
    fn open(&self) -> Result<ConnectionHandle, ConnectionError>;
}

impl<M: ConnectionManager + ?Sized> ConnectionManager for Box<M> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn open(&self) -> Result<ConnectionHandle, ConnectionError> {
        (**self).open()
    }
}

/// Owned handle around an open [`Connection`].
///
/// [`ConnectionHandle::default`] is a handle that was never opened; closing it
/// only logs.
///
/// # Examples
///
/// ```
/// use fetchsink_core::ConnectionHandle;
///
/// let mut handle = ConnectionHandle::default();
/// assert!(!handle.is_open());
/// assert!(handle.close().is_ok());
/// assert!(handle.close().is_ok());
/// ```
#[derive(Default)]
pub struct ConnectionHandle {
    target: String,
    inner: Option<Box<dyn Connection>>,
}

impl ConnectionHandle {
    /// Wrap an open connection. `target` describes the store for logs.
    pub fn new(target: impl Into<String>, connection: Box<dyn Connection>) -> Self {
        Self {
            target: target.into(),
            inner: Some(connection),
        }
    }

    /// Description of the store behind this handle.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Whether the handle still owns an open connection.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.inner.is_some()
    }

    /// Append rows to `table`; see [`Connection::append`].
    pub fn append(&mut self, table: &str, rows: &Table) -> Result<usize, PersistError> {
        self.live()?.append(table, rows)
    }

    /// Read `table` back; see [`Connection::read_table`].
    pub fn read_table(&mut self, table: &str) -> Result<Vec<Record>, PersistError> {
        self.live()?.read_table(table)
    }

    /// Close the connection. Calling this on a closed handle is a no-op.
    pub fn close(&mut self) -> Result<(), ConnectionError> {
        match self.inner.take() {
            Some(connection) => {
                debug!("closing connection to {}", self.target);
                connection.close()
            }
            None => {
                debug!("connection to {} already closed", self.display_target());
                Ok(())
            }
        }
    }

    fn live(&mut self) -> Result<&mut Box<dyn Connection>, ConnectionError> {
        let target = &self.target;
        self.inner.as_mut().ok_or_else(|| ConnectionError::Closed {
            target: target.clone(),
        })
    }

    fn display_target(&self) -> &str {
        if self.target.is_empty() {
            "<never opened>"
        } else {
            &self.target
        }
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("target", &self.target)
            .field("open", &self.is_open())
            .finish()
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        if self.is_open()
            && let Err(err) = self.close()
        {
            warn!("failed to close connection on drop: {err}");
        }
    }
}
