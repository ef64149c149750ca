//! Sinks: destinations a normalised payload is persisted to.
//!
//! Every sink implements [`Sink`]. The pipeline hands each one the same
//! payload and a [`SinkContext`] carrying the run's identifier, flattening
//! options and lazily opened relational connections.

mod relational;

use std::fmt;

use camino::Utf8PathBuf;
use indexmap::IndexMap;
use log::{debug, warn};
use thiserror::Error;

use crate::connection::{BoxError, ConnectionError, ConnectionHandle, ConnectionManager};
use crate::identifier::Identifier;
use crate::record::Payload;
use crate::tabular::{FlattenError, FlattenOptions};

pub use relational::RelationalSink;

/// Connection managers registered under the names sinks refer to.
pub type ConnectionRegistry = IndexMap<String, Box<dyn ConnectionManager>>;

/// File formats the file sinks understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// The payload as JSON (or verbatim text).
    Json,
    /// Comma-separated values.
    Csv,
    /// Office Open XML spreadsheet.
    Xlsx,
}

impl FileFormat {
    /// Map a file extension to a format, ignoring case.
    ///
    /// ```
    /// use fetchsink_core::FileFormat;
    ///
    /// assert_eq!(FileFormat::from_extension("XLSX"), Some(FileFormat::Xlsx));
    /// assert_eq!(FileFormat::from_extension("parquet"), None);
    /// ```
    #[must_use]
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "csv" => Some(Self::Csv),
            "xlsx" => Some(Self::Xlsx),
            _ => None,
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Xlsx => "xlsx",
        })
    }
}

/// Where a file sink writes, possibly depending on the run's identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtefactPath {
    /// Always the same path.
    Fixed(Utf8PathBuf),
    /// `<dir>/<identifier stem>.<extension>`; the identifier's own extension
    /// is used when `extension` is `None`.
    Derived {
        /// Directory holding the artefact.
        dir: Utf8PathBuf,
        /// Extension overriding the identifier's.
        extension: Option<String>,
    },
}

impl ArtefactPath {
    /// Artefact named after the identifier inside `dir`.
    pub fn derived(dir: impl Into<Utf8PathBuf>, extension: Option<&str>) -> Self {
        Self::Derived {
            dir: dir.into(),
            extension: extension.map(str::to_owned),
        }
    }

    /// Concrete path for this run.
    #[must_use]
    pub fn resolve(&self, identifier: &Identifier) -> Utf8PathBuf {
        match self {
            Self::Fixed(path) => path.clone(),
            Self::Derived { dir, extension } => {
                let name = extension
                    .as_deref()
                    .map_or_else(|| identifier.file_name(), |ext| identifier.with_extension(ext));
                dir.join(name)
            }
        }
    }

    /// Extension known before the run, if any.
    #[must_use]
    pub fn extension(&self) -> Option<&str> {
        match self {
            Self::Fixed(path) => path.extension(),
            Self::Derived { extension, .. } => extension.as_deref(),
        }
    }
}

impl fmt::Display for ArtefactPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(path) => write!(f, "{path}"),
            Self::Derived { dir, extension } => {
                let placeholder = dir.join("{id}");
                match extension {
                    Some(ext) => write!(f, "{placeholder}.{ext}"),
                    None => write!(f, "{placeholder}.{{ext}}"),
                }
            }
        }
    }
}

/// What a sink writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkTarget {
    /// A local file.
    File {
        /// Location template.
        path: ArtefactPath,
        /// Format implied by the extension, when known up front.
        format: Option<FileFormat>,
    },
    /// A table reached through a registered connection.
    Table {
        /// Registered connection name.
        connection: String,
        /// Table name.
        table: String,
    },
}

impl SinkTarget {
    /// File target with the format inferred from `path`.
    #[must_use]
    pub fn file(path: ArtefactPath) -> Self {
        let format = path.extension().and_then(FileFormat::from_extension);
        Self::File { path, format }
    }

    /// Connection name for table targets.
    #[must_use]
    pub fn connection(&self) -> Option<&str> {
        match self {
            Self::Table { connection, .. } => Some(connection),
            Self::File { .. } => None,
        }
    }
}

impl fmt::Display for SinkTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File { path, .. } => write!(f, "file {path}"),
            Self::Table { connection, table } => write!(f, "table {connection}:{table}"),
        }
    }
}

/// Successful result of a persist call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistOutcome {
    /// A new file was created.
    Created {
        /// Path written.
        path: Utf8PathBuf,
    },
    /// An existing file was replaced.
    Replaced {
        /// Path written.
        path: Utf8PathBuf,
    },
    /// The target already existed and was left untouched.
    Skipped {
        /// Existing path.
        path: Utf8PathBuf,
    },
    /// Rows were appended to a table.
    Appended {
        /// Table written.
        table: String,
        /// Number of rows appended.
        rows: usize,
    },
}

impl fmt::Display for PersistOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created { path } => write!(f, "created {path}"),
            Self::Replaced { path } => write!(f, "replaced {path}"),
            Self::Skipped { path } => write!(f, "skipped {path} (already exists)"),
            Self::Appended { table, rows } => write!(f, "appended {rows} row(s) to {table}"),
        }
    }
}

/// Failures while persisting a payload.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PersistError {
    /// Filesystem failure.
    #[error("I/O error writing {path}")]
    Io {
        /// Path being written.
        path: Utf8PathBuf,
        /// Source error.
        #[source]
        source: std::io::Error,
    },
    /// The payload could not be serialised.
    #[error("failed to serialise payload")]
    Serialize(#[source] serde_json::Error),
    /// The destination extension maps to no supported format.
    #[error("unsupported file format for {path}")]
    UnsupportedFormat {
        /// Path whose extension was not recognised.
        path: Utf8PathBuf,
    },
    /// The sink only accepts structured payloads.
    #[error("sink `{sink}` requires a structured payload, got {kind}")]
    RequiresStructured {
        /// Sink name.
        sink: String,
        /// Payload kind received.
        kind: &'static str,
    },
    /// The record nests deeper than the flattening limit.
    #[error(transparent)]
    NestingTooDeep(#[from] FlattenError),
    /// The record has columns the existing table lacks.
    #[error("table `{table}` has no column(s) {missing:?}")]
    SchemaMismatch {
        /// Table name.
        table: String,
        /// Record columns missing from the table.
        missing: Vec<String>,
    },
    /// Encoding a tabular file failed.
    #[error("failed to encode {format} file {path}")]
    Encode {
        /// Path being written.
        path: Utf8PathBuf,
        /// Target format.
        format: FileFormat,
        /// Encoder failure.
        #[source]
        source: BoxError,
    },
    /// A SQL statement failed.
    #[error("{backend} statement on `{table}` failed")]
    Sql {
        /// Backend label, e.g. `sqlite`.
        backend: &'static str,
        /// Table being accessed.
        table: String,
        /// Driver failure.
        #[source]
        source: BoxError,
    },
    /// Opening or using the connection failed.
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// Persists a payload to one destination.
pub trait Sink {
    /// Name used in reports and logs.
    fn name(&self) -> &str;

    /// Destination description.
    fn target(&self) -> SinkTarget;

    /// Persist `payload`, either fully or not at all.
    fn persist(
        &self,
        payload: &Payload,
        ctx: &mut SinkContext<'_>,
    ) -> Result<PersistOutcome, PersistError>;
}

impl<S: Sink + ?Sized> Sink for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn target(&self) -> SinkTarget {
        (**self).target()
    }

    fn persist(
        &self,
        payload: &Payload,
        ctx: &mut SinkContext<'_>,
    ) -> Result<PersistOutcome, PersistError> {
        (**self).persist(payload, ctx)
    }
}

/// Per-run state shared by sinks.
///
/// Connections are opened on first use and stay open until released or the
/// context is closed. Dropping the context closes whatever is still open.
pub struct SinkContext<'a> {
    identifier: &'a Identifier,
    flatten: FlattenOptions,
    managers: &'a ConnectionRegistry,
    open: IndexMap<String, ConnectionHandle>,
}

impl fmt::Debug for SinkContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkContext")
            .field("identifier", &self.identifier)
            .field("flatten", &self.flatten)
            .field("registered", &self.managers.keys().collect::<Vec<_>>())
            .field("open", &self.open)
            .finish()
    }
}

impl<'a> SinkContext<'a> {
    /// Create a context for one run.
    #[must_use]
    pub fn new(
        identifier: &'a Identifier,
        flatten: FlattenOptions,
        managers: &'a ConnectionRegistry,
    ) -> Self {
        Self {
            identifier,
            flatten,
            managers,
            open: IndexMap::new(),
        }
    }

    /// Identifier derived for this run.
    #[must_use]
    pub const fn identifier(&self) -> &Identifier {
        self.identifier
    }

    /// Flattening limits for tabular sinks.
    #[must_use]
    pub const fn flatten_options(&self) -> &FlattenOptions {
        &self.flatten
    }

    /// Borrow the named connection, opening it if needed.
    pub fn connection(&mut self, name: &str) -> Result<&mut ConnectionHandle, ConnectionError> {
        if !self.open.contains_key(name) {
            let manager =
                self.managers
                    .get(name)
                    .ok_or_else(|| ConnectionError::UnknownConnection {
                        name: name.to_owned(),
                    })?;
            debug!("opening connection `{name}` to {}", manager.describe());
            let handle = manager.open()?;
            self.open.insert(name.to_owned(), handle);
        }
        self.open
            .get_mut(name)
            .ok_or_else(|| ConnectionError::UnknownConnection {
                name: name.to_owned(),
            })
    }

    /// Whether the named connection is currently open.
    #[must_use]
    pub fn is_open(&self, name: &str) -> bool {
        self.open.get(name).is_some_and(ConnectionHandle::is_open)
    }

    /// Close and forget the named connection; a later use reopens it.
    pub fn release(&mut self, name: &str) -> Result<(), ConnectionError> {
        match self.open.shift_remove(name) {
            Some(mut handle) => handle.close(),
            None => Ok(()),
        }
    }

    /// Close every open connection, returning the failures by name.
    pub fn close_all(&mut self) -> Vec<(String, ConnectionError)> {
        let mut failures = Vec::new();
        for (name, mut handle) in self.open.drain(..) {
            if let Err(err) = handle.close() {
                warn!("closing connection `{name}` failed: {err}");
                failures.push((name, err));
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemoryConnectionManager;
    use rstest::{fixture, rstest};

    #[fixture]
    fn identifier() -> Identifier {
        Identifier::from_value("forgetful", "json").expect("identifier")
    }

    #[rstest]
    #[case("json", Some(FileFormat::Json))]
    #[case("CSV", Some(FileFormat::Csv))]
    #[case("Xlsx", Some(FileFormat::Xlsx))]
    #[case("xls", None)]
    #[case("", None)]
    fn formats_from_extension(#[case] ext: &str, #[case] expected: Option<FileFormat>) {
        assert_eq!(FileFormat::from_extension(ext), expected);
    }

    #[rstest]
    fn derived_paths_follow_identifier(identifier: Identifier) {
        let json = ArtefactPath::derived("files", None);
        let csv = ArtefactPath::derived("files", Some("csv"));
        assert_eq!(json.resolve(&identifier), Utf8PathBuf::from("files/forgetful.json"));
        assert_eq!(csv.resolve(&identifier), Utf8PathBuf::from("files/forgetful.csv"));
        assert_eq!(
            ArtefactPath::Fixed("out/x.xlsx".into()).resolve(&identifier),
            Utf8PathBuf::from("out/x.xlsx")
        );
    }

    #[rstest]
    fn file_target_infers_format() {
        let target = SinkTarget::file(ArtefactPath::derived("files", Some("XLSX")));
        assert!(matches!(
            target,
            SinkTarget::File {
                format: Some(FileFormat::Xlsx),
                ..
            }
        ));
    }

    #[rstest]
    fn connections_open_lazily_and_once(identifier: Identifier) {
        let manager = MemoryConnectionManager::default();
        let store = manager.store();
        let mut registry = ConnectionRegistry::new();
        registry.insert("mem".to_owned(), Box::new(manager));
        let mut ctx = SinkContext::new(&identifier, FlattenOptions::default(), &registry);

        assert_eq!(store.opens(), 0);
        ctx.connection("mem").expect("first use");
        ctx.connection("mem").expect("second use");
        assert_eq!(store.opens(), 1);

        ctx.release("mem").expect("release");
        assert!(!ctx.is_open("mem"));
        ctx.connection("mem").expect("reopen");
        assert_eq!(store.opens(), 2);

        assert!(ctx.close_all().is_empty());
        assert_eq!(store.closes(), 2);
    }

    #[rstest]
    fn unknown_connection_is_reported(identifier: Identifier) {
        let registry = ConnectionRegistry::new();
        let mut ctx = SinkContext::new(&identifier, FlattenOptions::default(), &registry);
        let err = ctx.connection("missing").expect_err("unregistered");
        assert!(matches!(err, ConnectionError::UnknownConnection { name } if name == "missing"));
    }
}
