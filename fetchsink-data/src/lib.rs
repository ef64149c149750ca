//! Concrete transports, sinks and storage backends for `fetchsink-core`.
//!
//! Each integration sits behind a Cargo feature, all enabled by default:
//!
//! - `http`: [`http::HttpTransport`], a `reqwest` GET transport.
//! - `files`: [`file::JsonFileSink`] and [`export::TabularExportSink`].
//! - `store-sqlite`: [`sqlite::SqliteManager`], an embedded backend.
//! - `store-postgres`: [`postgres::PostgresManager`], a networked backend.
#![cfg_attr(docsrs, feature(doc_cfg))]

#[cfg(feature = "files")]
#[cfg_attr(docsrs, doc(cfg(feature = "files")))]
pub mod export;
#[cfg(feature = "files")]
#[cfg_attr(docsrs, doc(cfg(feature = "files")))]
pub mod file;
#[cfg(feature = "http")]
#[cfg_attr(docsrs, doc(cfg(feature = "http")))]
pub mod http;
#[cfg(feature = "store-postgres")]
#[cfg_attr(docsrs, doc(cfg(feature = "store-postgres")))]
pub mod postgres;
#[cfg(any(feature = "store-sqlite", feature = "store-postgres"))]
mod sql;
#[cfg(feature = "store-sqlite")]
#[cfg_attr(docsrs, doc(cfg(feature = "store-sqlite")))]
pub mod sqlite;

#[cfg(feature = "files")]
pub use export::TabularExportSink;
#[cfg(feature = "files")]
pub use file::JsonFileSink;
#[cfg(feature = "http")]
pub use http::{HttpTransport, HttpTransportBuildError, HttpTransportConfig};
#[cfg(feature = "store-postgres")]
pub use postgres::{PostgresConfig, PostgresManager};
#[cfg(feature = "store-sqlite")]
pub use sqlite::SqliteManager;
