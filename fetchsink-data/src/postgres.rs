//! Networked PostgreSQL backend over `tokio-postgres`.
//!
//! Like [`crate::http::HttpTransport`], each connection blocks on a
//! current-thread Tokio runtime it owns; the driver task that services the
//! socket is spawned onto that runtime and makes progress whenever a query is
//! awaited. Opening or using a connection from inside a `current_thread`
//! runtime panics.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use fetchsink_core::{
    Cell, ColumnKind, Connection, ConnectionError, ConnectionHandle, ConnectionManager,
    PersistError, Record, Table,
};
use log::{debug, warn};
use tokio::runtime::{Handle, Runtime, RuntimeFlavor};
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, Error as PgError, NoTls, Transaction};

use crate::sql::{column_list, create_statement, ensure_compatible, quote_ident};

const BACKEND: &str = "postgres";

/// Default TCP connect timeout in seconds.
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Where and as whom to connect.
#[derive(Clone, PartialEq, Eq)]
pub struct PostgresConfig {
    /// Server host name or address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Role to authenticate as.
    pub user: String,
    /// Password, if the server asks for one.
    pub password: Option<String>,
    /// Database name.
    pub database: String,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_owned(),
            port: 5432,
            user: "postgres".to_owned(),
            password: None,
            database: "postgres".to_owned(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }
}

impl fmt::Debug for PostgresConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("database", &self.database)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

/// Opens PostgreSQL connections described by a [`PostgresConfig`].
///
/// Tables are created on first append with `BIGINT`, `DOUBLE PRECISION`,
/// `BOOLEAN` or `TEXT` columns. Values are sent as text and cast server-side
/// to each column's declared type, so appends into pre-existing tables with
/// other column types work as long as the text converts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostgresManager {
    config: PostgresConfig,
}

impl PostgresManager {
    /// Manager for `config`.
    #[must_use]
    pub const fn new(config: PostgresConfig) -> Self {
        Self { config }
    }

    /// Connection settings.
    #[must_use]
    pub const fn config(&self) -> &PostgresConfig {
        &self.config
    }

    fn connect_error(&self, message: impl fmt::Display) -> ConnectionError {
        ConnectionError::Connect {
            target: self.describe(),
            message: message.to_string(),
        }
    }
}

impl ConnectionManager for PostgresManager {
    fn describe(&self) -> String {
        let PostgresConfig {
            host,
            port,
            user,
            database,
            ..
        } = &self.config;
        format!("postgres://{user}@{host}:{port}/{database}")
    }

    fn open(&self) -> Result<ConnectionHandle, ConnectionError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| self.connect_error(format!("failed to build Tokio runtime: {err}")))?;

        let mut pg = tokio_postgres::Config::new();
        pg.host(&self.config.host)
            .port(self.config.port)
            .user(&self.config.user)
            .dbname(&self.config.database)
            .connect_timeout(self.config.connect_timeout);
        if let Some(password) = &self.config.password {
            pg.password(password);
        }

        let (client, connection) =
            block_on(&runtime, pg.connect(NoTls)).map_err(|err| self.connect_error(err))?;
        let target = self.describe();
        let task_target = target.clone();
        runtime.spawn(async move {
            if let Err(err) = connection.await {
                warn!("connection to {task_target} failed: {err}");
            }
        });
        debug!("opened {target}");

        Ok(ConnectionHandle::new(
            target.clone(),
            Box::new(PostgresConnection {
                target,
                client,
                runtime,
            }),
        ))
    }
}

/// Run `future` on `runtime`, stepping aside for an ambient multi-threaded
/// runtime. Panics when called from inside a `current_thread` runtime.
fn block_on<F: Future>(runtime: &Runtime, future: F) -> F::Output {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(|| runtime.block_on(future))
        }
        _ => runtime.block_on(future),
    }
}

struct PostgresConnection {
    target: String,
    client: Client,
    runtime: Runtime,
}

fn sql_error(table: &str) -> impl FnOnce(PgError) -> PersistError + '_ {
    move |source| PersistError::Sql {
        backend: BACKEND,
        table: table.to_owned(),
        source: Box::new(source),
    }
}

const fn column_type(kind: ColumnKind) -> &'static str {
    match kind {
        ColumnKind::Bool => "BOOLEAN",
        ColumnKind::Integer => "BIGINT",
        ColumnKind::Float => "DOUBLE PRECISION",
        ColumnKind::Text => "TEXT",
    }
}

/// Type to cast a text parameter to for a column reported by
/// `information_schema.columns`.
fn cast_target(data_type: &str, udt_name: &str) -> String {
    match data_type {
        "ARRAY" | "USER-DEFINED" => quote_ident(udt_name),
        other => other.to_owned(),
    }
}

fn insert_statement(table: &str, rows: &Table, casts: &[String]) -> String {
    let values = casts
        .iter()
        .enumerate()
        .map(|(index, cast)| format!("${}::TEXT::{cast}", index + 1))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} {} VALUES ({values})",
        quote_ident(table),
        column_list(rows)
    )
}

fn to_text(cell: &Cell) -> Option<String> {
    if cell.is_null() {
        None
    } else {
        Some(cell.to_string())
    }
}

/// Existing columns as `(name, cast target)` in ordinal order.
async fn existing_columns(
    transaction: &Transaction<'_>,
    table: &str,
) -> Result<Vec<(String, String)>, PgError> {
    let rows = transaction
        .query(
            "SELECT column_name::TEXT, data_type::TEXT, udt_name::TEXT \
             FROM information_schema.columns \
             WHERE table_schema = current_schema() AND table_name::TEXT = $1 \
             ORDER BY ordinal_position",
            &[&table],
        )
        .await?;
    rows.iter()
        .map(|row| {
            let name: String = row.try_get(0)?;
            let data_type: String = row.try_get(1)?;
            let udt_name: String = row.try_get(2)?;
            Ok((name, cast_target(&data_type, &udt_name)))
        })
        .collect()
}

async fn append_rows(
    client: &mut Client,
    table: &str,
    rows: &Table,
) -> Result<usize, PersistError> {
    let transaction = client.transaction().await.map_err(sql_error(table))?;

    let existing = existing_columns(&transaction, table)
        .await
        .map_err(sql_error(table))?;
    let casts: Vec<String> = if existing.is_empty() {
        transaction
            .batch_execute(&create_statement(table, rows, column_type))
            .await
            .map_err(sql_error(table))?;
        rows.column_kinds()
            .into_iter()
            .map(|kind| column_type(kind).to_owned())
            .collect()
    } else {
        let names: Vec<String> = existing.iter().map(|(name, _)| name.clone()).collect();
        ensure_compatible(table, &names, rows)?;
        rows.columns()
            .iter()
            .filter_map(|column| {
                existing
                    .iter()
                    .find(|(name, _)| name == column)
                    .map(|(_, cast)| cast.clone())
            })
            .collect()
    };

    let statement = transaction
        .prepare(&insert_statement(table, rows, &casts))
        .await
        .map_err(sql_error(table))?;
    for row in rows.rows() {
        let values: Vec<Option<String>> = row.iter().map(to_text).collect();
        let params: Vec<&(dyn ToSql + Sync)> = values
            .iter()
            .map(|value| value as &(dyn ToSql + Sync))
            .collect();
        transaction
            .execute(&statement, &params)
            .await
            .map_err(sql_error(table))?;
    }

    transaction.commit().await.map_err(sql_error(table))?;
    Ok(rows.len())
}

async fn read_rows(client: &Client, table: &str) -> Result<Vec<Record>, PersistError> {
    let query = format!(
        "SELECT row_to_json(t)::TEXT FROM {} AS t",
        quote_ident(table)
    );
    let rows = client.query(&query, &[]).await.map_err(sql_error(table))?;
    rows.iter()
        .map(|row| {
            let text: String = row.try_get(0).map_err(sql_error(table))?;
            Record::from_slice(text.as_bytes()).map_err(|source| PersistError::Sql {
                backend: BACKEND,
                table: table.to_owned(),
                source: Box::new(source),
            })
        })
        .collect()
}

impl Connection for PostgresConnection {
    fn append(&mut self, table: &str, rows: &Table) -> Result<usize, PersistError> {
        let Self {
            client, runtime, ..
        } = self;
        block_on(runtime, append_rows(client, table, rows))
    }

    fn read_table(&mut self, table: &str) -> Result<Vec<Record>, PersistError> {
        block_on(&self.runtime, read_rows(&self.client, table))
    }

    fn close(self: Box<Self>) -> Result<(), ConnectionError> {
        let Self {
            target,
            client,
            runtime,
        } = *self;
        drop(client);
        runtime.shutdown_background();
        debug!("closed {target}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fetchsink_core::FlattenOptions;
    use rstest::rstest;
    use serde_json::json;
    use std::net::TcpListener;

    fn table(value: serde_json::Value) -> Table {
        Table::from_record(&Record::new(value), &FlattenOptions::default()).expect("flatten")
    }

    #[rstest]
    fn describe_omits_password() {
        let manager = PostgresManager::new(PostgresConfig {
            password: Some("hunter2".to_owned()),
            database: "words".to_owned(),
            ..PostgresConfig::default()
        });

        assert_eq!(manager.describe(), "postgres://postgres@localhost:5432/words");
        assert!(!format!("{manager:?}").contains("hunter2"));
    }

    #[rstest]
    fn unreachable_server_is_connect_error() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
            listener.local_addr().expect("addr").port()
        };
        let manager = PostgresManager::new(PostgresConfig {
            host: "127.0.0.1".to_owned(),
            port,
            connect_timeout: Duration::from_secs(2),
            ..PostgresConfig::default()
        });

        let err = manager.open().expect_err("nothing listening");

        assert!(matches!(err, ConnectionError::Connect { .. }));
    }

    #[rstest]
    #[case("bigint", "int8", "bigint")]
    #[case("character varying", "varchar", "character varying")]
    #[case("ARRAY", "_int4", "\"_int4\"")]
    #[case("USER-DEFINED", "mood", "\"mood\"")]
    fn casts_follow_declared_types(
        #[case] data_type: &str,
        #[case] udt_name: &str,
        #[case] expected: &str,
    ) {
        assert_eq!(cast_target(data_type, udt_name), expected);
    }

    #[rstest]
    fn insert_casts_every_parameter_through_text() {
        let rows = table(json!({"word": "a", "score": 1}));
        let casts = vec!["TEXT".to_owned(), "BIGINT".to_owned()];

        assert_eq!(
            insert_statement("words", &rows, &casts),
            "INSERT INTO \"words\" (\"word\", \"score\") VALUES ($1::TEXT::TEXT, $2::TEXT::BIGINT)"
        );
    }

    #[rstest]
    #[case(Cell::Null, None)]
    #[case(Cell::Bool(true), Some("true"))]
    #[case(Cell::Integer(-3), Some("-3"))]
    #[case(Cell::Float(0.5), Some("0.5"))]
    #[case(Cell::Text("x".to_owned()), Some("x"))]
    fn cells_render_as_text(#[case] cell: Cell, #[case] expected: Option<&str>) {
        assert_eq!(to_text(&cell).as_deref(), expected);
    }

    /// Needs a scratch database: set `FETCHSINK_TEST_PG_HOST` (and optionally
    /// `FETCHSINK_TEST_PG_USER`, `FETCHSINK_TEST_PG_PASSWORD`,
    /// `FETCHSINK_TEST_PG_DATABASE`).
    #[rstest]
    #[ignore = "requires a running PostgreSQL server"]
    fn append_then_read_back_live() {
        let env = |key: &str| std::env::var(format!("FETCHSINK_TEST_PG_{key}")).ok();
        let defaults = PostgresConfig::default();
        let manager = PostgresManager::new(PostgresConfig {
            host: env("HOST").expect("FETCHSINK_TEST_PG_HOST"),
            user: env("USER").unwrap_or(defaults.user.clone()),
            password: env("PASSWORD"),
            database: env("DATABASE").unwrap_or(defaults.database.clone()),
            ..defaults
        });
        let mut handle = manager.open().expect("open");
        let table_name = format!("fetchsink_test_{}", std::process::id());
        let rows = table(json!([
            {"word": "regretful", "score": 1393, "ok": true},
            {"word": "nostalgic", "score": null, "ok": false}
        ]));

        handle.append(&table_name, &rows).expect("append");
        let back = handle.read_table(&table_name).expect("read");

        assert_eq!(
            back.into_iter().map(Record::into_value).collect::<Vec<_>>(),
            vec![
                json!({"word": "regretful", "score": 1393, "ok": true}),
                json!({"word": "nostalgic", "score": null, "ok": false}),
            ]
        );
        handle.close().expect("close");
        handle.close().expect("close again");
    }
}
