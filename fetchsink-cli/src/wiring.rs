//! Turning an [`AppConfig`] into a [`Pipeline`].

use fetchsink_core::{
    ArtefactPath, Pipeline, RelationalSink, RetryingTransport, RunReport, SinkTarget, Transport,
};
use fetchsink_data::{
    HttpTransport, JsonFileSink, PostgresManager, SqliteManager, TabularExportSink,
};
use log::{debug, info, warn};

use crate::{AppConfig, CliError};

/// Connection name the SQLite sink is registered under.
pub const SQLITE_CONNECTION: &str = "sqlite";
/// Connection name the PostgreSQL sink is registered under.
pub const POSTGRES_CONNECTION: &str = "postgres";

pub(crate) fn http_transport(
    config: &AppConfig,
) -> Result<RetryingTransport<HttpTransport>, CliError> {
    let http = HttpTransport::with_config(config.http_config())?;
    Ok(RetryingTransport::new(http, config.retry_policy()))
}

/// Sinks run in a fixed order: JSON, CSV, XLSX, SQLite, PostgreSQL.
pub(crate) fn build_pipeline<T: Transport>(config: &AppConfig, transport: T) -> Pipeline<T> {
    let dir = &config.output_dir;
    let outputs = &config.outputs;
    let mut builder = Pipeline::builder(transport)
        .format(config.format)
        .identifier_rule(config.identifier_rule())
        .status_policy(config.status_policy())
        .flatten_options(config.flatten_options());

    if outputs.json {
        builder = builder.sink(JsonFileSink::new(
            "json",
            ArtefactPath::derived(dir.clone(), None),
        ));
    }
    for (enabled, extension) in [(outputs.csv, "csv"), (outputs.xlsx, "xlsx")] {
        if enabled {
            let path = ArtefactPath::derived(dir.clone(), Some(extension));
            builder = builder
                .sink(TabularExportSink::new(extension, path).with_index(outputs.include_index));
        }
    }
    if config.sqlite.enabled {
        builder = builder
            .connection(SQLITE_CONNECTION, SqliteManager::new(config.sqlite.path.clone()))
            .sink(RelationalSink::new(
                "sqlite",
                SQLITE_CONNECTION,
                config.sqlite.table.clone(),
            ));
    }
    if config.postgres.enabled {
        builder = builder
            .connection(
                POSTGRES_CONNECTION,
                PostgresManager::new(config.postgres_config()),
            )
            .sink(RelationalSink::new(
                "postgres",
                POSTGRES_CONNECTION,
                config.postgres.table.clone(),
            ));
    }
    builder.build()
}

/// Read back every table a successful sink appended to and log it.
///
/// Returns `(table, rows)` for each table read. Failures to reopen or read
/// are logged and skipped; they never change the run's outcome.
pub(crate) fn echo_tables<T: Transport>(
    pipeline: &Pipeline<T>,
    report: &RunReport,
) -> Vec<(String, usize)> {
    let mut echoed = Vec::new();
    for sink in report.succeeded() {
        let SinkTarget::Table { connection, table } = &sink.target else {
            continue;
        };
        let Some(manager) = pipeline.connections().get(connection) else {
            continue;
        };
        let mut handle = match manager.open() {
            Ok(handle) => handle,
            Err(err) => {
                warn!(
                    "sink `{}`: cannot reopen {connection} to echo {table}: {err}",
                    sink.name
                );
                continue;
            }
        };
        match handle.read_table(table) {
            Ok(records) => {
                info!(
                    "sink `{}`: {table} now holds {} row(s)",
                    sink.name,
                    records.len()
                );
                for record in &records {
                    debug!("{table}: {}", record.as_value());
                }
                echoed.push((table.clone(), records.len()));
            }
            Err(err) => warn!("sink `{}`: reading {table} back failed: {err}", sink.name),
        }
        if let Err(err) = handle.close() {
            warn!("closing {connection} after echo failed: {err}");
        }
    }
    echoed
}
