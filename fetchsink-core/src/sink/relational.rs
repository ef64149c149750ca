//! Appending flattened records to a relational table.

use log::info;

use super::{PersistError, PersistOutcome, Sink, SinkContext, SinkTarget};
use crate::record::Payload;
use crate::tabular::Table;

/// Appends each run's record to a table on a registered connection.
///
/// The table is created on first write from the flattened column list and
/// appended to afterwards. The connection is looked up by name in the
/// [`SinkContext`] so that several sinks can share one store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationalSink {
    name: String,
    connection: String,
    table: String,
}

impl RelationalSink {
    /// Sink named `name` writing to `table` through `connection`.
    pub fn new(
        name: impl Into<String>,
        connection: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            connection: connection.into(),
            table: table.into(),
        }
    }

    /// Target table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }
}

impl Sink for RelationalSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn target(&self) -> SinkTarget {
        SinkTarget::Table {
            connection: self.connection.clone(),
            table: self.table.clone(),
        }
    }

    fn persist(
        &self,
        payload: &Payload,
        ctx: &mut SinkContext<'_>,
    ) -> Result<PersistOutcome, PersistError> {
        let record = payload
            .as_record()
            .ok_or_else(|| PersistError::RequiresStructured {
                sink: self.name.clone(),
                kind: payload.kind(),
            })?;
        let rows = Table::from_record(record, ctx.flatten_options())?;
        if rows.columns().is_empty() {
            info!("{}: record has no columns; nothing to append", self.name);
            return Ok(PersistOutcome::Appended {
                table: self.table.clone(),
                rows: 0,
            });
        }
        let handle = ctx.connection(&self.connection)?;
        let written = handle.append(&self.table, &rows)?;
        Ok(PersistOutcome::Appended {
            table: self.table.clone(),
            rows: written,
        })
    }
}
