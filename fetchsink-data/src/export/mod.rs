//! CSV and XLSX export of flattened records.

mod delimited;
mod spreadsheet;

use fetchsink_core::{
    ArtefactPath, FileFormat, Payload, PersistError, PersistOutcome, Sink, SinkContext,
    SinkTarget, Table,
};
use fetchsink_fs::{path_exists, replace_atomic};
use log::info;

/// Flattens the record and writes it as CSV or XLSX.
///
/// The format follows the target's extension, ignoring case; any other
/// extension fails with [`PersistError::UnsupportedFormat`]. Existing files
/// are replaced atomically, so each run leaves a complete export of its own
/// record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabularExportSink {
    name: String,
    path: ArtefactPath,
    include_index: bool,
}

impl TabularExportSink {
    /// Sink named `name` writing to `path`, with a leading index column.
    pub fn new(name: impl Into<String>, path: ArtefactPath) -> Self {
        Self {
            name: name.into(),
            path,
            include_index: true,
        }
    }

    /// Whether to write the unnamed 0-based index column.
    #[must_use]
    pub const fn with_index(mut self, include_index: bool) -> Self {
        self.include_index = include_index;
        self
    }
}

impl Sink for TabularExportSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn target(&self) -> SinkTarget {
        SinkTarget::file(self.path.clone())
    }

    fn persist(
        &self,
        payload: &Payload,
        ctx: &mut SinkContext<'_>,
    ) -> Result<PersistOutcome, PersistError> {
        let path = self.path.resolve(ctx.identifier());
        let format = match path.extension().and_then(FileFormat::from_extension) {
            Some(format @ (FileFormat::Csv | FileFormat::Xlsx)) => format,
            _ => return Err(PersistError::UnsupportedFormat { path }),
        };
        let record = payload
            .as_record()
            .ok_or_else(|| PersistError::RequiresStructured {
                sink: self.name.clone(),
                kind: payload.kind(),
            })?;
        let table = Table::from_record(record, ctx.flatten_options())?;

        let encoded = match format {
            FileFormat::Xlsx => spreadsheet::encode(&table, self.include_index),
            _ => delimited::encode(&table, self.include_index),
        };
        let bytes = encoded.map_err(|source| PersistError::Encode {
            path: path.clone(),
            format,
            source,
        })?;

        let existed = path_exists(&path).map_err(|source| PersistError::Io {
            path: path.clone(),
            source,
        })?;
        replace_atomic(&path, &bytes).map_err(|source| PersistError::Io {
            path: path.clone(),
            source,
        })?;
        info!(
            "{}: wrote {} row(s) as {format} to {path}",
            self.name,
            table.len()
        );
        Ok(if existed {
            PersistOutcome::Replaced { path }
        } else {
            PersistOutcome::Created { path }
        })
    }
}
