//! Write-once file sink for the raw payload.

use fetchsink_core::{
    ArtefactPath, Payload, PersistError, PersistOutcome, Sink, SinkContext, SinkTarget,
};
use fetchsink_fs::{WriteOutcome, create_new_atomic};
use log::{info, warn};

/// Writes the payload to a file only if the file does not exist yet.
///
/// Structured payloads are written as single-line JSON with `", "` and
/// `": "` separators; text payloads verbatim. The first run to write a path
/// wins: later runs leave the file untouched and report
/// [`PersistOutcome::Skipped`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonFileSink {
    name: String,
    path: ArtefactPath,
}

impl JsonFileSink {
    /// Sink named `name` writing to `path`.
    pub fn new(name: impl Into<String>, path: ArtefactPath) -> Self {
        Self {
            name: name.into(),
            path,
        }
    }
}

impl Sink for JsonFileSink {
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
        let bytes = payload.to_bytes().map_err(PersistError::Serialize)?;
        match create_new_atomic(&path, &bytes) {
            Ok(WriteOutcome::Created) => {
                info!("{}: wrote {} bytes to {path}", self.name, bytes.len());
                Ok(PersistOutcome::Created { path })
            }
            Ok(WriteOutcome::AlreadyExists) => {
                warn!("{}: {path} already exists; leaving it untouched", self.name);
                Ok(PersistOutcome::Skipped { path })
            }
            Err(source) => Err(PersistError::Io { path, source }),
        }
    }
}
