use anyhow::{Context, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::SystemTime;

use crate::models::SchemaKind;

/// Watches the externally-produced signal file for new content
///
/// The file is a single-slot mailbox: the producer appends rows, we read the
/// most recent one and truncate the file back to its header to hand the slot
/// back. Only the last data row is ever considered ("latest wins") - rows the
/// producer managed to append between two polls are silently dropped.
pub struct SignalStore {
    path: PathBuf,
    schema: SchemaKind,
    last_modified: Option<SystemTime>,
}

impl SignalStore {
    pub fn new(path: impl Into<PathBuf>, schema: SchemaKind) -> Self {
        Self {
            path: path.into(),
            schema,
            last_modified: None,
        }
    }

    /// Return the latest unconsumed data row, if the file changed since the
    /// previous check
    ///
    /// A missing file is not an error - the producer may not have started yet.
    /// Read errors propagate; the caller retries on the next poll.
    pub fn check_for_update(&mut self) -> Result<Option<String>> {
        let metadata = match fs::metadata(&self.path) {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("stat signal file {:?}", self.path))
            }
        };

        let modified = metadata
            .modified()
            .with_context(|| format!("signal file {:?} has no mtime", self.path))?;

        // Only re-read when the mtime strictly increased
        if let Some(last) = self.last_modified {
            if modified <= last {
                return Ok(None);
            }
        }
        self.last_modified = Some(modified);

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("read signal file {:?}", self.path))?;

        // Skip the header row; latest data row wins
        let line = contents
            .lines()
            .skip(1)
            .filter(|l| !l.trim().is_empty())
            .last()
            .map(|l| l.to_string());

        Ok(line)
    }

    /// Truncate the file back to its header, signalling the producer that the
    /// slot is free
    pub fn acknowledge(&mut self) -> Result<()> {
        fs::write(&self.path, format!("{}\n", self.schema.header()))
            .with_context(|| format!("truncate signal file {:?}", self.path))?;

        // Fold our own rewrite into the watermark so the next poll does not
        // re-read the header-only file
        if let Ok(modified) = fs::metadata(&self.path).and_then(|m| m.modified()) {
            self.last_modified = Some(modified);
        }

        Ok(())
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}
