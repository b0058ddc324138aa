use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use tracing::warn;

/// Tail reader for the platform's live price file
///
/// The platform appends `DateTime,Last` rows on every tick; only the most
/// recent print matters here. A missing file just means the feed strategy
/// has not started yet.
pub struct LiveFeed {
    path: PathBuf,
    last_modified: Option<SystemTime>,
}

impl LiveFeed {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_modified: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return the latest price if the file changed since the previous poll
    pub fn poll(&mut self) -> Result<Option<f64>> {
        let metadata = match fs::metadata(&self.path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to stat {}", self.path.display()))
            }
        };

        let modified = metadata
            .modified()
            .with_context(|| format!("No mtime for {}", self.path.display()))?;
        if let Some(seen) = self.last_modified {
            if modified <= seen {
                return Ok(None);
            }
        }
        self.last_modified = Some(modified);

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;

        let last_line = match contents
            .lines()
            .skip(1)
            .filter(|l| !l.trim().is_empty())
            .last()
        {
            Some(line) => line,
            None => return Ok(None),
        };

        match parse_price_line(last_line) {
            Some(price) => Ok(Some(price)),
            None => {
                // Half-written tick; the next append supersedes it anyway
                warn!(line = last_line, "Skipping malformed feed line");
                Ok(None)
            }
        }
    }
}

fn parse_price_line(line: &str) -> Option<f64> {
    let mut fields = line.split(',');
    let _timestamp = fields.next()?;
    fields.next()?.trim().parse::<f64>().ok()
}
