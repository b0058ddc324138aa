use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::models::{ExitPlan, SchemaKind, TradeLogEntry, SIGNAL_TIME_FORMAT};

/// Append-only CSV log of every filled entry
///
/// One row per entry fill, written after the exit orders are already on the
/// venue. The file is created lazily with a header on first append; existing
/// rows are never rewritten.
pub struct TradeLogWriter {
    path: PathBuf,
    schema: SchemaKind,
}

impl TradeLogWriter {
    pub fn new(path: impl Into<PathBuf>, schema: SchemaKind) -> Self {
        Self {
            path: path.into(),
            schema,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn header(&self) -> &'static str {
        match self.schema {
            SchemaKind::Basic => "EntryTime,DateTime,Direction,Signal_Entry,Actual_Entry",
            SchemaKind::SingleTarget => {
                "EntryTime,DateTime,Signal,Direction,Signal_Entry,Actual_Entry,Stop_Loss,Profit_Target,Zone_Type,ATR"
            }
            SchemaKind::DualTarget => {
                "EntryTime,DateTime,Signal,Direction,Signal_Entry,Actual_Entry,Stop_Loss,Profit_Target1,Profit_Target2,Quantity1,Quantity2,Zone_Type,ATR"
            }
        }
    }

    fn row(&self, entry: &TradeLogEntry) -> String {
        let signal = &entry.signal;
        let entry_time = entry.entry_time.format("%m/%d/%Y %H:%M:%S");
        let signal_time = signal.timestamp.format(SIGNAL_TIME_FORMAT);
        let signal_type = signal.signal_type.as_deref().unwrap_or("");
        let zone_type = signal.zone_type.as_deref().unwrap_or("");
        let atr = signal.atr.map(|a| format!("{:.2}", a)).unwrap_or_default();

        match &signal.plan {
            ExitPlan::FixedBracket => format!(
                "{},{},{},{:.2},{:.2}",
                entry_time, signal_time, signal.direction, signal.entry_price,
                entry.actual_entry_price
            ),
            ExitPlan::SingleTarget {
                stop_loss,
                profit_target,
            } => format!(
                "{},{},{},{},{:.2},{:.2},{:.2},{:.2},{},{}",
                entry_time,
                signal_time,
                signal_type,
                signal.direction,
                signal.entry_price,
                entry.actual_entry_price,
                stop_loss,
                profit_target,
                zone_type,
                atr
            ),
            ExitPlan::DualTarget {
                stop_loss,
                profit_target_1,
                profit_target_2,
                quantity_1,
                quantity_2,
            } => format!(
                "{},{},{},{},{:.2},{:.2},{:.2},{:.2},{:.2},{},{},{},{}",
                entry_time,
                signal_time,
                signal_type,
                signal.direction,
                signal.entry_price,
                entry.actual_entry_price,
                stop_loss,
                profit_target_1,
                profit_target_2,
                quantity_1,
                quantity_2,
                zone_type,
                atr
            ),
        }
    }

    /// Append one record, creating the file (and parent directory) with a
    /// header row if needed
    pub fn append(&mut self, entry: &TradeLogEntry) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }

        let needs_header = match fs::metadata(&self.path) {
            Ok(meta) => meta.len() == 0,
            Err(_) => true,
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open trade log {}", self.path.display()))?;

        if needs_header {
            writeln!(file, "{}", self.header())?;
        }
        writeln!(file, "{}", self.row(entry))?;
        Ok(())
    }
}
