//! Progress ledger for Waypoint.
//!
//! Every transition's events are appended to a JSONL file
//! (`~/.waypoint/ledger.jsonl`), one entry per event. The engine writes the
//! ledger fail-open: a ledger failure never blocks progression.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{ProgressEvent, Unit};
use crate::error::{Result, WaypointError};
use crate::util::read_to_string_limited;

/// Schema version for ledger entries.
pub const LEDGER_SCHEMA_VERSION: u8 = 1;

/// One ledger line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerEntry {
    /// Schema version for forward compatibility.
    pub v: u8,
    /// When the entry was written.
    pub ts: DateTime<Utc>,
    /// Unit the event belongs to.
    pub unit_id: String,
    /// Unit version after the transition.
    pub version: u64,
    /// The event and its data.
    #[serde(flatten)]
    pub event: ProgressEvent,
}

impl LedgerEntry {
    /// Create an entry stamped now.
    pub fn new(unit_id: impl Into<String>, version: u64, event: ProgressEvent) -> Self {
        Self::with_timestamp(unit_id, version, event, Utc::now())
    }

    /// Create an entry with a specific timestamp.
    pub fn with_timestamp(
        unit_id: impl Into<String>,
        version: u64,
        event: ProgressEvent,
        ts: DateTime<Utc>,
    ) -> Self {
        Self {
            v: LEDGER_SCHEMA_VERSION,
            ts,
            unit_id: unit_id.into(),
            version,
            event,
        }
    }
}

/// Append-only JSONL ledger.
#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    /// Create a ledger writing to `path`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Append a single entry.
    pub fn append(&self, entry: &LedgerEntry) -> Result<()> {
        self.append_lines(&[serde_json::to_string(entry)?])
    }

    /// Append one entry per event of a transition on `unit`.
    ///
    /// All lines go out in a single write.
    pub fn record(&self, unit: &Unit, events: &[ProgressEvent]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        let ts = Utc::now();
        let lines = events
            .iter()
            .map(|event| {
                let entry =
                    LedgerEntry::with_timestamp(&unit.id, unit.version, event.clone(), ts);
                serde_json::to_string(&entry)
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        self.append_lines(&lines)
    }

    fn append_lines(&self, lines: &[String]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| WaypointError::storage(parent, e))?;
        }

        let mut buffer = lines.join("\n");
        buffer.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| WaypointError::storage(&self.path, e))?;
        file.write_all(buffer.as_bytes())
            .map_err(|e| WaypointError::storage(&self.path, e))
    }

    /// Read all entries.
    pub fn read_all(&self) -> Result<Vec<LedgerEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = read_to_string_limited(&self.path)?;
        let mut entries = Vec::new();
        for (line_num, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let entry: LedgerEntry = serde_json::from_str(line).map_err(|e| {
                WaypointError::serde(format!(
                    "failed to parse ledger entry on line {}: {}",
                    line_num + 1,
                    e
                ))
            })?;
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Read the entries of one unit, oldest first.
    pub fn for_unit(&self, unit_id: &str) -> Result<Vec<LedgerEntry>> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|e| e.unit_id == unit_id)
            .collect())
    }

    /// Count the entries in the ledger.
    pub fn count(&self) -> Result<usize> {
        Ok(self.read_all()?.len())
    }

    /// Get the path to the ledger file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Compensation, Outcome, PhaseKind, Template};
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn ledger() -> (Ledger, TempDir) {
        let dir = TempDir::new().unwrap();
        (Ledger::new(dir.path().join("ledger.jsonl")), dir)
    }

    fn step_event(step: &str) -> ProgressEvent {
        ProgressEvent::StepCompleted {
            phase_index: 0,
            step_id: step.to_string(),
            outcome: Some(Outcome::PartialConfirmation),
        }
    }

    #[test]
    fn test_entry_serialization_is_flat() {
        let ts = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let entry = LedgerEntry::with_timestamp(
            "u-1",
            3,
            ProgressEvent::PhaseCompleted {
                phase_index: 1,
                kind: PhaseKind::Execution,
            },
            ts,
        );
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains(r#""event":"phase_completed""#));
        assert!(json.contains(r#""unit_id":"u-1""#));
        assert!(json.contains(r#""v":1"#));

        let back: LedgerEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn test_append_and_read() {
        let (ledger, _dir) = ledger();
        ledger
            .append(&LedgerEntry::new("u-1", 1, step_event("s-1")))
            .unwrap();
        let entries = ledger.read_all().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].event, step_event("s-1"));
    }

    #[test]
    fn test_record_writes_one_line_per_event() {
        let (ledger, _dir) = ledger();
        let mut unit = Template::directive().start_unit("u-2", "t");
        unit.version = 4;
        ledger
            .record(
                &unit,
                &[
                    step_event("s-9"),
                    ProgressEvent::UnitCompleted {
                        final_reward: Compensation::new(3, 4),
                        audit_digest: None,
                    },
                ],
            )
            .unwrap();

        let entries = ledger.read_all().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.unit_id == "u-2" && e.version == 4));
        assert_eq!(ledger.count().unwrap(), 2);
    }

    #[test]
    fn test_record_nothing_creates_no_file() {
        let (ledger, _dir) = ledger();
        let unit = Template::directive().start_unit("u", "t");
        ledger.record(&unit, &[]).unwrap();
        assert!(!ledger.path().exists());
    }

    #[test]
    fn test_for_unit_filters() {
        let (ledger, _dir) = ledger();
        ledger
            .append(&LedgerEntry::new("a", 1, step_event("s-1")))
            .unwrap();
        ledger
            .append(&LedgerEntry::new("b", 1, step_event("s-2")))
            .unwrap();
        ledger
            .append(&LedgerEntry::new("a", 2, step_event("s-3")))
            .unwrap();

        let entries = ledger.for_unit("a").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].version, 2);
    }

    #[test]
    fn test_read_missing_file_is_empty() {
        let (ledger, _dir) = ledger();
        assert!(ledger.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_creates_parent_directory() {
        let dir = TempDir::new().unwrap();
        let ledger = Ledger::new(dir.path().join("nested").join("ledger.jsonl"));
        ledger
            .append(&LedgerEntry::new("u", 1, step_event("s")))
            .unwrap();
        assert!(ledger.path().exists());
    }

    #[test]
    fn test_malformed_line_reports_line_number() {
        let (ledger, _dir) = ledger();
        ledger
            .append(&LedgerEntry::new("u", 1, step_event("s")))
            .unwrap();
        let mut file = OpenOptions::new().append(true).open(ledger.path()).unwrap();
        writeln!(file, "not json").unwrap();

        let err = ledger.read_all().unwrap_err().to_string();
        assert!(err.contains("line 2"));
    }
}
