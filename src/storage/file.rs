//! File-based unit storage for Waypoint.
//!
//! Units are stored as versioned snapshot envelopes in `~/.waypoint/units/`.
//! Atomic writes are achieved via temp file + rename pattern.

use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use crate::config::units_dir;
use crate::core::Unit;
use crate::error::{Result, WaypointError};
use crate::storage::snapshot::{restore, snapshot, SerializedUnit};
use crate::storage::UnitStore;
use crate::util::{atomic_write, read_to_string_limited, temp_path_for};

/// File-based unit storage.
///
/// Reads go through `restore`, so files written by older versions load with
/// their derived progress recomputed.
#[derive(Debug)]
pub struct FileUnitStore {
    /// Directory where unit files are stored.
    units_dir: PathBuf,
    /// Serializes in-process writers between the version check and rename.
    write_lock: Mutex<()>,
}

impl FileUnitStore {
    /// Create a store in the default directory (`$WAYPOINT_HOME/units/`).
    pub fn new() -> Result<Self> {
        let dir = units_dir().ok_or_else(|| {
            WaypointError::config("Could not determine units directory (no home directory)")
        })?;
        Self::with_dir(dir)
    }

    /// Create a store in a custom directory, creating it if needed.
    pub fn with_dir(units_dir: impl Into<PathBuf>) -> Result<Self> {
        let units_dir = units_dir.into();
        if !units_dir.exists() {
            fs::create_dir_all(&units_dir).map_err(|e| WaypointError::storage(&units_dir, e))?;
        }
        Ok(Self {
            units_dir,
            write_lock: Mutex::new(()),
        })
    }

    /// Directory the store writes to.
    pub fn dir(&self) -> &PathBuf {
        &self.units_dir
    }

    /// Get the path for a unit file.
    ///
    /// Ids that could resolve outside the store directory are rejected.
    fn unit_path(&self, id: &str) -> Result<PathBuf> {
        Unit::check_id(id)?;
        Ok(self.units_dir.join(format!("{}.json", id)))
    }

    fn read_unit(&self, path: &std::path::Path) -> Result<Unit> {
        let content = read_to_string_limited(path)?;
        let serialized = SerializedUnit::from_json(&content)?;
        restore(&serialized, None)
    }

    fn write_unit(&self, unit: &Unit) -> Result<()> {
        let json = snapshot(unit)?.to_json()?;
        atomic_write(&self.unit_path(&unit.id)?, json.as_bytes())
    }
}

impl UnitStore for FileUnitStore {
    fn get(&self, id: &str) -> Result<Option<Unit>> {
        let path = self.unit_path(id)?;
        if !path.exists() {
            return Ok(None);
        }
        self.read_unit(&path).map(Some)
    }

    fn put(&self, unit: &Unit) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.write_unit(unit)
    }

    fn compare_and_put(&self, unit: &Unit, expected_version: u64) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let stored = self
            .get(&unit.id)?
            .ok_or_else(|| WaypointError::unit_not_found(&unit.id))?;
        if stored.version != expected_version {
            return Err(WaypointError::conflict(
                &unit.id,
                expected_version,
                stored.version,
            ));
        }
        self.write_unit(unit)
    }

    fn list(&self, limit: usize) -> Result<Vec<Unit>> {
        if !self.units_dir.exists() {
            return Ok(Vec::new());
        }

        let entries =
            fs::read_dir(&self.units_dir).map_err(|e| WaypointError::storage(&self.units_dir, e))?;

        let mut units = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| WaypointError::storage(&self.units_dir, e))?;
            let path = entry.path();

            // Skip non-JSON files and temp files
            if path.extension().map(|e| e != "json").unwrap_or(true) {
                continue;
            }
            if path
                .file_name()
                .map(|n| n.to_string_lossy().starts_with('.'))
                .unwrap_or(true)
            {
                continue;
            }

            match self.read_unit(&path) {
                Ok(unit) => units.push(unit),
                Err(e) => {
                    tracing::debug!(path = %path.display(), error = %e, "skipping unreadable unit")
                }
            }
        }

        units.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.id.cmp(&b.id)));
        units.truncate(limit);
        Ok(units)
    }

    fn delete(&self, id: &str) -> Result<()> {
        let path = self.unit_path(id)?;
        if path.exists() {
            fs::remove_file(&path).map_err(|e| WaypointError::storage(&path, e))?;
        }

        let temp_path = temp_path_for(&path);
        if temp_path.exists() {
            let _ = fs::remove_file(&temp_path);
        }
        Ok(())
    }
}
