//! Unit storage traits for Waypoint.
//!
//! This module defines the `UnitStore` trait for unit persistence.

use std::sync::Arc;

use crate::core::Unit;
use crate::error::Result;

/// Trait for unit storage backends.
///
/// Implementations provide persistent storage for units keyed by unit id,
/// with a version-checked write for optimistic concurrency.
pub trait UnitStore: Send + Sync {
    /// Retrieve a unit by ID.
    ///
    /// Returns `Ok(None)` if the unit doesn't exist.
    fn get(&self, id: &str) -> Result<Option<Unit>>;

    /// Save a unit unconditionally (last write wins).
    fn put(&self, unit: &Unit) -> Result<()>;

    /// Save a unit only if the stored version equals `expected_version`.
    ///
    /// Returns `Conflict` on a version mismatch and `UnitNotFound` if no
    /// unit is stored under the id.
    fn compare_and_put(&self, unit: &Unit, expected_version: u64) -> Result<()>;

    /// List units, most recently updated first, up to `limit`.
    fn list(&self, limit: usize) -> Result<Vec<Unit>>;

    /// Delete a unit.
    ///
    /// Returns `Ok(())` even if the unit doesn't exist.
    fn delete(&self, id: &str) -> Result<()>;

    /// Check if a unit exists.
    fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.get(id)?.is_some())
    }
}

/// Blanket implementation of UnitStore for Arc-wrapped stores.
impl<T: UnitStore + ?Sized> UnitStore for Arc<T> {
    fn get(&self, id: &str) -> Result<Option<Unit>> {
        (**self).get(id)
    }

    fn put(&self, unit: &Unit) -> Result<()> {
        (**self).put(unit)
    }

    fn compare_and_put(&self, unit: &Unit, expected_version: u64) -> Result<()> {
        (**self).compare_and_put(unit, expected_version)
    }

    fn list(&self, limit: usize) -> Result<Vec<Unit>> {
        (**self).list(limit)
    }

    fn delete(&self, id: &str) -> Result<()> {
        (**self).delete(id)
    }
}
