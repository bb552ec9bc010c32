//! In-memory unit storage.
//!
//! Thread-safe implementation of `UnitStore`, used by tests and by callers
//! that persist elsewhere.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::core::Unit;
use crate::error::{Result, WaypointError};
use crate::storage::UnitStore;

/// In-memory unit store.
///
/// Units are lost when the store is dropped. The version check in
/// `compare_and_put` runs under the write lock.
#[derive(Debug, Default)]
pub struct MemoryUnitStore {
    units: RwLock<HashMap<String, Unit>>,
}

impl MemoryUnitStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of units in the store.
    pub fn len(&self) -> usize {
        self.units
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl UnitStore for MemoryUnitStore {
    fn get(&self, id: &str) -> Result<Option<Unit>> {
        let units = self.units.read().unwrap_or_else(PoisonError::into_inner);
        Ok(units.get(id).cloned())
    }

    fn put(&self, unit: &Unit) -> Result<()> {
        let mut units = self.units.write().unwrap_or_else(PoisonError::into_inner);
        units.insert(unit.id.clone(), unit.clone());
        Ok(())
    }

    fn compare_and_put(&self, unit: &Unit, expected_version: u64) -> Result<()> {
        let mut units = self.units.write().unwrap_or_else(PoisonError::into_inner);
        let stored = units
            .get(&unit.id)
            .ok_or_else(|| WaypointError::unit_not_found(&unit.id))?;
        if stored.version != expected_version {
            return Err(WaypointError::conflict(
                &unit.id,
                expected_version,
                stored.version,
            ));
        }
        units.insert(unit.id.clone(), unit.clone());
        Ok(())
    }

    fn list(&self, limit: usize) -> Result<Vec<Unit>> {
        let units = self.units.read().unwrap_or_else(PoisonError::into_inner);
        let mut result: Vec<Unit> = units.values().cloned().collect();
        result.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.id.cmp(&b.id)));
        result.truncate(limit);
        Ok(result)
    }

    fn delete(&self, id: &str) -> Result<()> {
        let mut units = self.units.write().unwrap_or_else(PoisonError::into_inner);
        units.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::traits::tests::{
        sample_unit, test_unit_store_compare_and_put, test_unit_store_crud,
    };

    #[test]
    fn test_memory_store_crud() {
        test_unit_store_crud(&MemoryUnitStore::new());
    }

    #[test]
    fn test_memory_store_compare_and_put() {
        test_unit_store_compare_and_put(&MemoryUnitStore::new());
    }

    #[test]
    fn test_len_and_is_empty() {
        let store = MemoryUnitStore::new();
        assert!(store.is_empty());
        store.put(&sample_unit("u1")).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_list_ordering_and_limit() {
        use chrono::{Duration, Utc};

        let store = MemoryUnitStore::new();
        let mut u1 = sample_unit("u1");
        let mut u2 = sample_unit("u2");
        let mut u3 = sample_unit("u3");
        u1.updated_at = Utc::now() - Duration::seconds(100);
        u2.updated_at = Utc::now() - Duration::seconds(50);
        u3.updated_at = Utc::now();
        store.put(&u2).unwrap();
        store.put(&u1).unwrap();
        store.put(&u3).unwrap();

        let ids: Vec<String> = store.list(10).unwrap().into_iter().map(|u| u.id).collect();
        assert_eq!(ids, vec!["u3", "u2", "u1"]);
        assert_eq!(store.list(2).unwrap().len(), 2);
    }

    #[test]
    fn test_thread_safety() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(MemoryUnitStore::new());
        let handles: Vec<_> = (0..10)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let unit = sample_unit(&format!("u{}", i));
                    store.put(&unit).unwrap();
                    store.get(&unit.id).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.len(), 10);
    }

    #[test]
    fn test_concurrent_cas_admits_one_writer() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(MemoryUnitStore::new());
        store.put(&sample_unit("race")).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let mut unit = sample_unit("race");
                    unit.version = 1;
                    store.compare_and_put(&unit, 0).is_ok()
                })
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(winners, 1);
    }
}
