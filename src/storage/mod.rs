//! Unit storage for Waypoint.
//!
//! The engine persists only through the `UnitStore` trait. File and
//! in-memory backends are provided, along with the snapshot format both
//! share.

pub mod file;
pub mod memory;
pub mod snapshot;
pub mod traits;

pub use file::FileUnitStore;
pub use memory::MemoryUnitStore;
pub use snapshot::{restore, snapshot, SerializedUnit, SCHEMA_VERSION};
pub use traits::UnitStore;
