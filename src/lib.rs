//! Waypoint - Mission & Directive Progression Engine
//!
//! Waypoint drives a user through a multi-phase sequence of gated steps. It
//! decides when a phase or a whole unit is done, grades outcomes, totals the
//! reward, and seals completed units with a deterministic audit digest.
//! Missions and directives are two templates over the same engine.

pub mod cli;
pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod generator;
pub mod ledger;
pub mod storage;
pub mod util;

pub use config::Config;
pub use crate::core::{
    Advancer, Compensation, DigestHasher, Gate, GateKind, Outcome, Phase, PhaseKind,
    ProgressEvent, Response, ResponseShape, Sha256Hasher, Step, StepResponse, Template,
    Transition, Unit, UnitStatus, Variant,
};
pub use engine::Engine;
pub use error::{Result, WaypointError};
pub use generator::{ContentGenerator, JsonFileGenerator, UnitDescriptor};
pub use ledger::{Ledger, LedgerEntry, LEDGER_SCHEMA_VERSION};
pub use storage::{FileUnitStore, MemoryUnitStore, UnitStore};

// CLI commands
pub use cli::{
    AuditCommand, CompleteCommand, ImportCommand, JumpCommand, LedgerCommand, ListCommand,
    StatusCommand,
};
