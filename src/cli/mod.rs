//! CLI commands for Waypoint.
//!
//! Each command follows the same shape: an `XCommand` owning an engine, an
//! `XOptions` with `json`/`quiet`, and a serializable `XOutput` that the
//! binary formats and maps to an exit code.
//! - **Setup**: import
//! - **Progress**: complete, jump, audit
//! - **Inspection**: status, list, ledger

// Setup
pub mod import;

// Progress
pub mod audit;
pub mod complete;
pub mod jump;

// Inspection
pub mod ledger;
pub mod list;
pub mod status;

pub use audit::AuditCommand;
pub use complete::{CompleteCommand, TransitionOutput};
pub use import::ImportCommand;
pub use jump::JumpCommand;
pub use ledger::LedgerCommand;
pub use list::ListCommand;
pub use status::{StatusCommand, UnitInfo};
