//! Unified error types for Waypoint.
//!
//! Refusals (gate, ordering, phase lock) are recoverable values the caller
//! turns into a re-prompt. Only `DigestUnavailable` may leave a unit in a
//! completed-but-unaudited state; every other error means nothing changed.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for Waypoint operations.
#[derive(Error, Debug)]
pub enum WaypointError {
    /// A required gate on the step has no usable response.
    #[error("step {step_id} is missing responses for: {}", .missing.join(", "))]
    GateNotSatisfied {
        step_id: String,
        missing: Vec<String>,
    },

    /// A step predecessor is incomplete, or a jump targets an unreached phase.
    #[error("out of order: {message}")]
    OutOfOrder { message: String },

    /// Attempted to mutate a phase other than the current one.
    #[error("phase {requested} is locked (current phase is {current})")]
    PhaseLocked { requested: usize, current: usize },

    /// Operation requires a fully completed unit.
    #[error("not ready: {message}")]
    NotReady { message: String },

    /// The hashing collaborator failed; the unit stays completed without a digest.
    #[error("audit digest unavailable: {message}")]
    DigestUnavailable { message: String },

    /// The content generator could not produce a unit.
    #[error("generator failure: {message}")]
    GeneratorFailure { message: String },

    /// The caller presented a stale version of the unit.
    #[error("conflict on unit {unit_id}: expected version {expected}, found {actual}")]
    Conflict {
        unit_id: String,
        expected: u64,
        actual: u64,
    },

    /// I/O errors from unit file operations.
    #[error("storage error at {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// JSON or TOML serialization errors.
    #[error("serialization error: {message}")]
    Serde { message: String },

    /// Configuration loading errors.
    #[error("config error: {message}")]
    Config { message: String },

    /// Unit not found in storage.
    #[error("unit not found: {unit_id}")]
    UnitNotFound { unit_id: String },

    /// Phase index or step id does not exist on the unit.
    #[error("unknown step: {message}")]
    UnknownStep { message: String },

    /// A unit failed structural validation.
    #[error("invalid unit: {message}")]
    InvalidUnit { message: String },

    /// User input could not be read as an answer.
    #[error("invalid answer: {message}")]
    InvalidAnswer { message: String },
}

/// A specialized Result type for Waypoint operations.
pub type Result<T> = std::result::Result<T, WaypointError>;

impl WaypointError {
    /// Create a gate refusal listing the unanswered gate ids.
    pub fn gate_not_satisfied(step_id: impl Into<String>, missing: Vec<String>) -> Self {
        Self::GateNotSatisfied {
            step_id: step_id.into(),
            missing,
        }
    }

    /// Create an ordering refusal.
    pub fn out_of_order(message: impl Into<String>) -> Self {
        Self::OutOfOrder {
            message: message.into(),
        }
    }

    /// Create a phase lock refusal.
    pub fn phase_locked(requested: usize, current: usize) -> Self {
        Self::PhaseLocked { requested, current }
    }

    /// Create a not-ready error.
    pub fn not_ready(message: impl Into<String>) -> Self {
        Self::NotReady {
            message: message.into(),
        }
    }

    /// Create a digest-unavailable error.
    pub fn digest_unavailable(message: impl Into<String>) -> Self {
        Self::DigestUnavailable {
            message: message.into(),
        }
    }

    /// Create a generator failure.
    pub fn generator_failure(message: impl Into<String>) -> Self {
        Self::GeneratorFailure {
            message: message.into(),
        }
    }

    /// Create a version conflict.
    pub fn conflict(unit_id: impl Into<String>, expected: u64, actual: u64) -> Self {
        Self::Conflict {
            unit_id: unit_id.into(),
            expected,
            actual,
        }
    }

    /// Create a storage error from an I/O error.
    pub fn storage(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    /// Create a serialization error.
    pub fn serde(message: impl Into<String>) -> Self {
        Self::Serde {
            message: message.into(),
        }
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a unit not found error.
    pub fn unit_not_found(unit_id: impl Into<String>) -> Self {
        Self::UnitNotFound {
            unit_id: unit_id.into(),
        }
    }

    /// Create an unknown step error.
    pub fn unknown_step(message: impl Into<String>) -> Self {
        Self::UnknownStep {
            message: message.into(),
        }
    }

    /// Create an invalid unit error.
    pub fn invalid_unit(message: impl Into<String>) -> Self {
        Self::InvalidUnit {
            message: message.into(),
        }
    }

    /// Create an invalid answer error.
    pub fn invalid_answer(message: impl Into<String>) -> Self {
        Self::InvalidAnswer {
            message: message.into(),
        }
    }

    /// Whether the error is a user-facing refusal the caller should re-prompt on.
    ///
    /// Refusals never change unit state.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::GateNotSatisfied { .. }
                | Self::OutOfOrder { .. }
                | Self::PhaseLocked { .. }
                | Self::Conflict { .. }
                | Self::InvalidAnswer { .. }
        )
    }
}

impl From<io::Error> for WaypointError {
    fn from(err: io::Error) -> Self {
        Self::Storage {
            path: PathBuf::new(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for WaypointError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serde {
            message: err.to_string(),
        }
    }
}

/// Trait for fail-open error handling.
///
/// Used for side effects (ledger writes, digest retries on read) whose
/// failure must never block progression: log the error and continue.
pub trait FailOpen<T> {
    /// Handle an error by logging a warning and returning the default value.
    fn fail_open_default(self, context: &str) -> T
    where
        T: Default;

    /// Handle an error by logging a warning and returning the provided fallback.
    fn fail_open_with(self, context: &str, fallback: T) -> T;
}

impl<T> FailOpen<T> for Result<T> {
    fn fail_open_default(self, context: &str) -> T
    where
        T: Default,
    {
        match self {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!("{}: {} (fail-open: using default)", context, err);
                T::default()
            }
        }
    }

    fn fail_open_with(self, context: &str, fallback: T) -> T {
        match self {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!("{}: {} (fail-open: using fallback)", context, err);
                fallback
            }
        }
    }
}

/// Exit codes for the Waypoint CLI.
pub mod exit_codes {
    /// The command succeeded.
    pub const SUCCESS: i32 = 0;

    /// The command failed (storage, config, invalid input).
    pub const ERROR: i32 = 1;

    /// The engine refused the transition (gate, order, lock, conflict).
    pub const REFUSED: i32 = 2;

    /// The process panicked.
    pub const CRASH: i32 = 3;
}
