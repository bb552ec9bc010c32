//! Core types and logic for Waypoint.
//!
//! This module contains the progression model, the gate evaluator, outcome
//! classification, reward aggregation, audit digests and the phase advancer
//! that ties them together.

pub mod advancer;
pub mod audit;
pub mod gate;
pub mod model;
pub mod outcome;
pub mod reward;
pub mod template;

pub use advancer::{Advancer, ProgressEvent, Transition};
pub use audit::{build_digest, canonical_payload, AuditContext, DigestHasher, Sha256Hasher};
pub use gate::{can_complete, evaluate, evaluate_with, GateVerdict};
pub use model::{
    Compensation, Gate, GateKind, Phase, PhaseKind, Progress, ProgressionRules, Response,
    ResponseShape, Step, StepOrdering, StepResponse, Unit, UnitContext, UnitStatus, Variant,
};
pub use outcome::{classify, Outcome};
pub use reward::aggregate;
pub use template::Template;
