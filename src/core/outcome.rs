//! Outcome classification for completed steps.
//!
//! The grade is informational: it is logged and recorded on events, and
//! never gates completion or changes rewards.

use serde::{Deserialize, Serialize};

use crate::core::model::{GateKind, Step};

/// Qualitative completion grade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Safety confirmed and evidence captured (or none was asked for).
    CleanSuccess,
    /// At least one safety gate was not answered `true`.
    RiskySuccess,
    /// Safe, but no evidence gate was answered.
    PartialConfirmation,
}

impl Outcome {
    /// Uppercase label used in log lines.
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::CleanSuccess => "CLEAN_SUCCESS",
            Outcome::RiskySuccess => "RISKY_SUCCESS",
            Outcome::PartialConfirmation => "PARTIAL_CONFIRMATION",
        }
    }
}

/// Grade a step from which gate kinds were satisfied.
pub fn classify(step: &Step) -> Outcome {
    let mut safe = true;
    let mut evidence_gates = 0usize;
    let mut evidence_answered = false;

    for gate in &step.gates {
        match gate.kind {
            GateKind::Safety => {
                if !gate.response.as_ref().is_some_and(|r| r.is_affirmative()) {
                    safe = false;
                }
            }
            GateKind::Evidence => {
                evidence_gates += 1;
                if gate.response.as_ref().is_some_and(|r| !r.is_empty()) {
                    evidence_answered = true;
                }
            }
            GateKind::Confirmation | GateKind::Observation => {}
        }
    }

    if !safe {
        Outcome::RiskySuccess
    } else if evidence_gates == 0 || evidence_answered {
        Outcome::CleanSuccess
    } else {
        Outcome::PartialConfirmation
    }
}
