//! Complete command for Waypoint.
//!
//! Submits answers for a step and reports what the transition did.
//! Answers are given as `gate=value` and parsed against the gate's expected
//! response shape.

use serde::{Deserialize, Serialize};

use crate::cli::status::UnitInfo;
use crate::core::{ProgressEvent, Response, Step, StepResponse, Transition};
use crate::engine::Engine;
use crate::error::{Result, WaypointError};
use crate::storage::UnitStore;

/// Options for the complete command.
#[derive(Debug, Clone, Default)]
pub struct CompleteOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
    /// Phase the step belongs to.
    pub phase: usize,
    /// Step to complete.
    pub step: String,
    /// Raw `gate=value` answers.
    pub answers: Vec<String>,
    /// Evidence reference for the step.
    pub evidence: Option<String>,
    /// Refuse unless the stored unit has this version.
    pub expected_version: Option<u64>,
}

/// Output of a transition command (complete, jump).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionOutput {
    pub success: bool,
    /// The engine refused the request; nothing changed.
    #[serde(default)]
    pub refused: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<UnitInfo>,
    #[serde(default)]
    pub events: Vec<ProgressEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TransitionOutput {
    pub fn success(transition: Transition) -> Self {
        Self {
            success: true,
            refused: false,
            unit: Some(UnitInfo::from_unit(&transition.unit)),
            events: transition.events,
            error: None,
        }
    }

    pub fn failure(error: &WaypointError) -> Self {
        Self {
            success: false,
            refused: error.is_recoverable(),
            unit: None,
            events: Vec::new(),
            error: Some(error.to_string()),
        }
    }

    /// Human-readable text shared by the transition commands.
    pub fn describe(&self, verb: &str) -> String {
        if !self.success {
            let label = if self.refused { "Refused" } else { "Failed" };
            return format!(
                "{}: {}\n",
                label,
                self.error.as_deref().unwrap_or("unknown error")
            );
        }

        let mut lines = Vec::new();
        if self.events.is_empty() {
            lines.push(format!("Nothing to {} (already done).", verb));
        }
        for event in &self.events {
            lines.push(describe_event(event));
        }
        if let Some(unit) = &self.unit {
            lines.push(format!(
                "{}: {} | {} | version {}",
                unit.id,
                unit.status,
                unit.progress_line(),
                unit.version
            ));
        }

        let mut text = lines.join("\n");
        text.push('\n');
        text
    }
}

fn describe_event(event: &ProgressEvent) -> String {
    match event {
        ProgressEvent::StepCompleted {
            phase_index,
            step_id,
            outcome,
        } => match outcome {
            Some(outcome) => format!(
                "Step {} completed in phase {} [{}]",
                step_id,
                phase_index,
                outcome.label()
            ),
            None => format!("Step {} completed in phase {}", step_id, phase_index),
        },
        ProgressEvent::PhaseCompleted { phase_index, kind } => {
            format!("Phase {} ({}) complete", phase_index, kind.label())
        }
        ProgressEvent::UnitCompleted {
            final_reward,
            audit_digest,
        } => format!(
            "Unit complete: {} currency, {} xp{}",
            final_reward.reward_currency,
            final_reward.reward_xp,
            audit_digest
                .as_deref()
                .map(|d| format!(" | audit {}", d))
                .unwrap_or_default()
        ),
        ProgressEvent::AuditDeferred { reason } => {
            format!("Audit deferred: {} (run `waypoint audit` to retry)", reason)
        }
        ProgressEvent::AuditSealed { audit_digest } => format!("Audit sealed: {}", audit_digest),
        ProgressEvent::ViewMoved { from, to } => format!("Viewing phase {} (was {})", to, from),
    }
}

/// Build a submission from raw `gate=value` answers for `step`.
pub fn parse_answers(step: &Step, raw: &[String], evidence: Option<&str>) -> Result<StepResponse> {
    let mut response = StepResponse::new();
    for item in raw {
        let (gate_id, value) = item.split_once('=').ok_or_else(|| {
            WaypointError::invalid_answer(format!("answer '{}' is not in gate=value form", item))
        })?;
        let gate_id = gate_id.trim();
        let gate = step.gate(gate_id).ok_or_else(|| {
            WaypointError::unknown_step(format!(
                "step '{}' has no gate '{}'",
                step.id, gate_id
            ))
        })?;
        response = response.answer(gate_id, Response::parse_for(gate.expects, value)?);
    }
    if let Some(evidence) = evidence {
        response = response.with_evidence(evidence);
    }
    Ok(response)
}

/// The complete command implementation.
pub struct CompleteCommand<S: UnitStore> {
    engine: Engine<S>,
}

impl<S: UnitStore> CompleteCommand<S> {
    pub fn new(engine: Engine<S>) -> Self {
        Self { engine }
    }

    /// Run the complete command.
    pub fn run(&self, unit_id: &str, options: &CompleteOptions) -> TransitionOutput {
        match self.submit(unit_id, options) {
            Ok(transition) => TransitionOutput::success(transition),
            Err(e) => TransitionOutput::failure(&e),
        }
    }

    fn submit(&self, unit_id: &str, options: &CompleteOptions) -> Result<Transition> {
        let unit = self.engine.get_snapshot(unit_id)?;
        let step_index = unit.locate(options.phase, &options.step)?;
        let step = &unit.phases[options.phase].steps[step_index];
        let response = parse_answers(step, &options.answers, options.evidence.as_deref())?;

        self.engine.complete_step(
            unit_id,
            options.phase,
            &options.step,
            &response,
            options.expected_version,
        )
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &TransitionOutput, options: &CompleteOptions) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string())
        } else {
            output.describe("complete")
        }
    }
}
