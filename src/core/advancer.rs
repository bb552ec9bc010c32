//! Phase advancer for Waypoint.
//!
//! The advancer is the only code that mutates a unit's progression state.
//! Each transition works on a copy and commits it only on success, so a
//! refused or failed call leaves the unit exactly as it was.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::audit::{build_digest, AuditContext, DigestHasher};
use crate::core::gate::evaluate_with;
use crate::core::model::{Compensation, PhaseKind, StepResponse, Unit, UnitStatus};
use crate::core::outcome::{classify, Outcome};
use crate::core::reward::aggregate;
use crate::error::{Result, WaypointError};

/// Something that happened during a transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// A step was marked complete.
    StepCompleted {
        phase_index: usize,
        step_id: String,
        /// Present only when the unit's rules grade outcomes.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        outcome: Option<Outcome>,
    },
    /// A phase became complete for the first time.
    PhaseCompleted { phase_index: usize, kind: PhaseKind },
    /// The last phase completed. The reward is ready to be credited.
    UnitCompleted {
        final_reward: Compensation,
        audit_digest: Option<String>,
    },
    /// Digest building failed; the unit is completed but unaudited.
    AuditDeferred { reason: String },
    /// A previously deferred digest was built.
    AuditSealed { audit_digest: String },
    /// The review cursor moved.
    ViewMoved { from: usize, to: usize },
}

impl ProgressEvent {
    /// Short snake_case name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            ProgressEvent::StepCompleted { .. } => "step_completed",
            ProgressEvent::PhaseCompleted { .. } => "phase_completed",
            ProgressEvent::UnitCompleted { .. } => "unit_completed",
            ProgressEvent::AuditDeferred { .. } => "audit_deferred",
            ProgressEvent::AuditSealed { .. } => "audit_sealed",
            ProgressEvent::ViewMoved { .. } => "view_moved",
        }
    }
}

/// Result of a transition: the new unit state plus what happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub unit: Unit,
    pub events: Vec<ProgressEvent>,
}

impl Transition {
    /// Whether the transition changed anything.
    pub fn is_noop(&self) -> bool {
        self.events.is_empty()
    }
}

/// Progression state machine over a borrowed unit.
pub struct Advancer<'a> {
    /// The unit being advanced.
    unit: &'a mut Unit,
    /// Hasher for the audit digest.
    hasher: &'a dyn DigestHasher,
    /// Payload options for the audit digest.
    audit: AuditContext,
}

impl<'a> Advancer<'a> {
    /// Create an advancer with the default audit context.
    pub fn new(unit: &'a mut Unit, hasher: &'a dyn DigestHasher) -> Self {
        Self {
            unit,
            hasher,
            audit: AuditContext::default(),
        }
    }

    /// Override the audit payload options.
    pub fn with_audit(mut self, audit: AuditContext) -> Self {
        self.audit = audit;
        self
    }

    /// Current unit status.
    pub fn status(&self) -> UnitStatus {
        self.unit.status
    }

    /// The unit being advanced.
    pub fn unit(&self) -> &Unit {
        &*self.unit
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Transition: complete a step in the current phase.
    ///
    /// Completing an already complete step is a no-op returning no events.
    /// Refusals leave the unit untouched.
    pub fn complete_step(
        &mut self,
        phase_index: usize,
        step_id: &str,
        submission: &StepResponse,
    ) -> Result<Vec<ProgressEvent>> {
        let step_index = self.unit.locate(phase_index, step_id)?;
        if self.unit.phases[phase_index].steps[step_index].is_complete {
            debug!(unit = %self.unit.id, step = step_id, "step already complete");
            return Ok(Vec::new());
        }

        if phase_index != self.unit.current_phase_index {
            debug!(
                unit = %self.unit.id,
                requested = phase_index,
                current = self.unit.current_phase_index,
                "phase locked"
            );
            return Err(WaypointError::phase_locked(
                phase_index,
                self.unit.current_phase_index,
            ));
        }

        let phase = &self.unit.phases[phase_index];
        let step = &phase.steps[step_index];
        if let Some(unknown) = submission.answers.keys().find(|id| step.gate(id).is_none()) {
            return Err(WaypointError::unknown_step(format!(
                "step '{}' has no gate '{}'",
                step_id, unknown
            )));
        }

        let verdict = evaluate_with(phase, step, submission, &self.unit.rules);
        if let Some(refusal) = verdict.into_refusal(step_id) {
            debug!(unit = %self.unit.id, step = step_id, error = %refusal, "step refused");
            return Err(refusal);
        }

        let mut next = self.unit.clone();
        let now = Utc::now();
        let mut events = Vec::new();

        let step = &mut next.phases[phase_index].steps[step_index];
        for gate in &mut step.gates {
            if let Some(answer) = submission.answers.get(&gate.id) {
                if gate.accepts(answer) {
                    gate.response = Some(answer.clone());
                }
            }
        }
        if let Some(evidence) = submission.evidence.as_deref().map(str::trim) {
            if !evidence.is_empty() {
                step.evidence = Some(evidence.to_string());
            }
        }
        step.is_complete = true;
        step.completed_at = Some(now);

        let outcome = next.rules.classify_outcomes.then(|| classify(step));
        if let Some(outcome) = outcome {
            info!(unit = %next.id, step = step_id, outcome = outcome.label(), "step graded");
        }
        events.push(ProgressEvent::StepCompleted {
            phase_index,
            step_id: step_id.to_string(),
            outcome,
        });

        if next.status == UnitStatus::NotStarted {
            next.status = UnitStatus::InProgress;
        }

        let phase = &mut next.phases[phase_index];
        if !phase.is_complete && phase.all_steps_complete() {
            phase.is_complete = true;
            phase.completed_at = Some(now);
            info!(
                unit = %next.id,
                phase = phase_index,
                kind = phase.kind.label(),
                "phase complete"
            );
            events.push(ProgressEvent::PhaseCompleted {
                phase_index,
                kind: phase.kind,
            });

            if phase_index + 1 < next.phases.len() {
                next.current_phase_index = phase_index + 1;
                next.view_index = next.current_phase_index;
            } else {
                self.finish(&mut next, &mut events)?;
            }
        }

        next.version += 1;
        next.updated_at = now;
        *self.unit = next;
        Ok(events)
    }

    /// Transition: move the review cursor to an already reached phase.
    ///
    /// Completion flags and the progress frontier never change.
    pub fn jump_to_phase(&mut self, target: usize) -> Result<Vec<ProgressEvent>> {
        let len = self.unit.phases.len();
        if target > self.unit.current_phase_index || target >= len {
            debug!(unit = %self.unit.id, target, "jump refused");
            return Err(WaypointError::out_of_order(format!(
                "cannot jump to phase {}: unit {} has reached phase {} of {}",
                target,
                self.unit.id,
                self.unit.current_phase_index.min(len.saturating_sub(1)),
                len
            )));
        }

        let from = self.unit.view_index;
        if from == target {
            return Ok(Vec::new());
        }

        self.unit.view_index = target;
        self.unit.version += 1;
        self.unit.touch();
        Ok(vec![ProgressEvent::ViewMoved { from, to: target }])
    }

    /// Transition: build a digest that was deferred at completion.
    ///
    /// The stored reward is never recomputed. Units that already carry a
    /// digest are returned unchanged.
    pub fn retry_digest(&mut self) -> Result<Vec<ProgressEvent>> {
        if !self.unit.is_complete() {
            return Err(WaypointError::not_ready(format!(
                "unit {} is not completed",
                self.unit.id
            )));
        }
        if self.unit.audit_digest.is_some() {
            return Ok(Vec::new());
        }

        let digest = build_digest(&*self.unit, &self.audit, self.hasher)?;
        info!(unit = %self.unit.id, "audit digest sealed");
        self.unit.audit_digest = Some(digest.clone());
        self.unit.version += 1;
        self.unit.touch();
        Ok(vec![ProgressEvent::AuditSealed {
            audit_digest: digest,
        }])
    }

    // =========================================================================
    // Internal helpers
    // =========================================================================

    /// Complete the unit: aggregate once, then try to seal.
    fn finish(&self, next: &mut Unit, events: &mut Vec<ProgressEvent>) -> Result<()> {
        let final_reward = aggregate(next)?;
        next.status = UnitStatus::Completed;
        next.current_phase_index = next.phases.len();
        next.view_index = next.phases.len().saturating_sub(1);
        next.completed_at = Some(Utc::now());
        next.final_reward = Some(final_reward);

        match build_digest(next, &self.audit, self.hasher) {
            Ok(digest) => next.audit_digest = Some(digest),
            Err(e) => {
                warn!(unit = %next.id, error = %e, "audit digest deferred");
                next.audit_digest = None;
                events.push(ProgressEvent::AuditDeferred {
                    reason: e.to_string(),
                });
            }
        }

        info!(
            unit = %next.id,
            currency = final_reward.reward_currency,
            xp = final_reward.reward_xp,
            "unit completed"
        );
        events.push(ProgressEvent::UnitCompleted {
            final_reward,
            audit_digest: next.audit_digest.clone(),
        });
        Ok(())
    }
}
