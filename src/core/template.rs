//! Unit templates and structural validation.
//!
//! Missions and directives differ only in data: the phase-kind sequence,
//! the intra-phase ordering policy and whether outcomes are graded. Both are
//! driven by the same advancer.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::config::LimitsConfig;
use crate::core::model::{
    Compensation, PhaseKind, ProgressionRules, StepOrdering, Unit, UnitStatus, Variant,
};
use crate::error::{Result, WaypointError};

/// Progression template shared by every unit of a variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    /// The variant this template describes.
    pub variant: Variant,
    /// Required phase-kind sequence.
    pub phase_kinds: Vec<PhaseKind>,
    /// Intra-phase ordering policy.
    pub step_ordering: StepOrdering,
    /// Whether completed steps are graded.
    pub classify_outcomes: bool,
}

impl Template {
    /// RECON then OPERATION, strict step order, graded outcomes.
    pub fn mission() -> Self {
        Self {
            variant: Variant::Mission,
            phase_kinds: vec![PhaseKind::Recon, PhaseKind::Operation],
            step_ordering: StepOrdering::Strict,
            classify_outcomes: true,
        }
    }

    /// RECON, EXECUTION, VERIFICATION, COMPLETION; any step order.
    pub fn directive() -> Self {
        Self {
            variant: Variant::Directive,
            phase_kinds: vec![
                PhaseKind::Recon,
                PhaseKind::Execution,
                PhaseKind::Verification,
                PhaseKind::Completion,
            ],
            step_ordering: StepOrdering::Any,
            classify_outcomes: false,
        }
    }

    /// Built-in template for a variant.
    pub fn for_variant(variant: Variant) -> Self {
        match variant {
            Variant::Mission => Self::mission(),
            Variant::Directive => Self::directive(),
        }
    }

    /// The rules a unit built from this template progresses under.
    pub fn rules(&self) -> ProgressionRules {
        ProgressionRules {
            step_ordering: self.step_ordering,
            classify_outcomes: self.classify_outcomes,
        }
    }

    /// Start an empty unit of this template.
    pub fn start_unit(&self, id: impl Into<String>, title: impl Into<String>) -> Unit {
        Unit::new(id, title, self.variant, self.rules())
    }

    /// Structurally validate a freshly generated unit.
    ///
    /// Checks shape only; generated text is never inspected.
    pub fn validate(&self, unit: &Unit, limits: &LimitsConfig) -> Result<()> {
        Unit::check_id(&unit.id)?;
        if unit.variant != self.variant {
            return Err(WaypointError::invalid_unit(format!(
                "unit {} is a {} but the template is for {}",
                unit.id,
                unit.variant.as_str(),
                self.variant.as_str()
            )));
        }
        if unit.phases.is_empty() {
            return Err(WaypointError::invalid_unit(format!(
                "unit {} has no phases",
                unit.id
            )));
        }
        if unit.phases.len() > limits.max_phases as usize {
            return Err(WaypointError::invalid_unit(format!(
                "unit {} has {} phases (limit {})",
                unit.id,
                unit.phases.len(),
                limits.max_phases
            )));
        }

        let kinds: Vec<PhaseKind> = unit.phases.iter().map(|p| p.kind).collect();
        if kinds != self.phase_kinds {
            let labels: Vec<&str> = kinds.iter().map(PhaseKind::label).collect();
            let expected: Vec<&str> = self.phase_kinds.iter().map(PhaseKind::label).collect();
            return Err(WaypointError::invalid_unit(format!(
                "unit {} has phases [{}], expected [{}]",
                unit.id,
                labels.join(", "),
                expected.join(", ")
            )));
        }

        let mut step_ids = HashSet::new();
        for (index, phase) in unit.phases.iter().enumerate() {
            if phase.steps.is_empty() {
                return Err(WaypointError::invalid_unit(format!(
                    "phase {} ({}) has no steps",
                    index,
                    phase.kind.label()
                )));
            }
            if phase.steps.len() > limits.max_steps_per_phase as usize {
                return Err(WaypointError::invalid_unit(format!(
                    "phase {} has {} steps (limit {})",
                    index,
                    phase.steps.len(),
                    limits.max_steps_per_phase
                )));
            }

            for step in &phase.steps {
                if step.id.trim().is_empty() {
                    return Err(WaypointError::invalid_unit(format!(
                        "phase {} has a step with an empty id",
                        index
                    )));
                }
                if !step_ids.insert(step.id.as_str()) {
                    return Err(WaypointError::invalid_unit(format!(
                        "duplicate step id '{}'",
                        step.id
                    )));
                }
                if step.gates.len() > limits.max_gates_per_step as usize {
                    return Err(WaypointError::invalid_unit(format!(
                        "step '{}' has {} gates (limit {})",
                        step.id,
                        step.gates.len(),
                        limits.max_gates_per_step
                    )));
                }
                let mut gate_ids = HashSet::new();
                for gate in &step.gates {
                    if !gate_ids.insert(gate.id.as_str()) {
                        return Err(WaypointError::invalid_unit(format!(
                            "step '{}' has duplicate gate id '{}'",
                            step.id, gate.id
                        )));
                    }
                    if gate.response.is_some() {
                        return Err(WaypointError::invalid_unit(format!(
                            "gate '{}' on step '{}' arrived pre-answered",
                            gate.id, step.id
                        )));
                    }
                }
                if step.is_complete {
                    return Err(WaypointError::invalid_unit(format!(
                        "step '{}' arrived already complete",
                        step.id
                    )));
                }
            }

            if phase.is_complete || phase.completed_at.is_some() {
                return Err(WaypointError::invalid_unit(format!(
                    "phase {} arrived already complete",
                    index
                )));
            }
        }

        // The reward total must fit, or the final step could never complete.
        let total = unit
            .phases
            .iter()
            .try_fold(Compensation::default(), |total, phase| {
                total.checked_add(phase.compensation)
            });
        if total.is_none() {
            return Err(WaypointError::invalid_unit(format!(
                "reward total for unit {} overflows",
                unit.id
            )));
        }

        if unit.status != UnitStatus::NotStarted
            || unit.current_phase_index != 0
            || unit.view_index != 0
            || unit.final_reward.is_some()
            || unit.audit_digest.is_some()
            || unit.completed_at.is_some()
        {
            return Err(WaypointError::invalid_unit(format!(
                "unit {} is not in its initial state",
                unit.id
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{Gate, GateKind, Phase, ResponseShape, Response, Step};

    fn limits() -> LimitsConfig {
        LimitsConfig::default()
    }

    fn mission_unit() -> Unit {
        Template::mission()
            .start_unit("m-1", "Streetlight out")
            .with_phase(
                Phase::new(PhaseKind::Recon, "Recon", Compensation::new(5, 10))
                    .with_step(Step::new("a-1", "Locate", 1))
                    .with_step(Step::new("a-2", "Photograph", 2)),
            )
            .with_phase(
                Phase::new(PhaseKind::Operation, "Operation", Compensation::new(15, 30))
                    .with_step(Step::new("a-3", "Report", 1)),
            )
    }

    #[test]
    fn test_builtin_templates() {
        let mission = Template::mission();
        assert_eq!(mission.phase_kinds.len(), 2);
        assert_eq!(mission.step_ordering, StepOrdering::Strict);
        assert!(mission.classify_outcomes);

        let directive = Template::directive();
        assert_eq!(directive.phase_kinds.len(), 4);
        assert_eq!(directive.step_ordering, StepOrdering::Any);
        assert!(!directive.classify_outcomes);
    }

    #[test]
    fn test_for_variant() {
        assert_eq!(Template::for_variant(Variant::Mission), Template::mission());
        assert_eq!(
            Template::for_variant(Variant::Directive),
            Template::directive()
        );
    }

    #[test]
    fn test_start_unit_carries_rules() {
        let unit = Template::mission().start_unit("m", "t");
        assert_eq!(unit.variant, Variant::Mission);
        assert_eq!(unit.rules.step_ordering, StepOrdering::Strict);
        assert!(unit.rules.classify_outcomes);
    }

    #[test]
    fn test_validate_accepts_well_formed_unit() {
        Template::mission()
            .validate(&mission_unit(), &limits())
            .unwrap();
    }

    #[test]
    fn test_validate_rejects_empty_phase_list() {
        let unit = Template::mission().start_unit("m", "t");
        let err = Template::mission().validate(&unit, &limits()).unwrap_err();
        assert!(err.to_string().contains("no phases"));
    }

    #[test]
    fn test_validate_rejects_empty_phase() {
        let mut unit = mission_unit();
        unit.phases[1].steps.clear();
        let err = Template::mission().validate(&unit, &limits()).unwrap_err();
        assert!(err.to_string().contains("has no steps"));
    }

    #[test]
    fn test_validate_rejects_wrong_phase_sequence() {
        let mut unit = mission_unit();
        unit.phases[1].kind = PhaseKind::Execution;
        let err = Template::mission().validate(&unit, &limits()).unwrap_err();
        assert!(err.to_string().contains("expected [RECON, OPERATION]"));
    }

    #[test]
    fn test_validate_rejects_variant_mismatch() {
        let unit = mission_unit();
        assert!(Template::directive().validate(&unit, &limits()).is_err());
    }

    #[test]
    fn test_validate_rejects_duplicate_step_ids() {
        let mut unit = mission_unit();
        unit.phases[1].steps[0].id = "a-1".to_string();
        let err = Template::mission().validate(&unit, &limits()).unwrap_err();
        assert!(err.to_string().contains("duplicate step id"));
    }

    #[test]
    fn test_validate_rejects_duplicate_gate_ids() {
        let mut unit = mission_unit();
        let gate = Gate::new("g", GateKind::Confirmation, ResponseShape::Boolean);
        unit.phases[0].steps[0].gates = vec![gate.clone(), gate];
        assert!(Template::mission().validate(&unit, &limits()).is_err());
    }

    #[test]
    fn test_validate_rejects_pre_answered_gate() {
        let mut unit = mission_unit();
        let mut gate = Gate::new("g", GateKind::Confirmation, ResponseShape::Boolean);
        gate.response = Some(Response::Boolean(true));
        unit.phases[0].steps[0].gates.push(gate);
        assert!(Template::mission().validate(&unit, &limits()).is_err());
    }

    #[test]
    fn test_validate_rejects_reward_overflow() {
        let mut unit = mission_unit();
        unit.phases[0].compensation = Compensation::new(u64::MAX, 0);
        unit.phases[1].compensation = Compensation::new(1, 0);
        let err = Template::mission().validate(&unit, &limits()).unwrap_err();
        assert!(matches!(err, WaypointError::InvalidUnit { .. }));
        assert!(err.to_string().contains("overflows"));

        unit.phases[1].compensation = Compensation::new(0, 0);
        Template::mission().validate(&unit, &limits()).unwrap();
    }

    #[test]
    fn test_validate_rejects_path_like_id() {
        let mut unit = mission_unit();
        unit.id = "../escaped".to_string();
        let err = Template::mission().validate(&unit, &limits()).unwrap_err();
        assert!(err.to_string().contains("not a plain name"));
    }

    #[test]
    fn test_validate_rejects_started_unit() {
        let mut unit = mission_unit();
        unit.status = UnitStatus::InProgress;
        assert!(Template::mission().validate(&unit, &limits()).is_err());
    }

    #[test]
    fn test_validate_enforces_limits() {
        let unit = mission_unit();
        let tight = LimitsConfig {
            max_steps_per_phase: 1,
            ..LimitsConfig::default()
        };
        let err = Template::mission().validate(&unit, &tight).unwrap_err();
        assert!(err.to_string().contains("limit 1"));
    }
}
