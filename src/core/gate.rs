//! Gate evaluation for Waypoint.
//!
//! Decides whether a step may be marked complete. Evaluation is a pure
//! function of the current state: a refusal is returned as a verdict
//! describing what is missing, never raised as a side effect.

use crate::core::model::{
    Phase, ProgressionRules, Response, Step, StepOrdering, StepResponse, Unit,
};
use crate::error::WaypointError;

/// Result of evaluating a step against its gates and ordering rules.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GateVerdict {
    /// Required gates without an acceptable response, in declaration order.
    pub missing_gates: Vec<String>,
    /// Earlier steps that must complete first (strict ordering only).
    pub blocking_steps: Vec<String>,
}

impl GateVerdict {
    /// Whether the step may be completed.
    pub fn passed(&self) -> bool {
        self.missing_gates.is_empty() && self.blocking_steps.is_empty()
    }

    /// Convert a refusal into the error the caller re-prompts on.
    ///
    /// Ordering refusals take precedence over gate refusals.
    pub fn into_refusal(self, step_id: &str) -> Option<WaypointError> {
        if !self.blocking_steps.is_empty() {
            return Some(WaypointError::out_of_order(format!(
                "step '{}' must wait for: {}",
                step_id,
                self.blocking_steps.join(", ")
            )));
        }
        if !self.missing_gates.is_empty() {
            return Some(WaypointError::gate_not_satisfied(
                step_id,
                self.missing_gates,
            ));
        }
        None
    }
}

/// Evaluate a step using only its captured responses.
pub fn evaluate(phase: &Phase, step: &Step, rules: &ProgressionRules) -> GateVerdict {
    evaluate_with(phase, step, &StepResponse::default(), rules)
}

/// Evaluate a step as if `submission` had been captured.
///
/// Submitted answers take precedence over previously captured ones. Neither
/// the step nor the submission is modified.
pub fn evaluate_with(
    phase: &Phase,
    step: &Step,
    submission: &StepResponse,
    rules: &ProgressionRules,
) -> GateVerdict {
    let missing_gates = step
        .gates
        .iter()
        .filter(|gate| gate.required)
        .filter(|gate| {
            let effective: Option<&Response> =
                submission.answers.get(&gate.id).or(gate.response.as_ref());
            !effective.is_some_and(|r| gate.accepts(r))
        })
        .map(|gate| gate.id.clone())
        .collect();

    let blocking_steps = match rules.step_ordering {
        StepOrdering::Strict => phase
            .steps
            .iter()
            .filter(|other| other.order < step.order && !other.is_complete)
            .map(|other| other.id.clone())
            .collect(),
        StepOrdering::Any => Vec::new(),
    };

    GateVerdict {
        missing_gates,
        blocking_steps,
    }
}

/// Whether `step` may be completed given the unit's current state.
///
/// Returns false for steps that do not belong to the unit.
pub fn can_complete(step: &Step, unit: &Unit) -> bool {
    unit.phases
        .iter()
        .find(|phase| phase.steps.iter().any(|s| s.id == step.id))
        .is_some_and(|phase| evaluate(phase, step, &unit.rules).passed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{Compensation, Gate, GateKind, PhaseKind, ResponseShape};

    fn strict() -> ProgressionRules {
        ProgressionRules {
            step_ordering: StepOrdering::Strict,
            classify_outcomes: true,
        }
    }

    fn any_order() -> ProgressionRules {
        ProgressionRules::default()
    }

    fn confirm_gate() -> Gate {
        Gate::new("confirm", GateKind::Confirmation, ResponseShape::Boolean)
            .with_prompt("Did you find it?")
    }

    fn two_step_phase() -> Phase {
        Phase::new(PhaseKind::Recon, "Recon", Compensation::new(1, 1))
            .with_step(Step::new("first", "Go there", 1).with_gate(confirm_gate()))
            .with_step(Step::new("second", "Look around", 2))
    }

    #[test]
    fn test_step_without_gates_passes() {
        let phase = two_step_phase();
        let verdict = evaluate(&phase, &phase.steps[1], &any_order());
        assert!(verdict.passed());
    }

    #[test]
    fn test_required_gate_without_response_is_missing() {
        let phase = two_step_phase();
        let verdict = evaluate(&phase, &phase.steps[0], &any_order());
        assert!(!verdict.passed());
        assert_eq!(verdict.missing_gates, vec!["confirm"]);
    }

    #[test]
    fn test_captured_response_satisfies_gate() {
        let mut phase = two_step_phase();
        phase.steps[0].gates[0].response = Some(Response::Boolean(true));
        assert!(evaluate(&phase, &phase.steps[0], &any_order()).passed());
    }

    #[test]
    fn test_false_is_still_an_answer() {
        let phase = two_step_phase();
        let submission = StepResponse::new().answer("confirm", Response::Boolean(false));
        assert!(evaluate_with(&phase, &phase.steps[0], &submission, &any_order()).passed());
    }

    #[test]
    fn test_submission_satisfies_gate_without_mutation() {
        let phase = two_step_phase();
        let submission = StepResponse::new().answer("confirm", Response::Boolean(true));
        let verdict = evaluate_with(&phase, &phase.steps[0], &submission, &any_order());
        assert!(verdict.passed());
        assert!(phase.steps[0].gates[0].response.is_none());
    }

    #[test]
    fn test_wrong_shape_does_not_satisfy() {
        let phase = two_step_phase();
        let submission = StepResponse::new().answer("confirm", Response::Text("yes".into()));
        let verdict = evaluate_with(&phase, &phase.steps[0], &submission, &any_order());
        assert_eq!(verdict.missing_gates, vec!["confirm"]);
    }

    #[test]
    fn test_empty_text_does_not_satisfy() {
        let phase = Phase::new(PhaseKind::Execution, "Exec", Compensation::default()).with_step(
            Step::new("note", "Describe", 1).with_gate(Gate::new(
                "obs",
                GateKind::Observation,
                ResponseShape::Text,
            )),
        );
        let submission = StepResponse::new().answer("obs", Response::Text("  ".into()));
        assert!(!evaluate_with(&phase, &phase.steps[0], &submission, &any_order()).passed());
    }

    #[test]
    fn test_optional_gate_is_ignored() {
        let phase = Phase::new(PhaseKind::Execution, "Exec", Compensation::default()).with_step(
            Step::new("s", "Do", 1).with_gate(
                Gate::new("photo", GateKind::Evidence, ResponseShape::Photo).optional(),
            ),
        );
        assert!(evaluate(&phase, &phase.steps[0], &any_order()).passed());
    }

    #[test]
    fn test_strict_order_blocks_later_step() {
        let phase = two_step_phase();
        let verdict = evaluate(&phase, &phase.steps[1], &strict());
        assert_eq!(verdict.blocking_steps, vec!["first"]);
        assert!(matches!(
            verdict.into_refusal("second"),
            Some(WaypointError::OutOfOrder { .. })
        ));
    }

    #[test]
    fn test_any_order_allows_later_step() {
        let phase = two_step_phase();
        assert!(evaluate(&phase, &phase.steps[1], &any_order()).passed());
    }

    #[test]
    fn test_strict_order_passes_once_predecessor_completes() {
        let mut phase = two_step_phase();
        phase.steps[0].is_complete = true;
        assert!(evaluate(&phase, &phase.steps[1], &strict()).passed());
    }

    #[test]
    fn test_equal_order_does_not_block() {
        let phase = Phase::new(PhaseKind::Recon, "Recon", Compensation::default())
            .with_step(Step::new("a", "A", 1))
            .with_step(Step::new("b", "B", 1));
        assert!(evaluate(&phase, &phase.steps[1], &strict()).passed());
    }

    #[test]
    fn test_order_refusal_precedes_gate_refusal() {
        let verdict = GateVerdict {
            missing_gates: vec!["g".into()],
            blocking_steps: vec!["a".into()],
        };
        assert!(matches!(
            verdict.into_refusal("b"),
            Some(WaypointError::OutOfOrder { .. })
        ));
    }

    #[test]
    fn test_gate_refusal_lists_missing() {
        let verdict = GateVerdict {
            missing_gates: vec!["g1".into(), "g2".into()],
            blocking_steps: vec![],
        };
        match verdict.into_refusal("s") {
            Some(WaypointError::GateNotSatisfied { step_id, missing }) => {
                assert_eq!(step_id, "s");
                assert_eq!(missing, vec!["g1", "g2"]);
            }
            other => panic!("unexpected refusal: {:?}", other),
        }
    }

    #[test]
    fn test_passed_verdict_has_no_refusal() {
        assert!(GateVerdict::default().into_refusal("s").is_none());
    }

    #[test]
    fn test_can_complete_uses_unit_rules() {
        let unit = crate::core::template::Template::mission()
            .start_unit("m", "t")
            .with_phase(two_step_phase());
        assert!(!can_complete(&unit.phases[0].steps[0], &unit));
        assert!(!can_complete(&unit.phases[0].steps[1], &unit));

        let stranger = Step::new("stranger", "Not here", 1);
        assert!(!can_complete(&stranger, &unit));
    }
}
