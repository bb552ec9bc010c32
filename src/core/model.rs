//! Progression model types for Waypoint.
//!
//! A unit (mission or directive) is an ordered list of phases, each phase an
//! ordered list of steps, each step guarded by gates. The engine never
//! invents phases or steps; it only transitions a unit it was handed.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, WaypointError};

/// Which progression shape a unit was generated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    /// Two-phase RECON/OPERATION unit built from fixed actions.
    Mission,
    /// Four-phase RECON/EXECUTION/VERIFICATION/COMPLETION unit.
    #[default]
    Directive,
}

impl Variant {
    /// Lowercase name used in payloads and CLI output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Mission => "mission",
            Variant::Directive => "directive",
        }
    }
}

/// Overall unit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    /// No step has been completed yet.
    #[default]
    NotStarted,
    /// At least one step completed, at least one phase outstanding.
    InProgress,
    /// Every phase complete. Terminal.
    Completed,
}

impl UnitStatus {
    /// Check if the status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, UnitStatus::Completed)
    }

    /// snake_case name, as serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitStatus::NotStarted => "not_started",
            UnitStatus::InProgress => "in_progress",
            UnitStatus::Completed => "completed",
        }
    }
}

/// Stage tag for a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    Recon,
    Operation,
    Execution,
    Verification,
    Completion,
}

impl PhaseKind {
    /// Uppercase label as shown to users.
    pub fn label(&self) -> &'static str {
        match self {
            PhaseKind::Recon => "RECON",
            PhaseKind::Operation => "OPERATION",
            PhaseKind::Execution => "EXECUTION",
            PhaseKind::Verification => "VERIFICATION",
            PhaseKind::Completion => "COMPLETION",
        }
    }
}

/// What a gate asks of the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateKind {
    /// "I did it" acknowledgement.
    Confirmation,
    /// Captured media or artifact backing the claim.
    Evidence,
    /// Free-form note about what was seen.
    Observation,
    /// Safety checklist item; anything other than `true` is a risk signal.
    Safety,
}

/// The response shape a gate expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseShape {
    Boolean,
    Text,
    Photo,
    Video,
    MultiSelect,
}

/// A captured gate response, tagged by shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "shape", content = "value", rename_all = "snake_case")]
pub enum Response {
    Boolean(bool),
    Text(String),
    /// Reference to captured photo media (URI, content id), never raw bytes.
    Photo(String),
    /// Reference to captured video media.
    Video(String),
    MultiSelect(Vec<String>),
}

impl Response {
    /// The shape of this response.
    pub fn shape(&self) -> ResponseShape {
        match self {
            Response::Boolean(_) => ResponseShape::Boolean,
            Response::Text(_) => ResponseShape::Text,
            Response::Photo(_) => ResponseShape::Photo,
            Response::Video(_) => ResponseShape::Video,
            Response::MultiSelect(_) => ResponseShape::MultiSelect,
        }
    }

    /// Whether the response carries no usable content.
    ///
    /// A boolean is never empty: `false` is an answer.
    pub fn is_empty(&self) -> bool {
        match self {
            Response::Boolean(_) => false,
            Response::Text(value) | Response::Photo(value) | Response::Video(value) => {
                value.trim().is_empty()
            }
            Response::MultiSelect(values) => values.iter().all(|v| v.trim().is_empty()),
        }
    }

    /// Whether this is `Boolean(true)`.
    pub fn is_affirmative(&self) -> bool {
        matches!(self, Response::Boolean(true))
    }

    /// Parse raw user input into a response of the given shape.
    pub fn parse_for(shape: ResponseShape, raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        match shape {
            ResponseShape::Boolean => match trimmed.to_lowercase().as_str() {
                "true" | "yes" | "y" | "1" => Ok(Response::Boolean(true)),
                "false" | "no" | "n" | "0" => Ok(Response::Boolean(false)),
                _ => Err(WaypointError::invalid_answer(format!(
                    "expected a yes/no answer, got '{}'",
                    raw
                ))),
            },
            ResponseShape::Text => Ok(Response::Text(trimmed.to_string())),
            ResponseShape::Photo => Ok(Response::Photo(trimmed.to_string())),
            ResponseShape::Video => Ok(Response::Video(trimmed.to_string())),
            ResponseShape::MultiSelect => Ok(Response::MultiSelect(
                trimmed
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect(),
            )),
        }
    }
}

/// Answers submitted with a step completion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StepResponse {
    /// Gate id to response.
    #[serde(default)]
    pub answers: BTreeMap<String, Response>,
    /// Evidence reference captured for the step.
    #[serde(default)]
    pub evidence: Option<String>,
}

impl StepResponse {
    /// An empty submission.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an answer for a gate.
    pub fn answer(mut self, gate_id: impl Into<String>, response: Response) -> Self {
        self.answers.insert(gate_id.into(), response);
        self
    }

    /// Attach an evidence reference.
    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence = Some(evidence.into());
        self
    }
}

/// Reward contribution of a phase, or the summed reward of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Compensation {
    /// In-app currency.
    pub reward_currency: u64,
    /// Experience points.
    pub reward_xp: u64,
}

impl Compensation {
    /// Create a compensation.
    pub fn new(reward_currency: u64, reward_xp: u64) -> Self {
        Self {
            reward_currency,
            reward_xp,
        }
    }

    /// Add two compensations, returning `None` on overflow.
    pub fn checked_add(self, other: Compensation) -> Option<Compensation> {
        Some(Compensation {
            reward_currency: self.reward_currency.checked_add(other.reward_currency)?,
            reward_xp: self.reward_xp.checked_add(other.reward_xp)?,
        })
    }
}

/// A single requirement attached to a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gate {
    /// Identifier, unique within its step.
    pub id: String,
    /// What kind of requirement this is.
    pub kind: GateKind,
    /// Question shown to the user.
    #[serde(default)]
    pub prompt: String,
    /// Whether the step may complete without this gate.
    #[serde(default = "default_required")]
    pub required: bool,
    /// The response shape this gate accepts.
    pub expects: ResponseShape,
    /// Allowed choices for multi-select gates. Empty means unrestricted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    /// Captured response, absent until satisfied.
    #[serde(default)]
    pub response: Option<Response>,
}

fn default_required() -> bool {
    true
}

impl Gate {
    /// Create a required gate with no captured response.
    pub fn new(id: impl Into<String>, kind: GateKind, expects: ResponseShape) -> Self {
        Self {
            id: id.into(),
            kind,
            prompt: String::new(),
            required: true,
            expects,
            options: Vec::new(),
            response: None,
        }
    }

    /// Mark the gate optional.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Set the prompt text.
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// Restrict multi-select answers to these options.
    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    /// Whether `response` would satisfy this gate.
    ///
    /// The shape must match, the value must be non-empty, and multi-select
    /// answers must come from `options` when options are declared.
    pub fn accepts(&self, response: &Response) -> bool {
        if response.shape() != self.expects || response.is_empty() {
            return false;
        }
        match response {
            Response::MultiSelect(values) if !self.options.is_empty() => values
                .iter()
                .filter(|v| !v.trim().is_empty())
                .all(|v| self.options.iter().any(|o| o == v.trim())),
            _ => true,
        }
    }

    /// Whether the captured response satisfies the gate.
    pub fn is_satisfied(&self) -> bool {
        self.response.as_ref().is_some_and(|r| self.accepts(r))
    }
}

/// A unit of work within a phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// Identifier, unique within the unit.
    pub id: String,
    /// Display text.
    #[serde(default)]
    pub text: String,
    /// Declared sequence within the phase (used under strict ordering).
    #[serde(default)]
    pub order: u32,
    /// Requirements attached to this step.
    #[serde(default)]
    pub gates: Vec<Gate>,
    /// Whether the step is complete.
    #[serde(default)]
    pub is_complete: bool,
    /// Reference to captured evidence, if any.
    #[serde(default)]
    pub evidence: Option<String>,
    /// When the step was completed.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Step {
    /// Create an incomplete step with no gates.
    pub fn new(id: impl Into<String>, text: impl Into<String>, order: u32) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            order,
            gates: Vec::new(),
            is_complete: false,
            evidence: None,
            completed_at: None,
        }
    }

    /// Attach a gate.
    pub fn with_gate(mut self, gate: Gate) -> Self {
        self.gates.push(gate);
        self
    }

    /// Find a gate by id.
    pub fn gate(&self, id: &str) -> Option<&Gate> {
        self.gates.iter().find(|g| g.id == id)
    }

    /// Whether any evidence was captured, on the step or through an evidence gate.
    pub fn has_evidence(&self) -> bool {
        let step_ref = self
            .evidence
            .as_deref()
            .is_some_and(|e| !e.trim().is_empty());
        step_ref
            || self
                .gates
                .iter()
                .any(|g| g.kind == GateKind::Evidence && g.is_satisfied())
    }
}

/// A named stage of a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
    /// Stage tag.
    pub kind: PhaseKind,
    /// Display title.
    #[serde(default)]
    pub title: String,
    /// Ordered steps.
    #[serde(default)]
    pub steps: Vec<Step>,
    /// True iff every step is complete.
    #[serde(default)]
    pub is_complete: bool,
    /// When the phase completed. Set once.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Reward contribution, frozen at creation.
    #[serde(default)]
    pub compensation: Compensation,
}

impl Phase {
    /// Create an empty phase.
    pub fn new(kind: PhaseKind, title: impl Into<String>, compensation: Compensation) -> Self {
        Self {
            kind,
            title: title.into(),
            steps: Vec::new(),
            is_complete: false,
            completed_at: None,
            compensation,
        }
    }

    /// Append a step.
    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Whether every step in the phase is complete.
    pub fn all_steps_complete(&self) -> bool {
        self.steps.iter().all(|s| s.is_complete)
    }

    /// Find a step by id.
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }
}

/// Descriptor the content generator produced the unit from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct UnitContext {
    /// Report category (pothole, graffiti, ...).
    #[serde(default)]
    pub category: String,
    /// Declared location.
    #[serde(default)]
    pub location: Option<String>,
    /// Approach the user picked when the unit was generated.
    #[serde(default)]
    pub approach: Option<String>,
}

/// Intra-phase ordering policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepOrdering {
    /// Steps complete in ascending `order`.
    Strict,
    /// Steps within the current phase complete in any order.
    #[default]
    Any,
}

/// Rules a unit progresses under, copied from its template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProgressionRules {
    /// Intra-phase ordering policy.
    pub step_ordering: StepOrdering,
    /// Whether completed steps are graded by the outcome classifier.
    pub classify_outcomes: bool,
}

/// Aggregate progress counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub steps_completed: usize,
    pub steps_total: usize,
    pub phases_completed: usize,
    pub phases_total: usize,
}

/// One progression instance (a mission or a directive).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    /// Unique unit identifier.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Template variant.
    pub variant: Variant,
    /// Progression rules from the template.
    pub rules: ProgressionRules,
    /// Generation descriptor.
    pub context: UnitContext,
    /// Ordered phases.
    pub phases: Vec<Phase>,
    /// Progress frontier. Equals `phases.len()` once completed.
    pub current_phase_index: usize,
    /// Review cursor, moved by `jump_to_phase`. Never ahead of the frontier.
    pub view_index: usize,
    /// Overall status.
    pub status: UnitStatus,
    /// Summed reward, present only once completed.
    pub final_reward: Option<Compensation>,
    /// Lowercase hex audit digest, present only once completed and hashed.
    pub audit_digest: Option<String>,
    /// When the last phase completed. Set once.
    pub completed_at: Option<DateTime<Utc>>,
    /// When the unit was created.
    pub created_at: DateTime<Utc>,
    /// When the unit last changed.
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency counter, incremented by every mutation.
    pub version: u64,
}

impl Unit {
    /// Create an empty, not-started unit.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        variant: Variant,
        rules: ProgressionRules,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            variant,
            rules,
            context: UnitContext::default(),
            phases: Vec::new(),
            current_phase_index: 0,
            view_index: 0,
            status: UnitStatus::NotStarted,
            final_reward: None,
            audit_digest: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Check that `id` is usable as a unit id.
    ///
    /// Ids name storage files, so they must be a single plain path component.
    pub fn check_id(id: &str) -> Result<()> {
        if id.trim().is_empty() {
            return Err(WaypointError::invalid_unit("unit id is empty"));
        }
        if id.starts_with('.')
            || id.contains("..")
            || id.chars().any(|c| matches!(c, '/' | '\\' | ':' | '\0'))
        {
            return Err(WaypointError::invalid_unit(format!(
                "unit id '{}' is not a plain name",
                id.escape_default()
            )));
        }
        Ok(())
    }

    /// Set the generation context.
    pub fn with_context(mut self, context: UnitContext) -> Self {
        self.context = context;
        self
    }

    /// Append a phase.
    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phases.push(phase);
        self
    }

    /// Whether the unit is completed.
    pub fn is_complete(&self) -> bool {
        self.status.is_terminal()
    }

    /// The phase at the progress frontier, if not completed.
    pub fn current_phase(&self) -> Option<&Phase> {
        self.phases.get(self.current_phase_index)
    }

    /// Find a step, returning its index within the phase.
    pub fn locate(&self, phase_index: usize, step_id: &str) -> Result<usize> {
        let phase = self.phases.get(phase_index).ok_or_else(|| {
            WaypointError::unknown_step(format!(
                "unit {} has no phase {} ({} phases)",
                self.id,
                phase_index,
                self.phases.len()
            ))
        })?;
        phase
            .steps
            .iter()
            .position(|s| s.id == step_id)
            .ok_or_else(|| {
                WaypointError::unknown_step(format!(
                    "phase {} of unit {} has no step '{}'",
                    phase_index, self.id, step_id
                ))
            })
    }

    /// Count completed steps and phases.
    pub fn progress(&self) -> Progress {
        Progress {
            steps_completed: self
                .phases
                .iter()
                .flat_map(|p| &p.steps)
                .filter(|s| s.is_complete)
                .count(),
            steps_total: self.phases.iter().map(|p| p.steps.len()).sum(),
            phases_completed: self.phases.iter().filter(|p| p.is_complete).count(),
            phases_total: self.phases.len(),
        }
    }

    /// Update the `updated_at` timestamp.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Verify the progression invariants.
    pub fn check_invariants(&self) -> Result<()> {
        let len = self.phases.len();
        let fail = |message: String| Err(WaypointError::invalid_unit(message));

        if self.status == UnitStatus::Completed {
            if self.current_phase_index != len {
                return fail(format!(
                    "completed unit has current phase {} (expected {})",
                    self.current_phase_index, len
                ));
            }
            if self.final_reward.is_none() {
                return fail("completed unit has no final reward".to_string());
            }
        } else {
            if self.current_phase_index >= len {
                return fail(format!(
                    "current phase {} out of range ({} phases)",
                    self.current_phase_index, len
                ));
            }
            if self.final_reward.is_some() || self.audit_digest.is_some() {
                return fail("reward or digest present before completion".to_string());
            }
            if self.phases[self.current_phase_index].is_complete {
                return fail(format!(
                    "current phase {} is complete but was not advanced",
                    self.current_phase_index
                ));
            }
        }

        if len > 0 && self.view_index > self.current_phase_index.min(len - 1) {
            return fail(format!(
                "view index {} is ahead of the frontier",
                self.view_index
            ));
        }

        for (index, phase) in self.phases.iter().enumerate() {
            if phase.is_complete != phase.all_steps_complete() {
                return fail(format!("phase {} completion flag disagrees with steps", index));
            }
            if index < self.current_phase_index && !phase.is_complete {
                return fail(format!("phase {} is behind the frontier but incomplete", index));
            }
            if index > self.current_phase_index && phase.steps.iter().any(|s| s.is_complete) {
                return fail(format!("phase {} has progress ahead of the frontier", index));
            }

            for step in phase.steps.iter().filter(|s| s.is_complete) {
                if let Some(gate) = step.gates.iter().find(|g| g.required && !g.is_satisfied()) {
                    return fail(format!(
                        "step '{}' is complete but gate '{}' is unanswered",
                        step.id, gate.id
                    ));
                }
                if self.rules.step_ordering == StepOrdering::Strict {
                    if let Some(earlier) = phase
                        .steps
                        .iter()
                        .find(|s| s.order < step.order && !s.is_complete)
                    {
                        return fail(format!(
                            "step '{}' completed before earlier step '{}'",
                            step.id, earlier.id
                        ));
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_unit() -> Unit {
        Unit::new("u-1", "Pothole on Elm", Variant::Directive, ProgressionRules::default())
            .with_phase(
                Phase::new(PhaseKind::Recon, "Scout", Compensation::new(10, 5)).with_step(
                    Step::new("s-1", "Find it", 1).with_gate(Gate::new(
                        "confirm",
                        GateKind::Confirmation,
                        ResponseShape::Boolean,
                    )),
                ),
            )
            .with_phase(
                Phase::new(PhaseKind::Execution, "Report", Compensation::new(20, 10))
                    .with_step(Step::new("s-2", "File it", 1)),
            )
    }

    #[test]
    fn test_response_shape() {
        assert_eq!(Response::Boolean(true).shape(), ResponseShape::Boolean);
        assert_eq!(
            Response::MultiSelect(vec![]).shape(),
            ResponseShape::MultiSelect
        );
        assert_eq!(Response::Photo("p".into()).shape(), ResponseShape::Photo);
    }

    #[test]
    fn test_response_emptiness() {
        assert!(!Response::Boolean(false).is_empty());
        assert!(Response::Text("   ".into()).is_empty());
        assert!(Response::Photo(String::new()).is_empty());
        assert!(Response::MultiSelect(vec![]).is_empty());
        assert!(Response::MultiSelect(vec![" ".into()]).is_empty());
        assert!(!Response::Video("media://v1".into()).is_empty());
    }

    #[test]
    fn test_check_id() {
        Unit::check_id("m-1").unwrap();
        Unit::check_id("directive_2024.07").unwrap();

        for bad in ["", "  ", "../escaped", "a/b", "a\\b", ".hidden", "a..b", "c:x"] {
            assert!(
                matches!(Unit::check_id(bad), Err(WaypointError::InvalidUnit { .. })),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_parse_for_boolean() {
        assert_eq!(
            Response::parse_for(ResponseShape::Boolean, "YES").unwrap(),
            Response::Boolean(true)
        );
        assert_eq!(
            Response::parse_for(ResponseShape::Boolean, "0").unwrap(),
            Response::Boolean(false)
        );
        let err = Response::parse_for(ResponseShape::Boolean, "maybe").unwrap_err();
        assert!(matches!(err, WaypointError::InvalidAnswer { .. }));
    }

    #[test]
    fn test_parse_for_multi_select() {
        let parsed = Response::parse_for(ResponseShape::MultiSelect, "cones, tape,,").unwrap();
        assert_eq!(
            parsed,
            Response::MultiSelect(vec!["cones".into(), "tape".into()])
        );
    }

    #[test]
    fn test_response_serde_is_tagged() {
        let json = serde_json::to_string(&Response::Photo("media://1".into())).unwrap();
        assert_eq!(json, r#"{"shape":"photo","value":"media://1"}"#);
        let back: Response = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Response::Photo("media://1".into()));
    }

    #[test]
    fn test_gate_accepts_matching_shape_only() {
        let gate = Gate::new("g", GateKind::Evidence, ResponseShape::Photo);
        assert!(gate.accepts(&Response::Photo("media://1".into())));
        assert!(!gate.accepts(&Response::Video("media://1".into())));
        assert!(!gate.accepts(&Response::Photo("".into())));
    }

    #[test]
    fn test_gate_multi_select_respects_options() {
        let gate = Gate::new("g", GateKind::Observation, ResponseShape::MultiSelect)
            .with_options(["cones", "tape"]);
        assert!(gate.accepts(&Response::MultiSelect(vec!["tape".into()])));
        assert!(!gate.accepts(&Response::MultiSelect(vec!["rope".into()])));
    }

    #[test]
    fn test_gate_required_defaults_to_true_when_missing() {
        let gate: Gate =
            serde_json::from_str(r#"{"id":"g","kind":"safety","expects":"boolean"}"#).unwrap();
        assert!(gate.required);
        assert!(gate.response.is_none());
    }

    #[test]
    fn test_compensation_checked_add() {
        let sum = Compensation::new(1, 2).checked_add(Compensation::new(3, 4));
        assert_eq!(sum, Some(Compensation::new(4, 6)));
        assert!(Compensation::new(u64::MAX, 0)
            .checked_add(Compensation::new(1, 0))
            .is_none());
    }

    #[test]
    fn test_step_has_evidence() {
        let mut step = Step::new("s", "t", 1).with_gate(
            Gate::new("photo", GateKind::Evidence, ResponseShape::Photo).optional(),
        );
        assert!(!step.has_evidence());
        step.gates[0].response = Some(Response::Photo("media://1".into()));
        assert!(step.has_evidence());

        let step = Step {
            evidence: Some("media://2".into()),
            ..Step::new("s2", "t", 1)
        };
        assert!(step.has_evidence());
    }

    #[test]
    fn test_locate() {
        let unit = sample_unit();
        assert_eq!(unit.locate(0, "s-1").unwrap(), 0);
        assert!(matches!(
            unit.locate(0, "missing"),
            Err(WaypointError::UnknownStep { .. })
        ));
        assert!(matches!(
            unit.locate(7, "s-1"),
            Err(WaypointError::UnknownStep { .. })
        ));
    }

    #[test]
    fn test_progress_counts() {
        let mut unit = sample_unit();
        let progress = unit.progress();
        assert_eq!(progress.steps_total, 2);
        assert_eq!(progress.steps_completed, 0);
        assert_eq!(progress.phases_total, 2);

        unit.phases[0].steps[0].is_complete = true;
        unit.phases[0].is_complete = true;
        let progress = unit.progress();
        assert_eq!(progress.steps_completed, 1);
        assert_eq!(progress.phases_completed, 1);
    }

    #[test]
    fn test_fresh_unit_satisfies_invariants() {
        sample_unit().check_invariants().unwrap();
    }

    #[test]
    fn test_invariants_reject_unanswered_completed_step() {
        let mut unit = sample_unit();
        unit.phases[0].steps[0].is_complete = true;
        unit.phases[0].is_complete = true;
        unit.current_phase_index = 1;
        assert!(unit.check_invariants().is_err());
    }

    #[test]
    fn test_invariants_reject_reward_before_completion() {
        let mut unit = sample_unit();
        unit.final_reward = Some(Compensation::default());
        assert!(unit.check_invariants().is_err());
    }

    #[test]
    fn test_invariants_reject_view_ahead_of_frontier() {
        let mut unit = sample_unit();
        unit.view_index = 1;
        assert!(unit.check_invariants().is_err());
    }

    #[test]
    fn test_unit_json_roundtrip() {
        let unit = sample_unit();
        let json = serde_json::to_string(&unit).unwrap();
        let back: Unit = serde_json::from_str(&json).unwrap();
        assert_eq!(unit, back);
    }
}
