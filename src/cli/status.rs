//! Status command for Waypoint.
//!
//! Shows one unit with its progress summary and per-phase breakdown.

use serde::{Deserialize, Serialize};

use crate::core::{Compensation, Phase, Unit};
use crate::engine::Engine;
use crate::storage::UnitStore;

/// Options for the status command.
#[derive(Debug, Clone, Default)]
pub struct StatusOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
}

/// Progress summary of a unit, shared by the status, list and import output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitInfo {
    pub id: String,
    pub title: String,
    pub variant: String,
    pub status: String,
    pub category: String,
    /// Progress frontier.
    pub current_phase: usize,
    /// Review cursor.
    pub view_index: usize,
    pub phases_completed: usize,
    pub phases_total: usize,
    pub steps_completed: usize,
    pub steps_total: usize,
    pub version: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_reward: Option<Compensation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_digest: Option<String>,
    pub updated: String,
}

impl UnitInfo {
    pub fn from_unit(unit: &Unit) -> Self {
        let progress = unit.progress();
        Self {
            id: unit.id.clone(),
            title: unit.title.clone(),
            variant: unit.variant.as_str().to_string(),
            status: unit.status.as_str().to_string(),
            category: unit.context.category.clone(),
            current_phase: unit.current_phase_index,
            view_index: unit.view_index,
            phases_completed: progress.phases_completed,
            phases_total: progress.phases_total,
            steps_completed: progress.steps_completed,
            steps_total: progress.steps_total,
            version: unit.version,
            final_reward: unit.final_reward,
            audit_digest: unit.audit_digest.clone(),
            updated: unit.updated_at.format("%Y-%m-%d %H:%M").to_string(),
        }
    }

    /// One-line progress summary, e.g. `2/4 phases, 5/9 steps`.
    pub fn progress_line(&self) -> String {
        format!(
            "{}/{} phases, {}/{} steps",
            self.phases_completed, self.phases_total, self.steps_completed, self.steps_total
        )
    }
}

/// Step line in the phase breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepInfo {
    pub id: String,
    pub text: String,
    pub is_complete: bool,
    /// Required gates still without a response.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub pending_gates: Vec<String>,
}

/// Phase breakdown entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseInfo {
    pub index: usize,
    pub kind: String,
    pub title: String,
    pub is_complete: bool,
    pub compensation: Compensation,
    pub steps: Vec<StepInfo>,
}

impl PhaseInfo {
    fn from_phase(index: usize, phase: &Phase) -> Self {
        Self {
            index,
            kind: phase.kind.label().to_string(),
            title: phase.title.clone(),
            is_complete: phase.is_complete,
            compensation: phase.compensation,
            steps: phase
                .steps
                .iter()
                .map(|s| StepInfo {
                    id: s.id.clone(),
                    text: s.text.clone(),
                    is_complete: s.is_complete,
                    pending_gates: s
                        .gates
                        .iter()
                        .filter(|g| g.required && !g.is_satisfied())
                        .map(|g| g.id.clone())
                        .collect(),
                })
                .collect(),
        }
    }
}

/// Output format for the status command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusOutput {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<UnitInfo>,
    #[serde(default)]
    pub phases: Vec<PhaseInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusOutput {
    pub fn success(unit: &Unit) -> Self {
        Self {
            success: true,
            unit: Some(UnitInfo::from_unit(unit)),
            phases: unit
                .phases
                .iter()
                .enumerate()
                .map(|(i, p)| PhaseInfo::from_phase(i, p))
                .collect(),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            unit: None,
            phases: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// The status command implementation.
pub struct StatusCommand<S: UnitStore> {
    engine: Engine<S>,
}

impl<S: UnitStore> StatusCommand<S> {
    pub fn new(engine: Engine<S>) -> Self {
        Self { engine }
    }

    /// Run the status command.
    pub fn run(&self, unit_id: &str) -> StatusOutput {
        match self.engine.get_snapshot(unit_id) {
            Ok(unit) => StatusOutput::success(&unit),
            Err(e) => StatusOutput::failure(e.to_string()),
        }
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &StatusOutput, options: &StatusOptions) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string())
        } else {
            self.format_human_readable(output)
        }
    }

    fn format_human_readable(&self, output: &StatusOutput) -> String {
        let unit = match (&output.unit, output.success) {
            (Some(unit), true) => unit,
            _ => {
                return format!(
                    "Status failed: {}\n",
                    output.error.as_deref().unwrap_or("unknown error")
                )
            }
        };

        let mut lines = vec![
            format!("{} [{}] {}", unit.id, unit.variant, unit.title),
            format!(
                "Status: {} | {} | version {}",
                unit.status,
                unit.progress_line(),
                unit.version
            ),
        ];
        if let Some(reward) = unit.final_reward {
            lines.push(format!(
                "Reward: {} currency, {} xp",
                reward.reward_currency, reward.reward_xp
            ));
        }
        if unit.status == "completed" {
            match &unit.audit_digest {
                Some(digest) => lines.push(format!("Audit: {}", digest)),
                None => lines.push("Audit: pending (run `waypoint audit`)".to_string()),
            }
        }
        lines.push(String::new());

        for phase in &output.phases {
            let marker = if phase.is_complete {
                "x"
            } else if phase.index == unit.current_phase {
                ">"
            } else {
                " "
            };
            let viewing = if phase.index == unit.view_index && unit.view_index != unit.current_phase
            {
                " (viewing)"
            } else {
                ""
            };
            lines.push(format!(
                "[{}] {}. {} {}{}",
                marker, phase.index, phase.kind, phase.title, viewing
            ));
            for step in &phase.steps {
                let check = if step.is_complete { "x" } else { " " };
                let pending = if step.pending_gates.is_empty() {
                    String::new()
                } else {
                    format!(" (needs: {})", step.pending_gates.join(", "))
                };
                lines.push(format!("    [{}] {} {}{}", check, step.id, step.text, pending));
            }
        }

        let mut text = lines.join("\n");
        text.push('\n');
        text
    }
}
