//! Serialized unit snapshots.
//!
//! `snapshot` wraps a unit in a versioned envelope. `restore` reads any
//! shape this crate has ever written (and bare legacy unit objects), fills
//! gaps from an optional template unit, and recomputes derived progress so
//! the result satisfies the unit invariants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::model::{
    Compensation, Gate, Phase, PhaseKind, ProgressionRules, Step, Unit, UnitContext, UnitStatus,
    Variant,
};
use crate::core::reward::aggregate;
use crate::core::template::Template;
use crate::error::{Result, WaypointError};

/// Current snapshot schema version.
///
/// Version 1 was a bare unit object without rules or view cursor.
pub const SCHEMA_VERSION: u32 = 2;

/// A unit in its persisted form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedUnit {
    /// Schema version the payload was written with.
    pub schema_version: u32,
    /// The unit payload.
    pub unit: Value,
}

impl SerializedUnit {
    /// Parse persisted JSON, accepting both envelopes and bare unit objects.
    pub fn from_json(content: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(content)?;
        let is_envelope = value.get("schema_version").is_some() && value.get("unit").is_some();
        if is_envelope {
            Ok(serde_json::from_value(value)?)
        } else {
            Ok(Self {
                schema_version: 1,
                unit: value,
            })
        }
    }

    /// Render as pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Wrap a unit in a versioned envelope.
pub fn snapshot(unit: &Unit) -> Result<SerializedUnit> {
    Ok(SerializedUnit {
        schema_version: SCHEMA_VERSION,
        unit: serde_json::to_value(unit)?,
    })
}

// =============================================================================
// Lenient records
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UnitRecord {
    id: String,
    title: String,
    variant: Option<Variant>,
    rules: Option<ProgressionRules>,
    context: UnitContext,
    phases: Vec<PhaseRecord>,
    view_index: usize,
    final_reward: Option<Compensation>,
    audit_digest: Option<String>,
    completed_at: Option<DateTime<Utc>>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    version: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PhaseRecord {
    kind: Option<PhaseKind>,
    title: String,
    #[serde(alias = "actions")]
    steps: Vec<StepRecord>,
    completed_at: Option<DateTime<Utc>>,
    compensation: Option<Compensation>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StepRecord {
    id: String,
    text: String,
    order: Option<u32>,
    #[serde(alias = "prompts")]
    gates: Vec<Value>,
    is_complete: bool,
    evidence: Option<String>,
    completed_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Restore
// =============================================================================

/// Rebuild a unit from its persisted form.
///
/// `template` is a freshly generated unit of the same kind; when given, it
/// supplies phases, steps, step text, gates and compensation missing from
/// older payloads.
pub fn restore(serialized: &SerializedUnit, template: Option<&Unit>) -> Result<Unit> {
    if serialized.schema_version > SCHEMA_VERSION {
        return Err(WaypointError::serde(format!(
            "snapshot schema {} is newer than supported schema {}",
            serialized.schema_version, SCHEMA_VERSION
        )));
    }

    let record: UnitRecord = serde_json::from_value(serialized.unit.clone())?;
    if record.id.trim().is_empty() {
        return Err(WaypointError::invalid_unit("snapshot has no unit id"));
    }

    let variant = record
        .variant
        .or(template.map(|t| t.variant))
        .unwrap_or_default();
    let rules = record
        .rules
        .or(template.map(|t| t.rules))
        .unwrap_or_else(|| Template::for_variant(variant).rules());

    let template_phases = template.map(|t| t.phases.as_slice()).unwrap_or(&[]);
    let mut phases = Vec::with_capacity(record.phases.len().max(template_phases.len()));
    for (index, phase) in record.phases.into_iter().enumerate() {
        phases.push(restore_phase(
            &record.id,
            index,
            phase,
            template_phases.get(index),
        )?);
    }
    for missing in template_phases.iter().skip(phases.len()) {
        phases.push(fresh_phase(missing));
    }
    if phases.is_empty() {
        return Err(WaypointError::invalid_unit(format!(
            "snapshot of unit {} has no phases",
            record.id
        )));
    }
    // An empty phase would read as complete.
    if let Some(index) = phases.iter().position(|p| p.steps.is_empty()) {
        return Err(WaypointError::invalid_unit(format!(
            "phase {} of unit {} has no steps",
            index, record.id
        )));
    }

    let now = Utc::now();
    let created_at = record.created_at.unwrap_or(now);
    let updated_at = record.updated_at.unwrap_or(created_at);
    let mut unit = Unit {
        id: record.id,
        title: record.title,
        variant,
        rules,
        context: record.context,
        phases,
        current_phase_index: 0,
        view_index: record.view_index,
        status: UnitStatus::NotStarted,
        final_reward: record.final_reward,
        audit_digest: record.audit_digest,
        completed_at: record.completed_at,
        created_at,
        updated_at,
        version: record.version,
    };
    if unit.title.is_empty() {
        if let Some(t) = template {
            unit.title = t.title.clone();
        }
    }

    recompute_progress(&mut unit)?;
    unit.check_invariants()?;
    Ok(unit)
}

fn restore_phase(
    unit_id: &str,
    index: usize,
    record: PhaseRecord,
    template: Option<&Phase>,
) -> Result<Phase> {
    let kind = record
        .kind
        .or(template.map(|t| t.kind))
        .ok_or_else(|| {
            WaypointError::invalid_unit(format!(
                "phase {} of unit {} has no kind",
                index, unit_id
            ))
        })?;

    if record.steps.is_empty() {
        if let Some(t) = template {
            let mut phase = fresh_phase(t);
            phase.kind = kind;
            if !record.title.is_empty() {
                phase.title = record.title;
            }
            if let Some(compensation) = record.compensation {
                phase.compensation = compensation;
            }
            return Ok(phase);
        }
    }

    let steps = record
        .steps
        .into_iter()
        .enumerate()
        .map(|(position, step)| {
            let template_step = template.and_then(|t| t.step(&step.id));
            restore_step(position, step, template_step)
        })
        .collect();

    Ok(Phase {
        kind,
        title: if record.title.is_empty() {
            template.map(|t| t.title.clone()).unwrap_or_default()
        } else {
            record.title
        },
        steps,
        is_complete: false,
        completed_at: record.completed_at,
        compensation: record
            .compensation
            .or(template.map(|t| t.compensation))
            .unwrap_or_default(),
    })
}

fn restore_step(position: usize, record: StepRecord, template: Option<&Step>) -> Step {
    let mut gates: Vec<Gate> = record
        .gates
        .into_iter()
        .filter_map(|raw| match serde_json::from_value::<Gate>(raw) {
            Ok(gate) => Some(gate),
            Err(e) => {
                tracing::warn!(step = %record.id, error = %e, "dropping unreadable gate");
                None
            }
        })
        .collect();
    // Backfilled gates are unanswered, so only incomplete steps take them.
    if gates.is_empty() && !record.is_complete {
        if let Some(t) = template {
            gates = t.gates.iter().cloned().map(unanswered).collect();
        }
    }

    Step {
        text: if record.text.is_empty() {
            template.map(|t| t.text.clone()).unwrap_or_default()
        } else {
            record.text
        },
        order: record
            .order
            .or(template.map(|t| t.order))
            .unwrap_or(position as u32 + 1),
        gates,
        is_complete: record.is_complete,
        evidence: record.evidence,
        completed_at: record.completed_at,
        id: record.id,
    }
}

fn fresh_phase(template: &Phase) -> Phase {
    Phase {
        kind: template.kind,
        title: template.title.clone(),
        steps: template
            .steps
            .iter()
            .map(|s| Step {
                gates: s.gates.iter().cloned().map(unanswered).collect(),
                is_complete: false,
                evidence: None,
                completed_at: None,
                ..s.clone()
            })
            .collect(),
        is_complete: false,
        completed_at: None,
        compensation: template.compensation,
    }
}

fn unanswered(mut gate: Gate) -> Gate {
    gate.response = None;
    gate
}

/// Derive completion flags, frontier, status and terminal fields from steps.
fn recompute_progress(unit: &mut Unit) -> Result<()> {
    for phase in &mut unit.phases {
        phase.is_complete = phase.all_steps_complete();
        if !phase.is_complete {
            phase.completed_at = None;
        }
    }

    let len = unit.phases.len();
    unit.current_phase_index = unit
        .phases
        .iter()
        .position(|p| !p.is_complete)
        .unwrap_or(len);

    let any_progress = unit.phases.iter().flat_map(|p| &p.steps).any(|s| s.is_complete);
    if unit.current_phase_index == len {
        unit.status = UnitStatus::Completed;
        if unit.completed_at.is_none() {
            unit.completed_at = Some(unit.updated_at);
        }
        if unit.final_reward.is_none() {
            unit.final_reward = Some(aggregate(unit)?);
        }
    } else {
        unit.status = if any_progress {
            UnitStatus::InProgress
        } else {
            UnitStatus::NotStarted
        };
        unit.final_reward = None;
        unit.audit_digest = None;
        unit.completed_at = None;
    }

    unit.view_index = unit.view_index.min(unit.current_phase_index.min(len - 1));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{GateKind, Response, ResponseShape};
    use serde_json::json;

    fn template_unit() -> Unit {
        Template::mission()
            .start_unit("m-1", "Fallen sign")
            .with_phase(
                Phase::new(PhaseKind::Recon, "Recon", Compensation::new(5, 10))
                    .with_step(Step::new("a-1", "Locate the sign", 1).with_gate(Gate::new(
                        "seen",
                        GateKind::Confirmation,
                        ResponseShape::Boolean,
                    )))
                    .with_step(Step::new("a-2", "Photograph it", 2)),
            )
            .with_phase(
                Phase::new(PhaseKind::Operation, "Operation", Compensation::new(15, 30))
                    .with_step(Step::new("a-3", "Report it", 1)),
            )
    }

    #[test]
    fn test_snapshot_restore_preserves_unit() {
        let unit = template_unit();
        let restored = restore(&snapshot(&unit).unwrap(), None).unwrap();
        assert_eq!(restored, unit);
    }

    #[test]
    fn test_envelope_json_roundtrip() {
        let unit = template_unit();
        let json = snapshot(&unit).unwrap().to_json().unwrap();
        let parsed = SerializedUnit::from_json(&json).unwrap();
        assert_eq!(parsed.schema_version, SCHEMA_VERSION);
        assert_eq!(restore(&parsed, None).unwrap(), unit);
    }

    #[test]
    fn test_bare_object_is_schema_one() {
        let parsed = SerializedUnit::from_json(r#"{"id":"x","phases":[]}"#).unwrap();
        assert_eq!(parsed.schema_version, 1);
    }

    #[test]
    fn test_newer_schema_is_rejected() {
        let serialized = SerializedUnit {
            schema_version: SCHEMA_VERSION + 1,
            unit: json!({"id": "x"}),
        };
        assert!(matches!(
            restore(&serialized, None),
            Err(WaypointError::Serde { .. })
        ));
    }

    #[test]
    fn test_legacy_field_names_and_missing_rules() {
        let serialized = SerializedUnit {
            schema_version: 1,
            unit: json!({
                "id": "m-legacy",
                "title": "Legacy",
                "variant": "mission",
                "phases": [
                    {
                        "kind": "recon",
                        "compensation": {"reward_currency": 5, "reward_xp": 10},
                        "actions": [
                            {
                                "id": "a-1",
                                "text": "Locate",
                                "is_complete": true,
                                "prompts": [
                                    {"id": "seen", "kind": "confirmation", "expects": "boolean",
                                     "response": {"shape": "boolean", "value": true}}
                                ]
                            }
                        ]
                    },
                    {"kind": "operation", "actions": [{"id": "a-3", "text": "Report"}]}
                ]
            }),
        };
        let unit = restore(&serialized, None).unwrap();
        assert_eq!(unit.rules, Template::mission().rules());
        assert!(unit.phases[0].is_complete);
        assert_eq!(unit.current_phase_index, 1);
        assert_eq!(unit.status, UnitStatus::InProgress);
        assert_eq!(
            unit.phases[0].steps[0].gates[0].response,
            Some(Response::Boolean(true))
        );
    }

    #[test]
    fn test_template_backfills_missing_phase_and_fields() {
        let serialized = SerializedUnit {
            schema_version: 1,
            unit: json!({
                "id": "m-1",
                "variant": "mission",
                "phases": [
                    {"kind": "recon", "steps": [{"id": "a-1"}, {"id": "a-2", "is_complete": false}]}
                ]
            }),
        };
        let unit = restore(&serialized, Some(&template_unit())).unwrap();
        assert_eq!(unit.title, "Fallen sign");
        assert_eq!(unit.phases.len(), 2);
        assert_eq!(unit.phases[0].steps[0].text, "Locate the sign");
        assert_eq!(unit.phases[0].steps[0].gates.len(), 1);
        assert_eq!(unit.phases[0].compensation, Compensation::new(5, 10));
        assert_eq!(unit.phases[1].steps[0].id, "a-3");
        assert_eq!(unit.status, UnitStatus::NotStarted);
    }

    #[test]
    fn test_empty_step_list_is_backfilled() {
        let serialized = SerializedUnit {
            schema_version: 1,
            unit: json!({
                "id": "m-1",
                "variant": "mission",
                "phases": [{"kind": "recon", "steps": []}, {"kind": "operation"}]
            }),
        };
        let unit = restore(&serialized, Some(&template_unit())).unwrap();
        assert_eq!(unit.phases[0].steps.len(), 2);
        assert_eq!(unit.phases[1].steps.len(), 1);
    }

    #[test]
    fn test_frontier_and_flags_are_recomputed() {
        let mut unit = template_unit();
        unit.phases[0].steps[0].gates[0].response = Some(Response::Boolean(true));
        unit.phases[0].steps[0].is_complete = true;
        unit.phases[0].steps[1].is_complete = true;
        // Stale derived fields as an older writer might have left them.
        unit.phases[0].is_complete = false;
        unit.current_phase_index = 0;
        unit.view_index = 7;

        let restored = restore(&snapshot(&unit).unwrap(), None).unwrap();
        assert!(restored.phases[0].is_complete);
        assert_eq!(restored.current_phase_index, 1);
        assert_eq!(restored.view_index, 1);
        assert_eq!(restored.status, UnitStatus::InProgress);
    }

    #[test]
    fn test_completed_unit_without_reward_is_aggregated() {
        let mut unit = template_unit();
        unit.phases[0].steps[0].gates[0].response = Some(Response::Boolean(true));
        for phase in &mut unit.phases {
            for step in &mut phase.steps {
                step.is_complete = true;
            }
        }
        let restored = restore(&snapshot(&unit).unwrap(), None).unwrap();
        assert_eq!(restored.status, UnitStatus::Completed);
        assert_eq!(restored.current_phase_index, 2);
        assert_eq!(restored.final_reward, Some(Compensation::new(20, 40)));
        assert!(restored.completed_at.is_some());
        assert!(restored.audit_digest.is_none());
    }

    #[test]
    fn test_stale_reward_on_incomplete_unit_is_dropped() {
        let mut unit = template_unit();
        unit.final_reward = Some(Compensation::new(1, 1));
        unit.audit_digest = Some("ab".repeat(32));
        let restored = restore(&snapshot(&unit).unwrap(), None).unwrap();
        assert!(restored.final_reward.is_none());
        assert!(restored.audit_digest.is_none());
    }

    #[test]
    fn test_unreadable_gate_is_dropped() {
        let serialized = SerializedUnit {
            schema_version: 2,
            unit: json!({
                "id": "d-1",
                "variant": "directive",
                "phases": [{"kind": "recon", "steps": [{"id": "s", "gates": [{"id": "broken"}]}]}]
            }),
        };
        let unit = restore(&serialized, None).unwrap();
        assert!(unit.phases[0].steps[0].gates.is_empty());
        assert_eq!(unit.phases[0].steps[0].order, 1);
    }

    #[test]
    fn test_missing_id_or_phases_is_invalid() {
        let no_id = SerializedUnit {
            schema_version: 2,
            unit: json!({"phases": []}),
        };
        assert!(matches!(
            restore(&no_id, None),
            Err(WaypointError::InvalidUnit { .. })
        ));

        let no_phases = SerializedUnit {
            schema_version: 2,
            unit: json!({"id": "x"}),
        };
        assert!(matches!(
            restore(&no_phases, None),
            Err(WaypointError::InvalidUnit { .. })
        ));
    }

    #[test]
    fn test_phase_without_steps_is_invalid() {
        let serialized = SerializedUnit {
            schema_version: 2,
            unit: json!({
                "id": "x",
                "variant": "directive",
                "phases": [
                    {"kind": "recon", "compensation": {"reward_currency": 50, "reward_xp": 9}}
                ]
            }),
        };
        let err = restore(&serialized, None).unwrap_err();
        assert!(matches!(err, WaypointError::InvalidUnit { .. }));
        assert!(err.to_string().contains("has no steps"));

        let explicit_empty = SerializedUnit {
            schema_version: 2,
            unit: json!({
                "id": "m-1",
                "variant": "mission",
                "phases": [
                    {"kind": "recon", "steps": [{"id": "a-1"}]},
                    {"kind": "operation", "steps": []}
                ]
            }),
        };
        assert!(matches!(
            restore(&explicit_empty, None),
            Err(WaypointError::InvalidUnit { .. })
        ));
    }

    #[test]
    fn test_phase_without_kind_needs_template() {
        let serialized = SerializedUnit {
            schema_version: 1,
            unit: json!({"id": "m-1", "phases": [{"steps": [{"id": "a-1"}]}]}),
        };
        assert!(restore(&serialized, None).is_err());
        let unit = restore(&serialized, Some(&template_unit())).unwrap();
        assert_eq!(unit.phases[0].kind, PhaseKind::Recon);
    }
}
