//! Audit digest construction.
//!
//! A completed unit is reduced to a canonical JSON payload (sorted keys,
//! sorted step ids, evidence presence only) and hashed. The same unit state
//! always produces the same bytes, so a digest can be rebuilt later and
//! compared.

use std::collections::BTreeMap;

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::core::model::Unit;
use crate::error::{Result, WaypointError};

/// One-way hash over canonical payload bytes.
pub trait DigestHasher: Send + Sync {
    /// Hash `bytes`, returning a lowercase hex string.
    fn digest(&self, bytes: &[u8]) -> Result<String>;
}

impl<T: DigestHasher + ?Sized> DigestHasher for &T {
    fn digest(&self, bytes: &[u8]) -> Result<String> {
        (**self).digest(bytes)
    }
}

/// SHA-256 hasher producing 64 lowercase hex characters.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl DigestHasher for Sha256Hasher {
    fn digest(&self, bytes: &[u8]) -> Result<String> {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Ok(hex::encode(hasher.finalize()))
    }
}

/// Which optional context fields enter the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditContext {
    /// Include the declared location.
    pub include_location: bool,
}

impl Default for AuditContext {
    fn default() -> Self {
        Self {
            include_location: true,
        }
    }
}

/// Build the canonical payload for a completed unit.
pub fn canonical_payload(unit: &Unit, context: &AuditContext) -> Result<String> {
    let captured_at = unit.completed_at.ok_or_else(|| {
        WaypointError::not_ready(format!("unit {} has no completion timestamp", unit.id))
    })?;

    let phases: Vec<Value> = unit
        .phases
        .iter()
        .enumerate()
        .map(|(index, phase)| {
            let mut completed: Vec<&str> = phase
                .steps
                .iter()
                .filter(|s| s.is_complete)
                .map(|s| s.id.as_str())
                .collect();
            completed.sort_unstable();

            let mut entry = BTreeMap::<String, Value>::new();
            entry.insert("index".to_string(), Value::from(index as u64));
            entry.insert(
                "kind".to_string(),
                Value::String(phase.kind.label().to_string()),
            );
            entry.insert(
                "completed_steps".to_string(),
                Value::Array(
                    completed
                        .into_iter()
                        .map(|id| Value::String(id.to_string()))
                        .collect(),
                ),
            );
            object(entry)
        })
        .collect();

    let evidence: BTreeMap<String, Value> = unit
        .phases
        .iter()
        .flat_map(|p| &p.steps)
        .map(|s| (s.id.clone(), Value::Bool(s.has_evidence())))
        .collect();

    let mut declared = BTreeMap::<String, Value>::new();
    if context.include_location {
        declared.insert("location".to_string(), optional(&unit.context.location));
    }
    declared.insert("approach".to_string(), optional(&unit.context.approach));

    let mut map = BTreeMap::<String, Value>::new();
    map.insert("id".to_string(), Value::String(unit.id.clone()));
    map.insert("title".to_string(), Value::String(unit.title.clone()));
    map.insert(
        "variant".to_string(),
        Value::String(unit.variant.as_str().to_string()),
    );
    map.insert(
        "category".to_string(),
        Value::String(unit.context.category.clone()),
    );
    map.insert("phases".to_string(), Value::Array(phases));
    map.insert("evidence".to_string(), object(evidence));
    map.insert("context".to_string(), object(declared));
    map.insert(
        "captured_at".to_string(),
        Value::String(captured_at.to_rfc3339()),
    );

    Ok(serde_json::to_string(&map)?)
}

/// Hash the canonical payload of a completed unit.
///
/// Any hasher failure surfaces as `DigestUnavailable`.
pub fn build_digest(
    unit: &Unit,
    context: &AuditContext,
    hasher: &dyn DigestHasher,
) -> Result<String> {
    let payload = canonical_payload(unit, context)?;
    hasher
        .digest(payload.as_bytes())
        .map_err(|e| match e {
            WaypointError::DigestUnavailable { .. } => e,
            other => WaypointError::digest_unavailable(other.to_string()),
        })
}

fn object(map: BTreeMap<String, Value>) -> Value {
    Value::Object(map.into_iter().collect())
}

fn optional(value: &Option<String>) -> Value {
    value
        .as_ref()
        .map_or(Value::Null, |v| Value::String(v.clone()))
}
