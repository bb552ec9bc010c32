//! Audit command for Waypoint.
//!
//! Retries the audit digest of a completed unit whose digest was deferred.

use serde::{Deserialize, Serialize};

use crate::engine::Engine;
use crate::storage::UnitStore;

/// Options for the audit command.
#[derive(Debug, Clone, Default)]
pub struct AuditOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
}

/// Output format for the audit command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditOutput {
    pub success: bool,
    pub unit_id: String,
    /// Whether this run built the digest (false if it already existed).
    pub sealed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_digest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The audit command implementation.
pub struct AuditCommand<S: UnitStore> {
    engine: Engine<S>,
}

impl<S: UnitStore> AuditCommand<S> {
    pub fn new(engine: Engine<S>) -> Self {
        Self { engine }
    }

    /// Run the audit command.
    pub fn run(&self, unit_id: &str) -> AuditOutput {
        match self.engine.retry_digest(unit_id) {
            Ok(transition) => AuditOutput {
                success: true,
                unit_id: unit_id.to_string(),
                sealed: !transition.is_noop(),
                audit_digest: transition.unit.audit_digest,
                error: None,
            },
            Err(e) => AuditOutput {
                success: false,
                unit_id: unit_id.to_string(),
                sealed: false,
                audit_digest: None,
                error: Some(e.to_string()),
            },
        }
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &AuditOutput, options: &AuditOptions) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string())
        } else {
            self.format_human_readable(output)
        }
    }

    fn format_human_readable(&self, output: &AuditOutput) -> String {
        if !output.success {
            return format!(
                "Audit failed for {}: {}\n",
                output.unit_id,
                output.error.as_deref().unwrap_or("unknown error")
            );
        }

        let digest = output.audit_digest.as_deref().unwrap_or("-");
        if output.sealed {
            format!("Sealed {}: {}\n", output.unit_id, digest)
        } else {
            format!("{} already sealed: {}\n", output.unit_id, digest)
        }
    }
}
