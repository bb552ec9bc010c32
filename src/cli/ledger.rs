//! Ledger command for Waypoint.
//!
//! Shows the recorded progress history of a unit.

use serde::{Deserialize, Serialize};

use crate::engine::Engine;
use crate::ledger::LedgerEntry;
use crate::storage::UnitStore;

/// Options for the ledger command.
#[derive(Debug, Clone, Default)]
pub struct LedgerOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
    /// Show only the most recent entries.
    pub limit: Option<usize>,
}

/// Output format for the ledger command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerOutput {
    pub success: bool,
    pub unit_id: String,
    pub count: usize,
    pub entries: Vec<LedgerEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The ledger command implementation.
pub struct LedgerCommand<S: UnitStore> {
    engine: Engine<S>,
}

impl<S: UnitStore> LedgerCommand<S> {
    pub fn new(engine: Engine<S>) -> Self {
        Self { engine }
    }

    /// Run the ledger command.
    pub fn run(&self, unit_id: &str, options: &LedgerOptions) -> LedgerOutput {
        match self.engine.history(unit_id) {
            Ok(mut entries) => {
                if let Some(limit) = options.limit {
                    let skip = entries.len().saturating_sub(limit);
                    entries.drain(..skip);
                }
                LedgerOutput {
                    success: true,
                    unit_id: unit_id.to_string(),
                    count: entries.len(),
                    entries,
                    error: None,
                }
            }
            Err(e) => LedgerOutput {
                success: false,
                unit_id: unit_id.to_string(),
                count: 0,
                entries: Vec::new(),
                error: Some(e.to_string()),
            },
        }
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &LedgerOutput, options: &LedgerOptions) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string())
        } else {
            self.format_human_readable(output)
        }
    }

    fn format_human_readable(&self, output: &LedgerOutput) -> String {
        if !output.success {
            return format!(
                "Ledger failed: {}\n",
                output.error.as_deref().unwrap_or("unknown error")
            );
        }
        if output.entries.is_empty() {
            return format!("No ledger entries for {}.\n", output.unit_id);
        }

        let mut lines = vec![format!(
            "{} entr{} for {}:",
            output.count,
            if output.count == 1 { "y" } else { "ies" },
            output.unit_id
        )];
        for entry in &output.entries {
            lines.push(format!(
                "  {} v{:<3} {}",
                entry.ts.format("%Y-%m-%d %H:%M:%S"),
                entry.version,
                entry.event.name()
            ));
        }
        let mut text = lines.join("\n");
        text.push('\n');
        text
    }
}
