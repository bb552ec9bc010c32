//! List command for Waypoint.
//!
//! Lists stored units, most recently updated first.

use serde::{Deserialize, Serialize};

use crate::cli::status::UnitInfo;
use crate::engine::Engine;
use crate::storage::UnitStore;

/// Default number of units listed.
pub const DEFAULT_LIMIT: usize = 20;

/// Options for the list command.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
    /// Maximum number of results.
    pub limit: Option<usize>,
    /// Hide completed units.
    pub active_only: bool,
}

/// Output format for the list command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListOutput {
    pub success: bool,
    pub count: usize,
    pub units: Vec<UnitInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ListOutput {
    pub fn success(units: Vec<UnitInfo>) -> Self {
        Self {
            success: true,
            count: units.len(),
            units,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            count: 0,
            units: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// The list command implementation.
pub struct ListCommand<S: UnitStore> {
    engine: Engine<S>,
}

impl<S: UnitStore> ListCommand<S> {
    pub fn new(engine: Engine<S>) -> Self {
        Self { engine }
    }

    /// Run the list command.
    pub fn run(&self, options: &ListOptions) -> ListOutput {
        let limit = options.limit.unwrap_or(DEFAULT_LIMIT);
        // Filter before truncating so --active-only still returns up to `limit`.
        let fetch = if options.active_only { usize::MAX } else { limit };

        match self.engine.list(fetch) {
            Ok(units) => {
                let infos = units
                    .iter()
                    .filter(|u| !options.active_only || !u.is_complete())
                    .take(limit)
                    .map(UnitInfo::from_unit)
                    .collect();
                ListOutput::success(infos)
            }
            Err(e) => ListOutput::failure(e.to_string()),
        }
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &ListOutput, options: &ListOptions) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string())
        } else {
            self.format_human_readable(output)
        }
    }

    fn format_human_readable(&self, output: &ListOutput) -> String {
        if !output.success {
            return format!(
                "List failed: {}\n",
                output.error.as_deref().unwrap_or("unknown error")
            );
        }

        if output.units.is_empty() {
            return "No units found.\n".to_string();
        }

        let mut lines = vec![format!("Found {} unit(s):\n", output.count)];
        for (i, unit) in output.units.iter().enumerate() {
            lines.push(format!(
                "{}. [{}] {} ({})",
                i + 1,
                unit.variant,
                unit.title,
                unit.status
            ));
            lines.push(format!(
                "   {} | Updated: {} | ID: {}",
                unit.progress_line(),
                unit.updated,
                unit.id
            ));
            lines.push(String::new());
        }

        lines.join("\n")
    }
}
