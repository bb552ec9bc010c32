//! Jump command for Waypoint.
//!
//! Moves a unit's review cursor to an unlocked phase.

use crate::cli::complete::TransitionOutput;
use crate::engine::Engine;
use crate::storage::UnitStore;

/// Options for the jump command.
#[derive(Debug, Clone, Default)]
pub struct JumpOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
    /// Refuse unless the stored unit has this version.
    pub expected_version: Option<u64>,
}

/// The jump command implementation.
pub struct JumpCommand<S: UnitStore> {
    engine: Engine<S>,
}

impl<S: UnitStore> JumpCommand<S> {
    pub fn new(engine: Engine<S>) -> Self {
        Self { engine }
    }

    /// Run the jump command.
    pub fn run(&self, unit_id: &str, target: usize, options: &JumpOptions) -> TransitionOutput {
        match self
            .engine
            .jump_to_phase(unit_id, target, options.expected_version)
        {
            Ok(transition) => TransitionOutput::success(transition),
            Err(e) => TransitionOutput::failure(&e),
        }
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &TransitionOutput, options: &JumpOptions) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string())
        } else {
            output.describe("move")
        }
    }
}
