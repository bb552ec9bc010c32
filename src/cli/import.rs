//! Import command for Waypoint.
//!
//! Registers a pre-generated unit from a JSON file.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cli::status::UnitInfo;
use crate::core::Variant;
use crate::engine::Engine;
use crate::error::Result;
use crate::generator::{JsonFileGenerator, UnitDescriptor};
use crate::storage::UnitStore;

/// Options for the import command.
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
    /// Variant to import as. Defaults to the file's own, then directive.
    pub variant: Option<Variant>,
    pub category: Option<String>,
    pub location: Option<String>,
    pub approach: Option<String>,
}

/// Output format for the import command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportOutput {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<UnitInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The import command implementation.
pub struct ImportCommand<S: UnitStore> {
    engine: Engine<S>,
}

impl<S: UnitStore> ImportCommand<S> {
    pub fn new(engine: Engine<S>) -> Self {
        Self { engine }
    }

    /// Run the import command.
    pub fn run(&self, path: &Path, options: &ImportOptions) -> ImportOutput {
        match self.import(path, options) {
            Ok(unit) => ImportOutput {
                success: true,
                unit: Some(unit),
                error: None,
            },
            Err(e) => ImportOutput {
                success: false,
                unit: None,
                error: Some(e.to_string()),
            },
        }
    }

    fn import(&self, path: &Path, options: &ImportOptions) -> Result<UnitInfo> {
        let generator = JsonFileGenerator::new(path);
        let variant = match options.variant {
            Some(variant) => variant,
            None => generator.peek_variant()?.unwrap_or_default(),
        };

        let mut descriptor = UnitDescriptor::new(variant);
        if let Some(category) = &options.category {
            descriptor = descriptor.with_category(category.as_str());
        }
        if let Some(location) = &options.location {
            descriptor = descriptor.with_location(location.as_str());
        }
        if let Some(approach) = &options.approach {
            descriptor = descriptor.with_approach(approach.as_str());
        }

        let unit = self.engine.instantiate(&descriptor, &generator)?;
        Ok(UnitInfo::from_unit(&unit))
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &ImportOutput, options: &ImportOptions) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            return serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string());
        }

        match (&output.unit, output.success) {
            (Some(unit), true) => format!(
                "Imported {} {} ({} phases, {} steps): {}\n",
                unit.variant, unit.id, unit.phases_total, unit.steps_total, unit.title
            ),
            _ => format!(
                "Import failed: {}\n",
                output.error.as_deref().unwrap_or("unknown error")
            ),
        }
    }
}
