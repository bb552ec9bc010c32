//! Content generation boundary.
//!
//! The engine never decides what tasks exist. A `ContentGenerator` turns a
//! descriptor (variant, report category, location, chosen approach) into a
//! fresh unit, which the engine then validates structurally.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::{Phase, Template, Unit, UnitContext, Variant};
use crate::error::{Result, WaypointError};
use crate::util::read_to_string_limited;

/// What a unit should be generated for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct UnitDescriptor {
    /// Which template the unit follows.
    pub variant: Variant,
    /// Report category (pothole, graffiti, ...).
    #[serde(default)]
    pub category: String,
    /// Declared location, if any.
    #[serde(default)]
    pub location: Option<String>,
    /// Approach the user picked.
    #[serde(default)]
    pub approach: Option<String>,
}

impl UnitDescriptor {
    /// Descriptor for a variant with an empty context.
    pub fn new(variant: Variant) -> Self {
        Self {
            variant,
            ..Self::default()
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_approach(mut self, approach: impl Into<String>) -> Self {
        self.approach = Some(approach.into());
        self
    }

    /// The unit context this descriptor stamps on generated units.
    pub fn context(&self) -> UnitContext {
        UnitContext {
            category: self.category.clone(),
            location: self.location.clone(),
            approach: self.approach.clone(),
        }
    }
}

/// Produces units from descriptors.
///
/// Implementations may call out to anything (a model, a catalog, a file).
/// Their errors are reported to callers as `GeneratorFailure`.
pub trait ContentGenerator: Send + Sync {
    /// Generate a fresh unit for the descriptor.
    fn generate(&self, descriptor: &UnitDescriptor) -> Result<Unit>;
}

impl<F> ContentGenerator for F
where
    F: Fn(&UnitDescriptor) -> Result<Unit> + Send + Sync,
{
    fn generate(&self, descriptor: &UnitDescriptor) -> Result<Unit> {
        self(descriptor)
    }
}

/// Document shape read by `JsonFileGenerator`.
#[derive(Debug, Deserialize)]
struct GeneratedDocument {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    variant: Option<Variant>,
    #[serde(default)]
    context: Option<UnitContext>,
    #[serde(default)]
    phases: Vec<Phase>,
}

/// Reads a pre-generated unit from a JSON file.
///
/// The file holds `id`, `title` and `phases`; `variant` and `context` are
/// optional. A missing id falls back to the file stem.
#[derive(Debug, Clone)]
pub struct JsonFileGenerator {
    path: PathBuf,
}

impl JsonFileGenerator {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Path of the source document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the document's own variant, so callers can build a descriptor.
    pub fn peek_variant(&self) -> Result<Option<Variant>> {
        Ok(self.read_document()?.variant)
    }

    fn read_document(&self) -> Result<GeneratedDocument> {
        let content = read_to_string_limited(&self.path).map_err(|e| {
            WaypointError::generator_failure(format!(
                "cannot read {}: {}",
                self.path.display(),
                e
            ))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            WaypointError::generator_failure(format!(
                "cannot parse {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    fn fallback_id(&self) -> Option<String> {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
    }
}

impl ContentGenerator for JsonFileGenerator {
    fn generate(&self, descriptor: &UnitDescriptor) -> Result<Unit> {
        let doc = self.read_document()?;

        if let Some(variant) = doc.variant {
            if variant != descriptor.variant {
                return Err(WaypointError::generator_failure(format!(
                    "{} holds a {} but a {} was requested",
                    self.path.display(),
                    variant.as_str(),
                    descriptor.variant.as_str()
                )));
            }
        }

        let id = doc
            .id
            .filter(|id| !id.trim().is_empty())
            .or_else(|| self.fallback_id())
            .ok_or_else(|| {
                WaypointError::generator_failure(format!(
                    "{} has no unit id",
                    self.path.display()
                ))
            })?;

        let mut unit = Template::for_variant(descriptor.variant).start_unit(id, doc.title);
        unit.phases = doc.phases;
        if let Some(context) = doc.context {
            unit.context = context;
        }
        Ok(unit)
    }
}
