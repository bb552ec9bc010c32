//! Engine facade for Waypoint.
//!
//! Wires the advancer to an injected store and hasher. Every mutating call
//! loads the unit, runs one transition on it, and writes the result back
//! with a version check, so concurrent writers on the same unit surface as
//! `Conflict` instead of lost updates.

use tracing::{debug, warn};

use crate::config::Config;
use crate::core::{
    Advancer, DigestHasher, ProgressEvent, Sha256Hasher, StepResponse, Template, Transition,
    Unit, UnitContext,
};
use crate::error::{FailOpen, Result, WaypointError};
use crate::generator::{ContentGenerator, UnitDescriptor};
use crate::ledger::{Ledger, LedgerEntry};
use crate::storage::UnitStore;

/// Progression engine over a unit store.
pub struct Engine<S: UnitStore, H: DigestHasher = Sha256Hasher> {
    store: S,
    hasher: H,
    config: Config,
    ledger: Option<Ledger>,
}

impl<S: UnitStore> Engine<S, Sha256Hasher> {
    /// Create an engine with SHA-256 digests and default configuration.
    pub fn new(store: S) -> Self {
        Self::with_hasher(store, Sha256Hasher)
    }
}

impl<S: UnitStore, H: DigestHasher> Engine<S, H> {
    /// Create an engine with a custom digest hasher.
    pub fn with_hasher(store: S, hasher: H) -> Self {
        Self {
            store,
            hasher,
            config: Config::default(),
            ledger: None,
        }
    }

    /// Use the given configuration.
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Record transitions to a ledger. Ignored when the ledger is disabled.
    pub fn with_ledger(mut self, ledger: Ledger) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The ledger in use, if enabled.
    pub fn ledger(&self) -> Option<&Ledger> {
        self.ledger.as_ref().filter(|_| self.config.ledger.enabled)
    }

    // =========================================================================
    // Creation
    // =========================================================================

    /// Generate a unit for `descriptor`, validate it and store it.
    pub fn instantiate(
        &self,
        descriptor: &UnitDescriptor,
        generator: &dyn ContentGenerator,
    ) -> Result<Unit> {
        let mut unit = generator.generate(descriptor).map_err(|e| match e {
            WaypointError::GeneratorFailure { .. } => e,
            other => WaypointError::generator_failure(other.to_string()),
        })?;

        let context = descriptor.context();
        if context != UnitContext::default() {
            unit.context = context;
        }
        self.register(unit)
    }

    /// Validate and store an already generated unit.
    ///
    /// Rejects ids that are already stored.
    pub fn register(&self, mut unit: Unit) -> Result<Unit> {
        let template = Template::for_variant(unit.variant);
        template.validate(&unit, &self.config.limits)?;
        unit.rules = template.rules();

        if self.store.exists(&unit.id)? {
            return Err(WaypointError::invalid_unit(format!(
                "unit {} already exists",
                unit.id
            )));
        }

        self.store.put(&unit)?;
        debug!(unit_id = %unit.id, variant = unit.variant.as_str(), "registered unit");
        Ok(unit)
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Complete a step of a stored unit.
    pub fn complete_step(
        &self,
        unit_id: &str,
        phase_index: usize,
        step_id: &str,
        response: &StepResponse,
        expected_version: Option<u64>,
    ) -> Result<Transition> {
        self.transition(unit_id, expected_version, |advancer| {
            advancer.complete_step(phase_index, step_id, response)
        })
    }

    /// Move the review cursor of a stored unit.
    pub fn jump_to_phase(
        &self,
        unit_id: &str,
        target: usize,
        expected_version: Option<u64>,
    ) -> Result<Transition> {
        self.transition(unit_id, expected_version, |advancer| {
            advancer.jump_to_phase(target)
        })
    }

    /// Build a digest that was deferred at completion.
    pub fn retry_digest(&self, unit_id: &str) -> Result<Transition> {
        self.transition(unit_id, None, |advancer| advancer.retry_digest())
    }

    fn transition<F>(
        &self,
        unit_id: &str,
        expected_version: Option<u64>,
        f: F,
    ) -> Result<Transition>
    where
        F: FnOnce(&mut Advancer<'_>) -> Result<Vec<ProgressEvent>>,
    {
        let mut unit = self.load(unit_id)?;
        let loaded_version = unit.version;
        if let Some(expected) = expected_version {
            if expected != loaded_version {
                return Err(WaypointError::conflict(unit_id, expected, loaded_version));
            }
        }

        let events = {
            let mut advancer =
                Advancer::new(&mut unit, &self.hasher).with_audit(self.config.audit.context());
            f(&mut advancer)?
        };

        if events.is_empty() {
            return Ok(Transition { unit, events });
        }

        self.store.compare_and_put(&unit, loaded_version)?;
        self.record(&unit, &events);
        Ok(Transition { unit, events })
    }

    fn record(&self, unit: &Unit, events: &[ProgressEvent]) {
        if let Some(ledger) = self.ledger() {
            ledger
                .record(unit, events)
                .fail_open_default("failed to write progress ledger");
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Read a unit.
    ///
    /// With `audit.retry_on_read`, a completed unit without a digest gets
    /// one more digest attempt; failure to build or store it is logged and
    /// the unit is returned as stored.
    pub fn get_snapshot(&self, unit_id: &str) -> Result<Unit> {
        let unit = self.load(unit_id)?;
        if !self.config.audit.retry_on_read || !unit.is_complete() || unit.audit_digest.is_some()
        {
            return Ok(unit);
        }

        match self.retry_digest(unit_id) {
            Ok(transition) => Ok(transition.unit),
            Err(e) => {
                warn!(unit_id, error = %e, "digest retry on read failed");
                Ok(unit)
            }
        }
    }

    /// List stored units, most recently updated first.
    pub fn list(&self, limit: usize) -> Result<Vec<Unit>> {
        self.store.list(limit)
    }

    /// Ledger entries recorded for a unit. Empty when no ledger is attached.
    pub fn history(&self, unit_id: &str) -> Result<Vec<LedgerEntry>> {
        match self.ledger() {
            Some(ledger) => ledger.for_unit(unit_id),
            None => Ok(Vec::new()),
        }
    }

    fn load(&self, unit_id: &str) -> Result<Unit> {
        self.store
            .get(unit_id)?
            .ok_or_else(|| WaypointError::unit_not_found(unit_id))
    }
}
