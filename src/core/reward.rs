//! Reward aggregation.

use crate::core::model::{Compensation, Unit};
use crate::error::{Result, WaypointError};

/// Sum the compensation of every phase.
///
/// Fails with `NotReady` while any phase is incomplete; a partial sum is
/// never returned.
pub fn aggregate(unit: &Unit) -> Result<Compensation> {
    if let Some((index, phase)) = unit
        .phases
        .iter()
        .enumerate()
        .find(|(_, p)| !p.is_complete)
    {
        return Err(WaypointError::not_ready(format!(
            "cannot aggregate rewards for unit {}: phase {} ({}) is incomplete",
            unit.id,
            index,
            phase.kind.label()
        )));
    }

    unit.phases
        .iter()
        .try_fold(Compensation::default(), |total, phase| {
            total.checked_add(phase.compensation)
        })
        .ok_or_else(|| {
            WaypointError::invalid_unit(format!("reward total for unit {} overflows", unit.id))
        })
}
