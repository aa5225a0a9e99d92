//! Plan state load/save with invariant validation.

use std::path::Path;

use tracing::debug;

use crate::core::state::PlanState;
use crate::error::{Error, Result};
use crate::io::store::{read_json, write_json_atomic};

/// Load state from disk, rejecting files that violate the state invariants
/// (entry numbering, current-phase/last-entry agreement).
pub fn load_state(path: &Path) -> Result<PlanState> {
    let state: PlanState = read_json(path)?;
    let errors = state.validate();
    if !errors.is_empty() {
        return Err(Error::Validation { problems: errors });
    }
    debug!(
        current_phase = %state.current_phase,
        entries = state.history.len(),
        "state loaded"
    );
    Ok(state)
}

/// Atomically write state to disk (temp file + rename).
pub fn write_state(path: &Path, state: &PlanState) -> Result<()> {
    let errors = state.validate();
    if !errors.is_empty() {
        return Err(Error::Validation { problems: errors });
    }
    debug!(current_phase = %state.current_phase, "writing state");
    write_json_atomic(path, state)
}
