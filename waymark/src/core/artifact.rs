//! Artifact contract resolution between phases.
//!
//! Contracts are by name, not by positional phase wiring, so expansion can
//! insert phases between a producer and a consumer without rewriting every
//! contract. Consumption is soft: an unresolvable name is reported, not fatal.

use crate::core::state::{PhaseHistoryEntry, PlanState};

/// A context artifact resolved to the history entry that recorded it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedArtifact {
    pub name: String,
    /// Phase id that produced the artifact.
    pub phase: String,
    /// History entry number the record belongs to.
    pub entry: u32,
    /// File path relative to that entry's phase directory.
    pub file: String,
}

/// Outcome of resolving a phase's `context_artifacts` list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextResolution {
    /// In `context_artifacts` order.
    pub resolved: Vec<ResolvedArtifact>,
    /// Names no upstream entry ever recorded.
    pub missing: Vec<String>,
}

/// Resolve each name to the most recent history entry (any phase) that
/// recorded it.
pub fn resolve_context(state: &PlanState, names: &[String]) -> ContextResolution {
    let mut resolution = ContextResolution::default();
    for name in names {
        match state.latest_artifact(name) {
            Some(entry) => resolution.resolved.push(ResolvedArtifact {
                name: name.clone(),
                phase: entry.phase.clone(),
                entry: entry.entry,
                file: entry.artifacts[name].clone(),
            }),
            None => resolution.missing.push(name.clone()),
        }
    }
    resolution
}

/// Required artifact names with no record on `entry`. Used by the exit guard.
pub fn missing_required(required: &[String], entry: &PhaseHistoryEntry) -> Vec<String> {
    required
        .iter()
        .filter(|name| !entry.artifacts.contains_key(*name))
        .cloned()
        .collect()
}
