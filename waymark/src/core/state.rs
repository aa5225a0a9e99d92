//! Plan state: the mutable pointer into the workflow definition.
//!
//! Stored at `plans/<name>/state.json`. The state machine is authoritative;
//! progress logs are orientation only. Entry numbers are 1-indexed and never
//! reused, even across re-entries of the same phase id.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Minimum reason length for re-entering a phase. A deliberate speed bump
/// forcing the caller to articulate what changed since the last visit.
pub const MIN_REENTRY_REASON_LEN: usize = 30;

fn default_max_auto_iterations() -> u32 {
    25
}

/// One concrete visit to a phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseHistoryEntry {
    /// 1-indexed, strictly increasing across the plan's lifetime.
    pub entry: u32,
    pub phase: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_file: Option<String>,
    pub entered_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exited_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
    /// Artifact records for this entry: name -> file path relative to the
    /// entry's phase directory.
    #[serde(default)]
    pub artifacts: BTreeMap<String, String>,
}

/// Per-phase mutable bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseMeta {
    /// Re-entry count for this phase id. Exceeding the phase's `max_retries`
    /// is surfaced for escalation, never auto-failed.
    #[serde(default)]
    pub retries: u32,
}

/// A transition awaiting (or granted) explicit user confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingApproval {
    pub from: String,
    pub to: String,
    pub approved: bool,
    pub requested_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanState {
    pub current_phase: String,
    pub history: Vec<PhaseHistoryEntry>,
    #[serde(default)]
    pub phase_meta: BTreeMap<String, PhaseMeta>,
    /// Safety valve for the external auto-continue loop.
    #[serde(default)]
    pub auto_iterations: u32,
    #[serde(default = "default_max_auto_iterations")]
    pub max_auto_iterations: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_approval: Option<PendingApproval>,
}

impl PlanState {
    /// Fresh state positioned at `initial_phase` as entry 1.
    pub fn new(initial_phase: &str, entered_at: String, reason: Option<String>) -> Self {
        Self {
            current_phase: initial_phase.to_string(),
            history: vec![PhaseHistoryEntry {
                entry: 1,
                phase: initial_phase.to_string(),
                reason,
                reason_file: None,
                entered_at,
                exited_at: None,
                outcome: None,
                artifacts: BTreeMap::new(),
            }],
            phase_meta: BTreeMap::new(),
            auto_iterations: 0,
            max_auto_iterations: default_max_auto_iterations(),
            pending_approval: None,
        }
    }

    pub fn current_entry(&self) -> Option<&PhaseHistoryEntry> {
        self.history.last()
    }

    pub fn current_entry_mut(&mut self) -> Option<&mut PhaseHistoryEntry> {
        self.history.last_mut()
    }

    pub fn next_entry_number(&self) -> u32 {
        self.history.len() as u32 + 1
    }

    /// How many history entries exist for `phase` (0 = never entered).
    pub fn visits(&self, phase: &str) -> usize {
        self.history.iter().filter(|e| e.phase == phase).count()
    }

    pub fn retries(&self, phase: &str) -> u32 {
        self.phase_meta.get(phase).map_or(0, |meta| meta.retries)
    }

    /// Newest-first scan for the most recent entry recording artifact `name`.
    pub fn latest_artifact(&self, name: &str) -> Option<&PhaseHistoryEntry> {
        self.history
            .iter()
            .rev()
            .find(|entry| entry.artifacts.contains_key(name))
    }

    /// State invariants checked on every load: non-empty history, entry
    /// numbers exactly `1..=n`, and `current_phase` matching the last entry.
    ///
    /// Returns a list of stable error messages (empty on success).
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.history.is_empty() {
            errors.push("phase history is empty".to_string());
            return errors;
        }

        for (index, entry) in self.history.iter().enumerate() {
            let expected = index as u32 + 1;
            if entry.entry != expected {
                errors.push(format!(
                    "history entry at position {} has number {} (expected {})",
                    index, entry.entry, expected
                ));
            }
        }

        if let Some(last) = self.history.last() {
            if last.phase != self.current_phase {
                errors.push(format!(
                    "current phase '{}' does not match last history entry '{}'",
                    self.current_phase, last.phase
                ));
            }
        }

        errors
    }
}
