//! Workflow definitions: the phase graph loaded from `workflow.toml`.
//!
//! A workflow is a directed graph of phase definitions. Transition edges come
//! from `suggested_next` (plus the implicit self-edge for re-entry); every
//! referenced id must resolve within the graph, enforced at load and again
//! when an expansion commits.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Filesystem-safe identifier for plans, phases, and tasks.
static ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[a-z0-9][a-z0-9_-]*$").expect("id regex is valid"));

pub const MAX_ID_LEN: usize = 64;

pub fn valid_id(id: &str) -> bool {
    id.len() <= MAX_ID_LEN && ID_RE.is_match(id)
}

fn default_max_retries() -> u32 {
    3
}

/// One transition target: either a bare phase id or a gated edge that needs
/// explicit approval before `enter_phase` accepts it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NextPhase {
    Plain(String),
    Gated {
        phase: String,
        #[serde(default)]
        requires_approval: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prompt: Option<String>,
    },
}

impl NextPhase {
    pub fn phase(&self) -> &str {
        match self {
            NextPhase::Plain(id) => id,
            NextPhase::Gated { phase, .. } => phase,
        }
    }

    pub fn requires_approval(&self) -> bool {
        match self {
            NextPhase::Plain(_) => false,
            NextPhase::Gated {
                requires_approval, ..
            } => *requires_approval,
        }
    }

    pub fn prompt(&self) -> Option<&str> {
        match self {
            NextPhase::Plain(_) => None,
            NextPhase::Gated { prompt, .. } => prompt.as_deref(),
        }
    }

    /// Same edge retargeted at `phase`, preserving gating and prompt.
    pub fn retargeted(&self, phase: &str) -> NextPhase {
        match self {
            NextPhase::Plain(_) => NextPhase::Plain(phase.to_string()),
            NextPhase::Gated {
                requires_approval,
                prompt,
                ..
            } => NextPhase::Gated {
                phase: phase.to_string(),
                requires_approval: *requires_approval,
                prompt: prompt.clone(),
            },
        }
    }
}

/// Definition of one phase in the workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseDefinition {
    pub id: String,
    /// Prompt template reference; opaque to the engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default)]
    pub terminal: bool,
    #[serde(default)]
    pub use_tasks: bool,
    /// Artifact names this phase must record before it can be left.
    #[serde(default)]
    pub required_artifacts: Vec<String>,
    /// Artifact names consumed from upstream phases, resolved by name across
    /// phase history.
    #[serde(default)]
    pub context_artifacts: Vec<String>,
    #[serde(default)]
    pub suggested_next: Vec<NextPhase>,
    /// Phase to route to when blocked; `None` means route to self.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_blocked: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub allow_proposals: bool,
    #[serde(default)]
    pub allow_prototypes: bool,
}

impl PhaseDefinition {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            prompt: None,
            terminal: false,
            use_tasks: false,
            required_artifacts: Vec::new(),
            context_artifacts: Vec::new(),
            suggested_next: Vec::new(),
            on_blocked: None,
            max_retries: default_max_retries(),
            allow_proposals: false,
            allow_prototypes: false,
        }
    }
}

/// The phase graph, copied into each plan at creation and immutable except
/// through controlled expansion. The first phase is the initial phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub phases: Vec<PhaseDefinition>,
}

impl WorkflowDefinition {
    pub fn phase(&self, id: &str) -> Option<&PhaseDefinition> {
        self.phases.iter().find(|phase| phase.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.phase(id).is_some()
    }

    pub fn initial_phase(&self) -> Option<&PhaseDefinition> {
        self.phases.first()
    }

    /// Where `phase` routes when its tasks are blocked (self if unset).
    pub fn on_blocked_target<'a>(&self, phase: &'a PhaseDefinition) -> &'a str {
        phase.on_blocked.as_deref().unwrap_or(&phase.id)
    }

    /// Graph-level invariants: non-empty, unique well-formed ids, every
    /// `suggested_next` / `on_blocked` reference resolves, and non-terminal
    /// phases have at least one outgoing edge.
    ///
    /// Returns a list of stable error messages (empty on success).
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.phases.is_empty() {
            errors.push("workflow has no phases".to_string());
            return errors;
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for phase in &self.phases {
            if !valid_id(&phase.id) {
                errors.push(format!("invalid phase id '{}'", phase.id));
            }
            if !seen.insert(phase.id.as_str()) {
                errors.push(format!("duplicate phase id '{}'", phase.id));
            }
        }

        for phase in &self.phases {
            for next in &phase.suggested_next {
                if !self.contains(next.phase()) {
                    errors.push(format!(
                        "phase '{}': suggested_next references unknown phase '{}'",
                        phase.id,
                        next.phase()
                    ));
                }
            }
            if let Some(target) = &phase.on_blocked {
                if !self.contains(target) {
                    errors.push(format!(
                        "phase '{}': on_blocked references unknown phase '{}'",
                        phase.id, target
                    ));
                }
            }
            if !phase.terminal && phase.suggested_next.is_empty() {
                errors.push(format!(
                    "phase '{}': non-terminal phase has no suggested_next",
                    phase.id
                ));
            }
        }

        errors
    }
}
