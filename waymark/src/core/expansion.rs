//! Runtime workflow expansion: validated, atomic phase-graph splicing.
//!
//! An expansion replaces one existing edge (`insert_after` -> `before`) with a
//! detour through a new subgraph. Subgraph phases may reference `before`
//! directly as their exit edge; everything else must resolve inside the union
//! of the existing definition and the subgraph. Validation is all-or-nothing
//! and side-effect-free; the commit step backs up the definition first.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::core::workflow::{PhaseDefinition, WorkflowDefinition, valid_id};

/// A subgraph to splice into an existing workflow definition.
///
/// `insert_after` and `before` name existing phases (the stitching points);
/// `entry` names the subgraph phase that takes over the rewired edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSubgraph {
    pub insert_after: String,
    pub before: String,
    pub entry: String,
    pub phases: Vec<PhaseDefinition>,
}

/// Validate `subgraph` against `def`, collecting every problem found.
///
/// Returns a list of stable error messages (empty when the splice is safe).
pub fn validate_expansion(def: &WorkflowDefinition, subgraph: &WorkflowSubgraph) -> Vec<String> {
    let mut errors = Vec::new();

    if subgraph.phases.is_empty() {
        errors.push("expansion subgraph has no phases".to_string());
    }

    match def.phase(&subgraph.insert_after) {
        None => errors.push(format!(
            "insertion point '{}' is not in the workflow",
            subgraph.insert_after
        )),
        Some(phase) => {
            let has_edge = phase
                .suggested_next
                .iter()
                .any(|next| next.phase() == subgraph.before);
            if !has_edge {
                errors.push(format!(
                    "phase '{}' has no outgoing edge to '{}'",
                    subgraph.insert_after, subgraph.before
                ));
            }
        }
    }

    if !def.contains(&subgraph.before) {
        errors.push(format!(
            "original target '{}' is not in the workflow",
            subgraph.before
        ));
    }

    let mut new_ids: HashSet<&str> = HashSet::new();
    for phase in &subgraph.phases {
        if !valid_id(&phase.id) {
            errors.push(format!("invalid subgraph phase id '{}'", phase.id));
        }
        if !new_ids.insert(phase.id.as_str()) {
            errors.push(format!("duplicate subgraph phase id '{}'", phase.id));
        }
        if def.contains(&phase.id) {
            errors.push(format!(
                "subgraph phase id '{}' collides with an existing phase",
                phase.id
            ));
        }
    }

    if !new_ids.contains(subgraph.entry.as_str()) {
        errors.push(format!(
            "subgraph entry '{}' is not one of the subgraph phases",
            subgraph.entry
        ));
    }

    // Internal edges must resolve within the union of {definition, subgraph}.
    let in_union =
        |id: &str| def.contains(id) || new_ids.contains(id);
    for phase in &subgraph.phases {
        for next in &phase.suggested_next {
            if !in_union(next.phase()) {
                errors.push(format!(
                    "subgraph phase '{}': suggested_next references unknown phase '{}'",
                    phase.id,
                    next.phase()
                ));
            }
        }
        if let Some(target) = &phase.on_blocked {
            if !in_union(target) {
                errors.push(format!(
                    "subgraph phase '{}': on_blocked references unknown phase '{}'",
                    phase.id, target
                ));
            }
        }
    }

    // Only revalidate the spliced result when the pieces were individually
    // sound; otherwise the splice itself is not well-defined.
    if errors.is_empty() {
        errors.extend(splice(def, subgraph).validate());
    }

    errors
}

/// Produce the spliced definition. Call only after `validate_expansion`
/// returned no problems.
pub fn splice(def: &WorkflowDefinition, subgraph: &WorkflowSubgraph) -> WorkflowDefinition {
    let mut spliced = def.clone();
    for phase in &mut spliced.phases {
        if phase.id != subgraph.insert_after {
            continue;
        }
        for next in &mut phase.suggested_next {
            if next.phase() == subgraph.before {
                *next = next.retargeted(&subgraph.entry);
            }
        }
    }
    spliced.phases.extend(subgraph.phases.iter().cloned());
    spliced
}
