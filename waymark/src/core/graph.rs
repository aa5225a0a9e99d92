//! Dependency resolution and availability over a phase's task set.
//!
//! Availability is a pure function over (status, parents, resources),
//! recomputed on demand. There is no cached ready queue to keep consistent,
//! which removes a whole class of staleness bugs across crash/resume.

use std::collections::{BTreeSet, HashSet};

use crate::core::task::{Task, TaskStatus};
use crate::error::{Error, Result};

pub fn find<'a>(tasks: &'a [Task], id: &str) -> Option<&'a Task> {
    tasks.iter().find(|task| task.id == id)
}

/// Validate a task about to join `tasks`: unique id, known parents, no cycle.
pub fn validate_new_task(tasks: &[Task], task: &Task) -> Result<()> {
    if tasks.iter().any(|existing| existing.id == task.id) {
        return Err(Error::DuplicateId {
            task_id: task.id.clone(),
        });
    }
    validate_parent_edges(tasks, &task.id, &task.parents)
}

/// Validate giving `task_id` the parent set `parents` against `tasks`.
///
/// Used both for new tasks and for atomic parent replacement. The cycle check
/// walks ancestor chains from each declared parent; reaching `task_id` means
/// the task would be its own ancestor.
pub fn validate_parent_edges(tasks: &[Task], task_id: &str, parents: &[String]) -> Result<()> {
    for parent in parents {
        if parent == task_id {
            return Err(Error::Cycle {
                task_id: task_id.to_string(),
            });
        }
        if find(tasks, parent).is_none() {
            return Err(Error::InvalidParent {
                task_id: task_id.to_string(),
                parent_id: parent.clone(),
            });
        }
    }

    let mut seen: HashSet<&str> = HashSet::new();
    let mut stack: Vec<&str> = parents.iter().map(String::as_str).collect();
    while let Some(current) = stack.pop() {
        if current == task_id {
            return Err(Error::Cycle {
                task_id: task_id.to_string(),
            });
        }
        if !seen.insert(current) {
            continue;
        }
        if let Some(node) = find(tasks, current) {
            stack.extend(node.parents.iter().map(String::as_str));
        }
    }
    Ok(())
}

/// Tasks ready to claim, in creation order.
///
/// A task is available iff its status is `todo`, every parent is `done`, and
/// none of its `resources` tokens is held by a task currently `in-progress`.
pub fn available_tasks(tasks: &[Task]) -> Vec<&Task> {
    let held: BTreeSet<&str> = tasks
        .iter()
        .filter(|task| task.status == TaskStatus::InProgress)
        .flat_map(|task| task.resources.iter().map(String::as_str))
        .collect();

    tasks
        .iter()
        .filter(|task| task.status == TaskStatus::Todo)
        .filter(|task| {
            task.parents.iter().all(|parent| {
                matches!(find(tasks, parent), Some(p) if p.status == TaskStatus::Done)
            })
        })
        .filter(|task| {
            task.resources
                .iter()
                .all(|token| !held.contains(token.as_str()))
        })
        .collect()
}

pub fn blocked_tasks(tasks: &[Task]) -> Vec<&Task> {
    tasks
        .iter()
        .filter(|task| task.status == TaskStatus::Blocked)
        .collect()
}

pub fn has_blockers(tasks: &[Task]) -> bool {
    tasks.iter().any(|task| task.status == TaskStatus::Blocked)
}

/// Whole-set invariants checked when loading `tasks.json`: unique ids, parents
/// resolve within the set, and the parent graph is acyclic.
///
/// Returns a list of stable error messages (empty on success).
pub fn validate_task_set(tasks: &[Task]) -> Vec<String> {
    let mut errors = Vec::new();

    let mut seen: HashSet<&str> = HashSet::new();
    for task in tasks {
        if !seen.insert(task.id.as_str()) {
            errors.push(format!("duplicate task id '{}'", task.id));
        }
    }

    for task in tasks {
        for parent in &task.parents {
            if find(tasks, parent).is_none() {
                errors.push(format!(
                    "task '{}' references unknown parent '{}'",
                    task.id, parent
                ));
            }
        }
    }

    for task in tasks {
        if in_own_ancestry(tasks, task) {
            errors.push(format!("task '{}' is part of a dependency cycle", task.id));
        }
    }

    errors
}

fn in_own_ancestry(tasks: &[Task], task: &Task) -> bool {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut stack: Vec<&str> = task.parents.iter().map(String::as_str).collect();
    while let Some(current) = stack.pop() {
        if current == task.id {
            return true;
        }
        if !seen.insert(current) {
            continue;
        }
        if let Some(node) = find(tasks, current) {
            stack.extend(node.parents.iter().map(String::as_str));
        }
    }
    false
}
