//! Task records and the status transition rules.
//!
//! A task's status only ever moves forward (todo -> in-progress -> done), with
//! the single side-exit to `blocked` and the manual reset `blocked -> todo`
//! for rework. Tasks are never deleted, only superseded by new tasks that list
//! them as parents.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Task status. Exactly these four values are valid on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Done,
    Blocked,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in-progress",
            TaskStatus::Done => "done",
            TaskStatus::Blocked => "blocked",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "todo" => Ok(TaskStatus::Todo),
            "in-progress" => Ok(TaskStatus::InProgress),
            "done" => Ok(TaskStatus::Done),
            "blocked" => Ok(TaskStatus::Blocked),
            other => Err(format!(
                "unknown status '{other}' (expected todo, in-progress, done, or blocked)"
            )),
        }
    }
}

/// Optional task flavor; plain tasks carry no `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskType {
    Prototype,
    CacheReference,
}

/// A schedulable unit of work scoped to one phase entry.
///
/// `steps` is advisory and not separately tracked. `hints` round-trips opaque
/// execution metadata (subagent kind, model hint, anything the driver adds)
/// without the engine interpreting it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub description: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub task_type: Option<TaskType>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<String>,
    #[serde(flatten)]
    pub hints: BTreeMap<String, serde_json::Value>,
}

impl Task {
    /// New `todo` task with no parents, steps, or hints.
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            status: TaskStatus::Todo,
            parents: Vec::new(),
            steps: Vec::new(),
            task_type: None,
            resources: Vec::new(),
            hints: BTreeMap::new(),
        }
    }
}

/// Check a single status transition against the permitted set.
///
/// Permitted: todo -> in-progress, in-progress -> done,
/// in-progress -> blocked, todo -> blocked, blocked -> todo.
pub fn validate_transition(task_id: &str, from: TaskStatus, to: TaskStatus) -> Result<()> {
    let permitted = matches!(
        (from, to),
        (TaskStatus::Todo, TaskStatus::InProgress)
            | (TaskStatus::InProgress, TaskStatus::Done)
            | (TaskStatus::InProgress, TaskStatus::Blocked)
            | (TaskStatus::Todo, TaskStatus::Blocked)
            | (TaskStatus::Blocked, TaskStatus::Todo)
    );
    if permitted {
        Ok(())
    } else {
        Err(Error::InvalidTransition {
            task_id: task_id.to_string(),
            from,
            to,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [TaskStatus; 4] = [
        TaskStatus::Todo,
        TaskStatus::InProgress,
        TaskStatus::Done,
        TaskStatus::Blocked,
    ];

    /// The permitted transition set is exactly the five pairs from the contract.
    #[test]
    fn transition_table_is_exact() {
        let permitted = [
            (TaskStatus::Todo, TaskStatus::InProgress),
            (TaskStatus::InProgress, TaskStatus::Done),
            (TaskStatus::InProgress, TaskStatus::Blocked),
            (TaskStatus::Todo, TaskStatus::Blocked),
            (TaskStatus::Blocked, TaskStatus::Todo),
        ];
        for from in ALL {
            for to in ALL {
                let result = validate_transition("t", from, to);
                if permitted.contains(&(from, to)) {
                    assert!(result.is_ok(), "{from} -> {to} should be permitted");
                } else {
                    assert!(
                        matches!(
                            result,
                            Err(Error::InvalidTransition { .. })
                        ),
                        "{from} -> {to} should be rejected"
                    );
                }
            }
        }
    }

    /// done -> todo and todo -> done are both rejected (monotonic status).
    #[test]
    fn no_shortcuts_or_reversals() {
        assert!(validate_transition("t", TaskStatus::Done, TaskStatus::Todo).is_err());
        assert!(validate_transition("t", TaskStatus::Todo, TaskStatus::Done).is_err());
    }

    /// Wire shape: kebab-case statuses and opaque hints survive a round trip.
    #[test]
    fn task_json_shape_round_trips() {
        let raw = r#"{
            "id": "t1",
            "description": "do a thing",
            "status": "in-progress",
            "parents": ["t0"],
            "steps": ["first", "second"],
            "type": "cache-reference",
            "resources": ["db"],
            "subagent": "explorer",
            "model": "small"
        }"#;
        let task: Task = serde_json::from_str(raw).expect("parse task");
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.task_type, Some(TaskType::CacheReference));
        assert_eq!(task.hints.get("subagent").and_then(|v| v.as_str()), Some("explorer"));

        let encoded = serde_json::to_string(&task).expect("serialize task");
        let reparsed: Task = serde_json::from_str(&encoded).expect("reparse task");
        assert_eq!(reparsed, task);
        assert!(encoded.contains("\"in-progress\""));
        assert!(encoded.contains("\"model\""));
    }

    #[test]
    fn status_from_str_rejects_unknown() {
        assert_eq!("in-progress".parse::<TaskStatus>(), Ok(TaskStatus::InProgress));
        assert!("in_progress".parse::<TaskStatus>().is_err());
        assert!("cancelled".parse::<TaskStatus>().is_err());
    }

    /// Plain tasks omit optional fields on the wire.
    #[test]
    fn optional_fields_are_omitted_when_absent() {
        let encoded = serde_json::to_string(&Task::new("t", "desc")).expect("serialize");
        assert!(!encoded.contains("\"type\""));
        assert!(!encoded.contains("\"resources\""));
        assert!(encoded.contains("\"parents\""));
        assert!(encoded.contains("\"steps\""));
    }
}
