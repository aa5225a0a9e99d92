//! Task set load/save with schema + invariant validation.

use std::path::Path;

use jsonschema::validator_for;
use serde_json::Value;

use crate::core::graph::validate_task_set;
use crate::core::task::Task;
use crate::error::{Error, Result};
use crate::io::store::{read_to_string, write_json_atomic};

const TASK_SET_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../schemas/task_set/v1.schema.json"
));

/// Load and validate a phase's task set (schema + graph invariants).
pub fn load_tasks(path: &Path) -> Result<Vec<Task>> {
    let contents = read_to_string(path)?;
    let value: Value = serde_json::from_str(&contents).map_err(|source| Error::Json {
        path: path.to_path_buf(),
        source,
    })?;
    validate_schema(path, &value)?;
    let tasks: Vec<Task> = serde_json::from_value(value).map_err(|source| Error::Json {
        path: path.to_path_buf(),
        source,
    })?;
    let errors = validate_task_set(&tasks);
    if !errors.is_empty() {
        return Err(Error::Validation { problems: errors });
    }
    Ok(tasks)
}

/// Write a task set atomically. Invariants are re-checked so a buggy caller
/// cannot persist a corrupt set.
pub fn write_tasks(path: &Path, tasks: &[Task]) -> Result<()> {
    let errors = validate_task_set(tasks);
    if !errors.is_empty() {
        return Err(Error::Validation { problems: errors });
    }
    write_json_atomic(path, &tasks)
}

fn validate_schema(path: &Path, value: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(TASK_SET_SCHEMA).map_err(|source| Error::Json {
        path: path.to_path_buf(),
        source,
    })?;
    let compiled = validator_for(&schema)
        .map_err(|err| Error::validation(format!("invalid task set schema: {err}")))?;
    let problems: Vec<String> = compiled
        .iter_errors(value)
        .map(|err| format!("{}: {err}", path.display()))
        .collect();
    if problems.is_empty() {
        Ok(())
    } else {
        Err(Error::Validation { problems })
    }
}
