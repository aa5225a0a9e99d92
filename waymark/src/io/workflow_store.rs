//! Workflow definition load/save plus the single-level expansion backup.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::core::workflow::WorkflowDefinition;
use crate::error::{Error, Result};
use crate::io::store::{read_toml, write_toml_atomic};

/// Load and validate a workflow definition from TOML.
pub fn load_workflow(path: &Path) -> Result<WorkflowDefinition> {
    let workflow: WorkflowDefinition = read_toml(path)?;
    let errors = workflow.validate();
    if !errors.is_empty() {
        return Err(Error::Validation { problems: errors });
    }
    Ok(workflow)
}

/// Atomically write a workflow definition, re-validating first.
pub fn write_workflow(path: &Path, workflow: &WorkflowDefinition) -> Result<()> {
    let errors = workflow.validate();
    if !errors.is_empty() {
        return Err(Error::Validation { problems: errors });
    }
    write_toml_atomic(path, workflow)
}

/// Full backup copy taken before an expansion commits. Only one level is
/// kept; a second expansion overwrites the previous backup.
pub fn backup_workflow(path: &Path, backup_path: &Path) -> Result<()> {
    debug!(from = %path.display(), to = %backup_path.display(), "backing up workflow");
    fs::copy(path, backup_path).map_err(|source| Error::Io {
        op: "back up",
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Restore the most recent backup over the live definition, consuming it.
pub fn restore_backup(path: &Path, backup_path: &Path) -> Result<()> {
    if !backup_path.exists() {
        return Err(Error::NoBackup {
            path: backup_path.to_path_buf(),
        });
    }
    debug!(from = %backup_path.display(), to = %path.display(), "restoring workflow backup");
    fs::rename(backup_path, path).map_err(|source| Error::Io {
        op: "restore",
        path: backup_path.to_path_buf(),
        source,
    })
}
