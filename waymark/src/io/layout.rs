//! On-disk layout for a workspace of plans.
//!
//! The layout is a contract shared with external collaborators (hook scripts,
//! viewers) and must stay bit-exact:
//!
//! ```text
//! plans/<plan-name>/
//!   workflow.toml
//!   state.json
//!   request.md
//!   dead-ends.json
//!   claude-progress.txt
//!   phases/<NN>-<phase-id>/
//!     tasks.json
//!     <artifact files>
//!     tasks/<task-id>/
//!       progress.txt
//!       blocker.md
//! ```
//!
//! `NN` is the zero-padded phase-history entry number, so every visit to a
//! phase gets its own directory. The `active-plan` and `session-mode` pointer
//! files live next to `plans/`.

use std::path::{Path, PathBuf};

pub const PLANS_DIR: &str = "plans";
pub const PHASES_DIR: &str = "phases";
pub const TASKS_DIR: &str = "tasks";

pub const WORKFLOW_FILE: &str = "workflow.toml";
pub const WORKFLOW_BACKUP_FILE: &str = "workflow.toml.bak";
pub const STATE_FILE: &str = "state.json";
pub const REQUEST_FILE: &str = "request.md";
pub const DEAD_ENDS_FILE: &str = "dead-ends.json";
pub const PLAN_PROGRESS_FILE: &str = "claude-progress.txt";
pub const TASKS_FILE: &str = "tasks.json";
pub const TASK_PROGRESS_FILE: &str = "progress.txt";
pub const BLOCKER_FILE: &str = "blocker.md";
pub const ACTIVE_PLAN_FILE: &str = "active-plan";
pub const SESSION_MODE_FILE: &str = "session-mode";

/// Paths for a workspace root holding `plans/` and the process-wide pointers.
#[derive(Debug, Clone)]
pub struct WorkspacePaths {
    root: PathBuf,
}

impl WorkspacePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn plans_dir(&self) -> PathBuf {
        self.root.join(PLANS_DIR)
    }

    pub fn plan_dir(&self, name: &str) -> PathBuf {
        self.plans_dir().join(name)
    }

    pub fn active_plan_path(&self) -> PathBuf {
        self.root.join(ACTIVE_PLAN_FILE)
    }

    pub fn session_mode_path(&self) -> PathBuf {
        self.root.join(SESSION_MODE_FILE)
    }
}

/// Paths inside one plan directory.
#[derive(Debug, Clone)]
pub struct PlanPaths {
    dir: PathBuf,
}

impl PlanPaths {
    pub fn new(workspace: &WorkspacePaths, name: &str) -> Self {
        Self {
            dir: workspace.plan_dir(name),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn workflow_path(&self) -> PathBuf {
        self.dir.join(WORKFLOW_FILE)
    }

    pub fn workflow_backup_path(&self) -> PathBuf {
        self.dir.join(WORKFLOW_BACKUP_FILE)
    }

    pub fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    pub fn request_path(&self) -> PathBuf {
        self.dir.join(REQUEST_FILE)
    }

    pub fn dead_ends_path(&self) -> PathBuf {
        self.dir.join(DEAD_ENDS_FILE)
    }

    pub fn progress_path(&self) -> PathBuf {
        self.dir.join(PLAN_PROGRESS_FILE)
    }

    /// `phases/<NN>-<phase-id>` for one history entry.
    pub fn phase_dir(&self, entry: u32, phase_id: &str) -> PathBuf {
        self.dir
            .join(PHASES_DIR)
            .join(format!("{entry:02}-{phase_id}"))
    }

    pub fn tasks_path(&self, entry: u32, phase_id: &str) -> PathBuf {
        self.phase_dir(entry, phase_id).join(TASKS_FILE)
    }

    /// Artifact file path relative to an entry's phase directory.
    pub fn artifact_path(&self, entry: u32, phase_id: &str, file: &str) -> PathBuf {
        self.phase_dir(entry, phase_id).join(file)
    }

    pub fn task_dir(&self, entry: u32, phase_id: &str, task_id: &str) -> PathBuf {
        self.phase_dir(entry, phase_id).join(TASKS_DIR).join(task_id)
    }

    pub fn task_progress_path(&self, entry: u32, phase_id: &str, task_id: &str) -> PathBuf {
        self.task_dir(entry, phase_id, task_id).join(TASK_PROGRESS_FILE)
    }

    pub fn blocker_path(&self, entry: u32, phase_id: &str, task_id: &str) -> PathBuf {
        self.task_dir(entry, phase_id, task_id).join(BLOCKER_FILE)
    }
}
