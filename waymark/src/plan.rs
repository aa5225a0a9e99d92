//! Plan orchestration: coordinates the pure core with the persisted store.
//!
//! Every operation is a bounded, synchronous read-modify-write: load the
//! relevant state file, apply the pure checks, commit with an atomic replace.
//! Nothing is cached between calls, so a driver process can die and restart
//! at any point and reconstruct exactly where it left off from disk alone.
//!
//! There is exactly one logical writer per plan by convention; concurrent
//! drivers on the same plan are outside the guarantees (last write wins).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::core::artifact;
use crate::core::expansion::{WorkflowSubgraph, splice, validate_expansion};
use crate::core::graph;
use crate::core::state::{
    MIN_REENTRY_REASON_LEN, PendingApproval, PhaseHistoryEntry, PlanState,
};
use crate::core::task::{self, Task, TaskStatus, TaskType};
use crate::core::workflow::{NextPhase, WorkflowDefinition, valid_id};
use crate::error::{Error, Result};
use crate::io::advisory::{AdvisoryKind, AdvisoryRecord, append_record};
use crate::io::layout::{PlanPaths, WorkspacePaths};
use crate::io::pointers::{clear_pointer, read_pointer, write_pointer};
use crate::io::progress::{append_entry, now_rfc3339};
use crate::io::state_store::{load_state, write_state};
use crate::io::store::{read_to_string, write_atomic};
use crate::io::task_store::{load_tasks, write_tasks};
use crate::io::workflow_store::{
    backup_workflow, load_workflow, restore_backup, write_workflow,
};

/// Why a phase is being entered: inline text or a reason file reference.
#[derive(Debug, Clone)]
pub enum EntryReason {
    Text(String),
    File(PathBuf),
}

impl EntryReason {
    pub fn text(reason: impl Into<String>) -> Self {
        EntryReason::Text(reason.into())
    }

    /// Resolve to (reason text, reason-file reference). Reading the file is
    /// the caller-visible existence check.
    fn into_parts(self) -> Result<(Option<String>, Option<String>)> {
        match self {
            EntryReason::Text(text) => Ok((Some(text), None)),
            EntryReason::File(path) => {
                if !path.exists() {
                    return Err(Error::FileNotFound { path });
                }
                let contents = read_to_string(&path)?;
                Ok((Some(contents), Some(path.display().to_string())))
            }
        }
    }
}

/// One configured transition out of the current phase, annotated for the
/// external driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestedTransition {
    pub phase: String,
    pub requires_approval: bool,
    pub prompt: Option<String>,
    /// The target's retry counter has reached its `max_retries`; the driver
    /// should escalate to a human rather than loop again.
    pub escalate: bool,
}

/// A context artifact with its file content, ready for injection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextArtifact {
    pub name: String,
    pub phase: String,
    pub entry: u32,
    pub content: String,
}

/// Result of assembling a phase's `context_artifacts`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextArtifacts {
    pub resolved: Vec<ContextArtifact>,
    /// Names with no usable upstream record; a warning, not an error.
    pub missing: Vec<String>,
}

/// A workspace root: the `plans/` directory plus the process-wide pointers.
#[derive(Debug, Clone)]
pub struct Workspace {
    paths: WorkspacePaths,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            paths: WorkspacePaths::new(root),
        }
    }

    pub fn paths(&self) -> &WorkspacePaths {
        &self.paths
    }

    /// Create a plan: persist the workflow copy, seed state at the workflow's
    /// first phase as entry 1, and lay out the plan directory.
    pub fn create_plan(
        &self,
        name: &str,
        request: &str,
        workflow: &WorkflowDefinition,
    ) -> Result<Plan> {
        if !valid_id(name) {
            return Err(Error::validation(format!("invalid plan name '{name}'")));
        }
        let errors = workflow.validate();
        if !errors.is_empty() {
            return Err(Error::Validation { problems: errors });
        }
        let paths = PlanPaths::new(&self.paths, name);
        if paths.state_path().exists() {
            return Err(Error::validation(format!("plan '{name}' already exists")));
        }
        let initial = workflow
            .initial_phase()
            .ok_or_else(|| Error::validation("workflow has no phases"))?;

        write_workflow(&paths.workflow_path(), workflow)?;
        write_atomic(&paths.request_path(), &format!("{}\n", request.trim_end()))?;
        let no_records: Vec<AdvisoryRecord> = Vec::new();
        crate::io::store::write_json_atomic(&paths.dead_ends_path(), &no_records)?;

        let now = now_rfc3339();
        let state = PlanState::new(&initial.id, now.clone(), Some("plan created".to_string()));
        let phase_dir = paths.phase_dir(1, &initial.id);
        create_dir(&phase_dir)?;
        if initial.use_tasks {
            write_tasks(&paths.tasks_path(1, &initial.id), &[])?;
        }
        // State is the authoritative commit point, written last.
        write_state(&paths.state_path(), &state)?;
        append_entry(
            &paths.progress_path(),
            &now,
            &format!("created plan '{name}'; enter phase '{}' (entry 1)", initial.id),
        )?;
        info!(plan = %name, phase = %initial.id, "plan created");

        Ok(Plan {
            name: name.to_string(),
            paths,
        })
    }

    pub fn open_plan(&self, name: &str) -> Result<Plan> {
        let paths = PlanPaths::new(&self.paths, name);
        if !paths.state_path().exists() {
            return Err(Error::UnknownPlan {
                name: name.to_string(),
            });
        }
        Ok(Plan {
            name: name.to_string(),
            paths,
        })
    }

    /// The plan named by the `active-plan` pointer, if any.
    pub fn active_plan(&self) -> Result<Option<Plan>> {
        match read_pointer(&self.paths.active_plan_path())? {
            Some(name) => Ok(Some(self.open_plan(&name)?)),
            None => Ok(None),
        }
    }

    pub fn set_active_plan(&self, name: &str) -> Result<()> {
        // Pointer must reference a plan that exists.
        self.open_plan(name)?;
        write_pointer(&self.paths.active_plan_path(), name)
    }

    pub fn clear_active_plan(&self) -> Result<()> {
        clear_pointer(&self.paths.active_plan_path())
    }

    pub fn session_mode(&self) -> Result<Option<String>> {
        read_pointer(&self.paths.session_mode_path())
    }

    pub fn set_session_mode(&self, mode: &str) -> Result<()> {
        if mode.trim().is_empty() {
            return Err(Error::validation("session mode must not be blank"));
        }
        write_pointer(&self.paths.session_mode_path(), mode)
    }

    pub fn clear_session_mode(&self) -> Result<()> {
        clear_pointer(&self.paths.session_mode_path())
    }
}

/// One named unit of tracked, resumable work.
#[derive(Debug, Clone)]
pub struct Plan {
    name: String,
    paths: PlanPaths,
}

impl Plan {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn paths(&self) -> &PlanPaths {
        &self.paths
    }

    pub fn state(&self) -> Result<PlanState> {
        load_state(&self.paths.state_path())
    }

    pub fn workflow(&self) -> Result<WorkflowDefinition> {
        load_workflow(&self.paths.workflow_path())
    }

    /// The current phase's task set. A missing `tasks.json` reads as empty so
    /// a crash between directory seeding and the state commit stays harmless.
    pub fn tasks(&self) -> Result<Vec<Task>> {
        let state = self.state()?;
        let entry = current_entry(&state)?;
        self.tasks_at(entry.entry, &entry.phase)
    }

    fn tasks_at(&self, entry: u32, phase: &str) -> Result<Vec<Task>> {
        let path = self.paths.tasks_path(entry, phase);
        if !path.exists() {
            return Ok(Vec::new());
        }
        load_tasks(&path)
    }

    // ---- task graph engine ----

    /// Add a task to the current phase's set.
    pub fn add_task(&self, new_task: Task) -> Result<()> {
        let workflow = self.workflow()?;
        let state = self.state()?;
        let entry = current_entry(&state)?;
        let phase = workflow
            .phase(&entry.phase)
            .ok_or_else(|| Error::UnknownPhase {
                phase_id: entry.phase.clone(),
            })?;
        if !phase.use_tasks {
            return Err(Error::validation(format!(
                "phase '{}' does not track tasks",
                phase.id
            )));
        }
        if !valid_id(&new_task.id) {
            return Err(Error::validation(format!(
                "invalid task id '{}'",
                new_task.id
            )));
        }
        if new_task.task_type == Some(TaskType::Prototype) && !phase.allow_prototypes {
            return Err(Error::validation(format!(
                "phase '{}' does not allow prototype tasks",
                phase.id
            )));
        }

        let mut tasks = self.tasks_at(entry.entry, &entry.phase)?;
        graph::validate_new_task(&tasks, &new_task)?;
        let task_id = new_task.id.clone();
        tasks.push(new_task);
        write_tasks(&self.paths.tasks_path(entry.entry, &entry.phase), &tasks)?;
        append_entry(
            &self.paths.progress_path(),
            &now_rfc3339(),
            &format!("task '{task_id}' added to phase '{}'", entry.phase),
        )?;
        debug!(task = %task_id, phase = %entry.phase, "task added");
        Ok(())
    }

    /// Transition a task's status, enforcing the permitted moves and the
    /// blocker-record precondition for `blocked`.
    pub fn set_status(&self, task_id: &str, new_status: TaskStatus) -> Result<()> {
        let state = self.state()?;
        let entry = current_entry(&state)?;
        let (entry_no, phase) = (entry.entry, entry.phase.clone());

        let mut tasks = self.tasks_at(entry_no, &phase)?;
        let Some(position) = tasks.iter().position(|t| t.id == task_id) else {
            return Err(Error::UnknownTask {
                task_id: task_id.to_string(),
            });
        };
        let from = tasks[position].status;
        task::validate_transition(task_id, from, new_status)?;

        if new_status == TaskStatus::Blocked {
            // Hard precondition: the blocker record must already exist.
            let blocker = self.paths.blocker_path(entry_no, &phase, task_id);
            if !blocker.exists() {
                return Err(Error::MissingBlockerRecord {
                    task_id: task_id.to_string(),
                    path: blocker,
                });
            }
        }

        tasks[position].status = new_status;
        write_tasks(&self.paths.tasks_path(entry_no, &phase), &tasks)?;

        let now = now_rfc3339();
        append_entry(
            &self.paths.task_progress_path(entry_no, &phase, task_id),
            &now,
            &format!("status {from} -> {new_status}"),
        )?;
        append_entry(
            &self.paths.progress_path(),
            &now,
            &format!("task '{task_id}': {from} -> {new_status}"),
        )?;
        info!(task = %task_id, %from, to = %new_status, "task status changed");
        Ok(())
    }

    /// Tasks ready to claim, in creation order. The engine's sole admission
    /// function; it performs no execution itself.
    pub fn available_tasks(&self) -> Result<Vec<Task>> {
        let tasks = self.tasks()?;
        Ok(graph::available_tasks(&tasks).into_iter().cloned().collect())
    }

    /// True iff any task in the current phase is blocked. While true, phase
    /// transitions other than the `on_blocked` route are refused.
    pub fn has_blockers(&self) -> Result<bool> {
        Ok(graph::has_blockers(&self.tasks()?))
    }

    /// Atomically replace a task's parent set, re-validated for cycles
    /// exactly as in `add_task`.
    pub fn update_parents(&self, task_id: &str, new_parents: Vec<String>) -> Result<()> {
        let state = self.state()?;
        let entry = current_entry(&state)?;
        let (entry_no, phase) = (entry.entry, entry.phase.clone());

        let mut tasks = self.tasks_at(entry_no, &phase)?;
        if !tasks.iter().any(|t| t.id == task_id) {
            return Err(Error::UnknownTask {
                task_id: task_id.to_string(),
            });
        }
        graph::validate_parent_edges(&tasks, task_id, &new_parents)?;
        for t in &mut tasks {
            if t.id == task_id {
                t.parents = new_parents.clone();
            }
        }
        write_tasks(&self.paths.tasks_path(entry_no, &phase), &tasks)?;
        append_entry(
            &self.paths.progress_path(),
            &now_rfc3339(),
            &format!("task '{task_id}': parents set to [{}]", new_parents.join(", ")),
        )?;
        Ok(())
    }

    // ---- phase state machine ----

    /// Transition the plan to `target`.
    ///
    /// Check order: unknown phase, blocked-task gate, exit guard (required
    /// artifacts of the phase being left), approval gate, re-entry reason.
    /// The exit guard is waived when escaping blocked tasks through the
    /// `on_blocked` route, since blocked work cannot produce artifacts.
    pub fn enter_phase(&self, target: &str, reason: EntryReason) -> Result<()> {
        let workflow = self.workflow()?;
        let mut state = self.state()?;

        let Some(target_def) = workflow.phase(target) else {
            return Err(Error::UnknownPhase {
                phase_id: target.to_string(),
            });
        };
        let current_def =
            workflow
                .phase(&state.current_phase)
                .ok_or_else(|| Error::UnknownPhase {
                    phase_id: state.current_phase.clone(),
                })?;

        let (current_no, current_phase, artifacts_missing) = {
            let entry = current_entry(&state)?;
            (
                entry.entry,
                entry.phase.clone(),
                artifact::missing_required(&current_def.required_artifacts, entry),
            )
        };

        let tasks = if current_def.use_tasks {
            self.tasks_at(current_no, &current_phase)?
        } else {
            Vec::new()
        };
        let blocked: Vec<String> = graph::blocked_tasks(&tasks)
            .iter()
            .map(|t| t.id.clone())
            .collect();
        let blocked_route = workflow.on_blocked_target(current_def) == target;
        if !blocked.is_empty() && !blocked_route {
            return Err(Error::BlockedTasksExist {
                phase_id: current_phase,
                task_ids: blocked,
            });
        }

        let escaping_blocked = !blocked.is_empty() && blocked_route;
        if !artifacts_missing.is_empty() && !escaping_blocked {
            return Err(Error::MissingArtifacts {
                phase_id: current_phase,
                names: artifacts_missing,
            });
        }

        let edge = current_def
            .suggested_next
            .iter()
            .find(|next| next.phase() == target);
        if edge.is_some_and(NextPhase::requires_approval) {
            let approved = state
                .pending_approval
                .as_ref()
                .is_some_and(|p| p.approved && p.from == state.current_phase && p.to == target);
            if !approved {
                return Err(Error::ApprovalRequired {
                    from: state.current_phase.clone(),
                    to: target.to_string(),
                });
            }
        }

        let (reason_text, reason_file) = reason.into_parts()?;
        let reentry = state.visits(target) > 0;
        if reentry {
            let length = reason_text
                .as_deref()
                .map_or(0, |r| r.trim().chars().count());
            if length < MIN_REENTRY_REASON_LEN {
                return Err(Error::ReentryReasonTooShort {
                    phase_id: target.to_string(),
                    length,
                    minimum: MIN_REENTRY_REASON_LEN,
                });
            }
        }

        // All checks passed; commit.
        let now = now_rfc3339();
        let entry_no = state.next_entry_number();
        if let Some(prev) = state.current_entry_mut() {
            prev.exited_at.get_or_insert(now.clone());
        }
        if reentry {
            state
                .phase_meta
                .entry(target.to_string())
                .or_default()
                .retries += 1;
        }
        state.pending_approval = None;
        state.history.push(PhaseHistoryEntry {
            entry: entry_no,
            phase: target.to_string(),
            reason: reason_text,
            reason_file,
            entered_at: now.clone(),
            exited_at: None,
            outcome: None,
            artifacts: BTreeMap::new(),
        });
        state.current_phase = target.to_string();

        // Filesystem prep happens before the authoritative state write; a
        // crash in between leaves only an orphan directory behind.
        let phase_dir = self.paths.phase_dir(entry_no, target);
        create_dir(&phase_dir)?;
        if target_def.use_tasks {
            write_tasks(&self.paths.tasks_path(entry_no, target), &[])?;
        }
        write_state(&self.paths.state_path(), &state)?;
        append_entry(
            &self.paths.progress_path(),
            &now,
            &format!("enter phase '{target}' (entry {entry_no})"),
        )?;
        info!(phase = %target, entry = entry_no, reentry, "entered phase");
        Ok(())
    }

    /// Configured transitions out of the current phase, annotated with
    /// approval requirements and the retry-escalation flag.
    pub fn suggested_next(&self) -> Result<Vec<SuggestedTransition>> {
        let workflow = self.workflow()?;
        let state = self.state()?;
        let current = workflow
            .phase(&state.current_phase)
            .ok_or_else(|| Error::UnknownPhase {
                phase_id: state.current_phase.clone(),
            })?;

        Ok(current
            .suggested_next
            .iter()
            .map(|next| {
                let target = next.phase();
                let escalate = workflow
                    .phase(target)
                    .is_some_and(|def| state.retries(target) >= def.max_retries);
                SuggestedTransition {
                    phase: target.to_string(),
                    requires_approval: next.requires_approval(),
                    prompt: next.prompt().map(str::to_string),
                    escalate,
                }
            })
            .collect())
    }

    /// Record approval for an approval-gated transition out of the current
    /// phase. Consumed by the next successful `enter_phase`.
    pub fn approve_transition(&self, target: &str) -> Result<()> {
        let workflow = self.workflow()?;
        let mut state = self.state()?;
        if !workflow.contains(target) {
            return Err(Error::UnknownPhase {
                phase_id: target.to_string(),
            });
        }
        let now = now_rfc3339();
        state.pending_approval = Some(PendingApproval {
            from: state.current_phase.clone(),
            to: target.to_string(),
            approved: true,
            requested_at: now.clone(),
        });
        write_state(&self.paths.state_path(), &state)?;
        append_entry(
            &self.paths.progress_path(),
            &now,
            &format!("approved transition to '{target}'"),
        )?;
        Ok(())
    }

    /// Discard any pending approval; everything else is left unchanged.
    pub fn reject_transition(&self) -> Result<()> {
        let mut state = self.state()?;
        if state.pending_approval.take().is_some() {
            write_state(&self.paths.state_path(), &state)?;
            append_entry(
                &self.paths.progress_path(),
                &now_rfc3339(),
                "rejected pending transition",
            )?;
        }
        Ok(())
    }

    /// Record an artifact for the current phase entry. `file` is a path
    /// relative to the entry's phase directory and must exist at call time.
    pub fn record_artifact(&self, name: &str, file: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(Error::validation("artifact name must not be blank"));
        }
        if Path::new(file).is_absolute() || file.split('/').any(|part| part == "..") {
            return Err(Error::validation(format!(
                "artifact file '{file}' must be relative to the phase directory"
            )));
        }
        let mut state = self.state()?;
        let (entry_no, phase) = {
            let entry = current_entry(&state)?;
            (entry.entry, entry.phase.clone())
        };
        let full = self.paths.artifact_path(entry_no, &phase, file);
        if !full.exists() {
            return Err(Error::FileNotFound { path: full });
        }
        if let Some(entry) = state.current_entry_mut() {
            entry
                .artifacts
                .insert(name.to_string(), file.to_string());
        }
        write_state(&self.paths.state_path(), &state)?;
        append_entry(
            &self.paths.progress_path(),
            &now_rfc3339(),
            &format!("artifact '{name}' recorded as {file}"),
        )?;
        Ok(())
    }

    /// Annotate the current phase entry with an outcome string.
    pub fn record_outcome(&self, outcome: &str) -> Result<()> {
        let mut state = self.state()?;
        if let Some(entry) = state.current_entry_mut() {
            entry.outcome = Some(outcome.to_string());
        }
        write_state(&self.paths.state_path(), &state)
    }

    /// Required artifact names the current entry has not recorded yet. The
    /// pure check behind the exit guard.
    pub fn missing_required_artifacts(&self) -> Result<Vec<String>> {
        let workflow = self.workflow()?;
        let state = self.state()?;
        let entry = current_entry(&state)?;
        let phase = workflow
            .phase(&entry.phase)
            .ok_or_else(|| Error::UnknownPhase {
                phase_id: entry.phase.clone(),
            })?;
        Ok(artifact::missing_required(&phase.required_artifacts, entry))
    }

    /// Assemble `phase_id`'s context artifacts from phase history, newest
    /// producer first per name. Unresolvable names are soft failures.
    pub fn resolve_context_artifacts(&self, phase_id: &str) -> Result<ContextArtifacts> {
        let workflow = self.workflow()?;
        let state = self.state()?;
        let phase = workflow.phase(phase_id).ok_or_else(|| Error::UnknownPhase {
            phase_id: phase_id.to_string(),
        })?;

        let resolution = artifact::resolve_context(&state, &phase.context_artifacts);
        let mut out = ContextArtifacts {
            resolved: Vec::new(),
            missing: resolution.missing,
        };
        for hit in resolution.resolved {
            let path = self.paths.artifact_path(hit.entry, &hit.phase, &hit.file);
            // Existence is re-checked at consumption time; a record whose
            // file vanished degrades to a missing name.
            match read_to_string(&path) {
                Ok(content) => out.resolved.push(ContextArtifact {
                    name: hit.name,
                    phase: hit.phase,
                    entry: hit.entry,
                    content,
                }),
                Err(err) => {
                    warn!(name = %hit.name, %err, "context artifact unreadable");
                    out.missing.push(hit.name);
                }
            }
        }
        for name in &out.missing {
            warn!(phase = %phase_id, artifact = %name, "context artifact unresolved");
        }
        Ok(out)
    }

    // ---- expansion / mutation ----

    /// Splice a new phase subgraph into the workflow definition.
    ///
    /// Validation is all-or-nothing and side-effect-free; on commit the
    /// previous definition is backed up for single-level rollback.
    pub fn expand_phase(&self, subgraph: &WorkflowSubgraph, dry_run: bool) -> Result<()> {
        let workflow = self.workflow()?;
        let problems = validate_expansion(&workflow, subgraph);
        if !problems.is_empty() {
            return Err(Error::Validation { problems });
        }
        if dry_run {
            return Ok(());
        }
        backup_workflow(&self.paths.workflow_path(), &self.paths.workflow_backup_path())?;
        let spliced = splice(&workflow, subgraph);
        write_workflow(&self.paths.workflow_path(), &spliced)?;
        append_entry(
            &self.paths.progress_path(),
            &now_rfc3339(),
            &format!(
                "workflow expanded: {} phase(s) inserted between '{}' and '{}'",
                subgraph.phases.len(),
                subgraph.insert_after,
                subgraph.before
            ),
        )?;
        info!(
            phases = subgraph.phases.len(),
            insert_after = %subgraph.insert_after,
            "workflow expanded"
        );
        Ok(())
    }

    /// Restore the workflow definition from the most recent expansion backup.
    ///
    /// Refused while the plan sits inside a spliced-in phase: restoring would
    /// leave `state.json` pointing at a phase the definition no longer has,
    /// with no way back.
    pub fn rollback_expansion(&self) -> Result<()> {
        let backup_path = self.paths.workflow_backup_path();
        if !backup_path.exists() {
            return Err(Error::NoBackup { path: backup_path });
        }
        let restored = load_workflow(&backup_path)?;
        let state = self.state()?;
        if !restored.contains(&state.current_phase) {
            return Err(Error::validation(format!(
                "cannot roll back while in phase '{}': it is not in the backup workflow",
                state.current_phase
            )));
        }
        restore_backup(&self.paths.workflow_path(), &backup_path)?;
        append_entry(
            &self.paths.progress_path(),
            &now_rfc3339(),
            "workflow expansion rolled back",
        )?;
        Ok(())
    }

    /// `add_task` restricted to the current phase, for in-flight mutation
    /// (e.g. a process-feedback step discovering new work).
    pub fn add_investigation_task(&self, phase_id: &str, new_task: Task) -> Result<()> {
        self.require_current_phase(phase_id)?;
        self.add_task(new_task)
    }

    /// `update_parents` restricted to the current phase.
    pub fn update_task_parents(
        &self,
        phase_id: &str,
        task_id: &str,
        new_parents: Vec<String>,
    ) -> Result<()> {
        self.require_current_phase(phase_id)?;
        self.update_parents(task_id, new_parents)
    }

    fn require_current_phase(&self, phase_id: &str) -> Result<()> {
        let state = self.state()?;
        if state.current_phase != phase_id {
            return Err(Error::WrongPhase {
                current: state.current_phase,
                requested: phase_id.to_string(),
            });
        }
        Ok(())
    }

    // ---- advisory records / counters ----

    /// Append an advisory record. Proposals are only accepted in phases that
    /// enable them.
    pub fn record_advisory(
        &self,
        kind: AdvisoryKind,
        task_id: &str,
        summary: &str,
    ) -> Result<()> {
        if kind == AdvisoryKind::Proposal {
            let workflow = self.workflow()?;
            let state = self.state()?;
            let allowed = workflow
                .phase(&state.current_phase)
                .is_some_and(|phase| phase.allow_proposals);
            if !allowed {
                return Err(Error::validation(format!(
                    "phase '{}' does not allow proposals",
                    state.current_phase
                )));
            }
        }
        append_record(
            &self.paths.dead_ends_path(),
            AdvisoryRecord {
                task_id: task_id.to_string(),
                kind,
                summary: summary.to_string(),
                recorded_at: now_rfc3339(),
            },
        )
    }

    /// Bump the auto-continue counter. Returns false once the configured
    /// maximum is exceeded; the external loop must stop and ask a human.
    pub fn increment_auto_iterations(&self) -> Result<bool> {
        let mut state = self.state()?;
        state.auto_iterations += 1;
        let within_budget = state.auto_iterations <= state.max_auto_iterations;
        write_state(&self.paths.state_path(), &state)?;
        Ok(within_budget)
    }

    pub fn reset_auto_iterations(&self) -> Result<()> {
        let mut state = self.state()?;
        state.auto_iterations = 0;
        write_state(&self.paths.state_path(), &state)
    }
}

fn current_entry(state: &PlanState) -> Result<&PhaseHistoryEntry> {
    state
        .current_entry()
        .ok_or_else(|| Error::validation("phase history is empty"))
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|source| Error::Io {
        op: "create directory",
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{gated_workflow, simple_workflow, task, temp_plan};

    /// Long enough to satisfy the re-entry reason minimum.
    const REENTRY_REASON: &str = "the earlier findings missed the auth flow entirely";

    fn reason(text: &str) -> EntryReason {
        EntryReason::text(text)
    }

    #[test]
    fn create_plan_seeds_layout() {
        let (_temp, plan) = temp_plan(&simple_workflow());
        let paths = plan.paths();

        assert!(paths.workflow_path().exists());
        assert!(paths.state_path().exists());
        assert!(paths.request_path().exists());
        assert!(paths.dead_ends_path().exists());
        assert!(paths.progress_path().exists());
        // Initial phase uses tasks, so entry 1 gets a seeded empty set.
        assert!(paths.tasks_path(1, "research").exists());

        let state = plan.state().expect("state");
        assert_eq!(state.current_phase, "research");
        assert_eq!(state.history.len(), 1);
        assert_eq!(state.history[0].entry, 1);
        assert!(plan.tasks().expect("tasks").is_empty());
    }

    #[test]
    fn create_plan_rejects_bad_names_and_duplicates() {
        let temp = tempfile::tempdir().expect("tempdir");
        let workspace = Workspace::new(temp.path());
        let workflow = simple_workflow();

        let err = workspace
            .create_plan("Bad Name", "r", &workflow)
            .expect_err("invalid name");
        assert!(matches!(err, Error::Validation { .. }));

        workspace.create_plan("demo", "r", &workflow).expect("create");
        let err = workspace
            .create_plan("demo", "r", &workflow)
            .expect_err("duplicate");
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn active_plan_pointer_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let workspace = Workspace::new(temp.path());
        workspace
            .create_plan("demo", "r", &simple_workflow())
            .expect("create");

        assert!(workspace.active_plan().expect("none yet").is_none());
        workspace.set_active_plan("demo").expect("set");
        let active = workspace.active_plan().expect("read").expect("some");
        assert_eq!(active.name(), "demo");

        let err = workspace.set_active_plan("ghost").expect_err("unknown");
        assert!(matches!(err, Error::UnknownPlan { .. }));

        workspace.clear_active_plan().expect("clear");
        assert!(workspace.active_plan().expect("cleared").is_none());
    }

    /// Parents done plus no resource conflict is the whole availability rule,
    /// exercised through the persisted store.
    #[test]
    fn availability_flows_through_status_changes() {
        let (_temp, plan) = temp_plan(&simple_workflow());
        plan.add_task(task("a", &[])).expect("add a");
        plan.add_task(task("b", &["a"])).expect("add b");
        plan.add_task(task("c", &["a"])).expect("add c");

        let ids: Vec<String> = plan
            .available_tasks()
            .expect("available")
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec!["a"]);

        plan.set_status("a", TaskStatus::InProgress).expect("claim a");
        assert!(plan.available_tasks().expect("available").is_empty());

        plan.set_status("a", TaskStatus::Done).expect("finish a");
        let ids: Vec<String> = plan
            .available_tasks()
            .expect("available")
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn status_changes_are_logged() {
        let (_temp, plan) = temp_plan(&simple_workflow());
        plan.add_task(task("a", &[])).expect("add");
        plan.set_status("a", TaskStatus::InProgress).expect("claim");

        let task_log = fs::read_to_string(plan.paths().task_progress_path(1, "research", "a"))
            .expect("task log");
        assert!(task_log.contains("status todo -> in-progress"));

        let plan_log = fs::read_to_string(plan.paths().progress_path()).expect("plan log");
        assert!(plan_log.contains("task 'a': todo -> in-progress"));
    }

    #[test]
    fn blocking_requires_a_blocker_record() {
        let (_temp, plan) = temp_plan(&simple_workflow());
        plan.add_task(task("a", &[])).expect("add");
        plan.set_status("a", TaskStatus::InProgress).expect("claim");

        let err = plan
            .set_status("a", TaskStatus::Blocked)
            .expect_err("no blocker record");
        assert!(matches!(err, Error::MissingBlockerRecord { .. }));

        let blocker = plan.paths().blocker_path(1, "research", "a");
        fs::create_dir_all(blocker.parent().expect("parent")).expect("mkdir");
        fs::write(&blocker, "upstream API returns 500\n").expect("write blocker");
        plan.set_status("a", TaskStatus::Blocked).expect("block");
        assert!(plan.has_blockers().expect("blockers"));
    }

    #[test]
    fn blocked_tasks_gate_transitions_except_the_blocked_route() {
        let (_temp, plan) = temp_plan(&simple_workflow());
        plan.add_task(task("a", &[])).expect("add");
        let blocker = plan.paths().blocker_path(1, "research", "a");
        fs::create_dir_all(blocker.parent().expect("parent")).expect("mkdir");
        fs::write(&blocker, "blocked\n").expect("write blocker");
        plan.set_status("a", TaskStatus::InProgress).expect("claim");
        plan.set_status("a", TaskStatus::Blocked).expect("block");

        let err = plan
            .enter_phase("plan", reason("ready"))
            .expect_err("gated by blockers");
        assert!(matches!(err, Error::BlockedTasksExist { .. }));

        // on_blocked defaults to self: re-entry is the escape hatch.
        plan.enter_phase("research", reason(REENTRY_REASON))
            .expect("re-enter");
        let state = plan.state().expect("state");
        assert_eq!(state.history.len(), 2);
        assert_eq!(state.history[1].entry, 2);
        // Fresh visit, fresh task set.
        assert!(plan.tasks().expect("tasks").is_empty());
        assert!(!plan.has_blockers().expect("blockers"));
    }

    #[test]
    fn unblocking_reopens_the_normal_route() {
        let (_temp, plan) = temp_plan(&simple_workflow());
        plan.add_task(task("a", &[])).expect("add");
        let blocker = plan.paths().blocker_path(1, "research", "a");
        fs::create_dir_all(blocker.parent().expect("parent")).expect("mkdir");
        fs::write(&blocker, "blocked\n").expect("write blocker");
        plan.set_status("a", TaskStatus::InProgress).expect("claim");
        plan.set_status("a", TaskStatus::Blocked).expect("block");

        plan.set_status("a", TaskStatus::Todo).expect("reset");
        plan.enter_phase("plan", reason("ready")).expect("proceed");
        assert_eq!(plan.state().expect("state").current_phase, "plan");
    }

    #[test]
    fn exit_guard_requires_recorded_artifacts() {
        let mut workflow = simple_workflow();
        workflow.phases[0].required_artifacts = vec!["findings".to_string()];
        let (_temp, plan) = temp_plan(&workflow);

        assert_eq!(
            plan.missing_required_artifacts().expect("missing"),
            vec!["findings"]
        );
        let err = plan
            .enter_phase("plan", reason("done"))
            .expect_err("guarded");
        assert!(matches!(err, Error::MissingArtifacts { .. }));

        // Recording requires the file to exist first.
        let err = plan
            .record_artifact("findings", "findings.md")
            .expect_err("file absent");
        assert!(matches!(err, Error::FileNotFound { .. }));

        fs::write(
            plan.paths().artifact_path(1, "research", "findings.md"),
            "# findings\n",
        )
        .expect("write artifact");
        plan.record_artifact("findings", "findings.md").expect("record");
        assert!(plan.missing_required_artifacts().expect("missing").is_empty());

        plan.enter_phase("plan", reason("done")).expect("proceed");
    }

    #[test]
    fn artifact_files_must_stay_inside_the_phase_dir() {
        let (_temp, plan) = temp_plan(&simple_workflow());
        let err = plan
            .record_artifact("findings", "../../state.json")
            .expect_err("escape");
        assert!(matches!(err, Error::Validation { .. }));
        let err = plan
            .record_artifact("findings", "/etc/hosts")
            .expect_err("absolute");
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn entry_numbers_increase_and_reentry_needs_a_real_reason() {
        let (_temp, plan) = temp_plan(&simple_workflow());
        plan.enter_phase("plan", reason("research complete")).expect("to plan");
        plan.enter_phase("implement", reason("plan approved")).expect("to implement");

        let err = plan
            .enter_phase("research", reason("again"))
            .expect_err("reason too short");
        assert!(matches!(
            err,
            Error::ReentryReasonTooShort { minimum: MIN_REENTRY_REASON_LEN, .. }
        ));

        plan.enter_phase("research", reason(REENTRY_REASON)).expect("re-enter");
        let state = plan.state().expect("state");
        let numbers: Vec<u32> = state.history.iter().map(|e| e.entry).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
        assert_eq!(state.retries("research"), 1);
        assert!(state.history[0].exited_at.is_some());
        assert!(state.history[3].exited_at.is_none());
    }

    #[test]
    fn reason_files_are_read_and_referenced() {
        let (temp, plan) = temp_plan(&simple_workflow());
        plan.enter_phase("plan", reason("onward")).expect("to plan");

        let reason_path = temp.path().join("why.md");
        fs::write(&reason_path, REENTRY_REASON).expect("write reason");
        plan.enter_phase("research", EntryReason::File(reason_path.clone()))
            .expect("re-enter");

        let state = plan.state().expect("state");
        let entry = state.current_entry().expect("entry");
        assert_eq!(entry.reason.as_deref(), Some(REENTRY_REASON));
        assert_eq!(entry.reason_file.as_deref(), Some(reason_path.display().to_string().as_str()));

        let err = plan
            .enter_phase("plan", EntryReason::File(temp.path().join("ghost.md")))
            .expect_err("missing reason file");
        assert!(matches!(err, Error::FileNotFound { .. }));
    }

    #[test]
    fn unknown_phase_is_rejected_first() {
        let (_temp, plan) = temp_plan(&simple_workflow());
        let err = plan.enter_phase("ghost", reason("x")).expect_err("unknown");
        assert!(matches!(err, Error::UnknownPhase { .. }));
    }

    #[test]
    fn gated_edges_need_approval_and_consume_it() {
        let (_temp, plan) = temp_plan(&gated_workflow());

        let suggested = plan.suggested_next().expect("suggested");
        assert_eq!(suggested.len(), 1);
        assert_eq!(suggested[0].phase, "plan");
        assert!(suggested[0].requires_approval);
        assert!(!suggested[0].escalate);

        let err = plan
            .enter_phase("plan", reason("ready"))
            .expect_err("unapproved");
        assert!(matches!(err, Error::ApprovalRequired { .. }));

        plan.approve_transition("plan").expect("approve");
        plan.enter_phase("plan", reason("ready")).expect("approved");
        // Consumed on transition.
        assert!(plan.state().expect("state").pending_approval.is_none());
    }

    #[test]
    fn rejecting_leaves_everything_else_unchanged() {
        let (_temp, plan) = temp_plan(&gated_workflow());
        plan.approve_transition("plan").expect("approve");
        plan.reject_transition().expect("reject");

        let state = plan.state().expect("state");
        assert!(state.pending_approval.is_none());
        assert_eq!(state.current_phase, "research");
        assert_eq!(state.history.len(), 1);

        let err = plan
            .enter_phase("plan", reason("ready"))
            .expect_err("approval gone");
        assert!(matches!(err, Error::ApprovalRequired { .. }));
    }

    #[test]
    fn context_artifacts_resolve_to_newest_content() {
        let mut workflow = simple_workflow();
        workflow.phases[1].context_artifacts = vec!["findings".to_string(), "notes".to_string()];
        let (_temp, plan) = temp_plan(&workflow);

        fs::write(
            plan.paths().artifact_path(1, "research", "findings.md"),
            "auth flow is the risk\n",
        )
        .expect("write artifact");
        plan.record_artifact("findings", "findings.md").expect("record");
        plan.enter_phase("plan", reason("onward")).expect("to plan");

        let resolved = plan.resolve_context_artifacts("plan").expect("resolve");
        assert_eq!(resolved.resolved.len(), 1);
        let hit = &resolved.resolved[0];
        assert_eq!(hit.name, "findings");
        assert_eq!(hit.phase, "research");
        assert_eq!(hit.entry, 1);
        assert_eq!(hit.content, "auth flow is the risk\n");
        // No producer for "notes": soft failure, surfaced by name.
        assert_eq!(resolved.missing, vec!["notes"]);
    }

    #[test]
    fn vanished_artifact_files_degrade_to_missing() {
        let (_temp, plan) = temp_plan(&simple_workflow());
        fs::write(
            plan.paths().artifact_path(1, "research", "findings.md"),
            "x\n",
        )
        .expect("write artifact");
        plan.record_artifact("findings", "findings.md").expect("record");
        fs::remove_file(plan.paths().artifact_path(1, "research", "findings.md"))
            .expect("remove");

        let resolved = plan.resolve_context_artifacts("plan").expect("resolve");
        assert!(resolved.resolved.is_empty());
        assert_eq!(resolved.missing, vec!["findings"]);
    }

    #[test]
    fn failed_expansion_leaves_the_workflow_untouched() {
        let (_temp, plan) = temp_plan(&simple_workflow());
        let before = fs::read_to_string(plan.paths().workflow_path()).expect("read");

        let mut spike = crate::core::workflow::PhaseDefinition::new("spike");
        spike.suggested_next = vec![NextPhase::Plain("plan".to_string())];
        let subgraph = WorkflowSubgraph {
            insert_after: "research".to_string(),
            before: "ghost".to_string(),
            entry: "spike".to_string(),
            phases: vec![spike],
        };
        let err = plan.expand_phase(&subgraph, false).expect_err("invalid");
        assert!(matches!(err, Error::Validation { .. }));

        let after = fs::read_to_string(plan.paths().workflow_path()).expect("read");
        assert_eq!(before, after);
        assert!(!plan.paths().workflow_backup_path().exists());
    }

    #[test]
    fn expansion_commits_and_rolls_back_byte_exact() {
        let (_temp, plan) = temp_plan(&simple_workflow());
        let original = fs::read_to_string(plan.paths().workflow_path()).expect("read");

        let mut spike = crate::core::workflow::PhaseDefinition::new("spike");
        spike.suggested_next = vec![NextPhase::Plain("plan".to_string())];
        let subgraph = WorkflowSubgraph {
            insert_after: "research".to_string(),
            before: "plan".to_string(),
            entry: "spike".to_string(),
            phases: vec![spike],
        };

        // Dry run validates without touching anything.
        plan.expand_phase(&subgraph, true).expect("dry run");
        assert!(!plan.paths().workflow_backup_path().exists());

        plan.expand_phase(&subgraph, false).expect("expand");
        let expanded = plan.workflow().expect("reload");
        assert!(expanded.contains("spike"));
        let research = expanded.phase("research").expect("research");
        assert_eq!(research.suggested_next[0].phase(), "spike");

        plan.rollback_expansion().expect("rollback");
        let restored = fs::read_to_string(plan.paths().workflow_path()).expect("read");
        assert_eq!(restored, original);

        let err = plan.rollback_expansion().expect_err("no backup left");
        assert!(matches!(err, Error::NoBackup { .. }));
    }

    /// Rolling back while inside a spliced-in phase would orphan the current
    /// phase; the rollback is refused until the plan has moved back onto a
    /// phase the backup knows.
    #[test]
    fn rollback_is_refused_inside_a_spliced_phase() {
        let (_temp, plan) = temp_plan(&simple_workflow());
        let mut spike = crate::core::workflow::PhaseDefinition::new("spike");
        spike.suggested_next = vec![NextPhase::Plain("plan".to_string())];
        let subgraph = WorkflowSubgraph {
            insert_after: "research".to_string(),
            before: "plan".to_string(),
            entry: "spike".to_string(),
            phases: vec![spike],
        };
        plan.expand_phase(&subgraph, false).expect("expand");
        plan.enter_phase("spike", reason("detour")).expect("enter spike");

        let err = plan.rollback_expansion().expect_err("would orphan spike");
        assert!(matches!(err, Error::Validation { .. }));
        // Nothing was restored: the expanded definition and its backup stand.
        assert!(plan.workflow().expect("reload").contains("spike"));
        assert!(plan.paths().workflow_backup_path().exists());

        // Once back on a phase the backup contains, rollback goes through.
        plan.enter_phase("plan", reason("detour finished")).expect("to plan");
        plan.rollback_expansion().expect("rollback");
        assert!(!plan.workflow().expect("reload").contains("spike"));
        assert_eq!(plan.state().expect("state").current_phase, "plan");
    }

    /// Blocked tasks cannot produce artifacts, so the blocked route stays
    /// open even when required artifacts are unrecorded.
    #[test]
    fn blocked_route_waives_the_exit_guard() {
        let mut workflow = simple_workflow();
        workflow.phases[0].required_artifacts = vec!["findings".to_string()];
        let (_temp, plan) = temp_plan(&workflow);

        plan.add_task(task("a", &[])).expect("add");
        let blocker = plan.paths().blocker_path(1, "research", "a");
        fs::create_dir_all(blocker.parent().expect("parent")).expect("mkdir");
        fs::write(&blocker, "blocked\n").expect("write blocker");
        plan.set_status("a", TaskStatus::Blocked).expect("block");

        // Any other route is still gated by the blocked tasks.
        let err = plan
            .enter_phase("plan", reason("ready"))
            .expect_err("blocked gate");
        assert!(matches!(err, Error::BlockedTasksExist { .. }));

        // on_blocked (self) succeeds despite the unrecorded artifact.
        plan.enter_phase("research", reason(REENTRY_REASON))
            .expect("blocked route");
        assert_eq!(plan.state().expect("state").history.len(), 2);
    }

    #[test]
    fn in_flight_mutation_is_pinned_to_the_current_phase() {
        let (_temp, plan) = temp_plan(&simple_workflow());
        let err = plan
            .add_investigation_task("plan", task("t", &[]))
            .expect_err("wrong phase");
        assert!(matches!(err, Error::WrongPhase { .. }));

        plan.add_investigation_task("research", task("t", &[])).expect("add");
        plan.add_investigation_task("research", task("u", &[])).expect("add");
        plan.update_task_parents("research", "u", vec!["t".to_string()])
            .expect("reparent");

        let tasks = plan.tasks().expect("tasks");
        assert_eq!(tasks[1].parents, vec!["t"]);
    }

    #[test]
    fn reparenting_rejects_cycles_without_persisting() {
        let (_temp, plan) = temp_plan(&simple_workflow());
        plan.add_task(task("a", &[])).expect("add");
        plan.add_task(task("b", &["a"])).expect("add");

        let err = plan
            .update_parents("a", vec!["b".to_string()])
            .expect_err("cycle");
        assert!(matches!(err, Error::Cycle { .. }));
        assert!(plan.tasks().expect("tasks")[0].parents.is_empty());
    }

    #[test]
    fn proposals_are_gated_by_the_phase_flag() {
        let (_temp, plan) = temp_plan(&simple_workflow());
        let err = plan
            .record_advisory(AdvisoryKind::Proposal, "t1", "document the cache")
            .expect_err("proposals disabled");
        assert!(matches!(err, Error::Validation { .. }));

        plan.record_advisory(AdvisoryKind::DeadEnd, "t1", "regex too slow")
            .expect("dead end always allowed");
        let records =
            crate::io::advisory::load_records(&plan.paths().dead_ends_path()).expect("load");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, AdvisoryKind::DeadEnd);
    }

    #[test]
    fn auto_iteration_budget_trips_once_exceeded() {
        let (_temp, plan) = temp_plan(&simple_workflow());
        let max = plan.state().expect("state").max_auto_iterations;
        for _ in 0..max {
            assert!(plan.increment_auto_iterations().expect("within budget"));
        }
        assert!(!plan.increment_auto_iterations().expect("over budget"));

        plan.reset_auto_iterations().expect("reset");
        assert_eq!(plan.state().expect("state").auto_iterations, 0);
        assert!(plan.increment_auto_iterations().expect("fresh budget"));
    }

    /// Everything needed to resume lives on disk: reopening the plan by name
    /// sees the same tasks and position.
    #[test]
    fn plans_resume_from_disk_alone() {
        let temp = tempfile::tempdir().expect("tempdir");
        let workspace = Workspace::new(temp.path());
        let plan = workspace
            .create_plan("demo", "r", &simple_workflow())
            .expect("create");
        plan.add_task(task("a", &[])).expect("add");
        plan.set_status("a", TaskStatus::InProgress).expect("claim");
        drop(plan);

        let reopened = workspace.open_plan("demo").expect("reopen");
        let tasks = reopened.tasks().expect("tasks");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].status, TaskStatus::InProgress);
        assert_eq!(reopened.state().expect("state").current_phase, "research");
    }

    #[test]
    fn outcome_annotates_the_current_entry() {
        let (_temp, plan) = temp_plan(&simple_workflow());
        plan.record_outcome("nothing usable found").expect("record");
        let state = plan.state().expect("state");
        assert_eq!(
            state.current_entry().expect("entry").outcome.as_deref(),
            Some("nothing usable found")
        );
    }

    #[test]
    fn tasks_are_refused_in_phases_without_task_tracking() {
        let (_temp, plan) = temp_plan(&simple_workflow());
        plan.enter_phase("plan", reason("onward")).expect("to plan");
        let err = plan.add_task(task("t", &[])).expect_err("no tasks here");
        assert!(matches!(err, Error::Validation { .. }));
    }
}
