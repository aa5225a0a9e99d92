//! Builders shared by unit tests. Compiled only for tests or with the
//! `test-support` feature enabled.

use crate::core::task::{Task, TaskStatus};
use crate::core::workflow::{NextPhase, PhaseDefinition, WorkflowDefinition};
use crate::plan::{Plan, Workspace};

/// A `todo` task with the given parents.
pub fn task(id: &str, parents: &[&str]) -> Task {
    let mut t = Task::new(id, format!("task {id}"));
    t.parents = parents.iter().map(|p| (*p).to_string()).collect();
    t
}

pub fn task_with_status(id: &str, parents: &[&str], status: TaskStatus) -> Task {
    let mut t = task(id, parents);
    t.status = status;
    t
}

/// Three-phase linear workflow: research (tasks) -> plan -> implement.
pub fn simple_workflow() -> WorkflowDefinition {
    let mut research = PhaseDefinition::new("research");
    research.use_tasks = true;
    research.suggested_next = vec![NextPhase::Plain("plan".to_string())];

    let mut plan = PhaseDefinition::new("plan");
    plan.context_artifacts = vec!["findings".to_string()];
    plan.suggested_next = vec![NextPhase::Plain("implement".to_string())];

    let mut implement = PhaseDefinition::new("implement");
    implement.terminal = true;
    implement.use_tasks = true;

    WorkflowDefinition {
        phases: vec![research, plan, implement],
    }
}

/// `simple_workflow` with the research -> plan edge gated on approval.
pub fn gated_workflow() -> WorkflowDefinition {
    let mut workflow = simple_workflow();
    workflow.phases[0].suggested_next = vec![NextPhase::Gated {
        phase: "plan".to_string(),
        requires_approval: true,
        prompt: Some("research complete?".to_string()),
    }];
    workflow
}

/// A fresh workspace in a temp dir with one plan created from `workflow`.
/// The temp dir guard must be kept alive for the plan's lifetime.
pub fn temp_plan(workflow: &WorkflowDefinition) -> (tempfile::TempDir, Plan) {
    let temp = tempfile::tempdir().expect("tempdir");
    let workspace = Workspace::new(temp.path());
    let plan = workspace
        .create_plan("demo", "demo request", workflow)
        .expect("create plan");
    (temp, plan)
}
