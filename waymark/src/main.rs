//! Plan orchestration harness CLI.
//!
//! Thin shell over the library: every subcommand resolves the workspace and
//! target plan, calls one library operation, and prints a short result. All
//! durable state lives in plain files under `plans/`, so invocations are
//! independent and the harness resumes from disk alone.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use waymark::core::expansion::WorkflowSubgraph;
use waymark::core::task::{Task, TaskStatus, TaskType};
use waymark::io::advisory::AdvisoryKind;
use waymark::io::store::read_toml;
use waymark::plan::{EntryReason, Plan, Workspace};

/// Exit code when the auto-iteration budget is exhausted.
const EXIT_BUDGET_EXHAUSTED: i32 = 2;

#[derive(Parser)]
#[command(
    name = "waymark",
    version,
    about = "Crash-resumable orchestration harness for multi-phase plans"
)]
struct Cli {
    /// Workspace root (holds `plans/` and the pointer files).
    #[arg(long, default_value = ".", global = true)]
    root: PathBuf,

    /// Operate on this plan instead of the active one.
    #[arg(long, global = true)]
    plan: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a plan from a workflow definition file.
    Create {
        name: String,
        /// Workflow definition (TOML) to copy into the plan.
        #[arg(long)]
        workflow: PathBuf,
        /// File holding the original request text.
        #[arg(long)]
        request: Option<PathBuf>,
    },
    /// Set (or clear) the active plan pointer.
    Use {
        name: Option<String>,
        #[arg(long, conflicts_with = "name")]
        clear: bool,
    },
    /// Set (or clear) the session mode pointer.
    Mode {
        mode: Option<String>,
        #[arg(long, conflicts_with = "mode")]
        clear: bool,
    },
    /// Show the plan's current position and what can happen next.
    Status,
    /// Transition the plan to a phase.
    Enter {
        phase: String,
        /// Why this phase is being entered.
        #[arg(long, conflicts_with = "reason_file")]
        reason: Option<String>,
        /// File holding the entry reason.
        #[arg(long)]
        reason_file: Option<PathBuf>,
    },
    /// List the configured transitions out of the current phase.
    Next,
    /// Approve a pending approval-gated transition.
    Approve { phase: String },
    /// Reject any pending approval.
    Reject,
    /// Task graph operations in the current phase.
    #[command(subcommand)]
    Task(TaskCommand),
    /// List tasks ready to claim.
    Available,
    /// Artifact operations for the current phase entry.
    #[command(subcommand)]
    Artifact(ArtifactCommand),
    /// Annotate the current phase entry with an outcome.
    Outcome { text: String },
    /// Splice a phase subgraph (TOML) into the workflow.
    Expand {
        subgraph: PathBuf,
        /// Validate only; leave the workflow untouched.
        #[arg(long)]
        dry_run: bool,
    },
    /// Restore the workflow from the last expansion backup.
    Rollback,
    /// Record an advisory note (dead-end, challenge, or proposal).
    Advisory {
        kind: String,
        task_id: String,
        summary: String,
    },
    /// Bump the auto-continue counter; fails once the budget is exhausted.
    Iterate {
        /// Reset the counter instead of bumping it.
        #[arg(long)]
        reset: bool,
    },
    /// Re-run all on-disk validation for the plan.
    Validate,
}

#[derive(Subcommand)]
enum TaskCommand {
    /// Add a task to the current phase.
    Add {
        id: String,
        #[arg(long)]
        description: String,
        /// Parent task ids (repeatable).
        #[arg(long = "parent")]
        parents: Vec<String>,
        /// Exclusive resource tokens (repeatable).
        #[arg(long = "resource")]
        resources: Vec<String>,
        /// Advisory steps (repeatable).
        #[arg(long = "step")]
        steps: Vec<String>,
        /// Task flavor: `prototype` or `cache-reference`.
        #[arg(long, value_parser = parse_task_type)]
        task_type: Option<TaskType>,
    },
    /// Change a task's status.
    Status { id: String, status: String },
    /// Replace a task's parent set.
    Parents { id: String, parents: Vec<String> },
}

#[derive(Subcommand)]
enum ArtifactCommand {
    /// Record an artifact file (relative to the phase directory) under a name.
    Record { name: String, file: String },
    /// List required artifact names not yet recorded for this entry.
    Missing,
    /// Resolve and print a phase's context artifacts.
    Context { phase: String },
}

fn parse_task_type(s: &str) -> std::result::Result<TaskType, String> {
    match s {
        "prototype" => Ok(TaskType::Prototype),
        "cache-reference" => Ok(TaskType::CacheReference),
        other => Err(format!(
            "unknown task type '{other}' (expected prototype or cache-reference)"
        )),
    }
}

fn main() {
    waymark::logging::init();
    if let Err(err) = run() {
        eprintln!("{:#}", err);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let workspace = Workspace::new(&cli.root);

    match cli.command {
        Command::Create {
            name,
            workflow,
            request,
        } => cmd_create(&workspace, &name, &workflow, request.as_deref()),
        Command::Use { name, clear } => cmd_use(&workspace, name, clear),
        Command::Mode { mode, clear } => cmd_mode(&workspace, mode, clear),
        Command::Status => cmd_status(&resolve_plan(&workspace, cli.plan.as_deref())?),
        Command::Enter {
            phase,
            reason,
            reason_file,
        } => {
            let plan = resolve_plan(&workspace, cli.plan.as_deref())?;
            let reason = match (reason, reason_file) {
                (Some(text), None) => EntryReason::Text(text),
                (None, Some(path)) => EntryReason::File(path),
                (None, None) => bail!("--reason or --reason-file is required"),
                (Some(_), Some(_)) => unreachable!("clap enforces the conflict"),
            };
            plan.enter_phase(&phase, reason)?;
            println!("entered phase '{phase}'");
            Ok(())
        }
        Command::Next => cmd_next(&resolve_plan(&workspace, cli.plan.as_deref())?),
        Command::Approve { phase } => {
            let plan = resolve_plan(&workspace, cli.plan.as_deref())?;
            plan.approve_transition(&phase)?;
            println!("approved transition to '{phase}'");
            Ok(())
        }
        Command::Reject => {
            resolve_plan(&workspace, cli.plan.as_deref())?.reject_transition()?;
            println!("pending transition rejected");
            Ok(())
        }
        Command::Task(task_cmd) => {
            cmd_task(&resolve_plan(&workspace, cli.plan.as_deref())?, task_cmd)
        }
        Command::Available => cmd_available(&resolve_plan(&workspace, cli.plan.as_deref())?),
        Command::Artifact(artifact_cmd) => {
            cmd_artifact(&resolve_plan(&workspace, cli.plan.as_deref())?, artifact_cmd)
        }
        Command::Outcome { text } => {
            resolve_plan(&workspace, cli.plan.as_deref())?.record_outcome(&text)?;
            Ok(())
        }
        Command::Expand { subgraph, dry_run } => {
            let plan = resolve_plan(&workspace, cli.plan.as_deref())?;
            let subgraph: WorkflowSubgraph = read_toml(&subgraph)?;
            plan.expand_phase(&subgraph, dry_run)?;
            if dry_run {
                println!("expansion is valid (dry run, nothing written)");
            } else {
                println!("workflow expanded");
            }
            Ok(())
        }
        Command::Rollback => {
            resolve_plan(&workspace, cli.plan.as_deref())?.rollback_expansion()?;
            println!("workflow restored from backup");
            Ok(())
        }
        Command::Advisory {
            kind,
            task_id,
            summary,
        } => {
            let plan = resolve_plan(&workspace, cli.plan.as_deref())?;
            let kind: AdvisoryKind = kind.parse().map_err(anyhow::Error::msg)?;
            plan.record_advisory(kind, &task_id, &summary)?;
            Ok(())
        }
        Command::Iterate { reset } => {
            let plan = resolve_plan(&workspace, cli.plan.as_deref())?;
            if reset {
                plan.reset_auto_iterations()?;
                return Ok(());
            }
            if !plan.increment_auto_iterations()? {
                eprintln!("auto-iteration budget exhausted; a human must take over");
                std::process::exit(EXIT_BUDGET_EXHAUSTED);
            }
            Ok(())
        }
        Command::Validate => cmd_validate(&resolve_plan(&workspace, cli.plan.as_deref())?),
    }
}

/// `--plan` wins; otherwise the `active-plan` pointer must be set.
fn resolve_plan(workspace: &Workspace, name: Option<&str>) -> Result<Plan> {
    if let Some(name) = name {
        return Ok(workspace.open_plan(name)?);
    }
    workspace
        .active_plan()?
        .context("no active plan (set one with `waymark use <name>`)")
}

fn cmd_create(
    workspace: &Workspace,
    name: &str,
    workflow_path: &std::path::Path,
    request_path: Option<&std::path::Path>,
) -> Result<()> {
    let workflow = waymark::io::workflow_store::load_workflow(workflow_path)?;
    let request = match request_path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("read request file {}", path.display()))?,
        None => String::new(),
    };
    let plan = workspace.create_plan(name, &request, &workflow)?;
    workspace.set_active_plan(name)?;
    let state = plan.state()?;
    println!("created plan '{name}' at phase '{}'", state.current_phase);
    Ok(())
}

fn cmd_use(workspace: &Workspace, name: Option<String>, clear: bool) -> Result<()> {
    match (name, clear) {
        (Some(name), false) => {
            workspace.set_active_plan(&name)?;
            println!("active plan: {name}");
        }
        (None, true) => workspace.clear_active_plan()?,
        (None, false) => match workspace.active_plan()? {
            Some(plan) => println!("active plan: {}", plan.name()),
            None => println!("no active plan"),
        },
        (Some(_), true) => unreachable!("clap enforces the conflict"),
    }
    Ok(())
}

fn cmd_mode(workspace: &Workspace, mode: Option<String>, clear: bool) -> Result<()> {
    match (mode, clear) {
        (Some(mode), false) => workspace.set_session_mode(&mode)?,
        (None, true) => workspace.clear_session_mode()?,
        (None, false) => match workspace.session_mode()? {
            Some(mode) => println!("{mode}"),
            None => println!("no session mode set"),
        },
        (Some(_), true) => unreachable!("clap enforces the conflict"),
    }
    Ok(())
}

fn cmd_status(plan: &Plan) -> Result<()> {
    let state = plan.state()?;
    let entry = state
        .current_entry()
        .context("plan state has no history entries")?;
    println!(
        "plan '{}': phase '{}' (entry {})",
        plan.name(),
        state.current_phase,
        entry.entry
    );
    if let Some(pending) = &state.pending_approval {
        println!("pending approval: {} -> {}", pending.from, pending.to);
    }
    if plan.has_blockers()? {
        println!("blocked tasks present; only the blocked route is open");
    }
    let missing = plan.missing_required_artifacts()?;
    if !missing.is_empty() {
        println!("missing required artifacts: {}", missing.join(", "));
    }
    for next in plan.suggested_next()? {
        let mut notes = Vec::new();
        if next.requires_approval {
            notes.push("requires approval");
        }
        if next.escalate {
            notes.push("retry budget reached, escalate");
        }
        if notes.is_empty() {
            println!("next: {}", next.phase);
        } else {
            println!("next: {} ({})", next.phase, notes.join("; "));
        }
    }
    Ok(())
}

fn cmd_next(plan: &Plan) -> Result<()> {
    for next in plan.suggested_next()? {
        println!(
            "{}\tapproval={}\tescalate={}",
            next.phase, next.requires_approval, next.escalate
        );
    }
    Ok(())
}

fn cmd_task(plan: &Plan, command: TaskCommand) -> Result<()> {
    match command {
        TaskCommand::Add {
            id,
            description,
            parents,
            resources,
            steps,
            task_type,
        } => {
            let mut task = Task::new(id, description);
            task.parents = parents;
            task.resources = resources;
            task.steps = steps;
            task.task_type = task_type;
            plan.add_task(task)?;
        }
        TaskCommand::Status { id, status } => {
            let status: TaskStatus = status.parse().map_err(anyhow::Error::msg)?;
            plan.set_status(&id, status)?;
        }
        TaskCommand::Parents { id, parents } => plan.update_parents(&id, parents)?,
    }
    Ok(())
}

fn cmd_available(plan: &Plan) -> Result<()> {
    for task in plan.available_tasks()? {
        println!("{}\t{}", task.id, task.description);
    }
    Ok(())
}

fn cmd_artifact(plan: &Plan, command: ArtifactCommand) -> Result<()> {
    match command {
        ArtifactCommand::Record { name, file } => {
            plan.record_artifact(&name, &file)?;
            println!("recorded '{name}' -> {file}");
        }
        ArtifactCommand::Missing => {
            for name in plan.missing_required_artifacts()? {
                println!("{name}");
            }
        }
        ArtifactCommand::Context { phase } => {
            let resolved = plan.resolve_context_artifacts(&phase)?;
            for artifact in resolved.resolved {
                println!(
                    "--- {} (from '{}', entry {}) ---",
                    artifact.name, artifact.phase, artifact.entry
                );
                print!("{}", artifact.content);
                if !artifact.content.ends_with('\n') {
                    println!();
                }
            }
            for name in resolved.missing {
                eprintln!("unresolved: {name}");
            }
        }
    }
    Ok(())
}

fn cmd_validate(plan: &Plan) -> Result<()> {
    // Loads already enforce schema and invariants; surfacing any error is the
    // whole command.
    let workflow = plan.workflow()?;
    let state = plan.state()?;
    plan.tasks()?;
    println!(
        "ok: {} phases, {} history entries, current phase '{}'",
        workflow.phases.len(),
        state.history.len(),
        state.current_phase
    );
    Ok(())
}
