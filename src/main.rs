use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use stagegate::config::Config;
use stagegate::manager::{Listing, Manager, NewPhase, NewTask};
use stagegate::workflow::{PhaseStatus, PlanStatus, TaskStatus, TaskType};
use stagegate::Result;

/// Stagegate - stage-gated plan, phase and task workflow
#[derive(Parser, Debug)]
#[command(name = "stagegate")]
#[command(version, about, long_about = None)]
#[command(after_help = concat!(
    "ENVIRONMENT:\n",
    "    STAGEGATE_DEBUG=1     Enable debug logging (alternative to --debug)\n",
    "    STAGEGATE_ROOT=<dir>  Workflow store location",
))]
pub struct Cli {
    /// Workflow store directory (default: ./.stagegate)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Project to operate on (default: from config, else "default")
    #[arg(short = 'p', long, global = true)]
    pub project: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable debug logging (writes to ~/.stagegate/stagegate.log)
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Manage projects
    #[command(subcommand)]
    Project(ProjectCommand),

    /// Manage plans within a project
    #[command(subcommand)]
    Plan(PlanCommand),

    /// Manage the phases of a plan
    #[command(subcommand)]
    Phase(PhaseCommand),

    /// Manage the tasks of a plan
    #[command(subcommand)]
    Task(TaskCommand),

    /// Manage legacy change records
    #[command(subcommand)]
    Change(ChangeCommand),
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum ProjectCommand {
    Create { slug: String, title: String },
    List,
    Show { slug: String },
    Archive { slug: String },
    Delete { slug: String },
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum PlanCommand {
    Create {
        slug: String,
        title: String,
    },
    List {
        /// List archived plans instead of active ones
        #[arg(long)]
        archived: bool,
    },
    Show {
        slug: String,
    },
    Transition {
        slug: String,
        status: PlanStatus,
    },
    Archive {
        slug: String,
    },
    Delete {
        slug: String,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum PhaseCommand {
    Add {
        plan: String,
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Ids of phases that must complete first
        #[arg(long = "depends-on")]
        depends_on: Vec<String>,
        #[arg(long)]
        requires_approval: bool,
    },
    List {
        plan: String,
    },
    Transition {
        plan: String,
        id: String,
        status: PhaseStatus,
    },
    Approve {
        plan: String,
        id: String,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum TaskCommand {
    Add {
        plan: String,
        description: String,
        #[arg(long)]
        phase: Option<String>,
        #[arg(long = "type", default_value = "implement")]
        task_type: TaskType,
        #[arg(long = "depends-on")]
        depends_on: Vec<String>,
    },
    List {
        plan: String,
        /// Only tasks of this phase
        #[arg(long)]
        phase: Option<String>,
    },
    Transition {
        plan: String,
        id: String,
        status: TaskStatus,
    },
    Approve {
        plan: String,
        id: String,
    },
    Reject {
        plan: String,
        id: String,
        reason: String,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum ChangeCommand {
    Create { description: String },
    List,
    Status { slug: String, status: PlanStatus },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    stagegate::log::init_with_debug(cli.debug);

    let config = Config::load().unwrap_or_else(|err| {
        warn!(error = %err, "could not load config, using defaults");
        Config::default()
    });
    let root = match cli.root.clone() {
        Some(root) => root,
        None => config.workflow_root(&std::env::current_dir()?),
    };
    info!(root = %root.display(), "stagegate starting");

    let ctx = Context {
        manager: Manager::open(root),
        cancel: CancellationToken::new(),
        project: cli
            .project
            .clone()
            .unwrap_or_else(|| config.effective_project().to_string()),
        author: config.effective_author(),
        json: cli.json,
    };

    match cli.command {
        Command::Project(command) => run_project(&ctx, command),
        Command::Plan(command) => run_plan(&ctx, command),
        Command::Phase(command) => run_phase(&ctx, command),
        Command::Task(command) => run_task(&ctx, command),
        Command::Change(command) => run_change(&ctx, command),
    }
}

struct Context {
    manager: Manager,
    cancel: CancellationToken,
    project: String,
    author: String,
    json: bool,
}

impl Context {
    /// Print `value` as JSON, or with `human` otherwise.
    fn emit<T: Serialize>(&self, value: &T, human: impl FnOnce(&T)) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            human(value);
        }
        Ok(())
    }

    fn emit_listing<T: Serialize>(&self, listing: &Listing<T>, line: impl Fn(&T)) -> Result<()> {
        for failure in &listing.errors {
            eprintln!("warning: skipped {}: {}", failure.name, failure.error);
        }
        self.emit(&listing.items, |items| items.iter().for_each(line))
    }
}

fn run_project(ctx: &Context, command: ProjectCommand) -> Result<()> {
    let (m, cancel) = (&ctx.manager, &ctx.cancel);
    match command {
        ProjectCommand::Create { slug, title } => {
            let project = m.create_project(cancel, &slug, &title)?;
            ctx.emit(&project, |p| println!("Created project {} ({})", p.slug, p.id))
        }
        ProjectCommand::List => ctx.emit_listing(&m.list_projects(cancel)?, |p| {
            println!("{:<24} {:<10} {}", p.slug, p.status, p.title)
        }),
        ProjectCommand::Show { slug } => {
            let project = m.load_project(cancel, &slug)?;
            ctx.emit(&project, |p| {
                println!("{} - {}", p.slug, p.title);
                println!("  status:  {}", p.status);
                println!("  created: {}", p.created_at.format("%Y-%m-%d %H:%M"));
            })
        }
        ProjectCommand::Archive { slug } => {
            let project = m.archive_project(cancel, &slug)?;
            ctx.emit(&project, |p| println!("Archived project {}", p.slug))
        }
        ProjectCommand::Delete { slug } => {
            m.delete_project(cancel, &slug)?;
            ctx.emit(&slug, |s| println!("Deleted project {}", s))
        }
    }
}

fn run_plan(ctx: &Context, command: PlanCommand) -> Result<()> {
    let (m, cancel, project) = (&ctx.manager, &ctx.cancel, ctx.project.as_str());
    match command {
        PlanCommand::Create { slug, title } => {
            let plan = m.create_plan(cancel, project, &slug, &title)?;
            ctx.emit(&plan, |p| println!("Created plan {} ({})", p.slug, p.id))
        }
        PlanCommand::List { archived } => {
            let listing = if archived {
                m.list_archived_plans(cancel, project)?
            } else {
                m.list_plans(cancel, project)?
            };
            ctx.emit_listing(&listing, |p| {
                println!("{:<24} {:<18} {}", p.slug, p.effective_status(), p.title)
            })
        }
        PlanCommand::Show { slug } => {
            let plan = m.load_plan(cancel, project, &slug)?;
            let phases = m.load_phases(cancel, project, &slug)?;
            let tasks = m.load_tasks(cancel, project, &slug)?;
            let status = plan.effective_status();
            ctx.emit(&plan, |p| {
                let inferred = if status.is_inferred() { " (inferred)" } else { "" };
                println!("{} - {}", p.slug, p.title);
                println!("  status: {}{}", status, inferred);
                if let Some(goal) = &p.goal {
                    println!("  goal:   {}", goal);
                }
                println!("  phases: {}", phases.len());
                println!("  tasks:  {}", tasks.len());
                if let Some(error) = &p.last_error {
                    println!("  last error: {}", error);
                }
            })
        }
        PlanCommand::Transition { slug, status } => {
            let plan = m.transition_plan(cancel, project, &slug, status)?;
            ctx.emit(&plan, |p| println!("Plan {} is now {}", p.slug, p.effective_status()))
        }
        PlanCommand::Archive { slug } => {
            let plan = m.archive_plan(cancel, project, &slug)?;
            ctx.emit(&plan, |p| println!("Archived plan {}", p.slug))
        }
        PlanCommand::Delete { slug } => {
            m.delete_plan(cancel, project, &slug)?;
            ctx.emit(&slug, |s| println!("Deleted plan {}", s))
        }
    }
}

fn run_phase(ctx: &Context, command: PhaseCommand) -> Result<()> {
    let (m, cancel, project) = (&ctx.manager, &ctx.cancel, ctx.project.as_str());
    match command {
        PhaseCommand::Add {
            plan,
            name,
            description,
            depends_on,
            requires_approval,
        } => {
            let new = NewPhase {
                name,
                description,
                depends_on,
                requires_approval,
                agent_config: None,
            };
            let phase = m.create_phase(cancel, project, &plan, new)?;
            ctx.emit(&phase, |p| println!("Created phase {} ({})", p.name, p.id))
        }
        PhaseCommand::List { plan } => {
            let phases = m.load_phases(cancel, project, &plan)?;
            ctx.emit(&phases, |phases| {
                for p in phases {
                    let deps = if p.depends_on.is_empty() {
                        String::new()
                    } else {
                        format!(" after {}", p.depends_on.join(", "))
                    };
                    println!("{:>3}. {:<24} {:<9} {}{}", p.sequence, p.id, p.status, p.name, deps);
                }
            })
        }
        PhaseCommand::Transition { plan, id, status } => {
            let phase = m.transition_phase(cancel, project, &plan, &id, status)?;
            ctx.emit(&phase, |p| println!("Phase {} is now {}", p.id, p.status))
        }
        PhaseCommand::Approve { plan, id } => {
            let phase = m.approve_phase(cancel, project, &plan, &id, &ctx.author)?;
            ctx.emit(&phase, |p| println!("Approved phase {}", p.id))
        }
    }
}

fn run_task(ctx: &Context, command: TaskCommand) -> Result<()> {
    let (m, cancel, project) = (&ctx.manager, &ctx.cancel, ctx.project.as_str());
    match command {
        TaskCommand::Add {
            plan,
            description,
            phase,
            task_type,
            depends_on,
        } => {
            let new = NewTask {
                description,
                phase_id: phase,
                task_type,
                depends_on,
                ..Default::default()
            };
            let task = m.create_task(cancel, project, &plan, new)?;
            ctx.emit(&task, |t| println!("Created task {}", t.id))
        }
        TaskCommand::List { plan, phase } => {
            let tasks = match phase {
                Some(phase) => m.tasks_by_phase(cancel, project, &plan, &phase)?,
                None => m.load_tasks(cancel, project, &plan)?,
            };
            ctx.emit(&tasks, |tasks| {
                for t in tasks {
                    println!(
                        "{:>3}. {:<24} {:<16} [{}] {}",
                        t.sequence, t.id, t.status, t.task_type, t.description
                    );
                }
            })
        }
        TaskCommand::Transition { plan, id, status } => {
            let task = m.transition_task(cancel, project, &plan, &id, status)?;
            ctx.emit(&task, |t| println!("Task {} is now {}", t.id, t.status))
        }
        TaskCommand::Approve { plan, id } => {
            let task = m.approve_task(cancel, project, &plan, &id, &ctx.author)?;
            ctx.emit(&task, |t| println!("Approved task {}", t.id))
        }
        TaskCommand::Reject { plan, id, reason } => {
            let task = m.reject_task(cancel, project, &plan, &id, &reason)?;
            ctx.emit(&task, |t| {
                println!("Rejected task {} (iteration {})", t.id, t.iteration)
            })
        }
    }
}

fn run_change(ctx: &Context, command: ChangeCommand) -> Result<()> {
    let (m, cancel) = (&ctx.manager, &ctx.cancel);
    match command {
        ChangeCommand::Create { description } => {
            let record = m.create_change(cancel, &description, &ctx.author)?;
            ctx.emit(&record, |r| println!("Created change {}", r.slug))
        }
        ChangeCommand::List => ctx.emit_listing(&m.list_changes(cancel)?, |r| {
            println!("{:<32} {:<18} {}", r.slug, r.status, r.author)
        }),
        ChangeCommand::Status { slug, status } => {
            let record = m.update_change_status(cancel, &slug, status)?;
            ctx.emit(&record, |r| println!("Change {} is now {}", r.slug, r.status))
        }
    }
}
