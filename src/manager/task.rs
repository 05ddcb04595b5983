//! Task operations.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::plan::PlanLocation;
use super::{check_cancelled, keys, plan_lock_keys, Manager};
use crate::error::{EntityKind, Error, Result};
use crate::events::EventKind;
use crate::slug::{require, validate_slug};
use crate::workflow::{
    AcceptanceCriterion, DependencyGraph, Lifecycle, Phase, Plan, Task, TaskStatus, TaskType,
};

/// `1. Do the thing` or `1) Do the thing`.
static NUMBERED_ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)[.)]\s+(.+)$").unwrap());

/// Caller-supplied fields of a new task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewTask {
    pub description: String,
    pub phase_id: Option<String>,
    pub task_type: TaskType,
    pub acceptance_criteria: Vec<AcceptanceCriterion>,
    pub files: Vec<String>,
    pub depends_on: Vec<String>,
}

impl NewTask {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Default::default()
        }
    }
}

/// Turn a numbered list into pending tasks.
///
/// Lines that are not numbered items are ignored. Sequences count up from
/// 1 in order of appearance; the numbers written in the outline are not
/// used, so gaps and duplicates there do not matter.
pub fn parse_task_outline(plan: &Plan, outline: &str) -> Vec<Task> {
    outline
        .lines()
        .filter_map(|line| NUMBERED_ITEM_RE.captures(line))
        .filter_map(|caps| {
            let description = caps.get(2)?.as_str().trim();
            (!description.is_empty()).then(|| description.to_string())
        })
        .enumerate()
        .map(|(i, description)| Task::new(plan, i as u32 + 1, &description))
        .collect()
}

fn find(tasks: &[Task], id: &str) -> Result<usize> {
    tasks
        .iter()
        .position(|t| t.id == id)
        .ok_or_else(|| Error::not_found(EntityKind::Task, id))
}

fn check_not_terminal(task: &Task) -> Result<()> {
    if task.status.is_terminal() {
        return Err(frozen(task));
    }
    Ok(())
}

fn frozen(task: &Task) -> Error {
    Error::Terminal {
        kind: EntityKind::Task,
        id: task.id.clone(),
        status: task.status.to_string(),
    }
}

fn check_transition(task: &Task, from: TaskStatus, target: TaskStatus) -> Result<()> {
    if !from.can_transition_to(target) {
        return Err(Error::InvalidTransition {
            kind: EntityKind::Task,
            id: task.id.clone(),
            from: from.to_string(),
            to: target.to_string(),
        });
    }
    Ok(())
}

fn stamp(task: &mut Task, target: TaskStatus, now: DateTime<Utc>) {
    task.status = target;
    if target.is_terminal() {
        task.completed_at = Some(now);
    }
}

/// Every phase a task names must be one of `phases`.
fn check_phase_refs(tasks: &[Task], phases: &[Phase]) -> Result<()> {
    for task in tasks {
        if let Some(phase_id) = &task.phase_id {
            if !phases.iter().any(|p| &p.id == phase_id) {
                return Err(Error::not_found(EntityKind::Phase, phase_id.clone()));
            }
        }
    }
    Ok(())
}

fn renumber(tasks: &mut [Task]) {
    for (position, task) in tasks.iter_mut().enumerate() {
        task.sequence = position as u32 + 1;
    }
}

fn next_id(plan: &Plan, tasks: &[Task]) -> String {
    let mut n = tasks.len() as u32 + 1;
    loop {
        let id = Task::id_for(&plan.slug, n);
        if !tasks.iter().any(|t| t.id == id) {
            return id;
        }
        n += 1;
    }
}

impl Manager {
    pub(super) fn read_tasks(
        &self,
        location: PlanLocation,
        project: &str,
        plan: &str,
    ) -> Result<Vec<Task>> {
        let key = location.root(project, plan).join(keys::TASKS_FILE);
        Ok(self.read_doc::<Vec<Task>>(&key)?.unwrap_or_default())
    }

    /// Run `edit` over the tasks of an active plan under the plan's lock
    /// set, writing the list back if it changed.
    ///
    /// Phases cannot change while the locks are held, so every task's phase
    /// is checked against them before the write.
    fn edit_tasks<R>(
        &self,
        cancel: &CancellationToken,
        project: &str,
        plan_slug: &str,
        edit: impl FnOnce(&Plan, &mut Vec<Task>) -> Result<R>,
    ) -> Result<R> {
        check_cancelled(cancel)?;
        validate_slug(project)?;
        validate_slug(plan_slug)?;

        self.locked(plan_lock_keys(project, plan_slug), || {
            check_cancelled(cancel)?;
            let plan = self.active_plan(project, plan_slug)?;
            let before = self.read_tasks(PlanLocation::Active, project, plan_slug)?;
            let mut tasks = before.clone();
            let result = edit(&plan, &mut tasks)?;
            if tasks != before {
                let phases = self.read_phases(PlanLocation::Active, project, plan_slug)?;
                check_phase_refs(&tasks, &phases)?;
                DependencyGraph::build(&tasks)?;
                let key = keys::plan(project, plan_slug).join(keys::TASKS_FILE);
                self.write_doc(&key, &tasks, || {
                    Error::not_found(EntityKind::Plan, plan.id.clone())
                })?;
            }
            Ok(result)
        })
    }

    /// Single-task status change shared by the named transitions.
    fn move_task(
        &self,
        cancel: &CancellationToken,
        project: &str,
        plan: &str,
        id: &str,
        target: TaskStatus,
        apply: impl FnOnce(&mut Task, DateTime<Utc>),
    ) -> Result<(Task, TaskStatus)> {
        let moved = self.edit_tasks(cancel, project, plan, |_, tasks| {
            let index = find(tasks, id)?;
            let task = &mut tasks[index];
            let from = task.status;
            check_transition(task, from, target)?;
            let now = Utc::now();
            stamp(task, target, now);
            apply(&mut *task, now);
            Ok((task.clone(), from))
        })?;
        info!(project, plan, task = id, from = %moved.1, to = %target, "task transitioned");
        Ok(moved)
    }

    fn publish_task_transition(&self, project: &str, plan: &str, task: &Task, from: TaskStatus) {
        self.publish(EventKind::TaskTransitioned {
            project: project.to_string(),
            plan: plan.to_string(),
            task: task.id.clone(),
            from,
            to: task.status,
        });
    }

    /// Tasks of a plan in sequence order.
    pub fn load_tasks(
        &self,
        cancel: &CancellationToken,
        project: &str,
        plan: &str,
    ) -> Result<Vec<Task>> {
        check_cancelled(cancel)?;
        validate_slug(project)?;
        validate_slug(plan)?;
        let (location, _) = self
            .locate_plan(project, plan)?
            .ok_or_else(|| Error::not_found(EntityKind::Plan, Plan::id_for(project, plan)))?;
        let mut tasks = self.read_tasks(location, project, plan)?;
        tasks.sort_by_key(|t| t.sequence);
        Ok(tasks)
    }

    pub fn get_task(
        &self,
        cancel: &CancellationToken,
        project: &str,
        plan: &str,
        id: &str,
    ) -> Result<Task> {
        self.load_tasks(cancel, project, plan)?
            .into_iter()
            .find(|t| t.id == id)
            .ok_or_else(|| Error::not_found(EntityKind::Task, id))
    }

    pub fn tasks_by_phase(
        &self,
        cancel: &CancellationToken,
        project: &str,
        plan: &str,
        phase_id: &str,
    ) -> Result<Vec<Task>> {
        Ok(self
            .load_tasks(cancel, project, plan)?
            .into_iter()
            .filter(|t| t.phase_id.as_deref() == Some(phase_id))
            .collect())
    }

    /// Append a task to a plan. A phase, if given, must exist.
    pub fn create_task(
        &self,
        cancel: &CancellationToken,
        project: &str,
        plan: &str,
        new: NewTask,
    ) -> Result<Task> {
        require("description", &new.description)?;
        let task = self.edit_tasks(cancel, project, plan, |owner, tasks| {
            let mut task = Task::new(owner, tasks.len() as u32 + 1, new.description.trim());
            task.id = next_id(owner, tasks);
            task.phase_id = new.phase_id;
            task.task_type = new.task_type;
            task.acceptance_criteria = new.acceptance_criteria;
            task.files = new.files;
            task.depends_on = new.depends_on;
            tasks.push(task.clone());
            Ok(task)
        })?;
        info!(project, plan, task = %task.id, "task created");
        Ok(task)
    }

    /// Replace every task of a plan. Sequences follow list order; tasks
    /// that already existed may only change status along the task graph.
    pub fn save_tasks(
        &self,
        cancel: &CancellationToken,
        project: &str,
        plan: &str,
        tasks: Vec<Task>,
    ) -> Result<Vec<Task>> {
        let saved = self.edit_tasks(cancel, project, plan, |owner, stored| {
            let mut incoming = tasks;
            for task in &incoming {
                require("description", &task.description)?;
                if task.plan_id != owner.id {
                    return Err(Error::Validation(format!(
                        "task {} belongs to {}, not {}",
                        task.id, task.plan_id, owner.id
                    )));
                }
                if let Some(old) = stored.iter().find(|t| t.id == task.id) {
                    if old.status != task.status {
                        check_transition(task, old.status, task.status)?;
                    }
                }
            }
            DependencyGraph::build(&incoming)?;
            renumber(&mut incoming);
            *stored = incoming;
            Ok(stored.clone())
        })?;

        info!(project, plan, count = saved.len(), "tasks saved");
        self.publish(EventKind::TasksGenerated {
            project: project.to_string(),
            plan: plan.to_string(),
            count: saved.len(),
        });
        Ok(saved)
    }

    /// Apply `mutate` to a task that has not reached a terminal status.
    pub fn update_task<F>(
        &self,
        cancel: &CancellationToken,
        project: &str,
        plan: &str,
        id: &str,
        mutate: F,
    ) -> Result<Task>
    where
        F: FnOnce(&mut Task),
    {
        let (task, from) = self.edit_tasks(cancel, project, plan, |_, tasks| {
            let index = find(tasks, id)?;
            let before = tasks[index].clone();
            check_not_terminal(&before)?;

            mutate(&mut tasks[index]);
            let task = &mut tasks[index];
            if task.id != before.id
                || task.plan_id != before.plan_id
                || task.sequence != before.sequence
            {
                return Err(Error::Validation(
                    "task id, plan and sequence cannot be changed".to_string(),
                ));
            }
            require("description", &task.description)?;
            if task.status != before.status {
                let target = task.status;
                check_transition(task, before.status, target)?;
                stamp(task, target, Utc::now());
            }
            Ok((task.clone(), before.status))
        })?;

        debug!(project, plan, task = id, "task updated");
        if task.status != from {
            self.publish_task_transition(project, plan, &task, from);
        }
        Ok(task)
    }

    pub fn transition_task(
        &self,
        cancel: &CancellationToken,
        project: &str,
        plan: &str,
        id: &str,
        target: TaskStatus,
    ) -> Result<Task> {
        let (task, from) = self.move_task(cancel, project, plan, id, target, |_, _| {})?;
        self.publish_task_transition(project, plan, &task, from);
        Ok(task)
    }

    /// Put a pending task up for approval.
    pub fn submit_task(
        &self,
        cancel: &CancellationToken,
        project: &str,
        plan: &str,
        id: &str,
    ) -> Result<Task> {
        self.transition_task(cancel, project, plan, id, TaskStatus::PendingApproval)
    }

    pub fn approve_task(
        &self,
        cancel: &CancellationToken,
        project: &str,
        plan: &str,
        id: &str,
        approved_by: &str,
    ) -> Result<Task> {
        require("approved_by", approved_by)?;
        let (task, from) =
            self.move_task(cancel, project, plan, id, TaskStatus::Approved, |task, now| {
                approve(task, approved_by, now)
            })?;
        self.publish_task_transition(project, plan, &task, from);
        Ok(task)
    }

    /// Approve every task awaiting approval. Returns the tasks that changed.
    pub fn approve_all_tasks(
        &self,
        cancel: &CancellationToken,
        project: &str,
        plan: &str,
        approved_by: &str,
    ) -> Result<Vec<Task>> {
        require("approved_by", approved_by)?;
        let approved = self.edit_tasks(cancel, project, plan, |_, tasks| {
            let now = Utc::now();
            let mut approved = Vec::new();
            for task in tasks.iter_mut() {
                if task.status == TaskStatus::PendingApproval {
                    stamp(task, TaskStatus::Approved, now);
                    approve(task, approved_by, now);
                    approved.push(task.clone());
                }
            }
            Ok(approved)
        })?;

        info!(project, plan, count = approved.len(), "tasks approved");
        for task in &approved {
            self.publish_task_transition(project, plan, task, TaskStatus::PendingApproval);
        }
        Ok(approved)
    }

    /// Send a task awaiting approval back for rework.
    pub fn reject_task(
        &self,
        cancel: &CancellationToken,
        project: &str,
        plan: &str,
        id: &str,
        reason: &str,
    ) -> Result<Task> {
        require("reason", reason)?;
        let (task, _) = self.move_task(cancel, project, plan, id, TaskStatus::Rejected, |task, _| {
            task.rejection_reason = Some(reason.to_string());
            task.iteration += 1;
        })?;
        self.publish(EventKind::TaskRejected {
            project: project.to_string(),
            plan: plan.to_string(),
            task: id.to_string(),
            reason: reason.to_string(),
        });
        Ok(task)
    }

    /// Give up on a task, marking it failed with the reason.
    pub fn escalate_task(
        &self,
        cancel: &CancellationToken,
        project: &str,
        plan: &str,
        id: &str,
        reason: &str,
    ) -> Result<Task> {
        require("reason", reason)?;
        let (task, _) = self.move_task(cancel, project, plan, id, TaskStatus::Failed, |task, _| {
            task.escalation_reason = Some(reason.to_string());
        })?;
        self.publish(EventKind::TaskEscalated {
            project: project.to_string(),
            plan: plan.to_string(),
            task: id.to_string(),
            reason: reason.to_string(),
        });
        Ok(task)
    }

    /// Remove a task that is not in progress, renumbering the rest and
    /// dropping it from their dependencies.
    pub fn delete_task(
        &self,
        cancel: &CancellationToken,
        project: &str,
        plan: &str,
        id: &str,
    ) -> Result<()> {
        self.edit_tasks(cancel, project, plan, |_, tasks| {
            let index = find(tasks, id)?;
            if tasks[index].status == TaskStatus::InProgress {
                return Err(frozen(&tasks[index]));
            }
            tasks.remove(index);
            for task in tasks.iter_mut() {
                task.depends_on.retain(|dep| dep != id);
            }
            renumber(tasks);
            Ok(())
        })?;
        info!(project, plan, task = id, "task deleted");
        Ok(())
    }

    /// Replace a plan's tasks with ones parsed from a numbered outline.
    ///
    /// Refused once any existing task has left `pending`, so work already
    /// under way is never discarded.
    pub fn generate_tasks_from_outline(
        &self,
        cancel: &CancellationToken,
        project: &str,
        plan: &str,
        outline: &str,
    ) -> Result<Vec<Task>> {
        let tasks = self.edit_tasks(cancel, project, plan, |owner, stored| {
            if let Some(started) = stored.iter().find(|t| t.status != TaskStatus::Pending) {
                return Err(Error::Validation(format!(
                    "task {} is {}; tasks can only be regenerated while all are pending",
                    started.id, started.status
                )));
            }
            *stored = parse_task_outline(owner, outline);
            Ok(stored.clone())
        })?;

        info!(project, plan, count = tasks.len(), "tasks generated");
        self.publish(EventKind::TasksGenerated {
            project: project.to_string(),
            plan: plan.to_string(),
            count: tasks.len(),
        });
        Ok(tasks)
    }
}

fn approve(task: &mut Task, approved_by: &str, now: DateTime<Utc>) {
    task.approved_by = Some(approved_by.to_string());
    task.approved_at = Some(now);
    task.rejection_reason = None;
}
