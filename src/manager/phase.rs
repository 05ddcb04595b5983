//! Phase operations.
//!
//! All phases of a plan live in one `phases.json` document guarded by the
//! plan's phases lock, so every mutation is a read-modify-write of the
//! whole list.

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::plan::PlanLocation;
use super::{check_cancelled, keys, plan_lock_keys, Manager};
use crate::error::{EntityKind, Error, Result};
use crate::events::EventKind;
use crate::slug::{require, validate_slug};
use crate::workflow::{
    pending_dependencies, DependencyGraph, Lifecycle, Phase, PhaseAgentConfig, PhaseStatus, Plan,
};

/// Caller-supplied fields of a new phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewPhase {
    pub name: String,
    pub description: String,
    pub depends_on: Vec<String>,
    pub requires_approval: bool,
    pub agent_config: Option<PhaseAgentConfig>,
}

impl NewPhase {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            ..Default::default()
        }
    }
}

fn find(phases: &[Phase], id: &str) -> Result<usize> {
    phases
        .iter()
        .position(|p| p.id == id)
        .ok_or_else(|| Error::not_found(EntityKind::Phase, id))
}

/// Phases that have started or finished are frozen.
fn check_editable(phase: &Phase) -> Result<()> {
    match phase.status {
        PhaseStatus::Active | PhaseStatus::Complete | PhaseStatus::Failed => Err(Error::Terminal {
            kind: EntityKind::Phase,
            id: phase.id.clone(),
            status: phase.status.to_string(),
        }),
        _ => Ok(()),
    }
}

/// Check that `phases[index]` may move to `target` given its siblings.
fn check_transition(
    phases: &[Phase],
    index: usize,
    from: PhaseStatus,
    target: PhaseStatus,
) -> Result<()> {
    let phase = &phases[index];
    if !from.can_transition_to(target) {
        return Err(Error::InvalidTransition {
            kind: EntityKind::Phase,
            id: phase.id.clone(),
            from: from.to_string(),
            to: target.to_string(),
        });
    }
    if target == PhaseStatus::Active {
        let pending = pending_dependencies(phase, phases);
        if !pending.is_empty() {
            return Err(Error::DependenciesIncomplete {
                id: phase.id.clone(),
                pending,
            });
        }
        if phase.requires_approval && !phase.approved {
            return Err(Error::Validation(format!(
                "phase {} must be approved before it starts",
                phase.id
            )));
        }
    }
    Ok(())
}

fn stamp(phase: &mut Phase, target: PhaseStatus, now: DateTime<Utc>) {
    phase.status = target;
    match target {
        PhaseStatus::Active => phase.started_at = Some(now),
        PhaseStatus::Complete | PhaseStatus::Failed => phase.completed_at = Some(now),
        _ => {}
    }
}

fn renumber(phases: &mut [Phase]) {
    for (position, phase) in phases.iter_mut().enumerate() {
        phase.sequence = position as u32 + 1;
    }
}

/// Smallest id number at or above `len + 1` not already taken. Ids stay
/// stable across deletes, so the sequence alone may collide.
fn next_id(plan: &Plan, phases: &[Phase]) -> String {
    let mut n = phases.len() as u32 + 1;
    loop {
        let id = Phase::id_for(&plan.slug, n);
        if !phases.iter().any(|p| p.id == id) {
            return id;
        }
        n += 1;
    }
}

impl Manager {
    pub(super) fn read_phases(
        &self,
        location: PlanLocation,
        project: &str,
        plan: &str,
    ) -> Result<Vec<Phase>> {
        let key = location.root(project, plan).join(keys::PHASES_FILE);
        Ok(self.read_doc::<Vec<Phase>>(&key)?.unwrap_or_default())
    }

    /// Run `edit` over the phases of an active plan under the plan's lock
    /// set.
    ///
    /// The edited list must still form a valid dependency graph. It is
    /// written back only if it changed.
    fn edit_phases<R>(
        &self,
        cancel: &CancellationToken,
        project: &str,
        plan_slug: &str,
        edit: impl FnOnce(&Plan, &mut Vec<Phase>) -> Result<R>,
    ) -> Result<R> {
        check_cancelled(cancel)?;
        validate_slug(project)?;
        validate_slug(plan_slug)?;

        self.locked(plan_lock_keys(project, plan_slug), || {
            check_cancelled(cancel)?;
            let plan = self.active_plan(project, plan_slug)?;
            let before = self.read_phases(PlanLocation::Active, project, plan_slug)?;
            let mut phases = before.clone();
            let result = edit(&plan, &mut phases)?;
            if phases != before {
                DependencyGraph::build(&phases)?;
                let key = keys::plan(project, plan_slug).join(keys::PHASES_FILE);
                self.write_doc(&key, &phases, || {
                    Error::not_found(EntityKind::Plan, plan.id.clone())
                })?;
            }
            Ok(result)
        })
    }

    /// Phases of a plan in sequence order. A plan without phases yields an
    /// empty list.
    pub fn load_phases(
        &self,
        cancel: &CancellationToken,
        project: &str,
        plan: &str,
    ) -> Result<Vec<Phase>> {
        check_cancelled(cancel)?;
        validate_slug(project)?;
        validate_slug(plan)?;
        let (location, _) = self
            .locate_plan(project, plan)?
            .ok_or_else(|| Error::not_found(EntityKind::Plan, Plan::id_for(project, plan)))?;
        let mut phases = self.read_phases(location, project, plan)?;
        phases.sort_by_key(|p| p.sequence);
        Ok(phases)
    }

    pub fn get_phase(
        &self,
        cancel: &CancellationToken,
        project: &str,
        plan: &str,
        id: &str,
    ) -> Result<Phase> {
        self.load_phases(cancel, project, plan)?
            .into_iter()
            .find(|p| p.id == id)
            .ok_or_else(|| Error::not_found(EntityKind::Phase, id))
    }

    /// Append a phase to a plan.
    pub fn create_phase(
        &self,
        cancel: &CancellationToken,
        project: &str,
        plan: &str,
        new: NewPhase,
    ) -> Result<Phase> {
        require("name", &new.name)?;
        let phase = self.edit_phases(cancel, project, plan, |owner, phases| {
            let mut phase = Phase::new(owner, phases.len() as u32 + 1, &new.name, &new.description);
            phase.id = next_id(owner, phases);
            phase.depends_on = new.depends_on;
            phase.requires_approval = new.requires_approval;
            phase.agent_config = new.agent_config;
            phases.push(phase.clone());
            Ok(phase)
        })?;
        info!(project, plan, phase = %phase.id, "phase created");
        Ok(phase)
    }

    /// Replace every phase of a plan, as a generator does.
    ///
    /// Sequences are renumbered from the list order. Phases that already
    /// existed may only change status along the phase graph.
    pub fn save_phases(
        &self,
        cancel: &CancellationToken,
        project: &str,
        plan: &str,
        phases: Vec<Phase>,
    ) -> Result<Vec<Phase>> {
        let saved = self.edit_phases(cancel, project, plan, |owner, stored| {
            let mut incoming = phases;
            for phase in &incoming {
                require("name", &phase.name)?;
                if phase.plan_id != owner.id {
                    return Err(Error::Validation(format!(
                        "phase {} belongs to {}, not {}",
                        phase.id, phase.plan_id, owner.id
                    )));
                }
                if let Some(old) = stored.iter().find(|p| p.id == phase.id) {
                    if old.status != phase.status && !old.status.can_transition_to(phase.status) {
                        return Err(Error::InvalidTransition {
                            kind: EntityKind::Phase,
                            id: phase.id.clone(),
                            from: old.status.to_string(),
                            to: phase.status.to_string(),
                        });
                    }
                }
            }
            DependencyGraph::build(&incoming)?;
            renumber(&mut incoming);
            *stored = incoming;
            Ok(stored.clone())
        })?;

        info!(project, plan, count = saved.len(), "phases saved");
        self.publish(EventKind::PhasesGenerated {
            project: project.to_string(),
            plan: plan.to_string(),
            count: saved.len(),
        });
        Ok(saved)
    }

    /// Apply `mutate` to one phase that has not started yet.
    pub fn update_phase<F>(
        &self,
        cancel: &CancellationToken,
        project: &str,
        plan: &str,
        id: &str,
        mutate: F,
    ) -> Result<Phase>
    where
        F: FnOnce(&mut Phase),
    {
        let (phase, from) = self.edit_phases(cancel, project, plan, |_, phases| {
            let index = find(phases, id)?;
            let before = phases[index].clone();
            check_editable(&before)?;

            mutate(&mut phases[index]);
            let after = &phases[index];
            if after.id != before.id
                || after.plan_id != before.plan_id
                || after.sequence != before.sequence
            {
                return Err(Error::Validation(
                    "phase id, plan and sequence cannot be changed".to_string(),
                ));
            }
            require("name", &after.name)?;
            if after.status != before.status {
                let target = after.status;
                check_transition(phases, index, before.status, target)?;
                stamp(&mut phases[index], target, Utc::now());
            }
            Ok((phases[index].clone(), before.status))
        })?;

        debug!(project, plan, phase = id, "phase updated");
        if phase.status != from {
            self.publish(EventKind::PhaseTransitioned {
                project: project.to_string(),
                plan: plan.to_string(),
                phase: id.to_string(),
                from,
                to: phase.status,
            });
        }
        Ok(phase)
    }

    /// Move a phase along its status graph.
    ///
    /// Starting a phase requires every dependency to be complete and, when
    /// the phase asks for it, an approval.
    pub fn transition_phase(
        &self,
        cancel: &CancellationToken,
        project: &str,
        plan: &str,
        id: &str,
        target: PhaseStatus,
    ) -> Result<Phase> {
        let (phase, from) = self.edit_phases(cancel, project, plan, |_, phases| {
            let index = find(phases, id)?;
            let from = phases[index].status;
            check_transition(phases, index, from, target)?;
            stamp(&mut phases[index], target, Utc::now());
            Ok((phases[index].clone(), from))
        })?;

        info!(project, plan, phase = id, %from, to = %target, "phase transitioned");
        self.publish(EventKind::PhaseTransitioned {
            project: project.to_string(),
            plan: plan.to_string(),
            phase: id.to_string(),
            from,
            to: target,
        });
        Ok(phase)
    }

    pub fn approve_phase(
        &self,
        cancel: &CancellationToken,
        project: &str,
        plan: &str,
        id: &str,
        approved_by: &str,
    ) -> Result<Phase> {
        require("approved_by", approved_by)?;
        let phase = self.edit_phases(cancel, project, plan, |_, phases| {
            let index = find(phases, id)?;
            let phase = &mut phases[index];
            check_editable(phase)?;
            if !phase.requires_approval {
                return Err(Error::Validation(format!(
                    "phase {} does not require approval",
                    phase.id
                )));
            }
            if phase.approved {
                return Err(Error::Validation(format!(
                    "phase {} is already approved",
                    phase.id
                )));
            }
            approve(phase, approved_by, Utc::now());
            Ok(phase.clone())
        })?;

        info!(project, plan, phase = id, approved_by, "phase approved");
        self.publish(EventKind::PhaseApproved {
            project: project.to_string(),
            plan: plan.to_string(),
            phase: id.to_string(),
        });
        Ok(phase)
    }

    /// Withdraw a phase's approval, recording why.
    pub fn reject_phase(
        &self,
        cancel: &CancellationToken,
        project: &str,
        plan: &str,
        id: &str,
        reason: &str,
    ) -> Result<Phase> {
        require("reason", reason)?;
        let phase = self.edit_phases(cancel, project, plan, |_, phases| {
            let index = find(phases, id)?;
            let phase = &mut phases[index];
            check_editable(phase)?;
            phase.approved = false;
            phase.approved_by = None;
            phase.approved_at = None;
            phase.rejection_reason = Some(reason.to_string());
            Ok(phase.clone())
        })?;

        info!(project, plan, phase = id, reason, "phase rejected");
        self.publish(EventKind::PhaseRejected {
            project: project.to_string(),
            plan: plan.to_string(),
            phase: id.to_string(),
            reason: reason.to_string(),
        });
        Ok(phase)
    }

    /// Approve every phase still waiting for approval. Returns the phases
    /// that changed.
    pub fn approve_all_phases(
        &self,
        cancel: &CancellationToken,
        project: &str,
        plan: &str,
        approved_by: &str,
    ) -> Result<Vec<Phase>> {
        require("approved_by", approved_by)?;
        let approved = self.edit_phases(cancel, project, plan, |_, phases| {
            let now = Utc::now();
            let mut approved = Vec::new();
            for phase in phases.iter_mut() {
                if phase.requires_approval && !phase.approved && check_editable(phase).is_ok() {
                    approve(phase, approved_by, now);
                    approved.push(phase.clone());
                }
            }
            Ok(approved)
        })?;

        info!(project, plan, count = approved.len(), "phases approved");
        for phase in &approved {
            self.publish(EventKind::PhaseApproved {
                project: project.to_string(),
                plan: plan.to_string(),
                phase: phase.id.clone(),
            });
        }
        Ok(approved)
    }

    /// Reassign sequences so phases follow `order`, which must name every
    /// phase exactly once. Ids do not change.
    pub fn reorder_phases(
        &self,
        cancel: &CancellationToken,
        project: &str,
        plan: &str,
        order: &[String],
    ) -> Result<Vec<Phase>> {
        let phases = self.edit_phases(cancel, project, plan, |_, phases| {
            if order.len() != phases.len() {
                return Err(Error::Validation(format!(
                    "expected {} phase ids, got {}",
                    phases.len(),
                    order.len()
                )));
            }
            let mut reordered: Vec<Phase> = Vec::with_capacity(phases.len());
            for id in order {
                if reordered.iter().any(|p| &p.id == id) {
                    return Err(Error::Validation(format!("phase {} listed twice", id)));
                }
                let index = find(phases, id)?;
                reordered.push(phases[index].clone());
            }
            renumber(&mut reordered);
            *phases = reordered;
            Ok(phases.clone())
        })?;
        debug!(project, plan, "phases reordered");
        Ok(phases)
    }

    /// Remove a phase that has not started, renumbering the rest and
    /// dropping it from their dependencies.
    ///
    /// A phase that still owns tasks is kept; move or delete the tasks first.
    pub fn delete_phase(
        &self,
        cancel: &CancellationToken,
        project: &str,
        plan: &str,
        id: &str,
    ) -> Result<()> {
        self.edit_phases(cancel, project, plan, |_, phases| {
            let index = find(phases, id)?;
            check_editable(&phases[index])?;
            let owned: Vec<String> = self
                .read_tasks(PlanLocation::Active, project, plan)?
                .into_iter()
                .filter(|task| task.phase_id.as_deref() == Some(id))
                .map(|task| task.id)
                .collect();
            if !owned.is_empty() {
                return Err(Error::Validation(format!(
                    "phase {} still owns tasks: {}",
                    id,
                    owned.join(", ")
                )));
            }

            phases.remove(index);
            for phase in phases.iter_mut() {
                phase.depends_on.retain(|dep| dep != id);
            }
            renumber(phases);
            Ok(())
        })?;
        info!(project, plan, phase = id, "phase deleted");
        Ok(())
    }

    /// Phases ordered so every dependency precedes its dependents.
    pub fn phase_execution_order(
        &self,
        cancel: &CancellationToken,
        project: &str,
        plan: &str,
    ) -> Result<Vec<Phase>> {
        let phases = self.load_phases(cancel, project, plan)?;
        let graph = DependencyGraph::build(&phases)?;
        Ok(graph.execution_order()?.into_iter().cloned().collect())
    }
}

fn approve(phase: &mut Phase, approved_by: &str, now: DateTime<Utc>) {
    phase.approved = true;
    phase.approved_by = Some(approved_by.to_string());
    phase.approved_at = Some(now);
    phase.rejection_reason = None;
}
