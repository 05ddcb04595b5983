//! Plan operations.

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::{check_cancelled, keys, plan_lock_keys, storage, Listing, Manager};
use crate::error::{EntityKind, Error, Result};
use crate::events::EventKind;
use crate::locks::LockKey;
use crate::slug::{require, validate_slug};
use crate::store::StoreKey;
use crate::workflow::{
    Finding, IterationCalls, Lifecycle, Plan, PlanStatus, Project, ReviewStage, ReviewVerdict,
};

/// Result of one review iteration, as reported by a reviewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewSubmission {
    pub stage: ReviewStage,
    pub verdict: ReviewVerdict,
    pub summary: Option<String>,
    pub findings: Vec<Finding>,
    pub formatted_findings: Option<String>,
    /// Ids of the external calls made during this iteration.
    pub request_ids: Vec<String>,
}

impl ReviewSubmission {
    pub fn new(stage: ReviewStage, verdict: ReviewVerdict) -> Self {
        Self {
            stage,
            verdict,
            summary: None,
            findings: Vec::new(),
            formatted_findings: None,
            request_ids: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum PlanLocation {
    Active,
    Archived,
}

impl PlanLocation {
    pub(super) fn root(self, project: &str, slug: &str) -> StoreKey {
        match self {
            PlanLocation::Active => keys::plan(project, slug),
            PlanLocation::Archived => keys::archived_plan(project, slug),
        }
    }
}

fn archived(project: &str, slug: &str) -> Error {
    Error::Archived {
        kind: EntityKind::Plan,
        id: Plan::id_for(project, slug),
    }
}

fn invalid_transition(plan: &Plan, from: PlanStatus, to: PlanStatus) -> Error {
    Error::InvalidTransition {
        kind: EntityKind::Plan,
        id: plan.id.clone(),
        from: from.to_string(),
        to: to.to_string(),
    }
}

/// Set `status` and keep the legacy approval flags in step with it.
fn set_status(plan: &mut Plan, target: PlanStatus, now: DateTime<Utc>) {
    plan.status = Some(target);
    match target {
        PlanStatus::Approved => {
            plan.approved = true;
            plan.approved_at = Some(now);
        }
        PlanStatus::PhasesApproved => {
            plan.phases_approved = true;
            plan.phases_approved_at = Some(now);
        }
        PlanStatus::TasksApproved => {
            plan.tasks_approved = true;
            plan.tasks_approved_at = Some(now);
        }
        _ => {}
    }
}

impl Manager {
    /// Create a plan inside `project`. The default project is created on
    /// demand; any other project must exist and be active.
    pub fn create_plan(
        &self,
        cancel: &CancellationToken,
        project: &str,
        slug: &str,
        title: &str,
    ) -> Result<Plan> {
        check_cancelled(cancel)?;
        validate_slug(project)?;
        validate_slug(slug)?;
        require("title", title)?;

        // Provision the default project before taking any lock; creating it
        // takes the project lock itself.
        self.resolve_project(cancel, project)?;

        let plan = self.locked(
            [LockKey::project(project), LockKey::plan(project, slug)],
            || {
                check_cancelled(cancel)?;
                // Re-read under the project lock: it may have been archived
                // or deleted since it was resolved.
                let owner = self.read_project(project)?;
                if owner.is_archived() {
                    return Err(Error::Archived {
                        kind: EntityKind::Project,
                        id: project.to_string(),
                    });
                }
                let already_exists =
                    || Error::already_exists(EntityKind::Plan, Plan::id_for(project, slug));
                if self.exists(&keys::archived_plan(project, slug))? {
                    return Err(already_exists());
                }

                self.store.ensure_node(&keys::plans(project)).map_err(storage)?;
                let plan = Plan::new(project, slug, title);
                self.create_entity(
                    &keys::plan(project, slug),
                    keys::PLAN_FILE,
                    &plan,
                    &[],
                    already_exists,
                )?;
                Ok(plan)
            },
        )?;

        info!(project, plan = slug, "plan created");
        self.publish(EventKind::PlanCreated {
            project: project.to_string(),
            plan: slug.to_string(),
        });
        Ok(plan)
    }

    /// Load a plan from its active or archived location.
    pub fn load_plan(&self, cancel: &CancellationToken, project: &str, slug: &str) -> Result<Plan> {
        check_cancelled(cancel)?;
        validate_slug(project)?;
        validate_slug(slug)?;
        self.locate_plan(project, slug)?
            .map(|(_, plan)| plan)
            .ok_or_else(|| Error::not_found(EntityKind::Plan, Plan::id_for(project, slug)))
    }

    pub(super) fn locate_plan(
        &self,
        project: &str,
        slug: &str,
    ) -> Result<Option<(PlanLocation, Plan)>> {
        for location in [PlanLocation::Active, PlanLocation::Archived] {
            let key = location.root(project, slug).join(keys::PLAN_FILE);
            if let Some(plan) = self.read_doc::<Plan>(&key)? {
                return Ok(Some((location, plan)));
            }
        }
        Ok(None)
    }

    /// Load a plan that may still change: present and not archived.
    pub(super) fn active_plan(&self, project: &str, slug: &str) -> Result<Plan> {
        match self.read_doc::<Plan>(&keys::plan(project, slug).join(keys::PLAN_FILE))? {
            Some(plan) => Ok(plan),
            None if self.exists(&keys::archived_plan(project, slug))? => {
                Err(archived(project, slug))
            }
            None => Err(Error::not_found(
                EntityKind::Plan,
                Plan::id_for(project, slug),
            )),
        }
    }

    fn write_plan(&self, project: &str, plan: &Plan) -> Result<()> {
        let key = keys::plan(project, &plan.slug).join(keys::PLAN_FILE);
        self.write_doc(&key, plan, || {
            Error::not_found(EntityKind::Plan, Plan::id_for(project, &plan.slug))
        })
    }

    /// Replace a plan document wholesale.
    ///
    /// The plan must already exist in its active location, and any status
    /// change must be a legal transition from the stored status.
    pub fn save_plan(&self, cancel: &CancellationToken, project: &str, plan: &Plan) -> Result<()> {
        check_cancelled(cancel)?;
        validate_slug(project)?;
        validate_slug(&plan.slug)?;
        if plan.id != Plan::id_for(project, &plan.slug)
            || plan.project_id != Project::id_for(project)
        {
            return Err(Error::Validation(format!(
                "plan {} does not belong to project {}",
                plan.id, project
            )));
        }

        let lock = self.lock(LockKey::plan(project, &plan.slug));
        let _guard = lock.hold();
        check_cancelled(cancel)?;

        let stored = self.active_plan(project, &plan.slug)?;
        check_status_change(&stored, plan)?;
        self.write_plan(project, plan)
    }

    /// Whether a plan exists, active or archived.
    pub fn plan_exists(
        &self,
        cancel: &CancellationToken,
        project: &str,
        slug: &str,
    ) -> Result<bool> {
        check_cancelled(cancel)?;
        validate_slug(project)?;
        validate_slug(slug)?;
        Ok(self.exists(&keys::plan(project, slug).join(keys::PLAN_FILE))?
            || self.exists(&keys::archived_plan(project, slug).join(keys::PLAN_FILE))?)
    }

    /// Active plans of a project. Listing the default project creates it.
    pub fn list_plans(&self, cancel: &CancellationToken, project: &str) -> Result<Listing<Plan>> {
        check_cancelled(cancel)?;
        validate_slug(project)?;
        self.resolve_project(cancel, project)?;
        self.list_plans_at(cancel, project, PlanLocation::Active)
    }

    pub fn list_archived_plans(
        &self,
        cancel: &CancellationToken,
        project: &str,
    ) -> Result<Listing<Plan>> {
        check_cancelled(cancel)?;
        validate_slug(project)?;
        self.load_project(cancel, project)?;
        self.list_plans_at(cancel, project, PlanLocation::Archived)
    }

    fn list_plans_at(
        &self,
        cancel: &CancellationToken,
        project: &str,
        location: PlanLocation,
    ) -> Result<Listing<Plan>> {
        let parent = match location {
            PlanLocation::Active => keys::plans(project),
            PlanLocation::Archived => keys::plan_archive(project),
        };
        self.list_children(cancel, &parent, |slug| {
            self.read_doc::<Plan>(&location.root(project, slug).join(keys::PLAN_FILE))?
                .ok_or_else(|| Error::not_found(EntityKind::Plan, Plan::id_for(project, slug)))
        })
    }

    /// Apply `mutate` to a plan under its lock.
    ///
    /// A status change made by `mutate` is validated against the effective
    /// status like [`Manager::transition_plan`]; archiving must go through
    /// [`Manager::archive_plan`].
    pub fn update_plan<F>(
        &self,
        cancel: &CancellationToken,
        project: &str,
        slug: &str,
        mutate: F,
    ) -> Result<Plan>
    where
        F: FnOnce(&mut Plan),
    {
        check_cancelled(cancel)?;
        validate_slug(project)?;
        validate_slug(slug)?;

        let lock = self.lock(LockKey::plan(project, slug));
        let guard = lock.hold();
        check_cancelled(cancel)?;

        let before = self.active_plan(project, slug)?;
        let mut plan = before.clone();
        mutate(&mut plan);

        if plan.id != before.id || plan.slug != before.slug || plan.project_id != before.project_id
        {
            return Err(Error::Validation(
                "plan id, slug and project cannot be changed".to_string(),
            ));
        }
        require("title", &plan.title)?;
        check_status_change(&before, &plan)?;

        let now = Utc::now();
        let from = before.effective_status().status();
        let to = plan.effective_status().status();
        if plan.status != before.status {
            if let Some(target) = plan.status {
                set_status(&mut plan, target, now);
            }
        }
        plan.created_at = before.created_at;
        plan.updated_at = now;
        self.write_plan(project, &plan)?;
        drop(guard);

        debug!(project, plan = slug, "plan updated");
        if from != to {
            self.publish(EventKind::PlanTransitioned {
                project: project.to_string(),
                plan: slug.to_string(),
                from,
                to,
            });
        }
        Ok(plan)
    }

    /// Move a plan one step along its status graph.
    ///
    /// Validation uses the effective status, so legacy plans without a
    /// stored status transition from their inferred one. Reaching an
    /// approval status also sets the matching legacy flag.
    pub fn transition_plan(
        &self,
        cancel: &CancellationToken,
        project: &str,
        slug: &str,
        target: PlanStatus,
    ) -> Result<Plan> {
        if target == PlanStatus::Archived {
            return self.archive_plan(cancel, project, slug);
        }
        check_cancelled(cancel)?;
        validate_slug(project)?;
        validate_slug(slug)?;

        let lock = self.lock(LockKey::plan(project, slug));
        let guard = lock.hold();
        check_cancelled(cancel)?;

        let mut plan = self.active_plan(project, slug)?;
        let from = plan.effective_status().status();
        if !from.can_transition_to(target) {
            return Err(invalid_transition(&plan, from, target));
        }
        let now = Utc::now();
        set_status(&mut plan, target, now);
        plan.updated_at = now;
        self.write_plan(project, &plan)?;
        drop(guard);

        info!(project, plan = slug, %from, to = %target, "plan transitioned");
        self.publish(EventKind::PlanTransitioned {
            project: project.to_string(),
            plan: slug.to_string(),
            from,
            to: target,
        });
        Ok(plan)
    }

    /// Record a review iteration for one stage and append its calls to the
    /// plan's call history. Does not change status.
    pub fn record_review(
        &self,
        cancel: &CancellationToken,
        project: &str,
        slug: &str,
        review: ReviewSubmission,
    ) -> Result<Plan> {
        check_cancelled(cancel)?;
        validate_slug(project)?;
        validate_slug(slug)?;

        let lock = self.lock(LockKey::plan(project, slug));
        let guard = lock.hold();
        check_cancelled(cancel)?;

        let mut plan = self.active_plan(project, slug)?;
        let status = plan.effective_status().status();
        if status.is_terminal() {
            return Err(Error::Terminal {
                kind: EntityKind::Plan,
                id: plan.id.clone(),
                status: status.to_string(),
            });
        }

        let now = Utc::now();
        let record = plan.review_mut(review.stage);
        record.iteration += 1;
        record.verdict = Some(review.verdict);
        record.summary = review.summary;
        record.findings = review.findings;
        record.formatted_findings = review.formatted_findings;
        record.reviewed_at = Some(now);
        let iteration = record.iteration;

        plan.call_history
            .stage_mut(review.stage)
            .push(IterationCalls {
                iteration,
                request_ids: review.request_ids,
                verdict: Some(review.verdict),
            });
        plan.updated_at = now;
        self.write_plan(project, &plan)?;
        drop(guard);

        debug!(
            project,
            plan = slug,
            stage = %review.stage,
            verdict = %review.verdict,
            iteration,
            "review recorded"
        );
        self.publish(EventKind::PlanReviewed {
            project: project.to_string(),
            plan: slug.to_string(),
            stage: review.stage,
            verdict: review.verdict,
            iteration,
        });
        Ok(plan)
    }

    /// Annotate a plan with its most recent failure, or clear it with `None`.
    pub fn set_plan_error(
        &self,
        cancel: &CancellationToken,
        project: &str,
        slug: &str,
        message: Option<&str>,
    ) -> Result<Plan> {
        let message = message.map(str::to_string);
        self.update_plan(cancel, project, slug, |plan| {
            plan.last_error_at = message.as_ref().map(|_| Utc::now());
            plan.last_error = message;
        })
    }

    /// Archive a complete plan: its status becomes `archived` and its
    /// subtree moves from `plans/{slug}` to `archive/{slug}`.
    ///
    /// If the status cannot be written after the move, the subtree is moved
    /// back and the plan stays complete and active.
    pub fn archive_plan(
        &self,
        cancel: &CancellationToken,
        project: &str,
        slug: &str,
    ) -> Result<Plan> {
        check_cancelled(cancel)?;
        validate_slug(project)?;
        validate_slug(slug)?;

        let plan = self.locked(plan_lock_keys(project, slug), || {
            check_cancelled(cancel)?;
            let stored = self.active_plan(project, slug)?;
            let from = stored.effective_status().status();
            if from != PlanStatus::Complete {
                return Err(invalid_transition(&stored, from, PlanStatus::Archived));
            }

            let active = keys::plan(project, slug);
            let target = keys::archived_plan(project, slug);
            self.store
                .ensure_node(&keys::plan_archive(project))
                .map_err(storage)?;
            self.store.rename(&active, &target).map_err(|err| {
                if err.is_already_exists() {
                    Error::already_exists(EntityKind::Plan, Plan::id_for(project, slug))
                } else {
                    storage(err)
                }
            })?;

            let mut plan = stored;
            let now = Utc::now();
            set_status(&mut plan, PlanStatus::Archived, now);
            plan.updated_at = now;
            let written = self.write_doc(&target.join(keys::PLAN_FILE), &plan, || {
                Error::not_found(EntityKind::Plan, Plan::id_for(project, slug))
            });
            if let Err(err) = written {
                if let Err(undo) = self.store.rename(&target, &active) {
                    error!(project, plan = slug, error = %undo, "failed to undo plan archive");
                }
                return Err(err);
            }
            Ok(plan)
        })?;

        info!(project, plan = slug, "plan archived");
        self.publish(EventKind::PlanArchived {
            project: project.to_string(),
            plan: slug.to_string(),
        });
        Ok(plan)
    }

    /// Remove a plan, active or archived, with its phases and tasks.
    pub fn delete_plan(&self, cancel: &CancellationToken, project: &str, slug: &str) -> Result<()> {
        check_cancelled(cancel)?;
        validate_slug(project)?;
        validate_slug(slug)?;

        self.locked(plan_lock_keys(project, slug), || {
            check_cancelled(cancel)?;
            let mut removed = false;
            for location in [PlanLocation::Active, PlanLocation::Archived] {
                let root = location.root(project, slug);
                if self.exists(&root)? {
                    self.store.remove(&root).map_err(storage)?;
                    removed = true;
                }
            }
            if !removed {
                return Err(Error::not_found(
                    EntityKind::Plan,
                    Plan::id_for(project, slug),
                ));
            }
            Ok(())
        })?;

        info!(project, plan = slug, "plan deleted");
        self.publish(EventKind::PlanDeleted {
            project: project.to_string(),
            plan: slug.to_string(),
        });
        Ok(())
    }
}

/// Reject a status edit that does not follow the plan graph.
fn check_status_change(before: &Plan, after: &Plan) -> Result<()> {
    if after.status == before.status {
        return Ok(());
    }
    let from = before.effective_status().status();
    let Some(to) = after.status else {
        return Err(Error::Validation(
            "plan status cannot be cleared".to_string(),
        ));
    };
    if to == from && before.status.is_none() {
        // Materializing an inferred status.
        return Ok(());
    }
    if to == PlanStatus::Archived {
        return Err(Error::Validation(
            "plans are archived with archive_plan".to_string(),
        ));
    }
    if !from.can_transition_to(to) {
        return Err(invalid_transition(before, from, to));
    }
    Ok(())
}
