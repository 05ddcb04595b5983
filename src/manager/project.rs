//! Project operations.

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{check_cancelled, keys, plan_lock_keys, storage, Listing, Manager};
use crate::error::{EntityKind, Error, Result};
use crate::events::EventKind;
use crate::locks::LockKey;
use crate::slug::{require, validate_slug};
use crate::workflow::{Project, ProjectStatus, DEFAULT_PROJECT_SLUG, DEFAULT_PROJECT_TITLE};

impl Manager {
    /// Create a project. Fails with `AlreadyExists` if the slug is taken.
    pub fn create_project(
        &self,
        cancel: &CancellationToken,
        slug: &str,
        title: &str,
    ) -> Result<Project> {
        check_cancelled(cancel)?;
        validate_slug(slug)?;
        require("title", title)?;

        let lock = self.lock(LockKey::project(slug));
        let guard = lock.hold();
        check_cancelled(cancel)?;

        self.store.ensure_node(&keys::projects()).map_err(storage)?;
        let project = Project::new(slug, title);
        self.create_entity(
            &keys::project(slug),
            keys::PROJECT_FILE,
            &project,
            &["plans"],
            || Error::already_exists(EntityKind::Project, slug),
        )?;
        drop(guard);

        info!(project = slug, "project created");
        self.publish(EventKind::ProjectCreated {
            project: slug.to_string(),
        });
        Ok(project)
    }

    pub fn load_project(&self, cancel: &CancellationToken, slug: &str) -> Result<Project> {
        check_cancelled(cancel)?;
        validate_slug(slug)?;
        self.read_project(slug)
    }

    pub(super) fn read_project(&self, slug: &str) -> Result<Project> {
        self.read_doc(&keys::project_doc(slug))?
            .ok_or_else(|| Error::not_found(EntityKind::Project, slug))
    }

    fn write_project(&self, project: &Project) -> Result<()> {
        self.write_doc(&keys::project_doc(&project.slug), project, || {
            Error::not_found(EntityKind::Project, &project.slug)
        })
    }

    /// Replace a project document wholesale. The project must exist.
    pub fn save_project(&self, cancel: &CancellationToken, project: &Project) -> Result<()> {
        check_cancelled(cancel)?;
        validate_slug(&project.slug)?;
        if project.id != Project::id_for(&project.slug) {
            return Err(Error::Validation(format!(
                "project id {} does not match slug {}",
                project.id, project.slug
            )));
        }

        let lock = self.lock(LockKey::project(&project.slug));
        let _guard = lock.hold();
        check_cancelled(cancel)?;

        if !self.exists(&keys::project_doc(&project.slug))? {
            return Err(Error::not_found(EntityKind::Project, &project.slug));
        }
        self.write_project(project)
    }

    pub fn project_exists(&self, cancel: &CancellationToken, slug: &str) -> Result<bool> {
        check_cancelled(cancel)?;
        validate_slug(slug)?;
        self.exists(&keys::project_doc(slug))
    }

    pub fn list_projects(&self, cancel: &CancellationToken) -> Result<Listing<Project>> {
        check_cancelled(cancel)?;
        self.list_children(cancel, &keys::projects(), |slug| self.read_project(slug))
    }

    /// Apply `mutate` to a project under its lock.
    ///
    /// Identity fields and status cannot be changed here; use
    /// [`Manager::archive_project`] to archive.
    pub fn update_project<F>(
        &self,
        cancel: &CancellationToken,
        slug: &str,
        mutate: F,
    ) -> Result<Project>
    where
        F: FnOnce(&mut Project),
    {
        check_cancelled(cancel)?;
        validate_slug(slug)?;

        let lock = self.lock(LockKey::project(slug));
        let _guard = lock.hold();
        check_cancelled(cancel)?;

        let mut project = self.read_project(slug)?;
        if project.is_archived() {
            return Err(Error::Archived {
                kind: EntityKind::Project,
                id: slug.to_string(),
            });
        }

        let before = project.clone();
        mutate(&mut project);
        if project.id != before.id || project.slug != before.slug {
            return Err(Error::Validation(
                "project id and slug cannot be changed".to_string(),
            ));
        }
        if project.status != before.status {
            return Err(Error::Validation(
                "project status can only change through archive".to_string(),
            ));
        }
        require("title", &project.title)?;
        project.created_at = before.created_at;
        project.updated_at = Utc::now();

        self.write_project(&project)?;
        debug!(project = slug, "project updated");
        Ok(project)
    }

    /// Mark a project archived. Its plans stay in place but it accepts no
    /// further changes or new plans.
    pub fn archive_project(&self, cancel: &CancellationToken, slug: &str) -> Result<Project> {
        check_cancelled(cancel)?;
        validate_slug(slug)?;

        let lock = self.lock(LockKey::project(slug));
        let guard = lock.hold();
        check_cancelled(cancel)?;

        let mut project = self.read_project(slug)?;
        if project.is_archived() {
            return Err(Error::Archived {
                kind: EntityKind::Project,
                id: slug.to_string(),
            });
        }
        let now = Utc::now();
        project.status = ProjectStatus::Archived;
        project.archived_at = Some(now);
        project.updated_at = now;
        self.write_project(&project)?;
        drop(guard);

        info!(project = slug, "project archived");
        self.publish(EventKind::ProjectArchived {
            project: slug.to_string(),
        });
        Ok(project)
    }

    /// Remove a project and everything beneath it, plans included.
    ///
    /// Every plan's lock set is held for the removal, so no phase or task
    /// edit can write into the subtree while it goes.
    pub fn delete_project(&self, cancel: &CancellationToken, slug: &str) -> Result<()> {
        check_cancelled(cancel)?;
        validate_slug(slug)?;

        let lock = self.lock(LockKey::project(slug));
        let guard = lock.hold();
        check_cancelled(cancel)?;

        let root = keys::project(slug);
        if !self.exists(&root)? {
            return Err(Error::not_found(EntityKind::Project, slug));
        }
        // Plans are only created under the project lock, so this set is stable.
        let mut plans = self.store.list_nodes(&keys::plans(slug)).map_err(storage)?;
        plans.extend(
            self.store
                .list_nodes(&keys::plan_archive(slug))
                .map_err(storage)?,
        );
        let plan_keys = plans.iter().flat_map(|plan| plan_lock_keys(slug, plan));
        self.locked(plan_keys, || self.store.remove(&root).map_err(storage))?;
        drop(guard);

        info!(project = slug, "project deleted");
        self.publish(EventKind::ProjectDeleted {
            project: slug.to_string(),
        });
        Ok(())
    }

    /// Load the default project, creating it on first use.
    pub fn get_or_create_default_project(&self, cancel: &CancellationToken) -> Result<Project> {
        self.get_or_create_project(cancel, DEFAULT_PROJECT_SLUG, DEFAULT_PROJECT_TITLE)
    }

    pub(super) fn get_or_create_project(
        &self,
        cancel: &CancellationToken,
        slug: &str,
        title: &str,
    ) -> Result<Project> {
        match self.load_project(cancel, slug) {
            Err(err) if err.is_not_found() => {}
            other => return other,
        }
        match self.create_project(cancel, slug, title) {
            Err(err) if err.is_already_exists() => {
                // Lost the race; the winner holds the lock until its document is written.
                let lock = self.lock(LockKey::project(slug));
                let _guard = lock.hold();
                self.read_project(slug)
            }
            other => other,
        }
    }

    /// Resolve the project a plan operation targets, provisioning the
    /// default project when it is named.
    pub(super) fn resolve_project(
        &self,
        cancel: &CancellationToken,
        slug: &str,
    ) -> Result<Project> {
        if slug == DEFAULT_PROJECT_SLUG {
            self.get_or_create_default_project(cancel)
        } else {
            self.load_project(cancel, slug)
        }
    }
}
