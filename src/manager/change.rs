//! Legacy change records.
//!
//! Changes predate projects and plans: each one is a flat directory under
//! `changes/` holding a `metadata.json` [`PlanRecord`] plus markdown
//! artifacts. They share the plan status graph but none of the plan
//! machinery.

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::{check_cancelled, keys, storage, Listing, Manager};
use crate::error::{EntityKind, Error, Result};
use crate::events::EventKind;
use crate::locks::LockKey;
use crate::slug::{require, slugify, validate_slug};
use crate::store::StoreKey;
use crate::workflow::{Lifecycle, PlanRecord, PlanStatus};

/// Markdown documents a change may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Artifact {
    Proposal,
    Design,
    Spec,
    Tasks,
}

impl Artifact {
    pub const ALL: [Artifact; 4] = [
        Artifact::Proposal,
        Artifact::Design,
        Artifact::Spec,
        Artifact::Tasks,
    ];

    pub fn file_name(&self) -> &'static str {
        match self {
            Artifact::Proposal => "proposal.md",
            Artifact::Design => "design.md",
            Artifact::Spec => "spec.md",
            Artifact::Tasks => "tasks.md",
        }
    }

    fn mark_present(&self, record: &mut PlanRecord) {
        let files = &mut record.files;
        match self {
            Artifact::Proposal => files.has_proposal = true,
            Artifact::Design => files.has_design = true,
            Artifact::Spec => files.has_spec = true,
            Artifact::Tasks => files.has_tasks = true,
        }
    }
}

impl std::fmt::Display for Artifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.file_name())
    }
}

impl std::str::FromStr for Artifact {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "proposal" => Ok(Artifact::Proposal),
            "design" => Ok(Artifact::Design),
            "spec" => Ok(Artifact::Spec),
            "tasks" => Ok(Artifact::Tasks),
            other => Err(Error::Validation(format!("unknown artifact: {}", other))),
        }
    }
}

fn change_not_found(slug: &str) -> Error {
    Error::not_found(EntityKind::Change, slug)
}

impl Manager {
    /// Create a change whose slug is derived from `description`.
    pub fn create_change(
        &self,
        cancel: &CancellationToken,
        description: &str,
        author: &str,
    ) -> Result<PlanRecord> {
        check_cancelled(cancel)?;
        require("description", description)?;
        let slug = slugify(description);
        if slug.is_empty() {
            return Err(Error::Validation(format!(
                "description {:?} yields an empty slug",
                description
            )));
        }
        validate_slug(&slug)?;

        let lock = self.lock(LockKey::change(&slug));
        let guard = lock.hold();
        check_cancelled(cancel)?;

        let already_exists = || Error::already_exists(EntityKind::Change, slug.clone());
        // Archived changes keep their slug.
        if self.exists(&keys::change_archive().join(slug.as_str()))? {
            return Err(already_exists());
        }
        self.store.ensure_node(&keys::changes()).map_err(storage)?;
        let record = PlanRecord::new(&slug, description.trim(), description.trim(), author);
        self.create_entity(
            &keys::change(&slug),
            keys::METADATA_FILE,
            &record,
            &["specs"],
            already_exists,
        )?;
        drop(guard);

        info!(change = %slug, author, "change created");
        self.publish(EventKind::ChangeCreated {
            change: slug.clone(),
        });
        Ok(record)
    }

    /// Load a change, active or archived.
    pub fn load_change(&self, cancel: &CancellationToken, slug: &str) -> Result<PlanRecord> {
        check_cancelled(cancel)?;
        validate_slug(slug)?;
        if let Some(record) = self.read_doc::<PlanRecord>(&keys::change_doc(slug))? {
            return Ok(record);
        }
        let archived = keys::change_archive().join(slug).join(keys::METADATA_FILE);
        self.read_doc::<PlanRecord>(&archived)?
            .ok_or_else(|| change_not_found(slug))
    }

    /// Active changes.
    pub fn list_changes(&self, cancel: &CancellationToken) -> Result<Listing<PlanRecord>> {
        check_cancelled(cancel)?;
        self.list_children(cancel, &keys::changes(), |slug| {
            self.read_doc::<PlanRecord>(&keys::change_doc(slug))?
                .ok_or_else(|| change_not_found(slug))
        })
    }

    fn write_change(&self, slug: &str, record: &PlanRecord) -> Result<()> {
        self.write_doc(&keys::change_doc(slug), record, || change_not_found(slug))
    }

    fn active_change(&self, slug: &str) -> Result<PlanRecord> {
        match self.read_doc::<PlanRecord>(&keys::change_doc(slug))? {
            Some(record) => Ok(record),
            None if self.exists(&keys::change_archive().join(slug))? => Err(Error::Archived {
                kind: EntityKind::Change,
                id: slug.to_string(),
            }),
            None => Err(change_not_found(slug)),
        }
    }

    /// Move a change along the plan status graph.
    pub fn update_change_status(
        &self,
        cancel: &CancellationToken,
        slug: &str,
        target: PlanStatus,
    ) -> Result<PlanRecord> {
        check_cancelled(cancel)?;
        validate_slug(slug)?;
        if target == PlanStatus::Archived {
            return Err(Error::Validation(
                "changes are archived with archive_change".to_string(),
            ));
        }

        let lock = self.lock(LockKey::change(slug));
        let guard = lock.hold();
        check_cancelled(cancel)?;

        let mut record = self.active_change(slug)?;
        let from = record.status;
        if !from.can_transition_to(target) {
            return Err(Error::InvalidTransition {
                kind: EntityKind::Change,
                id: slug.to_string(),
                from: from.to_string(),
                to: target.to_string(),
            });
        }
        record.status = target;
        record.updated_at = Utc::now();
        self.write_change(slug, &record)?;
        drop(guard);

        info!(change = slug, %from, to = %target, "change transitioned");
        self.publish(EventKind::ChangeTransitioned {
            change: slug.to_string(),
            from,
            to: target,
        });
        Ok(record)
    }

    /// Store a markdown artifact and record its presence.
    pub fn write_artifact(
        &self,
        cancel: &CancellationToken,
        slug: &str,
        artifact: Artifact,
        content: &str,
    ) -> Result<PlanRecord> {
        check_cancelled(cancel)?;
        validate_slug(slug)?;

        let lock = self.lock(LockKey::change(slug));
        let _guard = lock.hold();
        check_cancelled(cancel)?;

        let mut record = self.active_change(slug)?;
        let key = keys::change(slug).join(artifact.file_name());
        self.store
            .write(&key, content.as_bytes())
            .map_err(|err| {
                if err.is_not_found() {
                    change_not_found(slug)
                } else {
                    storage(err)
                }
            })?;
        artifact.mark_present(&mut record);
        record.updated_at = Utc::now();
        self.write_change(slug, &record)?;

        debug!(change = slug, %artifact, bytes = content.len(), "artifact written");
        Ok(record)
    }

    pub fn read_artifact(
        &self,
        cancel: &CancellationToken,
        slug: &str,
        artifact: Artifact,
    ) -> Result<String> {
        check_cancelled(cancel)?;
        validate_slug(slug)?;
        let key = keys::change(slug).join(artifact.file_name());
        let bytes = self.store.read(&key).map_err(|err| {
            if err.is_not_found() {
                Error::not_found(EntityKind::Change, format!("{}/{}", slug, artifact.file_name()))
            } else {
                storage(err)
            }
        })?;
        String::from_utf8(bytes)
            .map_err(|err| Error::Validation(format!("{} is not valid UTF-8: {}", key, err)))
    }

    /// Archive a complete change.
    ///
    /// The change directory moves to `archive/{slug}` and is marked
    /// archived; if the status cannot be written it moves back. Only then
    /// does each capability under its `specs/` replace the one of the same
    /// name in the top-level `specs/`.
    pub fn archive_change(&self, cancel: &CancellationToken, slug: &str) -> Result<PlanRecord> {
        check_cancelled(cancel)?;
        validate_slug(slug)?;

        let lock = self.lock(LockKey::change(slug));
        let guard = lock.hold();
        check_cancelled(cancel)?;

        let mut record = self.active_change(slug)?;
        if record.status != PlanStatus::Complete {
            return Err(Error::InvalidTransition {
                kind: EntityKind::Change,
                id: slug.to_string(),
                from: record.status.to_string(),
                to: PlanStatus::Archived.to_string(),
            });
        }

        let active = keys::change(slug);
        let target = keys::change_archive().join(slug);
        self.store
            .ensure_node(&keys::change_archive())
            .map_err(storage)?;
        self.store.rename(&active, &target).map_err(|err| {
            if err.is_already_exists() {
                Error::already_exists(EntityKind::Change, slug)
            } else {
                storage(err)
            }
        })?;

        record.status = PlanStatus::Archived;
        record.updated_at = Utc::now();
        let written = self.write_doc(&target.join(keys::METADATA_FILE), &record, || {
            change_not_found(slug)
        });
        if let Err(err) = written {
            if let Err(undo) = self.store.rename(&target, &active) {
                error!(change = slug, error = %undo, "failed to undo change archive");
            }
            return Err(err);
        }

        // The archive is committed. A capability that fails to move stays
        // under archive/{slug}/specs and the fault is reported.
        let promoted = self.promote_specs(slug, &target.join("specs"))?;
        drop(guard);

        info!(change = slug, promoted, "change archived");
        self.publish(EventKind::ChangeArchived {
            change: slug.to_string(),
        });
        Ok(record)
    }

    /// Move every capability node under `source` into `specs/`, returning
    /// how many moved.
    fn promote_specs(&self, slug: &str, source: &StoreKey) -> Result<usize> {
        let names = self.store.list_nodes(source).map_err(storage)?;
        if names.is_empty() {
            return Ok(0);
        }
        self.store.ensure_node(&keys::specs()).map_err(storage)?;
        for name in &names {
            let from: StoreKey = source.join(name.as_str());
            let to = keys::specs().join(name.as_str());
            if self.exists(&to)? {
                self.store.remove(&to).map_err(storage)?;
            }
            self.store.rename(&from, &to).map_err(storage)?;
            debug!(change = slug, capability = %name, "spec promoted");
        }
        Ok(names.len())
    }
}
