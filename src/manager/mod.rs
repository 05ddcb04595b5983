//! Store-backed entity manager.
//!
//! Every mutating operation follows the same discipline: check the
//! cancellation token, validate identifiers, take the entity's lock, do the
//! whole store round trip, release the lock, then publish an event. Reads
//! take no lock; whole-document writes mean they never see a partial value.
//!
//! Anything that writes inside a plan's subtree holds the plan's full lock
//! set (plan, phases, tasks), so a delete or archive of the plan never
//! interleaves with an edit of its phases or tasks. Creating a plan also
//! holds its project's lock.

mod change;
mod keys;
mod phase;
mod plan;
mod project;
mod task;

pub use change::Artifact;
pub use phase::NewPhase;
pub use plan::ReviewSubmission;
pub use task::{parse_task_outline, NewTask};

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, warn};
use uuid::Uuid;

use crate::codec::{self, Document};
use crate::error::{Error, Result};
use crate::events::{EventKind, EventSink, NoopSink, WorkflowEvent};
use crate::locks::{EntityLock, LockKey, LockRegistry};
use crate::store::{FsStore, MemoryStore, Store, StoreError, StoreKey};

/// Entry point for all workflow entity operations.
///
/// Cheap to clone; clones share the store, the lock registry and the event
/// sink. Two managers built separately never share locks, so only one
/// manager should be pointed at a given store at a time.
#[derive(Clone)]
pub struct Manager {
    store: Arc<dyn Store>,
    locks: Arc<LockRegistry>,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("locks", &self.locks.len())
            .finish_non_exhaustive()
    }
}

impl Manager {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            locks: Arc::new(LockRegistry::new()),
            events: Arc::new(NoopSink),
        }
    }

    /// Manager over a workflow directory on disk.
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(FsStore::new(root)))
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Share a lock registry with another manager over the same store.
    pub fn with_locks(mut self, locks: Arc<LockRegistry>) -> Self {
        self.locks = locks;
        self
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub fn locks(&self) -> &Arc<LockRegistry> {
        &self.locks
    }

    fn lock(&self, key: LockKey) -> EntityLock {
        self.locks.lock_for(key)
    }

    /// Run `f` while holding the locks for `keys`, taken in canonical order.
    fn locked<R>(
        &self,
        keys: impl IntoIterator<Item = LockKey>,
        f: impl FnOnce() -> Result<R>,
    ) -> Result<R> {
        let locks = self.locks.lock_all(keys);
        let _guards: Vec<_> = locks.iter().map(EntityLock::hold).collect();
        f()
    }

    fn publish(&self, kind: EventKind) {
        self.events.publish(WorkflowEvent::new(kind));
    }

    /// Read and decode a document. A missing document is `Ok(None)`.
    fn read_doc<T: Document>(&self, key: &StoreKey) -> Result<Option<T>> {
        match self.store.read(key) {
            Ok(bytes) => codec::decode(key, &bytes).map(Some),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(storage(err)),
        }
    }

    /// Encode and replace a document.
    ///
    /// The parent node must already exist. If it is gone, the entity that
    /// owned it has been removed and `missing` builds the error to report.
    fn write_doc<T: Document>(
        &self,
        key: &StoreKey,
        value: &T,
        missing: impl FnOnce() -> Error,
    ) -> Result<()> {
        let bytes = codec::encode(value)?;
        match self.store.write(key, &bytes) {
            Ok(()) => Ok(()),
            Err(err) if err.is_not_found() => Err(missing()),
            Err(err) => Err(storage(err)),
        }
    }

    /// Create the node `root` holding `doc` at `root/{file}`, plus empty
    /// `children` nodes.
    ///
    /// The subtree is assembled under a hidden staging node beside `root`
    /// and renamed into place, so `root` never exists without its document.
    /// Any failure removes the staging node. The parent of `root` must exist.
    fn create_entity<T: Document>(
        &self,
        root: &StoreKey,
        file: &str,
        doc: &T,
        children: &[&str],
        already_exists: impl Fn() -> Error,
    ) -> Result<()> {
        let (Some(parent), Some(name)) = (root.parent(), root.name()) else {
            return Err(Error::Validation(format!("{} cannot hold an entity", root)));
        };
        if self.exists(root)? {
            return Err(already_exists());
        }

        let staging = parent.join(format!(".{}.{}", name, Uuid::new_v4().simple()));
        self.store.create_node(&staging).map_err(storage)?;
        let assembled = children
            .iter()
            .try_for_each(|child| self.store.create_node(&staging.join(*child)))
            .map_err(storage)
            .and_then(|()| {
                self.write_doc(&staging.join(file), doc, || {
                    Error::Storage(StoreError::NotFound(staging.clone()))
                })
            })
            .and_then(|()| match self.store.rename(&staging, root) {
                Ok(()) => Ok(()),
                Err(err) if err.is_already_exists() => Err(already_exists()),
                Err(err) => Err(storage(err)),
            });
        if let Err(err) = assembled {
            self.rollback(&staging, &err);
            return Err(err);
        }
        Ok(())
    }

    fn exists(&self, key: &StoreKey) -> Result<bool> {
        self.store.exists(key).map_err(storage)
    }

    /// Best-effort removal of a partially created subtree.
    fn rollback(&self, key: &StoreKey, cause: &Error) {
        warn!(%key, error = %cause, "rolling back partial create");
        if let Err(err) = self.store.remove(key) {
            if !err.is_not_found() {
                error!(%key, error = %err, "rollback failed");
            }
        }
    }

    /// Load every child node of `parent` with `load`, collecting failures.
    /// Hidden nodes (staging leftovers) are not entities and are skipped.
    fn list_children<T>(
        &self,
        cancel: &CancellationToken,
        parent: &StoreKey,
        mut load: impl FnMut(&str) -> Result<T>,
    ) -> Result<Listing<T>> {
        let names = self.store.list_nodes(parent).map_err(storage)?;
        let mut listing = Listing::default();
        for name in names.into_iter().filter(|name| !name.starts_with('.')) {
            check_cancelled(cancel)?;
            match load(&name) {
                Ok(item) => listing.items.push(item),
                Err(error) => {
                    warn!(%parent, %name, %error, "skipping unreadable entry");
                    listing.errors.push(ListingError { name, error });
                }
            }
        }
        Ok(listing)
    }
}

/// Lock set of one plan's subtree.
fn plan_lock_keys(project: &str, plan: &str) -> [LockKey; 3] {
    [
        LockKey::plan(project, plan),
        LockKey::phases(project, plan),
        LockKey::tasks(project, plan),
    ]
}

/// Wrap a store error, logging environmental faults with their context.
fn storage(err: StoreError) -> Error {
    if let StoreError::Io { op, key, source } = &err {
        error!(%op, %key, error = %source, "storage fault");
    }
    Error::Storage(err)
}

pub(crate) fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    Ok(())
}

/// Result of a best-effort listing: what loaded, and what did not.
#[derive(Debug)]
pub struct Listing<T> {
    pub items: Vec<T>,
    pub errors: Vec<ListingError>,
}

impl<T> Default for Listing<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            errors: Vec::new(),
        }
    }
}

impl<T> Listing<T> {
    /// True when every entry loaded.
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

/// One entry a listing could not load.
#[derive(Debug)]
pub struct ListingError {
    /// Slug (node name) of the entry.
    pub name: String,
    pub error: Error,
}
