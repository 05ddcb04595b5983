//! Per-entity lock registry.
//!
//! Each distinct [`LockKey`] gets its own mutex, created on first use and
//! kept for the lifetime of the registry. The key space is bounded by the
//! number of entities a process ever touches, so nothing is evicted.
//!
//! Operations that need several locks take them through
//! [`LockRegistry::lock_all`], which returns them in [`LockKey`] order:
//! a project before its plans, and a plan before its phases and tasks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Deterministic lock identity, built from validated slugs only.
///
/// The derived ordering is the acquisition order. Variant order puts
/// `Project` before `Plan`, `Plan` before `Phases` and `Phases` before
/// `Tasks`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LockKey {
    Project(String),
    Plan { project: String, plan: String },
    Phases { project: String, plan: String },
    Tasks { project: String, plan: String },
    Change(String),
}

impl LockKey {
    pub fn project(slug: &str) -> Self {
        LockKey::Project(slug.to_string())
    }

    pub fn plan(project: &str, plan: &str) -> Self {
        LockKey::Plan {
            project: project.to_string(),
            plan: plan.to_string(),
        }
    }

    pub fn phases(project: &str, plan: &str) -> Self {
        LockKey::Phases {
            project: project.to_string(),
            plan: plan.to_string(),
        }
    }

    pub fn tasks(project: &str, plan: &str) -> Self {
        LockKey::Tasks {
            project: project.to_string(),
            plan: plan.to_string(),
        }
    }

    pub fn change(slug: &str) -> Self {
        LockKey::Change(slug.to_string())
    }
}

impl std::fmt::Display for LockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockKey::Project(slug) => write!(f, "project:{}", slug),
            LockKey::Plan { project, plan } => write!(f, "plan:{}:{}", project, plan),
            LockKey::Phases { project, plan } => write!(f, "phases:{}:{}", project, plan),
            LockKey::Tasks { project, plan } => write!(f, "tasks:{}:{}", project, plan),
            LockKey::Change(slug) => write!(f, "change:{}", slug),
        }
    }
}

/// Handle to one entity's lock. Cloning shares the same underlying mutex.
#[derive(Debug, Clone)]
pub struct EntityLock {
    key: LockKey,
    mutex: Arc<Mutex<()>>,
}

impl EntityLock {
    /// Block until the lock is held. The returned guard releases on drop.
    ///
    /// A poisoned mutex is recovered: it guards no data, and the store is
    /// left consistent by the operation that panicked (whole-document writes).
    pub fn hold(&self) -> MutexGuard<'_, ()> {
        self.mutex
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn key(&self) -> &LockKey {
        &self.key
    }
}

/// Table of entity locks guarded by a single meta-lock.
#[derive(Debug, Default)]
pub struct LockRegistry {
    locks: Mutex<HashMap<LockKey, Arc<Mutex<()>>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the lock for `key`, creating it if this is the first request.
    pub fn lock_for(&self, key: LockKey) -> EntityLock {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mutex = locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        EntityLock { key, mutex }
    }

    /// Locks for every key, deduplicated and sorted into acquisition order.
    /// Hold them front to back.
    pub fn lock_all(&self, keys: impl IntoIterator<Item = LockKey>) -> Vec<EntityLock> {
        let mut keys: Vec<LockKey> = keys.into_iter().collect();
        keys.sort();
        keys.dedup();
        keys.into_iter().map(|key| self.lock_for(key)).collect()
    }

    /// Number of distinct keys seen so far.
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
