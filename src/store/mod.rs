//! Key-value storage underneath the entity manager.
//!
//! Entities live in a hierarchy of *nodes* (directories on disk) holding
//! *documents* (byte values). The manager only talks to the [`Store`] trait,
//! so the same lifecycle logic runs against the filesystem or against an
//! in-memory map in tests.

mod fs;
#[cfg(test)]
pub(crate) mod hooked;
mod memory;

pub use fs::FsStore;
pub use memory::MemoryStore;

use thiserror::Error;

/// A hierarchical key, rendered as `a/b/c`.
///
/// Segments are never interpreted as paths by callers; backends map them onto
/// whatever layout they use.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct StoreKey(Vec<String>);

impl StoreKey {
    /// The root of the store.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Return a new key with `segment` appended.
    pub fn join(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    /// Final segment, if any.
    pub fn name(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// True when `self` equals `prefix` or lives underneath it.
    pub fn starts_with(&self, prefix: &StoreKey) -> bool {
        self.0.len() >= prefix.0.len() && self.0[..prefix.0.len()] == prefix.0[..]
    }
}

impl std::fmt::Display for StoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            return write!(f, "/");
        }
        write!(f, "{}", self.0.join("/"))
    }
}

/// Storage operation, recorded on faults for diagnosis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    CreateNode,
    EnsureNode,
    Read,
    Write,
    List,
    Exists,
    Remove,
    Rename,
}

impl std::fmt::Display for StoreOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreOp::CreateNode => write!(f, "create_node"),
            StoreOp::EnsureNode => write!(f, "ensure_node"),
            StoreOp::Read => write!(f, "read"),
            StoreOp::Write => write!(f, "write"),
            StoreOp::List => write!(f, "list"),
            StoreOp::Exists => write!(f, "exists"),
            StoreOp::Remove => write!(f, "remove"),
            StoreOp::Rename => write!(f, "rename"),
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("key not found: {0}")]
    NotFound(StoreKey),

    #[error("key already exists: {0}")]
    AlreadyExists(StoreKey),

    #[error("{op} failed for {key}: {source}")]
    Io {
        op: StoreOp,
        key: StoreKey,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub fn io(op: StoreOp, key: &StoreKey, source: std::io::Error) -> Self {
        StoreError::Io {
            op,
            key: key.clone(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists(_))
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Byte-valued hierarchical store.
///
/// Implementations must make `create_node` create-only: it fails with
/// [`StoreError::AlreadyExists`] when the node is already there, with no
/// separate existence check. `write` must replace the whole value so readers
/// never observe a partial document.
pub trait Store: Send + Sync {
    /// Create a node. Fails with `AlreadyExists` if present and `NotFound`
    /// if the parent node is missing.
    fn create_node(&self, key: &StoreKey) -> StoreResult<()>;

    /// Create a node and any missing ancestors. Succeeds if it already exists.
    fn ensure_node(&self, key: &StoreKey) -> StoreResult<()>;

    /// Read a whole document.
    fn read(&self, key: &StoreKey) -> StoreResult<Vec<u8>>;

    /// Replace a whole document. The parent node must exist.
    fn write(&self, key: &StoreKey, value: &[u8]) -> StoreResult<()>;

    /// Names of the immediate child nodes of `key`, sorted. Documents are not
    /// listed. A missing node lists as empty.
    fn list_nodes(&self, key: &StoreKey) -> StoreResult<Vec<String>>;

    /// Whether a node or document exists at `key`.
    fn exists(&self, key: &StoreKey) -> StoreResult<bool>;

    /// Remove a node and everything beneath it, or a single document.
    fn remove(&self, key: &StoreKey) -> StoreResult<()>;

    /// Move a node (and its subtree) to a new key. Fails with `AlreadyExists`
    /// if the target exists. The target's parent must exist.
    fn rename(&self, from: &StoreKey, to: &StoreKey) -> StoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_key_join_and_display() {
        let key = StoreKey::root().join("projects").join("demo");
        assert_eq!(key.to_string(), "projects/demo");
        assert_eq!(key.name(), Some("demo"));
        assert_eq!(StoreKey::root().to_string(), "/");
    }

    #[test]
    fn test_store_key_parent() {
        let key = StoreKey::from_segments(["projects", "demo", "project.json"]);
        assert_eq!(
            key.parent(),
            Some(StoreKey::from_segments(["projects", "demo"]))
        );
        assert_eq!(StoreKey::root().parent(), None);
    }

    #[test]
    fn test_store_key_starts_with() {
        let parent = StoreKey::from_segments(["projects", "demo"]);
        let child = parent.join("plans");
        assert!(child.starts_with(&parent));
        assert!(parent.starts_with(&parent));
        assert!(!parent.starts_with(&child));
        assert!(!StoreKey::from_segments(["projects", "demo2"]).starts_with(&parent));
    }
}
