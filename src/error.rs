use thiserror::Error;

use crate::store::{StoreError, StoreKey};

/// The kind of entity an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Project,
    Plan,
    Phase,
    Task,
    Change,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Project => write!(f, "project"),
            EntityKind::Plan => write!(f, "plan"),
            EntityKind::Phase => write!(f, "phase"),
            EntityKind::Task => write!(f, "task"),
            EntityKind::Change => write!(f, "change"),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    #[error("{kind} already exists: {id}")]
    AlreadyExists { kind: EntityKind, id: String },

    #[error("Invalid {kind} transition for {id} from {from} to {to}")]
    InvalidTransition {
        kind: EntityKind,
        id: String,
        from: String,
        to: String,
    },

    #[error("{kind} is archived: {id}")]
    Archived { kind: EntityKind, id: String },

    #[error("{kind} {id} cannot be modified in status {status}")]
    Terminal {
        kind: EntityKind,
        id: String,
        status: String,
    },

    #[error("Phase {id} has incomplete dependencies: {}", pending.join(", "))]
    DependenciesIncomplete { id: String, pending: Vec<String> },

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Failed to decode {kind} at {key}: {source}")]
    Codec {
        kind: EntityKind,
        key: StoreKey,
        #[source]
        source: serde_json::Error,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Task join error: {0}")]
    TaskJoin(String),
}

impl Error {
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn already_exists(kind: EntityKind, id: impl Into<String>) -> Self {
        Error::AlreadyExists {
            kind,
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Error::AlreadyExists { .. })
    }

    /// Whether the caller supplied something the engine refused (as opposed to an
    /// environmental fault). HTTP-style callers map these to 4xx responses.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Error::Validation(_)
                | Error::NotFound { .. }
                | Error::AlreadyExists { .. }
                | Error::InvalidTransition { .. }
                | Error::Archived { .. }
                | Error::Terminal { .. }
                | Error::DependenciesIncomplete { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            format!("{}", Error::not_found(EntityKind::Plan, "add-auth")),
            "plan not found: add-auth"
        );
        assert_eq!(
            format!(
                "{}",
                Error::InvalidTransition {
                    kind: EntityKind::Plan,
                    id: "add-auth".to_string(),
                    from: "created".to_string(),
                    to: "tasks_generated".to_string(),
                }
            ),
            "Invalid plan transition for add-auth from created to tasks_generated"
        );
        assert_eq!(
            format!(
                "{}",
                Error::DependenciesIncomplete {
                    id: "phase.x.2".to_string(),
                    pending: vec!["phase.x.1".to_string()],
                }
            ),
            "Phase phase.x.2 has incomplete dependencies: phase.x.1"
        );
    }

    #[test]
    fn test_error_classification() {
        assert!(Error::not_found(EntityKind::Project, "p").is_not_found());
        assert!(Error::already_exists(EntityKind::Project, "p").is_already_exists());
        assert!(Error::Validation("bad".into()).is_caller_error());
        assert!(!Error::Cancelled.is_caller_error());
        assert!(!Error::NoHomeDir.is_caller_error());
    }
}
