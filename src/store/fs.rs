//! Directory-as-database backend.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::trace;

use super::{Store, StoreError, StoreKey, StoreOp, StoreResult};

/// Filesystem store rooted at a directory.
///
/// Nodes are directories and documents are files. Node creation uses
/// `fs::create_dir`, which fails atomically when the directory exists.
/// Documents are written to a sibling temp file and renamed into place.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path for a key.
    pub fn path_of(&self, key: &StoreKey) -> PathBuf {
        key.segments()
            .iter()
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }

    fn map_err(&self, op: StoreOp, key: &StoreKey, err: std::io::Error) -> StoreError {
        match err.kind() {
            ErrorKind::NotFound => StoreError::NotFound(key.clone()),
            ErrorKind::AlreadyExists => StoreError::AlreadyExists(key.clone()),
            _ => StoreError::io(op, key, err),
        }
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.tmp", name))
}

impl Store for FsStore {
    fn create_node(&self, key: &StoreKey) -> StoreResult<()> {
        let path = self.path_of(key);
        trace!(path = %path.display(), "create_node");
        fs::create_dir(&path).map_err(|e| self.map_err(StoreOp::CreateNode, key, e))
    }

    fn ensure_node(&self, key: &StoreKey) -> StoreResult<()> {
        let path = self.path_of(key);
        fs::create_dir_all(&path).map_err(|e| StoreError::io(StoreOp::EnsureNode, key, e))
    }

    fn read(&self, key: &StoreKey) -> StoreResult<Vec<u8>> {
        let path = self.path_of(key);
        fs::read(&path).map_err(|e| self.map_err(StoreOp::Read, key, e))
    }

    fn write(&self, key: &StoreKey, value: &[u8]) -> StoreResult<()> {
        let path = self.path_of(key);
        let temp_path = temp_path_for(&path);
        trace!(path = %path.display(), bytes = value.len(), "write");

        fs::write(&temp_path, value).map_err(|e| self.map_err(StoreOp::Write, key, e))?;
        if let Err(err) = fs::rename(&temp_path, &path) {
            let _ = fs::remove_file(&temp_path);
            return Err(StoreError::io(StoreOp::Write, key, err));
        }
        Ok(())
    }

    fn list_nodes(&self, key: &StoreKey) -> StoreResult<Vec<String>> {
        let path = self.path_of(key);
        let entries = match fs::read_dir(&path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(StoreOp::List, key, e)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(StoreOp::List, key, e))?;
            let file_type = entry
                .file_type()
                .map_err(|e| StoreError::io(StoreOp::List, key, e))?;
            if file_type.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    fn exists(&self, key: &StoreKey) -> StoreResult<bool> {
        let path = self.path_of(key);
        path.try_exists()
            .map_err(|e| StoreError::io(StoreOp::Exists, key, e))
    }

    fn remove(&self, key: &StoreKey) -> StoreResult<()> {
        let path = self.path_of(key);
        let metadata =
            fs::symlink_metadata(&path).map_err(|e| self.map_err(StoreOp::Remove, key, e))?;
        let result = if metadata.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        result.map_err(|e| self.map_err(StoreOp::Remove, key, e))
    }

    fn rename(&self, from: &StoreKey, to: &StoreKey) -> StoreResult<()> {
        let from_path = self.path_of(from);
        let to_path = self.path_of(to);

        // fs::rename silently replaces an empty target directory.
        if to_path
            .try_exists()
            .map_err(|e| StoreError::io(StoreOp::Rename, to, e))?
        {
            return Err(StoreError::AlreadyExists(to.clone()));
        }

        fs::rename(&from_path, &to_path).map_err(|e| {
            // Another writer moved a non-empty directory into place first.
            if to_path.exists() {
                StoreError::AlreadyExists(to.clone())
            } else {
                self.map_err(StoreOp::Rename, from, e)
            }
        })
    }
}
