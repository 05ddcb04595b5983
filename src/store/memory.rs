//! In-memory backend, mostly for tests and embedding.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use super::{Store, StoreError, StoreKey, StoreResult};

#[derive(Debug, Clone)]
enum Entry {
    Node,
    Document(Vec<u8>),
}

/// A store backed by an ordered map. The root node always exists.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<StoreKey, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, BTreeMap<StoreKey, Entry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn is_node(entries: &BTreeMap<StoreKey, Entry>, key: &StoreKey) -> bool {
    key.is_root() || matches!(entries.get(key), Some(Entry::Node))
}

fn parent_is_node(entries: &BTreeMap<StoreKey, Entry>, key: &StoreKey) -> bool {
    key.parent().is_some_and(|parent| is_node(entries, &parent))
}

fn subtree_keys(entries: &BTreeMap<StoreKey, Entry>, key: &StoreKey) -> Vec<StoreKey> {
    entries
        .range(key.clone()..)
        .take_while(|(k, _)| k.starts_with(key))
        .map(|(k, _)| k.clone())
        .collect()
}

impl Store for MemoryStore {
    fn create_node(&self, key: &StoreKey) -> StoreResult<()> {
        let mut entries = self.entries();
        if key.is_root() || entries.contains_key(key) {
            return Err(StoreError::AlreadyExists(key.clone()));
        }
        if !parent_is_node(&entries, key) {
            return Err(StoreError::NotFound(key.clone()));
        }
        entries.insert(key.clone(), Entry::Node);
        Ok(())
    }

    fn ensure_node(&self, key: &StoreKey) -> StoreResult<()> {
        let mut entries = self.entries();
        let mut current = StoreKey::root();
        for segment in key.segments() {
            current = current.join(segment.clone());
            match entries.get(&current) {
                Some(Entry::Node) => {}
                Some(Entry::Document(_)) => return Err(StoreError::AlreadyExists(current)),
                None => {
                    entries.insert(current.clone(), Entry::Node);
                }
            }
        }
        Ok(())
    }

    fn read(&self, key: &StoreKey) -> StoreResult<Vec<u8>> {
        match self.entries().get(key) {
            Some(Entry::Document(bytes)) => Ok(bytes.clone()),
            _ => Err(StoreError::NotFound(key.clone())),
        }
    }

    fn write(&self, key: &StoreKey, value: &[u8]) -> StoreResult<()> {
        let mut entries = self.entries();
        if !parent_is_node(&entries, key) {
            return Err(StoreError::NotFound(key.clone()));
        }
        if matches!(entries.get(key), Some(Entry::Node)) {
            return Err(StoreError::AlreadyExists(key.clone()));
        }
        entries.insert(key.clone(), Entry::Document(value.to_vec()));
        Ok(())
    }

    fn list_nodes(&self, key: &StoreKey) -> StoreResult<Vec<String>> {
        let entries = self.entries();
        let depth = key.segments().len() + 1;
        let names = entries
            .iter()
            .filter(|(k, entry)| {
                matches!(entry, Entry::Node) && k.segments().len() == depth && k.starts_with(key)
            })
            .filter_map(|(k, _)| k.name().map(str::to_string))
            .collect();
        Ok(names)
    }

    fn exists(&self, key: &StoreKey) -> StoreResult<bool> {
        Ok(key.is_root() || self.entries().contains_key(key))
    }

    fn remove(&self, key: &StoreKey) -> StoreResult<()> {
        let mut entries = self.entries();
        if !entries.contains_key(key) {
            return Err(StoreError::NotFound(key.clone()));
        }
        for k in subtree_keys(&entries, key) {
            entries.remove(&k);
        }
        Ok(())
    }

    fn rename(&self, from: &StoreKey, to: &StoreKey) -> StoreResult<()> {
        let mut entries = self.entries();
        if !entries.contains_key(from) {
            return Err(StoreError::NotFound(from.clone()));
        }
        if entries.contains_key(to) {
            return Err(StoreError::AlreadyExists(to.clone()));
        }
        if !parent_is_node(&entries, to) {
            return Err(StoreError::NotFound(to.clone()));
        }

        let prefix_len = from.segments().len();
        for old_key in subtree_keys(&entries, from) {
            if let Some(entry) = entries.remove(&old_key) {
                let new_key = old_key.segments()[prefix_len..]
                    .iter()
                    .fold(to.clone(), |acc, segment| acc.join(segment.clone()));
                entries.insert(new_key, entry);
            }
        }
        Ok(())
    }
}
