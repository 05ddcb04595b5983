//! Entity encoding.
//!
//! Entities are stored as pretty-printed JSON so the workflow directory
//! stays readable and diffable. Decoding tolerates unknown fields.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{EntityKind, Error, Result};
use crate::store::StoreKey;
use crate::workflow::{Phase, Plan, PlanRecord, Project, Task};

/// A value persisted as a single store document.
pub trait Document: Serialize + DeserializeOwned {
    const KIND: EntityKind;
}

impl Document for Project {
    const KIND: EntityKind = EntityKind::Project;
}

impl Document for Plan {
    const KIND: EntityKind = EntityKind::Plan;
}

impl Document for Vec<Phase> {
    const KIND: EntityKind = EntityKind::Phase;
}

impl Document for Vec<Task> {
    const KIND: EntityKind = EntityKind::Task;
}

impl Document for PlanRecord {
    const KIND: EntityKind = EntityKind::Change;
}

pub fn encode<T: Document>(value: &T) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Decode the document stored at `key`. The key is carried into the error.
pub fn decode<T: Document>(key: &StoreKey, bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|source| Error::Codec {
        kind: T::KIND,
        key: key.clone(),
        source,
    })
}
