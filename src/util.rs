//! Bridges from async callers into the synchronous manager.

use std::time::Duration;

use tokio::task::spawn_blocking;
use tokio::time::timeout;

use crate::manager::Manager;
use crate::{Error, Result};

pub async fn blocking<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    spawn_blocking(f)
        .await
        .map_err(|e| Error::TaskJoin(e.to_string()))?
}

/// Like [`blocking`], giving up after `duration`.
///
/// The closure keeps running to completion on the blocking pool after a
/// timeout; pair it with a cancellation token to stop further writes.
pub async fn blocking_with_timeout<F, T>(duration: Duration, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    match timeout(duration, spawn_blocking(f)).await {
        Ok(Ok(inner)) => inner,
        Ok(Err(join_err)) => Err(Error::TaskJoin(join_err.to_string())),
        Err(_) => Err(Error::Timeout(duration)),
    }
}

/// Run one manager operation on the blocking pool.
pub async fn with_manager<F, T>(manager: &Manager, f: F) -> Result<T>
where
    F: FnOnce(&Manager) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let manager = manager.clone();
    blocking(move || f(&manager)).await
}
