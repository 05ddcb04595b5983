//! Test store that runs callbacks and injects faults around an inner
//! [`MemoryStore`].

use std::io;
use std::sync::{mpsc, Mutex};
use std::thread;
use std::time::Duration;

use super::{MemoryStore, Store, StoreError, StoreKey, StoreOp, StoreResult};

type Matcher = Box<dyn Fn(StoreOp, &StoreKey) -> bool + Send + Sync>;
type Action = Box<dyn FnOnce() + Send>;

/// A [`MemoryStore`] with one-shot hooks checked around every operation.
#[derive(Default)]
pub(crate) struct HookedStore {
    inner: MemoryStore,
    after: Mutex<Vec<(Matcher, Action)>>,
    faults: Mutex<Vec<Matcher>>,
}

impl HookedStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Run `action` once, right after the first operation `matches`
    /// accepts has completed.
    pub(crate) fn after(
        &self,
        matches: impl Fn(StoreOp, &StoreKey) -> bool + Send + Sync + 'static,
        action: impl FnOnce() + Send + 'static,
    ) {
        self.after
            .lock()
            .unwrap()
            .push((Box::new(matches), Box::new(action)));
    }

    /// Fail the first operation `matches` accepts with an I/O error.
    pub(crate) fn fail_once(
        &self,
        matches: impl Fn(StoreOp, &StoreKey) -> bool + Send + Sync + 'static,
    ) {
        self.faults.lock().unwrap().push(Box::new(matches));
    }

    /// Start `run` on its own thread once the first operation `matches`
    /// accepts has completed, and give it a head start before the caller
    /// of that operation carries on.
    pub(crate) fn race<R: Send + 'static>(
        &self,
        matches: impl Fn(StoreOp, &StoreKey) -> bool + Send + Sync + 'static,
        run: impl FnOnce() -> R + Send + 'static,
    ) -> Racer<R> {
        let (tx, rx) = mpsc::channel();
        self.after(matches, move || {
            tx.send(thread::spawn(run)).unwrap();
            thread::sleep(Duration::from_millis(50));
        });
        Racer(rx)
    }

    fn around<T>(
        &self,
        op: StoreOp,
        key: &StoreKey,
        call: impl FnOnce() -> StoreResult<T>,
    ) -> StoreResult<T> {
        {
            let mut faults = self.faults.lock().unwrap();
            if let Some(i) = faults.iter().position(|matches| matches(op, key)) {
                faults.remove(i);
                return Err(StoreError::io(
                    op,
                    key,
                    io::Error::other("injected fault"),
                ));
            }
        }

        let out = call();

        let action = {
            let mut after = self.after.lock().unwrap();
            after
                .iter()
                .position(|(matches, _)| matches(op, key))
                .map(|i| after.remove(i).1)
        };
        // Run outside the lock; the action may use the store itself.
        if let Some(action) = action {
            action();
        }
        out
    }
}

/// Handle on an operation started by [`HookedStore::race`].
pub(crate) struct Racer<R>(mpsc::Receiver<thread::JoinHandle<R>>);

impl<R> Racer<R> {
    pub(crate) fn join(self) -> R {
        self.0
            .recv()
            .expect("racing operation never started")
            .join()
            .expect("racing operation panicked")
    }
}

/// Matcher for one operation on keys whose last segment is `name`.
pub(crate) fn on(
    op: StoreOp,
    name: &'static str,
) -> impl Fn(StoreOp, &StoreKey) -> bool + Send + Sync + 'static {
    move |o, key| o == op && key.name() == Some(name)
}

impl Store for HookedStore {
    fn create_node(&self, key: &StoreKey) -> StoreResult<()> {
        self.around(StoreOp::CreateNode, key, || self.inner.create_node(key))
    }

    fn ensure_node(&self, key: &StoreKey) -> StoreResult<()> {
        self.around(StoreOp::EnsureNode, key, || self.inner.ensure_node(key))
    }

    fn read(&self, key: &StoreKey) -> StoreResult<Vec<u8>> {
        self.around(StoreOp::Read, key, || self.inner.read(key))
    }

    fn write(&self, key: &StoreKey, value: &[u8]) -> StoreResult<()> {
        self.around(StoreOp::Write, key, || self.inner.write(key, value))
    }

    fn list_nodes(&self, key: &StoreKey) -> StoreResult<Vec<String>> {
        self.around(StoreOp::List, key, || self.inner.list_nodes(key))
    }

    fn exists(&self, key: &StoreKey) -> StoreResult<bool> {
        self.around(StoreOp::Exists, key, || self.inner.exists(key))
    }

    fn remove(&self, key: &StoreKey) -> StoreResult<()> {
        self.around(StoreOp::Remove, key, || self.inner.remove(key))
    }

    fn rename(&self, from: &StoreKey, to: &StoreKey) -> StoreResult<()> {
        self.around(StoreOp::Rename, from, || self.inner.rename(from, to))
    }
}
