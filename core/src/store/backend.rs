// Realtime store abstraction
//
// The live key-path database is an external collaborator. The core only needs
// two operations from it: subscribe to a path (full snapshot on every change)
// and overwrite a path. `MemoryStore` is the in-process implementation used by
// tests and by tooling that has no live backend.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use super::paths::segments;
use crate::{DashError, Result};

/// Callback receiving the full value at a subscribed path. `Value::Null` means
/// nothing is stored there.
pub type SnapshotCallback = Box<dyn FnMut(Value)>;

/// Live key-path store: subscribe delivers full snapshots, write overwrites.
#[async_trait(?Send)]
pub trait RealtimeStore {
    /// Register `callback` for `path`. The callback receives the current value
    /// and then the full value again after every change under that path.
    fn subscribe(&self, path: &str, callback: SnapshotCallback) -> Result<ListenerHandle>;

    /// Replace whatever is stored at `path` with `value`.
    async fn write(&self, path: &str, value: Value) -> Result<()>;
}

/// Releases a live listener exactly once, either through `unsubscribe` or on drop.
pub struct ListenerHandle {
    release: Option<Box<dyn FnOnce()>>,
}

impl ListenerHandle {
    pub fn new<F>(release: F) -> Self
    where
        F: FnOnce() + 'static,
    {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// A handle with nothing to release.
    pub fn noop() -> Self {
        Self { release: None }
    }

    pub fn unsubscribe(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl std::fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerHandle")
            .field("active", &self.release.is_some())
            .finish()
    }
}

struct Listener {
    path: Vec<String>,
    callback: Arc<Mutex<SnapshotCallback>>,
}

/// In-memory realtime store useful for testing and offline tooling
#[derive(Clone)]
pub struct MemoryStore {
    root: Arc<RwLock<Value>>,
    listeners: Arc<RwLock<HashMap<u64, Listener>>>,
    next_listener: Arc<AtomicU64>,
    reject_writes: Arc<AtomicBool>,
    writes: Arc<AtomicU64>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            root: Arc::new(RwLock::new(Value::Null)),
            listeners: Arc::new(RwLock::new(HashMap::new())),
            next_listener: Arc::new(AtomicU64::new(0)),
            reject_writes: Arc::new(AtomicBool::new(false)),
            writes: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Make every subsequent write fail with `DashError::Store`.
    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    /// Current value at `path` (`Null` when absent).
    pub fn get(&self, path: &str) -> Result<Value> {
        let segs = segments(path)?;
        Ok(value_at(&self.root.read(), &segs))
    }

    /// Number of writes accepted so far.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    fn notify(&self, written: &[&str]) {
        // Snapshots are computed under the lock, callbacks run after it is released
        // so a listener may write back into the store.
        let pending: Vec<(Arc<Mutex<SnapshotCallback>>, Value)> = {
            let root = self.root.read();
            self.listeners
                .read()
                .values()
                .filter(|l| paths_overlap(&l.path, written))
                .map(|l| {
                    let segs: Vec<&str> = l.path.iter().map(String::as_str).collect();
                    (Arc::clone(&l.callback), value_at(&root, &segs))
                })
                .collect()
        };

        for (callback, snapshot) in pending {
            match callback.try_lock() {
                Some(mut cb) => (*cb)(snapshot),
                None => tracing::warn!("Skipping re-entrant snapshot delivery"),
            }
        }
    }
}

#[async_trait(?Send)]
impl RealtimeStore for MemoryStore {
    fn subscribe(&self, path: &str, callback: SnapshotCallback) -> Result<ListenerHandle> {
        let segs = segments(path)?;
        let id = self.next_listener.fetch_add(1, Ordering::SeqCst);
        let callback = Arc::new(Mutex::new(callback));

        self.listeners.write().insert(
            id,
            Listener {
                path: segs.iter().map(|s| s.to_string()).collect(),
                callback: Arc::clone(&callback),
            },
        );

        let initial = value_at(&self.root.read(), &segs);
        (*callback.lock())(initial);

        let listeners = Arc::clone(&self.listeners);
        Ok(ListenerHandle::new(move || {
            listeners.write().remove(&id);
        }))
    }

    async fn write(&self, path: &str, value: Value) -> Result<()> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(DashError::Store(format!("write to '{}' rejected", path)));
        }
        let segs = segments(path)?;
        set_value_at(&mut self.root.write(), &segs, value);
        self.writes.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("memory store write: {}", path);
        self.notify(&segs);
        Ok(())
    }
}

fn paths_overlap(listener: &[String], written: &[&str]) -> bool {
    listener
        .iter()
        .zip(written.iter())
        .all(|(a, b)| a.as_str() == *b)
}

fn value_at(root: &Value, segs: &[&str]) -> Value {
    let mut node = root;
    for seg in segs {
        match node.get(*seg) {
            Some(child) => node = child,
            None => return Value::Null,
        }
    }
    node.clone()
}

/// Overwrite the node at `segs`. Writing `Null` deletes the node and prunes
/// parents left empty, matching realtime database semantics.
fn set_value_at(node: &mut Value, segs: &[&str], value: Value) {
    let Some((first, rest)) = segs.split_first() else {
        *node = value;
        return;
    };

    if !node.is_object() {
        if value.is_null() {
            return;
        }
        *node = Value::Object(Map::new());
    }
    let Value::Object(map) = &mut *node else {
        return;
    };

    if rest.is_empty() {
        if value.is_null() {
            map.remove(*first);
        } else {
            map.insert(first.to_string(), value);
        }
    } else {
        let child = map.entry(first.to_string()).or_insert(Value::Null);
        set_value_at(child, rest, value);
        if child.is_null() || child.as_object().is_some_and(Map::is_empty) {
            map.remove(*first);
        }
    }

    if map.is_empty() {
        *node = Value::Null;
    }
}
