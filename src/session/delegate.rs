use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use serde_json::Value;

/// Backing store for session payloads.
///
/// Calls happen outside the session store lock, so implementations may block
/// on I/O. Failures propagate into the request's error-hook chain.
pub trait SessionDelegate: Send + Sync {
    /// `None` when nothing is stored for `uuid`
    fn fetch_data(&self, uuid: &str) -> anyhow::Result<Option<Value>>;
    fn save_data(&self, uuid: &str, data: &Value) -> anyhow::Result<()>;
    fn remove_data(&self, uuid: &str) -> anyhow::Result<()>;
}

/// In-process delegate keeping payloads in a map.
#[derive(Debug, Default)]
pub struct MemorySessionDelegate {
    entries: Mutex<HashMap<String, Value>>,
    removals: AtomicUsize,
}

impl MemorySessionDelegate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a payload, e.g. one written by another process.
    pub fn insert(&self, uuid: impl Into<String>, data: Value) {
        self.entries.lock().insert(uuid.into(), data);
    }

    pub fn stored(&self, uuid: &str) -> Option<Value> {
        self.entries.lock().get(uuid).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Number of `remove_data` calls so far
    pub fn removals(&self) -> usize {
        self.removals.load(Ordering::Relaxed)
    }
}

impl SessionDelegate for MemorySessionDelegate {
    fn fetch_data(&self, uuid: &str) -> anyhow::Result<Option<Value>> {
        Ok(self.stored(uuid))
    }

    fn save_data(&self, uuid: &str, data: &Value) -> anyhow::Result<()> {
        self.insert(uuid, data.clone());
        Ok(())
    }

    fn remove_data(&self, uuid: &str) -> anyhow::Result<()> {
        self.removals.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().remove(uuid);
        Ok(())
    }
}
