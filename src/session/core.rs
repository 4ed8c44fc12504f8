use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Map, Value};

use super::SessionDelegate;
use crate::clock::{Clock, Timestamp};
use crate::error::SessionError;

pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_COOKIE_PREFIX: &str = "brrtkit";
pub const DEFAULT_SCOPE: &str = "session";

/// Session cookie name: `<prefix>:<scope>`.
pub fn cookie_name(prefix: &str, scope: &str) -> String {
    format!("{prefix}:{scope}")
}

/// Session subsystem settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub cookie_prefix: String,
    pub scope: String,
    pub ttl: Duration,
    pub sweep_interval: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            cookie_prefix: DEFAULT_COOKIE_PREFIX.to_string(),
            scope: DEFAULT_SCOPE.to_string(),
            ttl: DEFAULT_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl SessionOptions {
    pub fn cookie_name(&self) -> String {
        cookie_name(&self.cookie_prefix, &self.scope)
    }
}

/// A TTL-bearing session with an opaque JSON payload.
///
/// Shared as `Arc<Session>` between the store, the sweeper and any request
/// that resolved it. The payload is an object; key access goes through
/// [`get`](Self::get) / [`set`](Self::set).
pub struct Session {
    uuid: String,
    ttl_ms: u64,
    expiration: AtomicU64,
    data: Mutex<Value>,
    modified: AtomicBool,
    clock: Arc<dyn Clock>,
    delegate: Option<Arc<dyn SessionDelegate>>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("uuid", &self.uuid)
            .field("ttl_ms", &self.ttl_ms)
            .field("expiration", &self.expiration_time())
            .field("modified", &self.is_modified())
            .field("has_delegate", &self.delegate.is_some())
            .finish()
    }
}

impl AsRef<str> for Session {
    fn as_ref(&self) -> &str {
        &self.uuid
    }
}

impl Session {
    /// New session expiring at `clock.now() + ttl`.
    pub fn new(uuid: impl Into<String>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        let ttl_ms = ttl.as_millis() as u64;
        let now = clock.now();
        Self {
            uuid: uuid.into(),
            ttl_ms,
            expiration: AtomicU64::new(now.saturating_add(ttl_ms)),
            data: Mutex::new(Value::Object(Map::new())),
            modified: AtomicBool::new(false),
            clock,
            delegate: None,
        }
    }

    #[must_use]
    pub fn with_delegate(mut self, delegate: Arc<dyn SessionDelegate>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn expiration_time(&self) -> Timestamp {
        self.expiration.load(Ordering::Acquire)
    }

    /// Push expiry to `now + ttl`. Concurrent callers race; last one wins.
    pub fn postpone_expiration(&self) {
        let next = self.clock.now().saturating_add(self.ttl_ms);
        self.expiration.store(next, Ordering::Release);
    }

    /// Strictly after the expiration time; the boundary itself is still valid.
    pub fn is_expired(&self) -> bool {
        self.clock.now() > self.expiration_time()
    }

    /// Mark for removal on the next sweep.
    pub fn expire(&self) {
        self.expiration.store(0, Ordering::Release);
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.data.lock().get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        let mut data = self.data.lock();
        if !data.is_object() {
            *data = Value::Object(Map::new());
        }
        if let Value::Object(map) = &mut *data {
            map.insert(key.into(), value.into());
        }
        self.modified.store(true, Ordering::Release);
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        let removed = self
            .data
            .lock()
            .as_object_mut()
            .and_then(|map| map.remove(key));
        if removed.is_some() {
            self.modified.store(true, Ordering::Release);
        }
        removed
    }

    /// Snapshot of the whole payload
    pub fn data(&self) -> Value {
        self.data.lock().clone()
    }

    pub fn replace_data(&self, data: Value) {
        *self.data.lock() = data;
        self.modified.store(true, Ordering::Release);
    }

    pub fn is_modified(&self) -> bool {
        self.modified.load(Ordering::Acquire)
    }

    pub fn has_delegate(&self) -> bool {
        self.delegate.is_some()
    }

    /// Pull the payload from the delegate. Returns whether data was found.
    ///
    /// # Errors
    ///
    /// [`SessionError::Delegate`] when the backing store fails.
    pub fn load_data(&self) -> Result<bool, SessionError> {
        let Some(delegate) = &self.delegate else {
            return Ok(false);
        };
        let fetched = delegate
            .fetch_data(&self.uuid)
            .map_err(|source| self.delegate_error(source))?;
        match fetched {
            Some(data) => {
                *self.data.lock() = data;
                self.modified.store(false, Ordering::Release);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Push the payload to the delegate and clear the modified flag.
    pub fn save_data(&self) -> Result<(), SessionError> {
        let Some(delegate) = &self.delegate else {
            return Ok(());
        };
        let data = self.data();
        delegate
            .save_data(&self.uuid, &data)
            .map_err(|source| self.delegate_error(source))?;
        self.modified.store(false, Ordering::Release);
        Ok(())
    }

    /// Drop the local payload and the delegate's copy.
    pub fn clear_data(&self) -> Result<(), SessionError> {
        *self.data.lock() = Value::Object(Map::new());
        self.modified.store(false, Ordering::Release);
        match &self.delegate {
            Some(delegate) => delegate
                .remove_data(&self.uuid)
                .map_err(|source| self.delegate_error(source)),
            None => Ok(()),
        }
    }

    fn delegate_error(&self, source: anyhow::Error) -> SessionError {
        SessionError::Delegate {
            uuid: self.uuid.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::session::MemorySessionDelegate;
    use serde_json::json;

    fn session(clock: &Arc<ManualClock>, ttl_ms: u64) -> Session {
        Session::new(
            "s-1",
            Duration::from_millis(ttl_ms),
            Arc::clone(clock) as Arc<dyn Clock>,
        )
    }

    #[test]
    fn test_expiry_boundary_is_strict() {
        let clock = Arc::new(ManualClock::new(0));
        let s = session(&clock, 100);
        clock.set(100);
        assert!(!s.is_expired());
        clock.set(101);
        assert!(s.is_expired());
    }

    #[test]
    fn test_postpone_resets_from_now() {
        let clock = Arc::new(ManualClock::new(1_000));
        let s = session(&clock, 100);
        assert_eq!(s.expiration_time(), 1_100);
        clock.set(5_000);
        s.postpone_expiration();
        assert_eq!(s.expiration_time(), 5_100);
        clock.set(5_100);
        assert!(!s.is_expired());
    }

    #[test]
    fn test_expire_marks_for_sweep() {
        let clock = Arc::new(ManualClock::new(1_000));
        let s = session(&clock, 100);
        s.expire();
        assert!(s.is_expired());
    }

    #[test]
    fn test_data_access_tracks_modification() {
        let clock = Arc::new(ManualClock::new(0));
        let s = session(&clock, 100);
        assert!(!s.is_modified());
        assert_eq!(s.remove("missing"), None);
        assert!(!s.is_modified());

        s.set("count", 1);
        assert!(s.is_modified());
        assert_eq!(s.get("count"), Some(json!(1)));
        assert_eq!(s.remove("count"), Some(json!(1)));
        assert_eq!(s.data(), json!({}));
    }

    #[test]
    fn test_delegate_round_trip() {
        let clock = Arc::new(ManualClock::new(0));
        let delegate = Arc::new(MemorySessionDelegate::new());
        let s = session(&clock, 100).with_delegate(Arc::clone(&delegate) as Arc<dyn SessionDelegate>);

        assert!(!s.load_data().unwrap());
        s.set("user", "ann");
        s.save_data().unwrap();
        assert!(!s.is_modified());
        assert_eq!(delegate.stored("s-1"), Some(json!({"user": "ann"})));

        s.replace_data(json!({}));
        assert!(s.load_data().unwrap());
        assert_eq!(s.get("user"), Some(json!("ann")));

        s.clear_data().unwrap();
        assert_eq!(delegate.stored("s-1"), None);
        assert_eq!(s.data(), json!({}));
    }
}
