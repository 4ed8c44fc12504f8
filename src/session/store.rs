use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use super::Session;
use crate::error::SessionError;

/// Registry of live sessions keyed by UUID.
///
/// The lock is held only for single map operations; delegate I/O always
/// happens after it is released.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Arc<Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    ///
    /// [`SessionError::DuplicateId`] when the UUID is already registered.
    pub fn add(&self, session: Arc<Session>) -> Result<(), SessionError> {
        let mut sessions = self.sessions.lock();
        if sessions.contains_key(session.uuid()) {
            return Err(SessionError::DuplicateId(session.uuid().to_string()));
        }
        debug!(session = %session.uuid(), total = sessions.len() + 1, "Session registered");
        sessions.insert(session.uuid().to_string(), session);
        Ok(())
    }

    pub fn get(&self, uuid: &str) -> Option<Arc<Session>> {
        self.sessions.lock().get(uuid).map(Arc::clone)
    }

    /// No-op on a miss.
    pub fn remove(&self, uuid: &str) -> Option<Arc<Session>> {
        self.sessions.lock().remove(uuid)
    }

    /// Remove `uuid` only if it is still expired at the time of the call.
    ///
    /// A request may have postponed the session between the sweeper's
    /// snapshot and this call; such a session stays.
    pub fn remove_expired(&self, uuid: &str) -> Option<Arc<Session>> {
        let mut sessions = self.sessions.lock();
        if sessions.get(uuid).is_some_and(|s| s.is_expired()) {
            sessions.remove(uuid)
        } else {
            None
        }
    }

    /// Explicit close: unregister, then clear the backing data.
    ///
    /// Returns `Ok(false)` when the session was not registered.
    pub fn close(&self, uuid: &str) -> Result<bool, SessionError> {
        let Some(session) = self.remove(uuid) else {
            return Ok(false);
        };
        info!(session = %uuid, "Session closed");
        session.clear_data()?;
        Ok(true)
    }

    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        self.sessions.lock().values().map(Arc::clone).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}
