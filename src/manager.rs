//! Owning registry of live sessions, one per profile, bound to the
//! application run.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::ssh::Session;

/// Maps profile ids to their sessions. Sessions are created lazily and
/// live until removed or the whole registry is torn down; two profiles
/// never share a session.
#[derive(Default)]
pub struct ConnectionManager {
    sessions: Mutex<HashMap<String, Arc<Session>>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the session for a profile, creating a disconnected one
    /// on first use.
    pub fn get_or_create(&self, profile_id: &str) -> Arc<Session> {
        let mut sessions = self.sessions.lock().unwrap();
        Arc::clone(
            sessions
                .entry(profile_id.to_string())
                .or_insert_with(|| Arc::new(Session::new(profile_id))),
        )
    }

    pub fn get(&self, profile_id: &str) -> Option<Arc<Session>> {
        self.sessions.lock().unwrap().get(profile_id).cloned()
    }

    /// Disconnects and evicts one profile's session.
    pub fn remove(&self, profile_id: &str) {
        if let Some(session) = self.sessions.lock().unwrap().remove(profile_id) {
            debug!(profile_id, "evicting session");
            session.disconnect();
        }
    }

    /// Disconnects everything and clears the registry.
    pub fn disconnect_all(&self) {
        let sessions: Vec<_> = {
            let mut map = self.sessions.lock().unwrap();
            map.drain().map(|(_, session)| session).collect()
        };
        for session in sessions {
            session.disconnect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssh::SessionState;

    #[test]
    fn test_get_or_create_returns_same_session() {
        let manager = ConnectionManager::new();
        let first = manager.get_or_create("p1");
        let second = manager.get_or_create("p1");
        assert!(Arc::ptr_eq(&first, &second));

        let other = manager.get_or_create("p2");
        assert!(!Arc::ptr_eq(&first, &other));
    }

    #[test]
    fn test_get_without_create() {
        let manager = ConnectionManager::new();
        assert!(manager.get("p1").is_none());
        manager.get_or_create("p1");
        assert!(manager.get("p1").is_some());
    }

    #[test]
    fn test_remove_disconnects_and_evicts() {
        let manager = ConnectionManager::new();
        let session = manager.get_or_create("p1");
        manager.remove("p1");

        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(manager.get("p1").is_none());
        // Removing again is a no-op.
        manager.remove("p1");
    }

    #[test]
    fn test_disconnect_all_clears_registry() {
        let manager = ConnectionManager::new();
        manager.get_or_create("p1");
        manager.get_or_create("p2");

        manager.disconnect_all();

        assert!(manager.get("p1").is_none());
        assert!(manager.get("p2").is_none());
    }
}
