use std::collections::HashMap;
use std::sync::Mutex;

/// Which secret a profile is asking for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecretKind {
    Password,
    PrivateKey,
}

/// Source of credentials, keyed by profile id. The real implementation
/// sits on the platform keychain; this crate only consumes it.
pub trait SecretStore: Send + Sync {
    /// Returns the stored secret bytes, or `None` if nothing is stored.
    fn load_secret(&self, profile_id: &str, kind: SecretKind) -> Option<Vec<u8>>;
}

/// In-memory store used by tests and the probe binary.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    entries: Mutex<HashMap<(String, SecretKind), Vec<u8>>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store_secret(&self, profile_id: &str, kind: SecretKind, secret: impl Into<Vec<u8>>) {
        self.entries
            .lock()
            .unwrap()
            .insert((profile_id.to_string(), kind), secret.into());
    }

    pub fn delete_secret(&self, profile_id: &str, kind: SecretKind) {
        self.entries
            .lock()
            .unwrap()
            .remove(&(profile_id.to_string(), kind));
    }

    /// Drops every secret stored for a profile.
    pub fn delete_all(&self, profile_id: &str) {
        self.entries
            .lock()
            .unwrap()
            .retain(|(id, _), _| id != profile_id);
    }
}

impl SecretStore for MemorySecretStore {
    fn load_secret(&self, profile_id: &str, kind: SecretKind) -> Option<Vec<u8>> {
        self.entries
            .lock()
            .unwrap()
            .get(&(profile_id.to_string(), kind))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_and_load_roundtrip() {
        let store = MemorySecretStore::new();
        store.store_secret("p1", SecretKind::Password, "hunter2");

        assert_eq!(
            store.load_secret("p1", SecretKind::Password),
            Some(b"hunter2".to_vec())
        );
        assert_eq!(store.load_secret("p1", SecretKind::PrivateKey), None);
        assert_eq!(store.load_secret("p2", SecretKind::Password), None);
    }

    #[test]
    fn test_delete_all_clears_both_kinds() {
        let store = MemorySecretStore::new();
        store.store_secret("p1", SecretKind::Password, "pw");
        store.store_secret("p1", SecretKind::PrivateKey, "key material");
        store.store_secret("p2", SecretKind::Password, "other");

        store.delete_all("p1");

        assert_eq!(store.load_secret("p1", SecretKind::Password), None);
        assert_eq!(store.load_secret("p1", SecretKind::PrivateKey), None);
        assert_eq!(
            store.load_secret("p2", SecretKind::Password),
            Some(b"other".to_vec())
        );
    }
}
