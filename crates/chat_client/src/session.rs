use std::sync::{Arc, RwLock};

use chat_shared::domain::Credential;

use crate::error::{ClientError, Result};

/// Session context shared by every gateway component.
///
/// Cloning shares the same slot. The `ChatClient` that created it is the only
/// writer outside of implicit logout on an authentication rejection.
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    slot: Arc<RwLock<Option<Credential>>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save(&self, credential: Credential) {
        let mut guard = self.slot.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Some(credential);
    }

    pub fn current(&self) -> Option<Credential> {
        self.slot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn clear(&self) -> Option<Credential> {
        self.slot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    /// Credential for a gated operation; absence is an authentication failure.
    pub fn require(&self) -> Result<Credential> {
        self.current()
            .ok_or_else(|| ClientError::AuthFailure("not logged in".to_string()))
    }

    pub fn is_authenticated(&self) -> bool {
        self.current().is_some()
    }
}

#[cfg(test)]
mod tests {
    use chat_shared::domain::UserId;

    use super::*;

    #[test]
    fn require_fails_without_credential() {
        let store = CredentialStore::new();
        let err = store.require().expect_err("must fail");
        assert!(err.is_auth_failure());
    }

    #[test]
    fn clones_share_one_slot() {
        let store = CredentialStore::new();
        let handle = store.clone();
        store.save(Credential::new("T1", UserId(7), "alice"));
        assert_eq!(handle.require().expect("credential").token, "T1");

        let cleared = handle.clear().expect("cleared");
        assert_eq!(cleared.user_id, UserId(7));
        assert!(!store.is_authenticated());
    }
}
