use crate::client::utils::session_store::TokenVault;
use crate::client::utils::storage::{
    self, Storage, StorageError, KEY_EMAIL, KEY_SESSION_TOKEN, KEY_USER, KEY_USERNAME, KEY_USER_ID,
};
use crate::common::models::{AuthSession, User};
use std::sync::Arc;

/// The only reader and writer of persisted identity. Everything else asks
/// this store for the current user and token.
#[derive(Clone)]
pub struct SessionStore {
    storage: Arc<dyn Storage>,
    vault: Option<TokenVault>,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage, vault: None }
    }

    /// Keep the token in the OS keyring instead of plain storage.
    pub fn with_vault(mut self, vault: TokenVault) -> Self {
        self.vault = Some(vault);
        self
    }

    pub fn save(&self, session: &AuthSession) -> Result<(), StorageError> {
        let user = &session.user;
        storage::write_json(self.storage.as_ref(), KEY_USER, user)?;
        self.storage.set(KEY_USER_ID, &user.id)?;
        self.storage.set(KEY_USERNAME, &user.username)?;
        self.storage.set(KEY_EMAIL, &user.email)?;

        match &self.vault {
            Some(vault) => {
                if let Err(e) = vault.save_session_token(&session.token) {
                    log::warn!("[SESSION] Secure token store failed, keeping token in storage: {}", e);
                    self.storage.set(KEY_SESSION_TOKEN, &session.token)?;
                }
            }
            None => self.storage.set(KEY_SESSION_TOKEN, &session.token)?,
        }
        log::info!("[SESSION] Signed in as {} ({})", user.username, user.id);
        Ok(())
    }

    pub fn token(&self) -> Option<String> {
        if let Some(token) = self.vault.as_ref().and_then(|v| v.load_session_token()) {
            return Some(token);
        }
        self.storage.get(KEY_SESSION_TOKEN).filter(|t| !t.is_empty())
    }

    pub fn user(&self) -> Option<User> {
        storage::read_json(self.storage.as_ref(), KEY_USER)
    }

    pub fn user_id(&self) -> Option<String> {
        self.storage.get(KEY_USER_ID)
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some() && self.user_id().is_some()
    }

    pub fn is_admin(&self) -> bool {
        self.user().map(|u| u.is_admin()).unwrap_or(false)
    }

    /// Replace the cached profile after a settings change.
    pub fn update_user(&self, user: &User) -> Result<(), StorageError> {
        storage::write_json(self.storage.as_ref(), KEY_USER, user)?;
        self.storage.set(KEY_USER_ID, &user.id)?;
        self.storage.set(KEY_USERNAME, &user.username)?;
        self.storage.set(KEY_EMAIL, &user.email)
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        for key in [KEY_USER, KEY_SESSION_TOKEN, KEY_USER_ID, KEY_USERNAME, KEY_EMAIL] {
            self.storage.remove(key)?;
        }
        if let Some(vault) = &self.vault {
            if let Err(e) = vault.clear_session_token() {
                log::warn!("[SESSION] Failed to clear secure token: {}", e);
            }
        }
        log::info!("[SESSION] Session cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::utils::storage::MemoryStorage;
    use crate::common::models::Role;
    use std::collections::HashMap;

    fn admin() -> User {
        User {
            id: "u1".into(),
            username: "ada".into(),
            email: "ada@example.com".into(),
            role: Role::Admin,
            is_active: true,
            created_at: None,
            profile: None,
            social_links: HashMap::new(),
        }
    }

    #[test]
    fn save_writes_every_identity_key() {
        let storage = Arc::new(MemoryStorage::new());
        let session = SessionStore::new(storage.clone());
        session.save(&AuthSession { token: "tok".into(), user: admin() }).unwrap();

        assert_eq!(storage.get(KEY_SESSION_TOKEN).as_deref(), Some("tok"));
        assert_eq!(storage.get(KEY_USER_ID).as_deref(), Some("u1"));
        assert_eq!(storage.get(KEY_USERNAME).as_deref(), Some("ada"));
        assert_eq!(storage.get(KEY_EMAIL).as_deref(), Some("ada@example.com"));
        assert!(session.is_authenticated());
        assert!(session.is_admin());
        assert_eq!(session.user().unwrap().username, "ada");
    }

    #[test]
    fn clear_removes_identity() {
        let storage = Arc::new(MemoryStorage::new());
        let session = SessionStore::new(storage.clone());
        session.save(&AuthSession { token: "tok".into(), user: admin() }).unwrap();
        session.clear().unwrap();

        assert!(!session.is_authenticated());
        assert!(session.user().is_none());
        assert!(storage.get(KEY_USER).is_none());
    }
}
