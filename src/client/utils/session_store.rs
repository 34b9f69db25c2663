//! OS keyring vault for the session token, so it does not sit in plain
//! storage next to the rest of the identity.

use keyring::Entry;
use std::path::{Path, PathBuf};

const SERVICE: &str = "empathy_client";
const USER: &str = "empathy_session";
const FALLBACK_FILE: &str = "session_token.txt";

#[derive(Debug, Clone)]
pub struct TokenVault {
    data_dir: PathBuf,
    allow_file_fallback: bool,
}

impl TokenVault {
    pub fn new(data_dir: impl AsRef<Path>, allow_file_fallback: bool) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            allow_file_fallback,
        }
    }

    fn fallback_path(&self) -> PathBuf {
        self.data_dir.join(FALLBACK_FILE)
    }

    pub fn save_session_token(&self, token: &str) -> anyhow::Result<()> {
        let entry = Entry::new(SERVICE, USER);
        match entry.set_password(token) {
            Ok(()) => Ok(()),
            Err(e) => {
                if !self.allow_file_fallback {
                    return Err(anyhow::anyhow!("keyring unavailable and file fallback disabled: {}", e));
                }
                let path = self.fallback_path();
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&path, token)?;
                log::warn!("[SESSION] Keyring unavailable, persisted token to fallback file");
                Ok(())
            }
        }
    }

    pub fn load_session_token(&self) -> Option<String> {
        let entry = Entry::new(SERVICE, USER);
        match entry.get_password() {
            Ok(t) if !t.trim().is_empty() => Some(t),
            Ok(_) => None,
            Err(_) if self.allow_file_fallback => {
                let token = std::fs::read_to_string(self.fallback_path()).ok()?;
                let token = token.trim().to_string();
                if token.is_empty() {
                    None
                } else {
                    Some(token)
                }
            }
            Err(_) => None,
        }
    }

    pub fn clear_session_token(&self) -> anyhow::Result<()> {
        let entry = Entry::new(SERVICE, USER);
        let _ = entry.delete_password();
        if self.allow_file_fallback {
            let path = self.fallback_path();
            if path.exists() {
                std::fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}
