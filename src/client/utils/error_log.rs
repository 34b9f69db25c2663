//! Captured client errors. The last entries are kept under `empathy_errors`
//! and, when error reporting is on, forwarded to a remote tracker.

use crate::client::config::ClientConfig;
use crate::client::utils::session::SessionStore;
use crate::client::utils::storage::{self, Storage, KEY_ERRORS};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const MAX_ENTRIES: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Api,
    Channel,
    Panic,
    Unhandled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub id: String,
    pub message: String,
    #[serde(default)]
    pub context: serde_json::Value,
    pub kind: ErrorKind,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone)]
struct RemoteTracker {
    http: reqwest::Client,
    url: String,
}

#[derive(Clone)]
pub struct ErrorLog {
    storage: Arc<dyn Storage>,
    session: Option<SessionStore>,
    remote: Option<RemoteTracker>,
}

impl ErrorLog {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage, session: None, remote: None }
    }

    /// Enables remote reporting when the config asks for it.
    pub fn from_config(storage: Arc<dyn Storage>, config: &ClientConfig) -> Self {
        let mut log = Self::new(storage);
        if config.features.error_reporting {
            if let Some(url) = &config.error_tracking_url {
                log.remote = Some(RemoteTracker { http: reqwest::Client::new(), url: url.clone() });
            }
        }
        log
    }

    pub fn with_session(mut self, session: SessionStore) -> Self {
        self.session = Some(session);
        self
    }

    pub fn entries(&self) -> Vec<ErrorEntry> {
        storage::read_json(self.storage.as_ref(), KEY_ERRORS).unwrap_or_default()
    }

    pub fn capture(&self, kind: ErrorKind, message: impl Into<String>, context: serde_json::Value) -> ErrorEntry {
        self.capture_at(kind, message, context, None)
    }

    /// Records an error raised while `url` was being handled.
    pub fn capture_at(
        &self,
        kind: ErrorKind,
        message: impl Into<String>,
        context: serde_json::Value,
        url: Option<String>,
    ) -> ErrorEntry {
        let entry = ErrorEntry {
            id: uuid::Uuid::new_v4().to_string(),
            message: message.into(),
            context,
            kind,
            url,
            user_id: self.session.as_ref().and_then(|s| s.user_id()),
            timestamp: Utc::now(),
        };
        log::error!("[ERRLOG] {:?}: {}", entry.kind, entry.message);

        let mut entries = self.entries();
        entries.push(entry.clone());
        if entries.len() > MAX_ENTRIES {
            let excess = entries.len() - MAX_ENTRIES;
            entries.drain(..excess);
        }
        if let Err(e) = storage::write_json(self.storage.as_ref(), KEY_ERRORS, &entries) {
            log::warn!("[ERRLOG] Could not persist error log: {}", e);
        }

        self.report(&entry);
        entry
    }

    fn report(&self, entry: &ErrorEntry) {
        let Some(remote) = self.remote.clone() else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            log::debug!("[ERRLOG] No runtime, skipping remote report");
            return;
        };
        let entry = entry.clone();
        handle.spawn(async move {
            match remote.http.post(&remote.url).json(&entry).send().await {
                Ok(resp) if resp.status().is_success() => {}
                Ok(resp) => log::warn!("[ERRLOG] Tracker rejected report: {}", resp.status()),
                Err(e) => log::warn!("[ERRLOG] Tracker unreachable: {}", e),
            }
        });
    }

    pub fn clear(&self) {
        if let Err(e) = self.storage.remove(KEY_ERRORS) {
            log::warn!("[ERRLOG] Could not clear error log: {}", e);
        }
    }

    /// Records panics before the default hook prints them.
    pub fn install_panic_hook(&self) {
        let log = self.clone();
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let message = if let Some(s) = info.payload().downcast_ref::<&str>() {
                (*s).to_string()
            } else if let Some(s) = info.payload().downcast_ref::<String>() {
                s.clone()
            } else {
                "panic".to_string()
            };
            let location = info.location().map(|l| format!("{}:{}", l.file(), l.line()));
            log.capture(ErrorKind::Panic, message, serde_json::json!({ "location": location }));
            previous(info);
        }));
    }
}
