use crate::client::config::ClientConfig;
use crate::client::utils::session::SessionStore;
use crate::client::utils::storage::{self, Storage, KEY_USER_JOURNEY};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Steps of the user journey kept in session storage.
pub const JOURNEY_LEN: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub name: String,
    pub properties: serde_json::Value,
    pub session_id: String,
    pub user_id: Option<String>,
    pub analytics_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JourneyStep {
    pub path: String,
    pub timestamp: DateTime<Utc>,
}

/// Event shaping for product analytics. Does nothing unless enabled.
#[derive(Clone)]
pub struct Analytics {
    enabled: bool,
    analytics_id: Option<String>,
    session_id: String,
    session: Option<SessionStore>,
    journey: Arc<dyn Storage>,
    buffer: Arc<Mutex<Vec<AnalyticsEvent>>>,
}

impl Analytics {
    /// `journey` should be session-scoped storage.
    pub fn new(config: &ClientConfig, journey: Arc<dyn Storage>) -> Self {
        Self {
            enabled: config.features.analytics,
            analytics_id: config.analytics_id.clone(),
            session_id: uuid::Uuid::new_v4().to_string(),
            session: None,
            journey,
            buffer: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_session(mut self, session: SessionStore) -> Self {
        self.session = Some(session);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn track(&self, name: &str, properties: serde_json::Value) {
        if !self.enabled {
            return;
        }
        let event = AnalyticsEvent {
            name: name.to_string(),
            properties,
            session_id: self.session_id.clone(),
            user_id: self.session.as_ref().and_then(|s| s.user_id()),
            analytics_id: self.analytics_id.clone(),
            timestamp: Utc::now(),
        };
        log::debug!("[ANALYTICS] {}", event.name);
        match self.buffer.lock() {
            Ok(mut buffer) => buffer.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }

    pub fn page_view(&self, path: &str) {
        if !self.enabled {
            return;
        }
        let mut journey = self.journey();
        journey.push(JourneyStep { path: path.to_string(), timestamp: Utc::now() });
        if journey.len() > JOURNEY_LEN {
            let excess = journey.len() - JOURNEY_LEN;
            journey.drain(..excess);
        }
        if let Err(e) = storage::write_json(self.journey.as_ref(), KEY_USER_JOURNEY, &journey) {
            log::warn!("[ANALYTICS] Could not persist journey: {}", e);
        }
        self.track("page_view", serde_json::json!({ "path": path }));
    }

    pub fn journey(&self) -> Vec<JourneyStep> {
        storage::read_json(self.journey.as_ref(), KEY_USER_JOURNEY).unwrap_or_default()
    }

    /// Hands buffered events to the caller and empties the buffer.
    pub fn drain(&self) -> Vec<AnalyticsEvent> {
        match self.buffer.lock() {
            Ok(mut buffer) => std::mem::take(&mut *buffer),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::config::FeatureFlags;
    use crate::client::utils::storage::MemoryStorage;

    fn enabled() -> ClientConfig {
        ClientConfig {
            features: FeatureFlags { analytics: true, ..FeatureFlags::default() },
            analytics_id: Some("G-TEST".into()),
            ..ClientConfig::default()
        }
    }

    #[test]
    fn disabled_analytics_records_nothing() {
        let analytics = Analytics::new(&ClientConfig::default(), Arc::new(MemoryStorage::new()));
        analytics.track("like", serde_json::json!({}));
        analytics.page_view("/feed");
        assert!(analytics.drain().is_empty());
        assert!(analytics.journey().is_empty());
    }

    #[test]
    fn events_carry_session_and_analytics_ids() {
        let analytics = Analytics::new(&enabled(), Arc::new(MemoryStorage::new()));
        analytics.track("like", serde_json::json!({ "post_id": "p1" }));
        let events = analytics.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].session_id, analytics.session_id());
        assert_eq!(events[0].analytics_id.as_deref(), Some("G-TEST"));
        assert!(analytics.drain().is_empty());
    }

    #[test]
    fn journey_keeps_last_twenty_steps() {
        let analytics = Analytics::new(&enabled(), Arc::new(MemoryStorage::new()));
        for i in 0..25 {
            analytics.page_view(&format!("/page/{}", i));
        }
        let journey = analytics.journey();
        assert_eq!(journey.len(), JOURNEY_LEN);
        assert_eq!(journey[0].path, "/page/5");
        assert_eq!(analytics.drain().len(), 25);
    }
}
