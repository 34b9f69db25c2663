#![allow(dead_code)]

use empathy_client::client::config::ClientConfig;
use empathy_client::client::services::api::ApiClient;
use empathy_client::client::utils::session::SessionStore;
use empathy_client::client::utils::storage::MemoryStorage;
use empathy_client::common::models::{AuthSession, Role, User};
use std::collections::HashMap;
use std::sync::Arc;
use wiremock::MockServer;

pub fn user(id: &str, role: Role) -> User {
    User {
        id: id.into(),
        username: format!("user_{}", id),
        email: format!("{}@example.com", id),
        role,
        is_active: true,
        created_at: None,
        profile: None,
        social_links: HashMap::new(),
    }
}

pub fn api_for(server: &MockServer) -> ApiClient {
    let config = ClientConfig {
        api_url: server.uri(),
        ..ClientConfig::default()
    };
    let session = SessionStore::new(Arc::new(MemoryStorage::new()));
    ApiClient::new(&config, session).expect("client builds")
}

/// Client with a stored session for `user`.
pub fn signed_in(server: &MockServer, user: User) -> ApiClient {
    let api = api_for(server);
    api.session()
        .save(&AuthSession { token: "test-token".into(), user })
        .expect("session saves");
    api
}
