//! REST client for the Empathy API. One `ApiClient` is shared by every
//! service; it owns the base URL, the timeout and header injection.
//! Endpoint groups live in the submodules as further `impl ApiClient` blocks.

mod auth;
mod comments;
mod notifications;
mod posts;
mod reactions;
mod reports;
mod users;

use crate::client::config::ClientConfig;
use crate::client::utils::session::SessionStore;
use crate::common::error::ApiError;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;

#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    session: SessionStore,
}

impl ApiClient {
    pub fn new(config: &ClientConfig, session: SessionStore) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = Client::builder()
            .timeout(config.api_timeout())
            .default_headers(headers)
            .build()
            .map_err(|e| ApiError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            session,
        })
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, self.url(path));
        match self.session.token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        let response = builder.send().await?;
        let status = response.status();
        let url = response.url().path().to_string();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = ApiError::from_status(status.as_u16(), &body);
            log::warn!("[API] {} -> {}: {}", url, status.as_u16(), err);
            return Err(err);
        }

        let bytes = response.bytes().await?;
        log::debug!("[API] {} -> {} ({} bytes)", url, status.as_u16(), bytes.len());
        if bytes.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(serde_json::from_str("{}")?);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub(crate) async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T, ApiError> {
        let builder = self.request(Method::GET, path).query(query);
        self.send(builder).await
    }

    pub(crate) async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        let builder = self.request(Method::POST, path).json(body);
        self.send(builder).await
    }

    pub(crate) async fn put<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        let builder = self.request(Method::PUT, path).json(body);
        self.send(builder).await
    }

    pub(crate) async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let builder = self.request(Method::DELETE, path);
        self.send(builder).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::utils::storage::MemoryStorage;
    use std::sync::Arc;

    #[test]
    fn builds_api_urls_without_double_slashes() {
        let config = ClientConfig {
            api_url: "http://localhost:5000/".into(),
            ..ClientConfig::default()
        };
        let api = ApiClient::new(&config, SessionStore::new(Arc::new(MemoryStorage::new()))).unwrap();
        assert_eq!(api.url("/posts/p1"), "http://localhost:5000/api/posts/p1");
        assert_eq!(api.url("likes/create"), "http://localhost:5000/api/likes/create");
    }
}
