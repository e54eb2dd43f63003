//! Remote storage adapter
//!
//! Talks JSON to the session service over HTTP. Every request is bounded by
//! the client timeout. The `is_online` flag follows operation outcomes only:
//! a connect, send or timeout failure marks the remote offline, any
//! successful operation marks it online, and an HTTP error status leaves the
//! flag as it was.

pub mod wire;

#[cfg(test)]
mod tests;

use crate::adapter::{sort_newest_first, AdapterKind, StorageAdapter};
use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::model::{PersistedState, SaveRequest, SessionMetadata, SyncResult};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};
use wire::{ActiveSessionBody, ExistsResponse, SaveSessionBody};

/// Priority of the remote adapter (preferred over the device)
pub const REMOTE_PRIORITY: u8 = 10;

/// Storage adapter over the remote session service
pub struct RemoteAdapter {
    client: Client,
    base_url: Url,
    online: AtomicBool,
    name: String,
}

impl RemoteAdapter {
    /// Create an adapter for the service at `base_url`
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the URL cannot carry path segments or the
    /// HTTP client cannot be built
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::Configuration(format!("invalid remote url {}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Configuration(format!(
                "remote url {} cannot hold paths",
                base_url
            )));
        }

        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| Error::Configuration(format!("cannot build http client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            online: AtomicBool::new(true),
            name: "remote".to_string(),
        })
    }

    /// Create an adapter from the sync configuration
    ///
    /// # Errors
    ///
    /// See [`RemoteAdapter::new`]
    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        Self::new(&config.remote_url, config.request_timeout())
    }

    /// Adapter name used in logs
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Whether the last network-level outcome reached the service
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Relaxed)
    }

    /// Service base URL
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build `<base>/<segments...>`, percent-encoding each segment
    pub(crate) fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Configuration(format!("remote url {} cannot hold paths", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Record the outcome of a whole operation on the online flag
    fn track<T>(&self, result: Result<T>) -> Result<T> {
        match &result {
            Ok(_) => {
                if !self.online.swap(true, Ordering::Relaxed) {
                    info!(adapter = %self.name, "Remote store reachable again");
                }
            }
            Err(e) if e.is_network() => {
                if self.online.swap(false, Ordering::Relaxed) {
                    warn!(adapter = %self.name, error = %e, "Remote store unreachable");
                }
            }
            Err(_) => {}
        }
        result
    }

    async fn send(request: RequestBuilder) -> Result<Response> {
        Ok(request.send().await?)
    }

    /// Turn a non-success status into `Error::Http`
    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response
            .text()
            .await
            .ok()
            .filter(|body| !body.is_empty())
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string());
        Err(Error::Http {
            status: status.as_u16(),
            message,
        })
    }

    async fn json<T: DeserializeOwned>(response: Response) -> Result<T> {
        Ok(Self::check(response).await?.json::<T>().await?)
    }

    async fn exchange(request: RequestBuilder) -> Result<SyncResult> {
        Self::json(Self::send(request).await?).await
    }

    /// Fetch a resource where 404 means absent
    async fn get_optional<T: DeserializeOwned>(&self, url: Url) -> Result<Option<T>> {
        let response = Self::send(self.client.get(url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::json(response).await.map(Some)
    }

    /// Run a write and fold its outcome into a [`SyncResult`]
    async fn write(&self, session_id: &str, request: RequestBuilder) -> SyncResult {
        match self.track(Self::exchange(request).await) {
            Ok(result) => {
                debug!(adapter = %self.name, session_id = %session_id, success = result.success, "Remote write answered");
                result
            }
            Err(e) => {
                warn!(adapter = %self.name, session_id = %session_id, error = %e, "Remote write failed");
                SyncResult::from_error(session_id, &e)
            }
        }
    }

    async fn fetch_state(&self, session_id: &str) -> Result<Option<PersistedState>> {
        let url = self.url(&["sessions", session_id])?;
        self.get_optional(url).await
    }

    async fn fetch_list(&self) -> Result<Vec<SessionMetadata>> {
        let url = self.url(&["sessions"])?;
        let mut sessions: Vec<SessionMetadata> =
            Self::json(Self::send(self.client.get(url)).await?).await?;
        sort_newest_first(&mut sessions);
        Ok(sessions)
    }

    async fn fetch_exists(&self, session_id: &str) -> Result<bool> {
        let url = self.url(&["sessions", session_id, "exists"])?;
        let answer: Option<ExistsResponse> = self.get_optional(url).await?;
        Ok(answer.is_some_and(|a| a.exists))
    }

    async fn fetch_active(&self) -> Result<Option<String>> {
        let url = self.url(&["sessions", "active"])?;
        let body: ActiveSessionBody = Self::json(Self::send(self.client.get(url)).await?).await?;
        Ok(body.session_id)
    }

    async fn put_active(&self, session_id: &str) -> Result<()> {
        let url = self.url(&["sessions", "active"])?;
        let body = ActiveSessionBody {
            session_id: Some(session_id.to_string()),
        };
        Self::check(Self::send(self.client.post(url).json(&body)).await?).await?;
        Ok(())
    }

    async fn drop_active(&self) -> Result<()> {
        let url = self.url(&["sessions", "active"])?;
        Self::check(Self::send(self.client.delete(url)).await?).await?;
        Ok(())
    }

    async fn probe(&self) -> Result<()> {
        let url = self.url(&["health"])?;
        Self::check(Self::send(self.client.get(url)).await?).await?;
        Ok(())
    }

    fn request_or_fail(
        &self,
        session_id: &str,
        build: impl FnOnce(Url) -> RequestBuilder,
        segments: &[&str],
    ) -> std::result::Result<RequestBuilder, SyncResult> {
        self.url(segments)
            .map(build)
            .map_err(|e| SyncResult::from_error(session_id, &e))
    }
}

#[async_trait]
impl StorageAdapter for RemoteAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> AdapterKind {
        AdapterKind::Remote
    }

    fn priority(&self) -> u8 {
        REMOTE_PRIORITY
    }

    async fn save_state(&self, request: &SaveRequest) -> SyncResult {
        let body = SaveSessionBody::from(request);
        match self.request_or_fail(
            &request.session_id,
            |url| self.client.post(url).json(&body),
            &["sessions", request.session_id.as_str()],
        ) {
            Ok(builder) => self.write(&request.session_id, builder).await,
            Err(failed) => failed,
        }
    }

    async fn save_record(&self, record: &PersistedState) -> SyncResult {
        match self.request_or_fail(
            &record.session_id,
            |url| self.client.put(url).json(record),
            &["sessions", record.session_id.as_str()],
        ) {
            Ok(builder) => self.write(&record.session_id, builder).await,
            Err(failed) => failed,
        }
    }

    async fn load_state(&self, session_id: &str) -> Result<Option<PersistedState>> {
        self.track(self.fetch_state(session_id).await)
    }

    async fn delete_session(&self, session_id: &str) -> SyncResult {
        match self.request_or_fail(
            session_id,
            |url| self.client.delete(url),
            &["sessions", session_id],
        ) {
            Ok(builder) => self.write(session_id, builder).await,
            Err(failed) => failed,
        }
    }

    async fn list_sessions(&self) -> Result<Vec<SessionMetadata>> {
        self.track(self.fetch_list().await)
    }

    async fn has_session(&self, session_id: &str) -> Result<bool> {
        self.track(self.fetch_exists(session_id).await)
    }

    async fn active_session_id(&self) -> Result<Option<String>> {
        self.track(self.fetch_active().await)
    }

    async fn set_active_session_id(&self, session_id: &str) -> Result<()> {
        self.track(self.put_active(session_id).await)
    }

    async fn clear_active_session_id(&self) -> Result<()> {
        self.track(self.drop_active().await)
    }

    async fn clear_all(&self) -> SyncResult {
        match self.request_or_fail("all", |url| self.client.delete(url), &["sessions"]) {
            Ok(builder) => self.write("all", builder).await,
            Err(failed) => failed,
        }
    }

    async fn health_check(&self) -> bool {
        match self.track(self.probe().await) {
            Ok(()) => true,
            Err(e) => {
                debug!(adapter = %self.name, error = %e, "Remote health check failed");
                false
            }
        }
    }
}
