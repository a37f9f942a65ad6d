use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, warn};
use url::Url;

use crate::error::{classify_status, classify_transport, DashboardError};
use crate::model::{ActionOutcome, AuthSession, LoginGrant, PaneDetail, Snapshot};

/// The HTTP surface of the dashboard backend as seen by the controller.
///
/// `ApiClient` is the real implementation; tests substitute in-memory fakes.
/// Clones share the carried credential.
pub trait Collaborator: Clone + Send + Sync + 'static {
    fn fetch_snapshot(&self) -> impl Future<Output = Result<Snapshot, DashboardError>> + Send;

    fn fetch_pane_detail(
        &self,
        pane_id: &str,
    ) -> impl Future<Output = Result<PaneDetail, DashboardError>> + Send;

    fn post_action(
        &self,
        action: &str,
        payload: &Map<String, Value>,
    ) -> impl Future<Output = Result<ActionOutcome, DashboardError>> + Send;

    /// On success the returned grant's token is also retained for later calls.
    fn login(
        &self,
        user: &str,
        password: &str,
    ) -> impl Future<Output = Result<LoginGrant, DashboardError>> + Send;

    fn logout(&self) -> impl Future<Output = Result<(), DashboardError>> + Send;

    fn fetch_session(&self) -> impl Future<Output = Result<AuthSession, DashboardError>> + Send;

    /// Forget the carried credential without telling the backend.
    fn clear_credential(&self);
}

/// Client for the dashboard backend's REST API.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    /// API root, e.g. `http://127.0.0.1:5001/api`.
    base_url: Url,
    /// Bearer token issued by `/auth/login`.
    token: Arc<Mutex<Option<String>>>,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let mut base_url =
            Url::parse(base_url).with_context(|| format!("Invalid API base URL '{base_url}'"))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("API base URL '{base_url}' cannot carry a path");
        }
        // Keep the path free of a trailing slash so segments append cleanly.
        let trimmed = base_url.path().trim_end_matches('/').to_string();
        base_url.set_path(&trimmed);

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url,
            token: Arc::new(Mutex::new(None)),
        })
    }

    /// Start out carrying a token issued earlier (e.g. from `TMUXDASH_TOKEN`).
    pub fn with_token(self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.set_credential((!token.is_empty()).then_some(token));
        self
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    pub fn has_credential(&self) -> bool {
        self.token.lock().map(|t| t.is_some()).unwrap_or(false)
    }

    fn set_credential(&self, token: Option<String>) {
        if let Ok(mut guard) = self.token.lock() {
            *guard = token;
        }
    }

    /// Build an endpoint URL, percent-encoding every segment (pane ids start with `%`).
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let token = self.token.lock().ok().and_then(|t| t.clone());
        let request = request.header("Accept", "application/json");
        match token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Send a request and decode a 2xx JSON body, classifying every failure.
    async fn exchange<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, DashboardError> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;
        let status = response.status();
        let body = response.bytes().await.map_err(|e| classify_transport(&e))?;
        if let Some(err) = classify_status(status, &body) {
            debug!(status = status.as_u16(), error = %err, "Backend returned an error");
            return Err(err);
        }
        serde_json::from_slice(&body).map_err(|e| {
            warn!(error = %e, "Unparsable backend response");
            DashboardError::Network(format!("malformed response: {e}"))
        })
    }

    /// Check if the backend is reachable (`GET /health`).
    pub async fn health_check(&self) -> bool {
        let url = self.endpoint(&["health"]);
        match self.client.get(url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }
}

impl Collaborator for ApiClient {
    async fn fetch_snapshot(&self) -> Result<Snapshot, DashboardError> {
        let url = self.endpoint(&["snapshot"]);
        debug!(%url, "Fetching snapshot");
        self.exchange(self.client.get(url)).await
    }

    async fn fetch_pane_detail(&self, pane_id: &str) -> Result<PaneDetail, DashboardError> {
        let url = self.endpoint(&["panes", pane_id]);
        debug!(%url, pane_id, "Fetching pane detail");
        self.exchange(self.client.get(url)).await
    }

    async fn post_action(
        &self,
        action: &str,
        payload: &Map<String, Value>,
    ) -> Result<ActionOutcome, DashboardError> {
        let url = self.endpoint(&["actions", action]);
        debug!(%url, action, "Posting action");
        self.exchange(self.client.post(url).json(payload)).await
    }

    async fn login(&self, user: &str, password: &str) -> Result<LoginGrant, DashboardError> {
        let url = self.endpoint(&["auth", "login"]);
        debug!(%url, user, "Logging in");
        let request = self
            .client
            .post(url)
            .json(&serde_json::json!({ "user": user, "password": password }));
        let grant: LoginGrant = match self.exchange(request).await {
            Ok(grant) => grant,
            Err(DashboardError::Unauthorized) => {
                return Err(DashboardError::InvalidCredentials(
                    "invalid credentials".into(),
                ))
            }
            Err(e) => return Err(e),
        };
        if grant.token.is_empty() {
            return Err(DashboardError::Network("login response carried no token".into()));
        }
        self.set_credential(Some(grant.token.clone()));
        Ok(grant)
    }

    async fn logout(&self) -> Result<(), DashboardError> {
        let url = self.endpoint(&["auth", "logout"]);
        let result = self
            .exchange::<Value>(self.client.post(url))
            .await
            .map(|_| ());
        self.set_credential(None);
        result
    }

    async fn fetch_session(&self) -> Result<AuthSession, DashboardError> {
        let url = self.endpoint(&["auth", "session"]);
        match self.exchange(self.client.get(url)).await {
            Err(DashboardError::Unauthorized) => Ok(AuthSession::default()),
            other => other,
        }
    }

    fn clear_credential(&self) {
        self.set_credential(None);
    }
}
