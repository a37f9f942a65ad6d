use tracing::{debug, info, warn};

use crate::api::Collaborator;
use crate::error::DashboardError;
use crate::model::AuthSession;

/// Authentication state as seen by this client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// Startup default, before the first session probe resolves. Never re-entered.
    Unknown,
    Authenticated { user: String },
    Unauthenticated,
}

/// Owns the auth state machine. Polling is gated on `is_authenticated`.
#[derive(Debug, Clone)]
pub struct SessionGuard {
    state: AuthState,
}

impl Default for SessionGuard {
    fn default() -> Self {
        Self {
            state: AuthState::Unknown,
        }
    }
}

impl SessionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &AuthState {
        &self.state
    }

    /// Polling and dispatch are allowed only in this state.
    pub fn is_authenticated(&self) -> bool {
        matches!(self.state, AuthState::Authenticated { .. })
    }

    pub fn user(&self) -> Option<&str> {
        match &self.state {
            AuthState::Authenticated { user } => Some(user),
            _ => None,
        }
    }

    /// Apply the result of a session probe. Only meaningful while `Unknown`;
    /// once resolved, further probes cannot authenticate (that takes a login).
    pub fn resolve_probe(&mut self, probe: Result<AuthSession, DashboardError>) -> &AuthState {
        if self.state != AuthState::Unknown {
            debug!(state = ?self.state, "Ignoring late session probe");
            return &self.state;
        }
        self.state = match probe {
            Ok(AuthSession {
                authenticated: true,
                user,
            }) => AuthState::Authenticated { user },
            Ok(_) => AuthState::Unauthenticated,
            Err(e) => {
                warn!(error = %e, "Session probe failed");
                AuthState::Unauthenticated
            }
        };
        info!(state = ?self.state, "Session probe resolved");
        &self.state
    }

    /// Enter `Authenticated` from any state.
    pub fn login_succeeded(&mut self, user: String) {
        info!(user, "Logged in");
        self.state = AuthState::Authenticated { user };
    }

    /// A failed first login settles the startup state; later failures leave
    /// the current state alone.
    pub fn login_failed(&mut self) {
        if self.state == AuthState::Unknown {
            self.state = AuthState::Unauthenticated;
            info!("Startup login failed");
        }
    }

    /// Drop local auth state. The credential is already known to be invalid,
    /// so the backend is not contacted.
    pub fn on_unauthorized(&mut self) {
        if self.state != AuthState::Unauthenticated {
            warn!("Credential rejected by backend, re-login required");
        }
        self.state = AuthState::Unauthenticated;
    }

    pub fn logged_out(&mut self) {
        info!("Logged out");
        self.state = AuthState::Unauthenticated;
    }

    /// Probe the backend once and resolve the startup state.
    pub async fn check_session<C: Collaborator>(&mut self, client: &C) -> AuthSession {
        let probe = client.fetch_session().await;
        let session = probe.clone().unwrap_or_default();
        self.resolve_probe(probe);
        session
    }

    pub async fn login<C: Collaborator>(
        &mut self,
        client: &C,
        user: &str,
        password: &str,
    ) -> Result<AuthSession, DashboardError> {
        let grant = client.login(user, password).await?;
        let user = if grant.user.is_empty() {
            user.to_string()
        } else {
            grant.user
        };
        self.login_succeeded(user.clone());
        Ok(AuthSession {
            authenticated: true,
            user,
        })
    }

    /// Best-effort backend notification; local state is cleared regardless.
    pub async fn logout<C: Collaborator>(&mut self, client: &C) {
        if let Err(e) = client.logout().await {
            debug!(error = %e, "Logout notification failed");
        }
        client.clear_credential();
        self.logged_out();
    }
}
