//! In-memory backend used by unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::{Map, Value};

use crate::api::Collaborator;
use crate::error::DashboardError;
use crate::model::{
    ActionOutcome, AuthSession, DetailSession, DetailWindow, LoginGrant, Pane, PaneDetail,
    Session, Snapshot, TmuxState, Window,
};

pub const PASSWORD: &str = "secret";

struct FakeState {
    token: Option<String>,
    snapshot: Result<Snapshot, DashboardError>,
    action_result: Result<ActionOutcome, DashboardError>,
    logout_fails: bool,
    calls: Vec<String>,
    posted: Vec<(String, Map<String, Value>)>,
}

/// Behaves like the dashboard backend: every data call needs a credential
/// and answers 401 (`Unauthorized`) without one.
#[derive(Clone)]
pub struct FakeBackend {
    state: Arc<Mutex<FakeState>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                token: None,
                snapshot: Ok(Snapshot::default()),
                action_result: Ok(ActionOutcome {
                    ok: true,
                    returncode: Some(0),
                    ..Default::default()
                }),
                logout_fails: false,
                calls: Vec::new(),
                posted: Vec::new(),
            })),
        }
    }

    pub fn authenticated() -> Self {
        let backend = Self::new();
        backend.state.lock().unwrap().token = Some("token-ops".into());
        backend
    }

    pub fn set_snapshot(&self, snapshot: Snapshot) {
        self.state.lock().unwrap().snapshot = Ok(snapshot);
    }

    pub fn set_snapshot_error(&self, err: DashboardError) {
        self.state.lock().unwrap().snapshot = Err(err);
    }

    pub fn set_action_result(&self, result: Result<ActionOutcome, DashboardError>) {
        self.state.lock().unwrap().action_result = result;
    }

    /// Simulate the backend invalidating the credential.
    pub fn expire(&self) {
        self.state.lock().unwrap().token = None;
    }

    pub fn fail_logout(&self) {
        self.state.lock().unwrap().logout_fails = true;
    }

    pub fn has_credential(&self) -> bool {
        self.state.lock().unwrap().token.is_some()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().unwrap().calls.len()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn posted_actions(&self) -> Vec<(String, Map<String, Value>)> {
        self.state.lock().unwrap().posted.clone()
    }

    fn record(&self, call: String) -> Result<(), DashboardError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        if state.token.is_none() {
            return Err(DashboardError::Unauthorized);
        }
        Ok(())
    }
}

impl Collaborator for FakeBackend {
    async fn fetch_snapshot(&self) -> Result<Snapshot, DashboardError> {
        self.record("snapshot".into())?;
        self.state.lock().unwrap().snapshot.clone()
    }

    async fn fetch_pane_detail(&self, pane_id: &str) -> Result<PaneDetail, DashboardError> {
        self.record(format!("pane:{pane_id}"))?;
        let snapshot = self.state.lock().unwrap().snapshot.clone()?;
        for session in &snapshot.tmux.sessions {
            for window in &session.windows {
                if let Some(pane) = window.pane(pane_id) {
                    return Ok(PaneDetail {
                        session: DetailSession {
                            name: session.name.clone(),
                            attached: session.attached,
                        },
                        window: DetailWindow {
                            id: window.id.clone(),
                            index: window.index,
                            name: window.name.clone(),
                            active: window.active,
                        },
                        pane: pane.clone(),
                        output: format!("output of {pane_id}\n"),
                    });
                }
            }
        }
        Err(DashboardError::ActionRejected(format!(
            "pane '{pane_id}' not found"
        )))
    }

    async fn post_action(
        &self,
        action: &str,
        payload: &Map<String, Value>,
    ) -> Result<ActionOutcome, DashboardError> {
        self.record(format!("action:{action}"))?;
        let mut state = self.state.lock().unwrap();
        state.posted.push((action.to_string(), payload.clone()));
        state.action_result.clone()
    }

    async fn login(&self, user: &str, password: &str) -> Result<LoginGrant, DashboardError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("login".into());
        if password != PASSWORD {
            return Err(DashboardError::InvalidCredentials("invalid credentials".into()));
        }
        state.token = Some(format!("token-{user}"));
        Ok(LoginGrant {
            token: format!("token-{user}"),
            user: user.to_string(),
            expires_in: Some(86400),
        })
    }

    async fn logout(&self) -> Result<(), DashboardError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("logout".into());
        state.token = None;
        if state.logout_fails {
            return Err(DashboardError::Network("backend unreachable".into()));
        }
        Ok(())
    }

    async fn fetch_session(&self) -> Result<AuthSession, DashboardError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("session".into());
        Ok(match &state.token {
            Some(token) => AuthSession {
                authenticated: true,
                user: token.trim_start_matches("token-").to_string(),
            },
            None => AuthSession::default(),
        })
    }

    fn clear_credential(&self) {
        self.state.lock().unwrap().token = None;
    }
}

pub fn pane(id: &str, active: bool) -> Pane {
    Pane {
        id: id.to_string(),
        active,
        current_command: "zsh".into(),
        ..Default::default()
    }
}

pub fn window(id: &str, index: i64, panes: Vec<Pane>) -> Window {
    Window {
        id: id.to_string(),
        index,
        name: format!("win{index}"),
        pane_count: panes.len() as u32,
        panes,
        ..Default::default()
    }
}

pub fn session(name: &str, windows: Vec<Window>) -> Session {
    Session {
        name: name.to_string(),
        window_count: windows.len() as u32,
        windows,
        ..Default::default()
    }
}

pub fn snapshot(sessions: Vec<Session>) -> Snapshot {
    Snapshot {
        allowed_actions: [
            "send_keys",
            "select_pane",
            "select_window",
            "switch_client",
            "kill_pane",
            "kill_window",
            "kill_session",
            "new_window",
            "split_window",
        ]
        .into_iter()
        .map(String::from)
        .collect(),
        tmux: TmuxState {
            available: true,
            running: true,
            error: String::new(),
            sessions,
        },
        ..Default::default()
    }
}

/// Two sessions: `dev` (windows @1 and @2) and `ops` (window @3).
pub fn sample_snapshot() -> Snapshot {
    snapshot(vec![
        session(
            "dev",
            vec![
                window("@2", 2, vec![pane("%5", true), pane("%6", false)]),
                window("@1", 1, vec![pane("%3", false), pane("%4", true)]),
            ],
        ),
        session("ops", vec![window("@3", 0, vec![pane("%9", true)])]),
    ])
}
