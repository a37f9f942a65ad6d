use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Full point-in-time read of the remote tmux tree plus network facts.
///
/// Re-sent in full on every poll; identity is carried by session names and
/// window/pane ids, never by object identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub allowed_actions: BTreeSet<String>,
    #[serde(default)]
    pub tmux: TmuxState,
    #[serde(default)]
    pub network: NetworkState,
}

impl Snapshot {
    pub fn allows(&self, action: &str) -> bool {
        self.allowed_actions.contains(action)
    }

    pub fn session(&self, name: &str) -> Option<&Session> {
        self.tmux.sessions.iter().find(|s| s.name == name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TmuxState {
    #[serde(default)]
    pub available: bool,
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub sessions: Vec<Session>,
}

/// Network facts collected by the backend. Passed through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkState {
    #[serde(default)]
    pub listening_servers: Vec<serde_json::Value>,
    #[serde(default)]
    pub ssh_connections: Vec<serde_json::Value>,
    #[serde(default)]
    pub ssh_tunnels: Vec<serde_json::Value>,
}

/// A tmux session, keyed by name within a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Unique within a snapshot.
    pub name: String,
    /// Whether any tmux client is attached.
    #[serde(default)]
    pub attached: bool,
    /// Window count as reported by tmux.
    #[serde(default)]
    pub window_count: u32,
    /// In backend order; use `reconcile::sorted_windows` for display order.
    #[serde(default)]
    pub windows: Vec<Window>,
}

impl Session {
    /// Look up a window of this session by id.
    pub fn window(&self, id: &str) -> Option<&Window> {
        self.windows.iter().find(|w| w.id == id)
    }
}

/// A tmux window, keyed by id (`@N`) within its session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Window {
    /// Unique within the session.
    pub id: String,
    /// Display order only; not contiguous and not stable across polls.
    #[serde(default)]
    pub index: i64,
    #[serde(default)]
    pub name: String,
    /// The session's current window.
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub pane_count: u32,
    #[serde(default)]
    pub panes: Vec<Pane>,
}

impl Window {
    /// Look up a pane of this window by id.
    pub fn pane(&self, id: &str) -> Option<&Pane> {
        self.panes.iter().find(|p| p.id == id)
    }
}

/// A single terminal viewport, the leaf of the tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pane {
    /// Globally unique (`%N`), stable for the lifetime of the pane.
    pub id: String,
    #[serde(default)]
    pub index: i64,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub pid: String,
    #[serde(default)]
    pub current_command: String,
    #[serde(default)]
    pub current_path: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub process: ProcessInfo,
}

/// Best-effort `ps` facts about the pane's foreground process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessInfo {
    #[serde(default)]
    pub pid: Option<String>,
    #[serde(default)]
    pub ppid: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub elapsed: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaneDetail {
    #[serde(default)]
    pub session: DetailSession,
    #[serde(default)]
    pub window: DetailWindow,
    #[serde(default)]
    pub pane: Pane,
    #[serde(default)]
    pub output: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetailSession {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub attached: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetailWindow {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub index: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub active: bool,
}

/// Which session/window/pane the operator is looking at. Empty means none.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Selection {
    pub session: String,
    pub window: String,
    pub pane: String,
}

impl Selection {
    pub fn new(
        session: impl Into<String>,
        window: impl Into<String>,
        pane: impl Into<String>,
    ) -> Self {
        Self {
            session: session.into(),
            window: window.into(),
            pane: pane.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.session.is_empty() && self.window.is_empty() && self.pane.is_empty()
    }
}

/// Response of `GET /auth/session`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AuthSession {
    #[serde(default)]
    pub authenticated: bool,
    #[serde(default)]
    pub user: String,
}

/// Response of a successful `POST /auth/login`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginGrant {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Body of a successful `POST /actions/{action}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ActionOutcome {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    /// Backend-side summary, set alongside `ok: false`.
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub returncode: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_tolerates_missing_fields() {
        let raw = r#"{
            "allowed_actions": ["send_keys", "kill_pane"],
            "tmux": {"sessions": [{"name": "main", "windows": [{"id": "@1", "panes": [{"id": "%1"}]}]}]}
        }"#;
        let snapshot: Snapshot = serde_json::from_str(raw).unwrap();
        assert!(snapshot.allows("send_keys"));
        assert!(!snapshot.allows("split_window"));
        assert!(!snapshot.tmux.running);
        assert!(snapshot.network.ssh_tunnels.is_empty());
        let pane = &snapshot.tmux.sessions[0].windows[0].panes[0];
        assert_eq!(pane.id, "%1");
        assert_eq!(pane.process.command, None);
    }

    #[test]
    fn test_network_entries_pass_through() {
        let raw = r#"{"network": {"listening_servers": [{"command": "sshd", "pid": "9", "extra": [1, 2]}]}}"#;
        let snapshot: Snapshot = serde_json::from_str(raw).unwrap();
        assert_eq!(
            snapshot.network.listening_servers[0]["extra"],
            serde_json::json!([1, 2])
        );
    }

    #[test]
    fn test_pane_detail_shape() {
        let raw = r#"{
            "ok": true,
            "session": {"name": "dev", "attached": true},
            "window": {"id": "@3", "index": 2, "name": "editor", "active": true},
            "pane": {"id": "%7", "current_command": "nvim", "process": {"pid": "42"}},
            "output": "hello\n"
        }"#;
        let detail: PaneDetail = serde_json::from_str(raw).unwrap();
        assert_eq!(detail.session.name, "dev");
        assert_eq!(detail.window.index, 2);
        assert_eq!(detail.pane.process.pid.as_deref(), Some("42"));
        assert_eq!(detail.output, "hello\n");
    }
}
