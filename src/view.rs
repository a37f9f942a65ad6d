//! Plain-text rendering of the dashboard state for the terminal.

use std::fmt::Write;

use serde_json::Value;

use crate::app::{Dashboard, StatusBanner};
use crate::api::Collaborator;
use crate::error::Recovery;
use crate::guard::AuthState;
use crate::model::{NetworkState, PaneDetail, Selection, Snapshot};
use crate::reconcile::{sorted_sessions, sorted_windows};

/// Lines of captured pane output shown under the pane view.
const OUTPUT_TAIL_LINES: usize = 20;

fn marker(selected: bool) -> &'static str {
    if selected {
        "*"
    } else {
        " "
    }
}

/// Session → window → pane tree with the selection marked `*`.
pub fn render_tree(snapshot: &Snapshot, selection: &Selection) -> String {
    let mut out = String::new();
    if !snapshot.tmux.available {
        out.push_str("tmux not available\n");
    } else if !snapshot.tmux.running {
        let reason = if snapshot.tmux.error.is_empty() {
            "tmux server is not running"
        } else {
            snapshot.tmux.error.as_str()
        };
        let _ = writeln!(out, "{reason}");
    }

    for session in sorted_sessions(snapshot) {
        let in_session = session.name == selection.session;
        let _ = writeln!(
            out,
            "{} {}{}",
            marker(in_session),
            session.name,
            if session.attached { " (attached)" } else { "" }
        );
        for window in sorted_windows(session) {
            let in_window = in_session && window.id == selection.window;
            let _ = writeln!(
                out,
                "  {} #{} {} [{}]{}",
                marker(in_window),
                window.index,
                window.name,
                window.id,
                if window.active { " active" } else { "" }
            );
            for pane in &window.panes {
                let _ = writeln!(
                    out,
                    "    {} {} {} {}{}",
                    marker(in_window && pane.id == selection.pane),
                    pane.id,
                    pane.current_command,
                    pane.current_path,
                    if pane.active { " active" } else { "" }
                );
            }
        }
    }
    out
}

fn network_line(item: &Value) -> String {
    let field = |key: &str| item.get(key).and_then(Value::as_str).unwrap_or("");
    let mut line = format!("pid {}", field("pid"));
    for key in ["user", "address", "kind", "command"] {
        let value = field(key);
        if !value.is_empty() {
            line.push(' ');
            line.push_str(value);
        }
    }
    line
}

pub fn render_network(network: &NetworkState) -> String {
    let mut out = String::new();
    for (title, items) in [
        ("listening servers", &network.listening_servers),
        ("ssh connections", &network.ssh_connections),
        ("ssh tunnels", &network.ssh_tunnels),
    ] {
        let _ = writeln!(out, "{title}: {}", items.len());
        for item in items {
            let _ = writeln!(out, "  {}", network_line(item));
        }
    }
    out
}

pub fn render_detail(detail: &PaneDetail) -> String {
    let mut out = String::new();
    let pane = &detail.pane;
    let _ = writeln!(
        out,
        "pane {} in {}:{} ({})",
        pane.id, detail.session.name, detail.window.index, detail.window.name
    );
    let _ = writeln!(out, "  cmd: {}  path: {}", pane.current_command, pane.current_path);
    if !pane.title.is_empty() {
        let _ = writeln!(out, "  title: {}", pane.title);
    }
    if let Some(command) = &pane.process.command {
        let _ = writeln!(
            out,
            "  process: {} (pid {}, user {}, up {})",
            command,
            pane.process.pid.as_deref().unwrap_or("?"),
            pane.process.user.as_deref().unwrap_or("?"),
            pane.process.elapsed.as_deref().unwrap_or("?"),
        );
    }
    let lines: Vec<&str> = detail.output.lines().collect();
    let start = lines.len().saturating_sub(OUTPUT_TAIL_LINES);
    out.push_str("  ----\n");
    for line in &lines[start..] {
        let _ = writeln!(out, "  {line}");
    }
    out
}

pub fn render_banner(banner: &StatusBanner) -> String {
    let label = match banner.recovery {
        Recovery::Reauthenticate => "auth",
        Recovery::TransientBanner => "retrying",
        Recovery::ActionMessage => "error",
    };
    format!("[{label}] {}", banner.message)
}

/// Whole screen for the `watch` loop.
pub fn render<C: Collaborator>(app: &Dashboard<C>) -> String {
    let mut out = String::new();
    match app.auth_state() {
        AuthState::Unknown => out.push_str("checking session...\n"),
        AuthState::Unauthenticated => out.push_str("not logged in (login <user> <password>)\n"),
        AuthState::Authenticated { user } => {
            let _ = writeln!(
                out,
                "user {user}{}{}",
                if app.input_focused() { "  [paused]" } else { "" },
                if app.is_busy() { "  [running action]" } else { "" }
            );
        }
    }
    if let Some(banner) = app.banner() {
        let _ = writeln!(out, "{}", render_banner(banner));
    }
    if let Some((action, outcome)) = app.last_action() {
        let text = outcome.stdout.trim();
        if !text.is_empty() {
            let _ = writeln!(out, "{action}: {text}");
        }
    }
    match app.snapshot() {
        None => out.push_str("loading...\n"),
        Some(snapshot) => {
            out.push_str(&render_tree(snapshot, app.selection()));
            if app.route_pane().is_none() {
                out.push_str(&render_network(&snapshot.network));
                let actions: Vec<&str> =
                    snapshot.allowed_actions.iter().map(String::as_str).collect();
                let _ = writeln!(out, "actions: {}", actions.join(", "));
            }
        }
    }
    if let Some(detail) = app.detail() {
        out.push_str(&render_detail(detail));
    }
    out
}
