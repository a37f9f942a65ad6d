use std::collections::BTreeSet;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::api::Collaborator;
use crate::error::{preferred_message, DashboardError};
use crate::model::ActionOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TargetKind {
    Pane,
    Window,
    Session,
}

impl TargetKind {
    fn key(self) -> &'static str {
        match self {
            TargetKind::Pane => "target_pane",
            TargetKind::Window => "target_window",
            TargetKind::Session => "target_session",
        }
    }
}

/// Which payload target an action uses and whether the backend insists on it.
fn target_rule(action: &str) -> Option<(TargetKind, bool)> {
    match action {
        "send_keys" | "select_pane" | "kill_pane" => Some((TargetKind::Pane, true)),
        "split_window" => Some((TargetKind::Pane, false)),
        "select_window" | "kill_window" => Some((TargetKind::Window, true)),
        "switch_client" | "kill_session" => Some((TargetKind::Session, true)),
        "new_window" => Some((TargetKind::Session, false)),
        _ => None,
    }
}

/// True for actions that cannot run without a pane id.
pub fn requires_pane_target(action: &str) -> bool {
    matches!(target_rule(action), Some((TargetKind::Pane, true)))
}

/// The places the operator may have said "this pane" (or window, session).
#[derive(Debug, Clone, Default)]
pub struct TargetContext {
    /// Pane of the open pane-detail view.
    pub detail_pane: Option<String>,
    /// Pane of the currently active tab.
    pub active_tab_pane: Option<String>,
    /// Pane named by the route being viewed.
    pub route_pane: Option<String>,
    pub selected_window: Option<String>,
    pub selected_session: Option<String>,
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

/// Payload field as text; numbers are accepted since tmux targets can be bare indexes.
fn payload_text(payload: &Map<String, Value>, key: &str) -> Option<String> {
    match payload.get(key)? {
        Value::String(s) => non_empty(Some(s)),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// First non-empty of: explicit payload, detail view, active tab, route.
pub fn resolve_pane_target(payload: &Map<String, Value>, ctx: &TargetContext) -> Option<String> {
    payload_text(payload, "target_pane")
        .or_else(|| non_empty(ctx.detail_pane.as_deref()))
        .or_else(|| non_empty(ctx.active_tab_pane.as_deref()))
        .or_else(|| non_empty(ctx.route_pane.as_deref()))
}

fn resolve_target(
    kind: TargetKind,
    payload: &Map<String, Value>,
    ctx: &TargetContext,
) -> Option<String> {
    match kind {
        TargetKind::Pane => resolve_pane_target(payload, ctx),
        TargetKind::Window => payload_text(payload, kind.key())
            .or_else(|| non_empty(ctx.selected_window.as_deref())),
        TargetKind::Session => payload_text(payload, kind.key())
            .or_else(|| non_empty(ctx.selected_session.as_deref())),
    }
}

/// `send_keys` payload for typed text: literal mode, or clear-line when empty.
pub fn literal_keys(text: &str) -> Value {
    if text.trim().is_empty() {
        Value::from(vec!["C-u"])
    } else {
        Value::from(vec!["-l", text])
    }
}

/// `send_keys` payload for named tmux keys such as `Enter` or `C-c`.
pub fn named_keys(keys: &[&str]) -> Value {
    Value::from(keys.to_vec())
}

/// An action whose target has been resolved and that may be sent.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedAction {
    pub action: String,
    pub payload: Map<String, Value>,
    pub target: Option<String>,
}

/// Result of a dispatch that reached the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchReport {
    pub result: Result<ActionOutcome, DashboardError>,
    /// Whether the caller must force one refresh to show the action's effect.
    pub refresh: bool,
}

/// Resolves targets and enforces one dispatch in flight at a time.
#[derive(Debug, Default)]
pub struct Dispatcher {
    busy: bool,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Validate and resolve locally. On success the dispatcher is busy until
    /// [`Dispatcher::finish`].
    ///
    /// `allowed` is the latest snapshot's action set, when one is known.
    pub fn prepare(
        &mut self,
        action: &str,
        raw_payload: Map<String, Value>,
        ctx: &TargetContext,
        allowed: Option<&BTreeSet<String>>,
    ) -> Result<PreparedAction, DashboardError> {
        if self.busy {
            return Err(DashboardError::Busy);
        }
        if allowed.is_some_and(|set| !set.contains(action)) {
            return Err(DashboardError::ActionDisabled(action.to_string()));
        }

        let mut payload = raw_payload;
        let mut target = None;
        if let Some((kind, required)) = target_rule(action) {
            target = resolve_target(kind, &payload, ctx);
            match &target {
                Some(t) => {
                    payload.insert(kind.key().to_string(), Value::String(t.clone()));
                }
                None if required => {
                    debug!(action, "No target resolvable");
                    return Err(DashboardError::MissingTarget {
                        action: action.to_string(),
                    });
                }
                None => {}
            }
        }

        self.busy = true;
        Ok(PreparedAction {
            action: action.to_string(),
            payload,
            target,
        })
    }

    /// Clear the busy flag and decide whether a refresh is due.
    pub fn finish(&mut self, result: &Result<ActionOutcome, DashboardError>) -> bool {
        self.busy = false;
        match result {
            Ok(_) => true,
            Err(DashboardError::Unauthorized) => false,
            Err(e) => !e.is_local(),
        }
    }

    /// Execute a prepared action and finish it.
    pub async fn run<C: Collaborator>(
        &mut self,
        client: &C,
        prepared: &PreparedAction,
    ) -> DispatchReport {
        let result = execute(client, prepared).await;
        let refresh = self.finish(&result);
        DispatchReport { result, refresh }
    }
}

/// Send a prepared action. A 2xx body reporting `ok: false` is a rejection too.
pub async fn execute<C: Collaborator>(
    client: &C,
    prepared: &PreparedAction,
) -> Result<ActionOutcome, DashboardError> {
    let outcome = client
        .post_action(&prepared.action, &prepared.payload)
        .await
        .inspect_err(|e| warn!(action = %prepared.action, error = %e, "Action failed"))?;
    if !outcome.ok {
        let message = preferred_message(&outcome.stderr, &outcome.error, &outcome.stdout)
            .unwrap_or_else(|| "action failed".to_string());
        warn!(action = %prepared.action, message, "Action reported failure");
        return Err(DashboardError::ActionRejected(message));
    }
    info!(action = %prepared.action, target = ?prepared.target, "Action succeeded");
    Ok(outcome)
}
