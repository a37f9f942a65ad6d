use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::api::Collaborator;
use crate::dispatch::{self, Dispatcher, TargetContext};
use crate::error::{DashboardError, Recovery};
use crate::guard::{AuthState, SessionGuard};
use crate::model::{ActionOutcome, AuthSession, PaneDetail, Selection, Snapshot};
use crate::poller::{CancelToken, Poller, TickTicket};
use crate::reconcile;

/// Events sent from background tokio tasks back to the main event loop.
/// The loop applies them one at a time via [`Dashboard::handle_background_event`].
#[derive(Debug)]
pub enum BackgroundEvent {
    /// Startup `GET /auth/session` finished.
    SessionProbed(Result<AuthSession, DashboardError>),
    /// `POST /auth/login` finished.
    LoginFinished(Result<AuthSession, DashboardError>),
    /// A poll finished. `detail` is present on the pane view and names the
    /// pane that was requested.
    PollCompleted {
        ticket: TickTicket,
        snapshot: Result<Snapshot, DashboardError>,
        detail: Option<(String, Result<PaneDetail, DashboardError>)>,
    },
    /// A dispatched action came back.
    ActionFinished {
        action: String,
        result: Result<ActionOutcome, DashboardError>,
    },
}

/// The single replaceable status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusBanner {
    pub recovery: Recovery,
    pub message: String,
}

/// Client-side state of the dashboard: auth, poll gate, last snapshot,
/// selection, pane detail and status banner.
pub struct Dashboard<C: Collaborator> {
    client: C,
    bg_tx: mpsc::UnboundedSender<BackgroundEvent>,
    guard: SessionGuard,
    poller: Poller,
    poll_token: Option<CancelToken>,
    dispatcher: Dispatcher,
    snapshot: Option<Snapshot>,
    detail: Option<PaneDetail>,
    selection: Selection,
    /// Pane named by the pane view; `None` on the overview.
    route_pane: Option<String>,
    banner: Option<StatusBanner>,
    last_action: Option<(String, ActionOutcome)>,
    /// Bumped on every visible change so the runtime knows when to redraw.
    revision: u64,
}

impl<C: Collaborator> Dashboard<C> {
    pub fn new(client: C, poller: Poller, bg_tx: mpsc::UnboundedSender<BackgroundEvent>) -> Self {
        Self {
            client,
            bg_tx,
            guard: SessionGuard::new(),
            poller,
            poll_token: None,
            dispatcher: Dispatcher::new(),
            snapshot: None,
            detail: None,
            selection: Selection::default(),
            route_pane: None,
            banner: None,
            last_action: None,
            revision: 0,
        }
    }

    /// Show the pane view for `pane_id` instead of the overview.
    pub fn with_route_pane(mut self, pane_id: impl Into<String>) -> Self {
        let pane_id = pane_id.into();
        self.route_pane = (!pane_id.is_empty()).then_some(pane_id);
        self
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn auth_state(&self) -> &AuthState {
        self.guard.state()
    }

    pub fn is_authenticated(&self) -> bool {
        self.guard.is_authenticated()
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    pub fn detail(&self) -> Option<&PaneDetail> {
        self.detail.as_ref()
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn route_pane(&self) -> Option<&str> {
        self.route_pane.as_deref()
    }

    pub fn banner(&self) -> Option<&StatusBanner> {
        self.banner.as_ref()
    }

    pub fn last_action(&self) -> Option<&(String, ActionOutcome)> {
        self.last_action.as_ref()
    }

    pub fn is_busy(&self) -> bool {
        self.dispatcher.is_busy()
    }

    pub fn is_polling(&self) -> bool {
        self.poller.is_running()
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        self.poller.interval()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Whether the latest snapshot enables `action`. Unknown until the first poll.
    pub fn is_enabled(&self, action: &str) -> bool {
        self.snapshot.as_ref().is_some_and(|s| s.allows(action))
    }

    fn touch(&mut self) {
        self.revision += 1;
    }

    fn set_banner(&mut self, recovery: Recovery, message: impl Into<String>) {
        self.banner = Some(StatusBanner {
            recovery,
            message: message.into(),
        });
        self.touch();
    }

    fn clear_banner_if(&mut self, recovery: Recovery) {
        if self.banner.as_ref().is_some_and(|b| b.recovery == recovery) {
            self.banner = None;
            self.touch();
        }
    }

    // ── Session ─────────────────────────────────────────────────────

    pub fn probe_session(&self) {
        let client = self.client.clone();
        let tx = self.bg_tx.clone();
        tokio::spawn(async move {
            let result = client.fetch_session().await;
            let _ = tx.send(BackgroundEvent::SessionProbed(result));
        });
    }

    pub fn login(&self, user: &str, password: &str) {
        let client = self.client.clone();
        let tx = self.bg_tx.clone();
        let user = user.to_string();
        let password = password.to_string();
        tokio::spawn(async move {
            let result = client.login(&user, &password).await.map(|grant| AuthSession {
                authenticated: true,
                user: if grant.user.is_empty() { user } else { grant.user },
            });
            let _ = tx.send(BackgroundEvent::LoginFinished(result));
        });
    }

    /// Local state is cleared right away; the backend is told best-effort.
    pub fn logout(&mut self) {
        let client = self.client.clone();
        tokio::spawn(async move {
            if let Err(e) = client.logout().await {
                debug!(error = %e, "Logout notification failed");
            }
        });
        self.client.clear_credential();
        self.guard.logged_out();
        self.stop_polling();
        self.detail = None;
        self.banner = None;
        self.touch();
    }

    fn start_polling(&mut self) {
        self.poll_token = Some(self.poller.start());
        self.refresh();
    }

    fn stop_polling(&mut self) {
        if let Some(token) = self.poll_token.take() {
            self.poller.stop(token);
        }
    }

    // ── Polling ─────────────────────────────────────────────────────

    /// Scheduled timer tick.
    pub fn tick(&mut self) {
        if !self.guard.is_authenticated() {
            return;
        }
        if let Some(ticket) = self.poller.begin_tick() {
            self.spawn_poll(ticket);
        }
    }

    /// Out-of-schedule poll, bypassing the input-focus gate.
    pub fn refresh(&mut self) {
        if !self.guard.is_authenticated() {
            return;
        }
        if let Some(ticket) = self.poller.force_tick() {
            self.spawn_poll(ticket);
        }
    }

    pub fn set_input_focused(&mut self, focused: bool) {
        self.poller.set_input_focused(focused);
        self.touch();
    }

    pub fn input_focused(&self) -> bool {
        self.poller.input_focused()
    }

    /// Pane whose detail the pane view should fetch next.
    fn detail_target(&self) -> Option<String> {
        let route = self.route_pane.as_ref()?;
        if self.selection.pane.is_empty() {
            Some(route.clone())
        } else {
            Some(self.selection.pane.clone())
        }
    }

    fn spawn_poll(&self, ticket: TickTicket) {
        let client = self.client.clone();
        let tx = self.bg_tx.clone();
        let detail_pane = self.detail_target();
        debug!(seq = ticket.seq, detail_pane = ?detail_pane, "Poll dispatched");
        tokio::spawn(async move {
            let (snapshot, detail) = match detail_pane {
                Some(pane_id) => {
                    let (snapshot, detail) =
                        tokio::join!(client.fetch_snapshot(), client.fetch_pane_detail(&pane_id));
                    (snapshot, Some((pane_id, detail)))
                }
                None => (client.fetch_snapshot().await, None),
            };
            let _ = tx.send(BackgroundEvent::PollCompleted {
                ticket,
                snapshot,
                detail,
            });
        });
    }

    // ── Event application ───────────────────────────────────────────

    pub fn handle_background_event(&mut self, event: BackgroundEvent) {
        match event {
            BackgroundEvent::SessionProbed(result) => {
                self.guard.resolve_probe(result);
                self.touch();
                if self.guard.is_authenticated() {
                    self.start_polling();
                }
            }
            BackgroundEvent::LoginFinished(Ok(session)) => {
                self.guard.login_succeeded(session.user);
                self.banner = None;
                self.touch();
                self.start_polling();
            }
            BackgroundEvent::LoginFinished(Err(e)) => {
                warn!(error = %e, "Login failed");
                self.guard.login_failed();
                self.set_banner(Recovery::ActionMessage, e.to_string());
            }
            BackgroundEvent::PollCompleted {
                ticket,
                snapshot,
                detail,
            } => {
                if !self.poller.accept(ticket) {
                    return;
                }
                match snapshot {
                    Ok(snapshot) => self.apply_snapshot(snapshot, detail),
                    Err(e) => self.apply_error(e),
                }
            }
            BackgroundEvent::ActionFinished { action, result } => {
                let refresh = self.dispatcher.finish(&result);
                match result {
                    Ok(outcome) => {
                        self.last_action = Some((action, outcome));
                        self.touch();
                    }
                    Err(e) => self.apply_error(e),
                }
                if refresh {
                    self.refresh();
                }
            }
        }
    }

    /// Route a classified failure to its recovery path.
    fn apply_error(&mut self, err: DashboardError) {
        match err.recovery() {
            Recovery::Reauthenticate => {
                self.guard.on_unauthorized();
                self.client.clear_credential();
                self.stop_polling();
                self.detail = None;
                self.set_banner(Recovery::Reauthenticate, "session expired, log in again");
            }
            recovery => {
                debug!(error = %err, ?recovery, "Surfacing error");
                self.set_banner(recovery, err.to_string());
            }
        }
    }

    fn apply_snapshot(
        &mut self,
        snapshot: Snapshot,
        detail: Option<(String, Result<PaneDetail, DashboardError>)>,
    ) {
        let next = reconcile::reconcile(&snapshot, &self.selection, self.route_pane.as_deref());
        if next != self.selection {
            info!(
                session = %next.session,
                window = %next.window,
                pane = %next.pane,
                "Selection changed"
            );
        }
        let changed = self.snapshot.as_ref() != Some(&snapshot) || next != self.selection;
        self.snapshot = Some(snapshot);
        self.selection = next;
        self.clear_banner_if(Recovery::TransientBanner);
        if changed {
            self.touch();
        }

        let Some((requested, result)) = detail else {
            return;
        };
        match result {
            Ok(detail) if detail.pane.id == self.selection.pane => {
                if self.detail.as_ref() != Some(&detail) {
                    self.detail = Some(detail);
                    self.touch();
                }
            }
            Err(DashboardError::Unauthorized) => self.apply_error(DashboardError::Unauthorized),
            Err(e) if requested == self.selection.pane => self.apply_error(e),
            _ => {
                // The requested pane is no longer the selected one (it
                // vanished or the operator moved on); fetch the new one now.
                debug!(requested, selected = %self.selection.pane, "Pane detail outdated");
                self.detail = None;
                self.touch();
                if requested != self.selection.pane && !self.selection.pane.is_empty() {
                    self.refresh();
                }
            }
        }
    }

    // ── Operator input ──────────────────────────────────────────────

    pub fn select_session(&mut self, name: &str) -> bool {
        let next = self
            .snapshot
            .as_ref()
            .and_then(|s| reconcile::select_session(s, name));
        self.apply_selection(next)
    }

    pub fn select_window(&mut self, window_id: &str) -> bool {
        let session = self.selection.session.clone();
        let next = self
            .snapshot
            .as_ref()
            .and_then(|s| reconcile::select_window(s, &session, window_id));
        self.apply_selection(next)
    }

    pub fn select_pane(&mut self, pane_id: &str) -> bool {
        let next = self
            .snapshot
            .as_ref()
            .and_then(|s| reconcile::select_pane(s, pane_id));
        self.apply_selection(next)
    }

    fn apply_selection(&mut self, next: Option<Selection>) -> bool {
        let Some(next) = next else {
            return false;
        };
        let pane_changed = next.pane != self.selection.pane;
        self.selection = next;
        self.touch();
        if pane_changed && self.route_pane.is_some() {
            // The pane view follows the operator's pick.
            self.route_pane = Some(self.selection.pane.clone()).filter(|p| !p.is_empty());
            self.detail = None;
            self.refresh();
        }
        true
    }

    fn target_context(&self) -> TargetContext {
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        TargetContext {
            detail_pane: self.detail.as_ref().and_then(|d| non_empty(&d.pane.id)),
            active_tab_pane: non_empty(&self.selection.pane),
            route_pane: self.route_pane.clone(),
            selected_window: non_empty(&self.selection.window),
            selected_session: non_empty(&self.selection.session),
        }
    }

    /// Dispatch an action. Local validation failures are returned (and shown)
    /// immediately; otherwise the request runs in the background and reports
    /// through [`BackgroundEvent::ActionFinished`].
    pub fn submit(&mut self, action: &str, payload: Map<String, Value>) -> Result<(), DashboardError> {
        if !self.guard.is_authenticated() {
            // Nothing was sent, so auth state and credential stay as they are.
            let err = DashboardError::NotAuthenticated;
            self.set_banner(Recovery::ActionMessage, err.to_string());
            return Err(err);
        }
        let ctx = self.target_context();
        let allowed = self.snapshot.as_ref().map(|s| &s.allowed_actions);
        let prepared = match self.dispatcher.prepare(action, payload, &ctx, allowed) {
            Ok(prepared) => prepared,
            Err(e) => {
                self.set_banner(Recovery::ActionMessage, e.to_string());
                return Err(e);
            }
        };
        if self.banner.is_some() {
            self.banner = None;
            self.touch();
        }

        let client = self.client.clone();
        let tx = self.bg_tx.clone();
        tokio::spawn(async move {
            let result = dispatch::execute(&client, &prepared).await;
            let _ = tx.send(BackgroundEvent::ActionFinished {
                action: prepared.action,
                result,
            });
        });
        Ok(())
    }

    /// Type text into the target pane (literal mode; empty text clears the line).
    pub fn send_text(&mut self, text: &str) -> Result<(), DashboardError> {
        let mut payload = Map::new();
        payload.insert("keys".into(), dispatch::literal_keys(text));
        self.submit("send_keys", payload)
    }

    pub fn send_named_keys(&mut self, keys: &[&str]) -> Result<(), DashboardError> {
        let mut payload = Map::new();
        payload.insert("keys".into(), dispatch::named_keys(keys));
        self.submit("send_keys", payload)
    }
}
