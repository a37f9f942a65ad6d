use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

/// Everything that can go wrong between the operator and the backend.
///
/// `Unauthorized`, `Network` and `ActionRejected` come out of the classifier
/// for collaborator responses; the remaining variants are raised locally
/// before any request is made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DashboardError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("network error: {0}")]
    Network(String),
    #[error("{0}")]
    ActionRejected(String),
    #[error("{action}: target is unavailable")]
    MissingTarget { action: String },
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),
    #[error("another action is still running")]
    Busy,
    #[error("action '{0}' is disabled")]
    ActionDisabled(String),
    #[error("not logged in")]
    NotAuthenticated,
}

/// How the controller recovers from a given error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Credential is gone; drop auth state and ask for a fresh login.
    Reauthenticate,
    /// Show a banner and let the next scheduled poll retry.
    TransientBanner,
    /// Show the message for the action that failed. No retry.
    ActionMessage,
}

impl DashboardError {
    pub fn recovery(&self) -> Recovery {
        match self {
            DashboardError::Unauthorized => Recovery::Reauthenticate,
            DashboardError::Network(_) => Recovery::TransientBanner,
            DashboardError::ActionRejected(_)
            | DashboardError::MissingTarget { .. }
            | DashboardError::InvalidCredentials(_)
            | DashboardError::Busy
            | DashboardError::ActionDisabled(_)
            | DashboardError::NotAuthenticated => Recovery::ActionMessage,
        }
    }

    /// True when the error was produced without touching the network.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            DashboardError::MissingTarget { .. }
                | DashboardError::Busy
                | DashboardError::ActionDisabled(_)
                | DashboardError::NotAuthenticated
        )
    }
}

/// Classify a completed HTTP exchange. Returns `None` for 2xx.
pub fn classify_status(status: StatusCode, body: &[u8]) -> Option<DashboardError> {
    if status.is_success() {
        return None;
    }
    if status == StatusCode::UNAUTHORIZED {
        return Some(DashboardError::Unauthorized);
    }
    let parsed = serde_json::from_slice::<Value>(body).ok();
    Some(DashboardError::ActionRejected(rejection_message(
        status,
        parsed.as_ref(),
    )))
}

/// Transport-level failures (connect, timeout, unreadable body) are all `Network`.
pub fn classify_transport(err: &reqwest::Error) -> DashboardError {
    if err.is_timeout() {
        DashboardError::Network("request timed out".into())
    } else if err.is_connect() {
        DashboardError::Network("backend unreachable".into())
    } else {
        DashboardError::Network(err.to_string())
    }
}

/// First non-blank of stderr, error and stdout, trimmed.
pub fn preferred_message(stderr: &str, error: &str, stdout: &str) -> Option<String> {
    [stderr, error, stdout]
        .into_iter()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// Most specific message in an error payload: stderr, then error, then stdout.
pub fn rejection_message(status: StatusCode, body: Option<&Value>) -> String {
    let field = |key: &str| {
        body.and_then(|b| b.get(key))
            .and_then(Value::as_str)
            .unwrap_or("")
    };
    preferred_message(field("stderr"), field("error"), field("stdout"))
        .unwrap_or_else(|| format!("request failed: {}", status.as_u16()))
}
