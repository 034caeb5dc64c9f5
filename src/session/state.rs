//! Session state machine
//!
//! One enum, one watch channel. Every other component reads authentication
//! truth from here; only the session manager writes it, which the crate
//! enforces by keeping the transition methods `pub(crate)`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

/// Coarse role the UI gates feature access on.
///
/// Anything the issuer reports that is not an owner-level role maps to
/// [`Role::Staff`]; the server stays authoritative for actual permissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Business owner: full feature surface.
    Owner,
    /// Staff member: restricted feature surface.
    Staff,
}

impl Role {
    /// Map the issuer's role string onto the two-role model.
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "owner" | "business_owner" | "admin" => Role::Owner,
            _ => Role::Staff,
        }
    }
}

/// An authenticated session.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    /// Authenticated user id.
    pub user_id: Uuid,
    /// Username, also the vault credential key.
    pub username: String,
    /// Role at login.
    pub role: Role,
    /// Current bearer token.
    pub access_token: String,
    /// Refresh token, when the issuer granted one.
    pub refresh_token: Option<String>,
    /// When the bearer token was issued.
    pub token_issued_at: DateTime<Utc>,
    /// When this session was established or restored. The live activity
    /// stamp belongs to the watchdog's timer state, not this snapshot.
    pub last_activity_at: DateTime<Utc>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("username", &self.username)
            .field("role", &self.role)
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("token_issued_at", &self.token_issued_at)
            .field("last_activity_at", &self.last_activity_at)
            .finish()
    }
}

/// The four phases of the session lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No session; the login screen owns the UI.
    #[default]
    Unauthenticated,
    /// A login attempt is in flight.
    Authenticating,
    /// A live session.
    Authenticated(Session),
    /// Logout side effects are running; treated as unauthenticated by every
    /// read, it exists so the clear sequence is never re-entered.
    LoggingOut,
}

impl SessionState {
    /// The live session, if any.
    pub fn session(&self) -> Option<&Session> {
        match self {
            SessionState::Authenticated(session) => Some(session),
            _ => None,
        }
    }

    /// Whether this state carries a live session.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated(_))
    }
}

/// Shared, observable session state.
///
/// Cheap to clone; all clones observe the same channel.
#[derive(Debug, Clone)]
pub struct SessionStateStore {
    tx: std::sync::Arc<watch::Sender<SessionState>>,
    rx: watch::Receiver<SessionState>,
}

impl Default for SessionStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStateStore {
    /// Fresh store in [`SessionState::Unauthenticated`].
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(SessionState::default());
        Self {
            tx: std::sync::Arc::new(tx),
            rx,
        }
    }

    /// Snapshot of the current state.
    pub fn current(&self) -> SessionState {
        self.rx.borrow().clone()
    }

    /// Whether a session is currently live.
    pub fn is_authenticated(&self) -> bool {
        self.rx.borrow().is_authenticated()
    }

    /// The current bearer token, if authenticated.
    pub fn access_token(&self) -> Option<String> {
        self.rx.borrow().session().map(|s| s.access_token.clone())
    }

    /// The current session's role, if authenticated. Pure projection; gating
    /// decisions stay server-authoritative.
    pub fn role(&self) -> Option<Role> {
        self.rx.borrow().session().map(|s| s.role)
    }

    /// Subscribe to state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.rx.clone()
    }

    pub(crate) fn set(&self, state: SessionState) {
        debug!(to = state_name(&state), "session state transition");
        self.tx.send_replace(state);
    }
}

fn state_name(state: &SessionState) -> &'static str {
    match state {
        SessionState::Unauthenticated => "unauthenticated",
        SessionState::Authenticating => "authenticating",
        SessionState::Authenticated(_) => "authenticated",
        SessionState::LoggingOut => "logging_out",
    }
}
