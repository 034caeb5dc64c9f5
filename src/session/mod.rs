//! Session state machine and lifecycle orchestration.

mod manager;
mod state;

pub use manager::{
    Credentials, LoginOutcome, LogoutReason, NoopCache, ScopeCache, SessionManager,
};
pub use state::{Role, Session, SessionState, SessionStateStore};
