//! Session and security lifecycle core for a business-facing client app.
//!
//! Everything that decides whether a user *is* logged in, *stays* logged in,
//! and what survives the end of a session lives in this crate:
//!
//! - [`session`]: the authentication state machine and the
//!   [`SessionManager`](session::SessionManager) orchestrating login, logout,
//!   and cached-session restore
//! - [`watchdog`]: the two-stage inactivity timer (warning, then forced end)
//! - [`token`]: bearer-token expiry detection and the per-session poll loop
//! - [`broadcast`]: the single channel every system-initiated logout funnels
//!   through, deduplicated and observable
//! - [`vault`]: biometric-released credentials and session tokens in the
//!   platform secure store
//! - [`store`]: plain persisted state (cached username, explicit-logout flag,
//!   expiry hints, session profile)
//! - [`nav`]: the session-gated navigation back-stack
//! - [`api`]: the issuer client and response classification
//!
//! The crate is UI-free: it exposes watch channels and a broadcast channel
//! for whatever shell (mobile, web, desktop) sits on top.

pub mod api;
pub mod broadcast;
pub mod config;
pub mod errors;
pub mod nav;
pub mod session;
pub mod store;
pub mod timeout;
pub mod token;
pub mod vault;
pub mod watchdog;

pub use api::{AuthApi, HttpAuthClient};
pub use broadcast::ForcedLogoutBroadcaster;
pub use config::SessionConfig;
pub use errors::{AuthError, AuthResult, StorageError, VaultError};
pub use nav::{BackAction, Frame, NavigationHistory, Screen, Tab};
pub use session::{
    Credentials, LoginOutcome, LogoutReason, Role, ScopeCache, Session, SessionManager,
    SessionState, SessionStateStore,
};
pub use store::StateStore;
pub use vault::{BiometricGate, BiometricVerdict, CredentialVault, SecretKind, SecretString};
pub use watchdog::{InactivityWatchdog, TimerState};
