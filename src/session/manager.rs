//! Session lifecycle orchestration
//!
//! The manager owns the only write path into the session state machine and
//! the full login/logout sequences around it: credential exchange against the
//! issuer, vault and persisted-state bookkeeping, the per-session watchdog and
//! expiry poller, and the teardown ordering that makes logout idempotent.
//!
//! Every lifecycle operation runs under one async mutex, so the clear sequence
//! executes at most once per session no matter how many triggers race it.

use std::sync::{Arc, Weak};

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::{AuthApi, LoginRequest};
use crate::broadcast::ForcedLogoutBroadcaster;
use crate::config::SessionConfig;
use crate::errors::{AuthError, AuthResult, VaultError};
use crate::nav::NavigationHistory;
use crate::session::state::{Role, Session, SessionState, SessionStateStore};
use crate::store::{PersistedProfile, StateStore};
use crate::token;
use crate::vault::{BiometricGate, CredentialVault, SecretKind, SecretString, verify_bounded};
use crate::watchdog::{InactivityWatchdog, TimerState};

/// How the user is trying to log in.
#[derive(Debug)]
pub enum Credentials {
    /// Username and typed password.
    Password {
        /// Account identifier.
        username: String,
        /// The password.
        secret: SecretString,
    },
    /// Biometric unlock releasing the stored password for `username`.
    Biometric {
        /// Account whose stored credential to release.
        username: String,
    },
    /// Restore the persisted session from the last run, without contacting
    /// the issuer.
    Cached,
}

/// What a login attempt produced.
#[derive(Debug)]
pub enum LoginOutcome {
    /// A session is now live.
    LoggedIn(Session),
    /// Another login attempt is already in flight; this one was not started.
    AlreadyInProgress,
    /// A session was already live; this attempt was not started.
    AlreadyAuthenticated,
    /// Cached restore found nothing restorable. Not an error; the login
    /// screen simply stays up.
    NoCachedSession,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutReason {
    /// The user chose to log out.
    Explicit,
    /// The inactivity watchdog fired.
    Inactivity,
    /// The system demanded it (expired token, rejected request).
    Forced,
}

/// Session-scoped data caches cleared on every lifecycle boundary.
///
/// The application registers whatever holds per-user data here; the manager
/// clears it on login (so nothing from a previous user is visible) and again
/// on logout.
pub trait ScopeCache: Send + Sync {
    /// Drop all session-scoped data.
    fn clear(&self);
}

/// No-op cache for applications without session-scoped caches.
#[derive(Debug, Default)]
pub struct NoopCache;

impl ScopeCache for NoopCache {
    fn clear(&self) {}
}

/// Orchestrates the session lifecycle.
pub struct SessionManager {
    config: SessionConfig,
    state: SessionStateStore,
    api: Arc<dyn AuthApi>,
    vault: Arc<CredentialVault>,
    store: Arc<StateStore>,
    gate: Arc<dyn BiometricGate>,
    cache: Arc<dyn ScopeCache>,
    nav: Arc<NavigationHistory>,
    broadcaster: Arc<ForcedLogoutBroadcaster>,
    // Handed to spawned tasks so neither the watchdog nor the broadcaster
    // keeps the manager alive.
    weak: Weak<SessionManager>,
    // Serializes login and logout; the clear sequence is never re-entered.
    lifecycle: tokio::sync::Mutex<()>,
    watchdog: std::sync::Mutex<Option<InactivityWatchdog>>,
    poller: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("state", &self.state.current().is_authenticated())
            .field("vault_available", &self.vault.is_available())
            .finish()
    }
}

impl SessionManager {
    /// Build the manager and wire the forced-logout channel to it.
    ///
    /// The handler holds a `Weak` reference so the broadcaster (which outlives
    /// sessions and may be shared with the network layer) never keeps the
    /// manager alive.
    pub fn new(
        config: SessionConfig,
        api: Arc<dyn AuthApi>,
        vault: Arc<CredentialVault>,
        store: Arc<StateStore>,
        gate: Arc<dyn BiometricGate>,
        cache: Arc<dyn ScopeCache>,
    ) -> Arc<Self> {
        let broadcaster = Arc::new(ForcedLogoutBroadcaster::new(config.broadcast_grace));
        let manager = Arc::new_cyclic(|weak| Self {
            config,
            state: SessionStateStore::new(),
            api,
            vault,
            store,
            gate,
            cache,
            nav: Arc::new(NavigationHistory::new()),
            broadcaster,
            weak: weak.clone(),
            lifecycle: tokio::sync::Mutex::new(()),
            watchdog: std::sync::Mutex::new(None),
            poller: std::sync::Mutex::new(None),
        });

        let weak = Arc::downgrade(&manager);
        manager.broadcaster.set_logout_handler(move || {
            let weak = weak.clone();
            async move {
                if let Some(manager) = weak.upgrade() {
                    manager.logout(LogoutReason::Forced).await;
                }
            }
        });

        manager
    }

    /// Observable session state.
    pub fn state(&self) -> &SessionStateStore {
        &self.state
    }

    /// The forced-logout channel, for the network layer and UI subscribers.
    pub fn broadcaster(&self) -> &Arc<ForcedLogoutBroadcaster> {
        &self.broadcaster
    }

    /// The session-gated navigation history.
    pub fn navigation(&self) -> &Arc<NavigationHistory> {
        &self.nav
    }

    /// The current session's role, if authenticated. Projection only; the
    /// server remains authoritative for permissions.
    pub fn role(&self) -> Option<Role> {
        self.state.role()
    }

    /// Attempt a login.
    ///
    /// At most one attempt runs at a time; a second call while one is in
    /// flight reports [`LoginOutcome::AlreadyInProgress`] without touching
    /// the issuer. On any failure the state machine ends up
    /// [`SessionState::Unauthenticated`], never half-authenticated.
    pub async fn login(&self, credentials: Credentials) -> AuthResult<LoginOutcome> {
        match self.state.current() {
            SessionState::Authenticating | SessionState::LoggingOut => {
                return Ok(LoginOutcome::AlreadyInProgress);
            }
            SessionState::Authenticated(_) => return Ok(LoginOutcome::AlreadyAuthenticated),
            SessionState::Unauthenticated => {}
        }

        let _guard = self.lifecycle.lock().await;
        // Re-check under the lock; a racing login may have won.
        match self.state.current() {
            SessionState::Authenticating | SessionState::LoggingOut => {
                return Ok(LoginOutcome::AlreadyInProgress);
            }
            SessionState::Authenticated(_) => return Ok(LoginOutcome::AlreadyAuthenticated),
            SessionState::Unauthenticated => {}
        }

        self.state.set(SessionState::Authenticating);
        let result = match credentials {
            Credentials::Password { username, secret } => {
                self.password_login(username, secret, false).await
            }
            Credentials::Biometric { username } => self.biometric_login(username).await,
            Credentials::Cached => self.cached_login().await,
        };

        match result {
            Ok(LoginOutcome::LoggedIn(session)) => Ok(LoginOutcome::LoggedIn(session)),
            Ok(other) => {
                self.state.set(SessionState::Unauthenticated);
                Ok(other)
            }
            Err(err) => {
                // Fail closed: no partial session survives a failed attempt.
                self.state.set(SessionState::Unauthenticated);
                Err(err)
            }
        }
    }

    async fn password_login(
        &self,
        username: String,
        secret: SecretString,
        from_stored_secret: bool,
    ) -> AuthResult<LoginOutcome> {
        let device_id = match self.store.device_id().await {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "device id not persistable, using ephemeral id");
                uuid::Uuid::new_v4().to_string()
            }
        };
        let request = LoginRequest {
            identifier: username.clone(),
            secret: secret.expose().to_string(),
            device_id,
        };

        let response = match self.api.login(&request).await {
            Ok(response) => response,
            Err(AuthError::InvalidCredentials) if from_stored_secret => {
                // The issuer rejected a secret the vault released: the stored
                // credential is stale (password changed elsewhere). Evict it
                // so the next biometric attempt reports it missing instead of
                // failing the same way again.
                info!(username, "issuer rejected stored credential, evicting");
                if let Err(e) = self.vault.remove_secret(&username).await {
                    warn!(error = %e, "failed to evict stale credential");
                }
                return Err(AuthError::InvalidCredentials);
            }
            Err(err) => return Err(err),
        };

        let now = Utc::now();
        let session = Session {
            user_id: response.user.id,
            username: response.user.username.clone(),
            role: Role::parse(&response.user.role),
            access_token: response.token.clone(),
            refresh_token: response.refresh_token.clone(),
            token_issued_at: now,
            last_activity_at: now,
        };

        self.persist_session(&session).await?;
        self.finish_login(session.clone());
        Ok(LoginOutcome::LoggedIn(session))
    }

    async fn biometric_login(&self, username: String) -> AuthResult<LoginOutcome> {
        verify_bounded(
            self.gate.as_ref(),
            "Unlock your account",
            self.config.biometric_timeout,
        )
        .await?;

        let stored = match self.vault.get_secret(&username).await? {
            Some(stored) => stored,
            None => {
                if !self.vault.is_available() {
                    return Err(AuthError::VaultUnavailable);
                }
                // Either never enrolled or lazily expired; physically remove
                // whatever is there so the entry cannot resurface.
                if let Err(e) = self.vault.remove_secret(&username).await {
                    warn!(error = %e, "failed to remove expired credential");
                }
                return Err(AuthError::CredentialMissing(username));
            }
        };

        self.password_login(username, stored.secret, true).await
    }

    /// Restore the previous session from vault and store without contacting
    /// the issuer. Suppressed after an explicit logout, and after the
    /// persisted token has gone stale.
    async fn cached_login(&self) -> AuthResult<LoginOutcome> {
        if self.store.explicit_logout().await {
            debug!("last logout was explicit, skipping cached restore");
            return Ok(LoginOutcome::NoCachedSession);
        }

        let Some(profile) = self.store.profile().await else {
            return Ok(LoginOutcome::NoCachedSession);
        };
        let Some(access_token) = self.vault.session_token().await? else {
            return Ok(LoginOutcome::NoCachedSession);
        };

        let hint = self.store.token_expiry_hint().await;
        if token::is_stale(Some(access_token.expose()), hint.as_ref(), Utc::now()) {
            info!("persisted session token is stale, discarding cached session");
            if let Err(e) = self.vault.clear_session().await {
                warn!(error = %e, "failed to clear stale session tokens");
            }
            if let Err(e) = self.store.clear_session_keys().await {
                warn!(error = %e, "failed to clear stale session state");
            }
            return Ok(LoginOutcome::NoCachedSession);
        }

        let refresh_token = self.vault.refresh_token().await?;
        let session = Session {
            user_id: profile.user_id,
            username: profile.username,
            role: profile.role,
            access_token: access_token.expose().to_string(),
            refresh_token: refresh_token.map(|t| t.expose().to_string()),
            token_issued_at: profile.token_issued_at,
            last_activity_at: Utc::now(),
        };

        info!(username = session.username, "restored cached session");
        self.finish_login(session.clone());
        Ok(LoginOutcome::LoggedIn(session))
    }

    /// Persist the freshly issued session. Vault unavailability degrades to
    /// "will not survive a restart"; a real storage failure fails the login.
    async fn persist_session(&self, session: &Session) -> AuthResult<()> {
        match self
            .vault
            .store_session_tokens(&session.access_token, session.refresh_token.as_deref())
            .await
        {
            Ok(()) => {}
            Err(VaultError::Unavailable) => {
                debug!("no secure store, session will not survive a restart");
            }
            Err(err) => return Err(err.into()),
        }

        let profile = PersistedProfile {
            user_id: session.user_id,
            username: session.username.clone(),
            role: session.role,
            token_issued_at: session.token_issued_at,
        };
        let persisted = async {
            self.store.set_profile(&profile).await?;
            self.store.set_cached_username(&session.username).await?;
            self.store.set_explicit_logout(false).await
        }
        .await;

        if let Err(err) = persisted {
            // Fail closed, and do not leave tokens behind for a login that
            // never completed.
            if let Err(e) = self.vault.clear_session().await {
                warn!(error = %e, "failed to roll back session tokens");
            }
            return Err(err.into());
        }
        Ok(())
    }

    /// Final, infallible step of every successful login path: wipe
    /// session-scoped caches, flip the state machine, start the per-session
    /// tasks.
    fn finish_login(&self, session: Session) {
        self.cache.clear();
        let username = session.username.clone();
        self.state.set(SessionState::Authenticated(session));
        self.start_session_tasks();
        info!(username, "session established");
    }

    fn start_session_tasks(&self) {
        let weak = self.weak.clone();
        let watchdog = InactivityWatchdog::spawn(
            self.config.warning_timeout,
            self.config.logout_timeout,
            self.config.activity_throttle,
            move || async move {
                if let Some(manager) = weak.upgrade() {
                    manager.logout(LogoutReason::Inactivity).await;
                }
            },
        );
        *self.watchdog.lock().expect("watchdog slot poisoned") = Some(watchdog);

        let poller = token::spawn_poller(
            self.config.token_poll_interval,
            self.state.clone(),
            Arc::clone(&self.vault),
            Arc::clone(&self.store),
            Arc::clone(&self.broadcaster),
        );
        *self.poller.lock().expect("poller slot poisoned") = Some(poller);
    }

    /// End the session.
    ///
    /// Idempotent: with no live session this is a logged no-op. The clear
    /// sequence runs exactly once per session regardless of how many causes
    /// (explicit action, watchdog, forced trigger) race to end it, and it
    /// never fails visibly; individual cleanup failures are logged and the
    /// remaining steps still run.
    pub async fn logout(&self, reason: LogoutReason) {
        let _guard = self.lifecycle.lock().await;
        if !self.state.is_authenticated() {
            debug!(?reason, "logout with no live session, ignoring");
            return;
        }

        info!(?reason, "ending session");

        // Timers die before the state transition: no watchdog or poller can
        // ever observe a cleared session.
        let watchdog = self.watchdog.lock().expect("watchdog slot poisoned").take();
        if let Some(watchdog) = watchdog {
            watchdog.shutdown();
        }
        let poller = self.poller.lock().expect("poller slot poisoned").take();
        if let Some(poller) = poller {
            poller.abort();
        }

        self.state.set(SessionState::LoggingOut);

        if let Err(e) = self.vault.clear_session().await {
            warn!(error = %e, "failed to clear vault session entries");
        }
        if let Err(e) = self.store.clear_session_keys().await {
            warn!(error = %e, "failed to clear persisted session state");
        }
        if reason == LogoutReason::Explicit {
            if let Err(e) = self.store.set_explicit_logout(true).await {
                warn!(error = %e, "failed to record explicit logout");
            }
        }
        self.cache.clear();
        self.nav.clear();

        self.state.set(SessionState::Unauthenticated);
        // Exactly one emission per completed clear sequence.
        self.broadcaster.emit();
    }

    /// Store a credential for biometric release, replacing any previous one.
    ///
    /// When a different user than the previously cached one enrolls, the old
    /// user's credential is removed first so no account can release another's
    /// secret.
    pub async fn enroll_biometrics(
        &self,
        username: &str,
        kind: SecretKind,
        secret: &SecretString,
    ) -> AuthResult<()> {
        if !self.vault.is_available() {
            return Err(AuthError::VaultUnavailable);
        }

        if let Some(previous) = self.store.cached_username().await {
            if previous != username {
                info!(previous, username, "user switch, clearing previous credential");
                self.vault.remove_secret(&previous).await?;
            }
        }

        self.vault.set_secret(username, kind, secret).await?;
        self.store.set_cached_username(username).await?;
        Ok(())
    }

    /// Remove the stored credential for `username`.
    pub async fn revoke_biometrics(&self, username: &str) -> AuthResult<()> {
        self.vault.remove_secret(username).await?;
        Ok(())
    }

    /// Forward a user input event to the watchdog, if one is running.
    pub fn record_activity(&self) {
        if let Some(watchdog) = self.watchdog.lock().expect("watchdog slot poisoned").as_ref() {
            watchdog.record_activity();
        }
    }

    /// "Stay logged in" acknowledgment of the inactivity warning.
    pub fn acknowledge_inactivity_warning(&self) {
        if let Some(watchdog) = self.watchdog.lock().expect("watchdog slot poisoned").as_ref() {
            watchdog.acknowledge();
        }
    }

    /// Current watchdog timer state, `None` with no live session.
    pub fn timer_state(&self) -> Option<TimerState> {
        self.watchdog
            .lock()
            .expect("watchdog slot poisoned")
            .as_ref()
            .map(InactivityWatchdog::state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{LoginResponse, MockAuthApi, UserPayload};
    use crate::vault::{BiometricVerdict, MemorySecretStore, SecretBackend};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use uuid::Uuid;

    #[derive(Debug)]
    struct StubGate {
        verdict: BiometricVerdict,
    }

    #[async_trait]
    impl BiometricGate for StubGate {
        fn is_available(&self) -> bool {
            true
        }

        async fn verify(&self, _reason: &str) -> Result<BiometricVerdict, AuthError> {
            Ok(self.verdict)
        }
    }

    #[derive(Debug, Default)]
    struct CountingCache {
        clears: AtomicUsize,
    }

    impl ScopeCache for CountingCache {
        fn clear(&self) {
            self.clears.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn user_id() -> Uuid {
        Uuid::now_v7()
    }

    fn ok_response(id: Uuid) -> LoginResponse {
        LoginResponse {
            token: "opaque-token".to_string(),
            refresh_token: Some("refresh-token".to_string()),
            user: UserPayload {
                id,
                username: "alice".to_string(),
                role: "owner".to_string(),
            },
        }
    }

    struct Fixture {
        manager: Arc<SessionManager>,
        vault: Arc<CredentialVault>,
        store: Arc<StateStore>,
        cache: Arc<CountingCache>,
    }

    fn fixture_with(api: MockAuthApi, vault: CredentialVault) -> Fixture {
        let vault = Arc::new(vault);
        let store = Arc::new(StateStore::in_memory());
        let cache = Arc::new(CountingCache::default());
        let manager = SessionManager::new(
            SessionConfig::default(),
            Arc::new(api),
            Arc::clone(&vault),
            Arc::clone(&store),
            Arc::new(StubGate {
                verdict: BiometricVerdict::Confirmed,
            }),
            Arc::clone(&cache) as Arc<dyn ScopeCache>,
        );
        Fixture {
            manager,
            vault,
            store,
            cache,
        }
    }

    fn memory_vault() -> CredentialVault {
        CredentialVault::new(
            SecretBackend::Available(Arc::new(MemorySecretStore::new())),
            chrono::Duration::days(30),
            chrono::Duration::days(30),
        )
    }

    fn password_credentials() -> Credentials {
        Credentials::Password {
            username: "alice".to_string(),
            secret: SecretString::from("validpass123"),
        }
    }

    #[tokio::test]
    async fn password_login_establishes_a_session() {
        let mut api = MockAuthApi::new();
        let id = user_id();
        api.expect_login()
            .times(1)
            .returning(move |_| Ok(ok_response(id)));
        let fx = fixture_with(api, memory_vault());

        let outcome = fx.manager.login(password_credentials()).await.unwrap();
        let LoginOutcome::LoggedIn(session) = outcome else {
            panic!("expected a live session");
        };
        assert_eq!(session.user_id, id);
        assert_eq!(session.role, Role::Owner);

        assert!(fx.manager.state().is_authenticated());
        assert_eq!(fx.manager.role(), Some(Role::Owner));
        // Tokens persisted, profile cached, explicit flag cleared
        assert!(fx.vault.session_token().await.unwrap().is_some());
        assert!(fx.store.profile().await.is_some());
        assert!(!fx.store.explicit_logout().await);
        assert_eq!(fx.store.cached_username().await.as_deref(), Some("alice"));
        // Session-scoped caches wiped before the new session became visible
        assert_eq!(fx.cache.clears.load(Ordering::SeqCst), 1);
        // No credential entry without explicit enrollment
        assert!(fx.vault.get_secret("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn login_without_a_vault_still_works() {
        let mut api = MockAuthApi::new();
        let id = user_id();
        api.expect_login()
            .times(1)
            .returning(move |_| Ok(ok_response(id)));
        let vault = CredentialVault::new(
            SecretBackend::Unavailable,
            chrono::Duration::days(30),
            chrono::Duration::days(30),
        );
        let fx = fixture_with(api, vault);

        let outcome = fx.manager.login(password_credentials()).await.unwrap();
        assert!(matches!(outcome, LoginOutcome::LoggedIn(_)));
        assert!(fx.manager.state().is_authenticated());
        // Degraded: the session will not survive a restart
        assert!(fx.vault.session_token().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn store_write_failure_fails_the_login_closed() {
        let mut api = MockAuthApi::new();
        let id = user_id();
        api.expect_login()
            .times(1)
            .returning(move |_| Ok(ok_response(id)));

        // A file where a directory component should be makes every persist fail
        let dir = tempfile::TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        tokio::fs::write(&blocker, "x").await.unwrap();
        let store = StateStore::open(blocker.join("state.json")).await.unwrap();

        let vault = Arc::new(memory_vault());
        let cache = Arc::new(CountingCache::default());
        let manager = SessionManager::new(
            SessionConfig::default(),
            Arc::new(api),
            Arc::clone(&vault),
            Arc::new(store),
            Arc::new(StubGate {
                verdict: BiometricVerdict::Confirmed,
            }),
            Arc::clone(&cache) as Arc<dyn ScopeCache>,
        );

        let err = manager.login(password_credentials()).await.unwrap_err();
        assert!(matches!(err, AuthError::Storage(_)));
        assert!(!manager.state().is_authenticated());
        // Tokens written before the failure were rolled back
        assert!(vault.session_token().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rejected_login_fails_closed() {
        let mut api = MockAuthApi::new();
        api.expect_login()
            .times(1)
            .returning(|_| Err(AuthError::InvalidCredentials));
        let fx = fixture_with(api, memory_vault());

        let err = fx.manager.login(password_credentials()).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
        assert!(!fx.manager.state().is_authenticated());
        assert!(fx.vault.session_token().await.unwrap().is_none());
    }

    /// Issuer stub that takes two seconds to answer, to hold a login attempt
    /// in flight.
    #[derive(Debug)]
    struct SlowApi {
        id: Uuid,
    }

    #[async_trait]
    impl AuthApi for SlowApi {
        async fn login(&self, _request: &LoginRequest) -> AuthResult<LoginResponse> {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Ok(ok_response(self.id))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_login_reports_in_progress() {
        let id = user_id();
        let vault = Arc::new(memory_vault());
        let store = Arc::new(StateStore::in_memory());
        let cache = Arc::new(CountingCache::default());
        let fx = Fixture {
            manager: SessionManager::new(
                SessionConfig::default(),
                Arc::new(SlowApi { id }),
                Arc::clone(&vault),
                Arc::clone(&store),
                Arc::new(StubGate {
                    verdict: BiometricVerdict::Confirmed,
                }),
                Arc::clone(&cache) as Arc<dyn ScopeCache>,
            ),
            vault,
            store,
            cache,
        };

        let first = {
            let manager = Arc::clone(&fx.manager);
            tokio::spawn(async move { manager.login(password_credentials()).await })
        };
        tokio::task::yield_now().await;

        let second = fx.manager.login(password_credentials()).await.unwrap();
        assert!(matches!(second, LoginOutcome::AlreadyInProgress));

        tokio::time::advance(Duration::from_secs(3)).await;
        let first = first.await.unwrap().unwrap();
        assert!(matches!(first, LoginOutcome::LoggedIn(_)));

        let third = fx.manager.login(password_credentials()).await.unwrap();
        assert!(matches!(third, LoginOutcome::AlreadyAuthenticated));
    }

    #[tokio::test]
    async fn logout_clears_everything_once() {
        let mut api = MockAuthApi::new();
        let id = user_id();
        api.expect_login()
            .times(1)
            .returning(move |_| Ok(ok_response(id)));
        let fx = fixture_with(api, memory_vault());

        fx.manager.login(password_credentials()).await.unwrap();
        fx.manager.navigation().push(crate::nav::Frame::screen(crate::nav::Screen::Reports));
        let mut ended = fx.manager.broadcaster().subscribe();

        fx.manager.logout(LogoutReason::Explicit).await;
        fx.manager.logout(LogoutReason::Explicit).await;

        assert!(!fx.manager.state().is_authenticated());
        assert!(fx.vault.session_token().await.unwrap().is_none());
        assert!(fx.store.profile().await.is_none());
        assert!(fx.store.explicit_logout().await);
        assert!(fx.manager.navigation().is_empty());
        // One clear at login, one at logout; the second logout was a no-op
        assert_eq!(fx.cache.clears.load(Ordering::SeqCst), 2);
        // Exactly one session-ended emission
        assert!(ended.try_recv().is_ok());
        assert!(ended.try_recv().is_err());
    }

    #[tokio::test]
    async fn explicit_flag_survives_only_explicit_logout() {
        let mut api = MockAuthApi::new();
        let id = user_id();
        api.expect_login()
            .times(1)
            .returning(move |_| Ok(ok_response(id)));
        let fx = fixture_with(api, memory_vault());

        fx.manager.login(password_credentials()).await.unwrap();
        fx.manager.logout(LogoutReason::Forced).await;
        assert!(!fx.store.explicit_logout().await);
    }

    #[tokio::test]
    async fn biometric_login_releases_the_stored_secret() {
        let mut api = MockAuthApi::new();
        let id = user_id();
        api.expect_login()
            .times(1)
            .withf(|request| request.secret == "validpass123")
            .returning(move |_| Ok(ok_response(id)));
        let vault = memory_vault();
        let fx = fixture_with(api, vault);
        fx.vault
            .set_secret(
                "alice",
                SecretKind::Password,
                &SecretString::from("validpass123"),
            )
            .await
            .unwrap();

        let outcome = fx
            .manager
            .login(Credentials::Biometric {
                username: "alice".to_string(),
            })
            .await
            .unwrap();
        assert!(matches!(outcome, LoginOutcome::LoggedIn(_)));
    }

    #[tokio::test]
    async fn rejected_stored_secret_is_evicted() {
        let mut api = MockAuthApi::new();
        api.expect_login()
            .times(1)
            .returning(|_| Err(AuthError::InvalidCredentials));
        let fx = fixture_with(api, memory_vault());
        fx.vault
            .set_secret("alice", SecretKind::Password, &SecretString::from("oldpass"))
            .await
            .unwrap();

        let err = fx
            .manager
            .login(Credentials::Biometric {
                username: "alice".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
        // Stale credential no longer in the vault
        assert!(fx.vault.get_secret("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn biometric_login_without_enrollment_reports_missing() {
        let fx = fixture_with(MockAuthApi::new(), memory_vault());

        let err = fx
            .manager
            .login(Credentials::Biometric {
                username: "alice".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::CredentialMissing(_)));
    }

    #[tokio::test]
    async fn cached_restore_round_trips_without_the_issuer() {
        // First run: password login persists the session
        let mut api = MockAuthApi::new();
        let id = user_id();
        api.expect_login()
            .times(1)
            .returning(move |_| Ok(ok_response(id)));
        let fx = fixture_with(api, memory_vault());
        fx.manager.login(password_credentials()).await.unwrap();

        // Second run: new manager over the same vault and store, issuer
        // never contacted
        let manager = SessionManager::new(
            SessionConfig::default(),
            Arc::new(MockAuthApi::new()),
            Arc::clone(&fx.vault),
            Arc::clone(&fx.store),
            Arc::new(StubGate {
                verdict: BiometricVerdict::Confirmed,
            }),
            Arc::new(NoopCache),
        );
        let outcome = manager.login(Credentials::Cached).await.unwrap();
        let LoginOutcome::LoggedIn(session) = outcome else {
            panic!("expected cached restore");
        };
        assert_eq!(session.user_id, id);
        assert_eq!(session.access_token, "opaque-token");
    }

    #[tokio::test]
    async fn explicit_logout_suppresses_cached_restore() {
        let mut api = MockAuthApi::new();
        let id = user_id();
        api.expect_login()
            .times(1)
            .returning(move |_| Ok(ok_response(id)));
        let fx = fixture_with(api, memory_vault());
        fx.manager.login(password_credentials()).await.unwrap();
        fx.manager.logout(LogoutReason::Explicit).await;

        let outcome = fx.manager.login(Credentials::Cached).await.unwrap();
        assert!(matches!(outcome, LoginOutcome::NoCachedSession));
    }

    #[tokio::test]
    async fn forced_trigger_ends_the_session() {
        let mut api = MockAuthApi::new();
        let id = user_id();
        api.expect_login()
            .times(1)
            .returning(move |_| Ok(ok_response(id)));
        let fx = fixture_with(api, memory_vault());
        fx.manager.login(password_credentials()).await.unwrap();

        fx.manager.broadcaster().trigger().await;

        assert!(!fx.manager.state().is_authenticated());
        assert!(fx.vault.session_token().await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn inactivity_ends_the_session() {
        let mut api = MockAuthApi::new();
        let id = user_id();
        api.expect_login()
            .times(1)
            .returning(move |_| Ok(ok_response(id)));
        let fx = fixture_with(api, memory_vault());
        fx.manager.login(password_credentials()).await.unwrap();
        assert!(fx.manager.timer_state().is_some());

        tokio::time::sleep(SessionConfig::default().logout_timeout + Duration::from_secs(2)).await;
        // Let the spawned logout run
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert!(!fx.manager.state().is_authenticated());
        assert!(fx.manager.timer_state().is_none());
    }

    #[tokio::test]
    async fn enrollment_clears_the_previous_users_credential() {
        let fx = fixture_with(MockAuthApi::new(), memory_vault());

        fx.manager
            .enroll_biometrics("alice", SecretKind::Password, &SecretString::from("pw-a"))
            .await
            .unwrap();
        fx.manager
            .enroll_biometrics("bob", SecretKind::Password, &SecretString::from("pw-b"))
            .await
            .unwrap();

        assert!(fx.vault.get_secret("alice").await.unwrap().is_none());
        assert_eq!(
            fx.vault
                .get_secret("bob")
                .await
                .unwrap()
                .unwrap()
                .secret
                .expose(),
            "pw-b"
        );
        assert_eq!(fx.store.cached_username().await.as_deref(), Some("bob"));
    }

    #[tokio::test]
    async fn enrollment_without_a_vault_fails_softly() {
        let vault = CredentialVault::new(
            SecretBackend::Unavailable,
            chrono::Duration::days(30),
            chrono::Duration::days(30),
        );
        let fx = fixture_with(MockAuthApi::new(), vault);

        let err = fx
            .manager
            .enroll_biometrics("alice", SecretKind::Password, &SecretString::from("pw"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::VaultUnavailable));
    }
}
