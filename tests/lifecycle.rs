//! End-to-end session lifecycle over the public surface: a stub issuer, an
//! in-memory secure store, and a real on-disk state file.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use tempfile::TempDir;
use uuid::Uuid;

use aegis_session::api::{AuthApi, LoginRequest, LoginResponse, UserPayload, WireOutcome};
use aegis_session::vault::{BiometricVerdict, MemorySecretStore, SecretBackend};
use aegis_session::{
    AuthError, AuthResult, BiometricGate, CredentialVault, Credentials, LoginOutcome,
    LogoutReason, Role, SessionConfig, SessionManager, SessionState, StateStore,
    session::NoopCache,
};

/// Unsigned JWT carrying the given expiry; the core never checks signatures.
fn token_expiring_at(exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&serde_json::json!({ "exp": exp })).unwrap());
    format!("{header}.{payload}.c2lnbmF0dXJl")
}

#[derive(Debug)]
struct StubIssuer {
    user_id: Uuid,
    token: String,
    calls: AtomicUsize,
}

impl StubIssuer {
    fn new(token: String) -> Self {
        Self {
            user_id: Uuid::now_v7(),
            token,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl AuthApi for StubIssuer {
    async fn login(&self, request: &LoginRequest) -> AuthResult<LoginResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if request.secret != "validpass123" {
            return Err(AuthError::InvalidCredentials);
        }
        Ok(LoginResponse {
            token: self.token.clone(),
            refresh_token: None,
            user: UserPayload {
                id: self.user_id,
                username: request.identifier.clone(),
                role: "staff".to_string(),
            },
        })
    }
}

#[derive(Debug)]
struct AlwaysConfirmGate;

#[async_trait]
impl BiometricGate for AlwaysConfirmGate {
    fn is_available(&self) -> bool {
        true
    }

    async fn verify(&self, _reason: &str) -> Result<BiometricVerdict, AuthError> {
        Ok(BiometricVerdict::Confirmed)
    }
}

fn manager_over(
    issuer: Arc<StubIssuer>,
    vault: Arc<CredentialVault>,
    store: Arc<StateStore>,
) -> Arc<SessionManager> {
    SessionManager::new(
        SessionConfig::default(),
        issuer,
        vault,
        store,
        Arc::new(AlwaysConfirmGate),
        Arc::new(NoopCache),
    )
}

fn memory_vault() -> Arc<CredentialVault> {
    Arc::new(CredentialVault::new(
        SecretBackend::Available(Arc::new(MemorySecretStore::new())),
        chrono::Duration::days(30),
        chrono::Duration::days(30),
    ))
}

fn password() -> Credentials {
    Credentials::Password {
        username: "alice".to_string(),
        secret: "validpass123".into(),
    }
}

#[tokio::test]
async fn session_survives_a_restart_but_not_an_explicit_logout() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.json");
    let issuer = Arc::new(StubIssuer::new(token_expiring_at(
        chrono::Utc::now().timestamp() + 3600,
    )));
    let vault = memory_vault();

    // First run: password login
    {
        let store = Arc::new(StateStore::open(path.clone()).await.unwrap());
        let manager = manager_over(Arc::clone(&issuer), Arc::clone(&vault), store);
        let outcome = manager.login(password()).await.unwrap();
        assert!(matches!(outcome, LoginOutcome::LoggedIn(_)));
        assert_eq!(manager.role(), Some(Role::Staff));
    }

    // Second run: cached restore, no issuer round trip
    {
        let store = Arc::new(StateStore::open(path.clone()).await.unwrap());
        let manager = manager_over(Arc::clone(&issuer), Arc::clone(&vault), store);
        let outcome = manager.login(Credentials::Cached).await.unwrap();
        let LoginOutcome::LoggedIn(session) = outcome else {
            panic!("expected cached restore, got {outcome:?}");
        };
        assert_eq!(session.username, "alice");
        assert_eq!(issuer.calls.load(Ordering::SeqCst), 1);

        manager.logout(LogoutReason::Explicit).await;
    }

    // Third run: the explicit logout suppresses restore
    {
        let store = Arc::new(StateStore::open(path).await.unwrap());
        let manager = manager_over(issuer, vault, store);
        let outcome = manager.login(Credentials::Cached).await.unwrap();
        assert!(matches!(outcome, LoginOutcome::NoCachedSession));
    }
}

#[tokio::test(start_paused = true)]
async fn expired_token_forces_a_logout() {
    // The issuer hands out a token whose expiry has already passed; the
    // monitor notices on its first poll and ends the session.
    let now = chrono::Utc::now().timestamp();
    let issuer = Arc::new(StubIssuer::new(token_expiring_at(now)));
    let store = Arc::new(StateStore::in_memory());
    let manager = manager_over(issuer, memory_vault(), store);

    manager.login(password()).await.unwrap();
    let mut ended = manager.broadcaster().subscribe();
    assert!(manager.state().is_authenticated());

    tokio::time::sleep(Duration::from_secs(2)).await;
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }

    assert!(!manager.state().is_authenticated());
    assert!(ended.try_recv().is_ok());
}

#[tokio::test(start_paused = true)]
async fn rejected_requests_force_one_deduplicated_logout() {
    let issuer = Arc::new(StubIssuer::new(token_expiring_at(
        chrono::Utc::now().timestamp() + 3600,
    )));
    let store = Arc::new(StateStore::in_memory());
    let manager = manager_over(issuer, memory_vault(), store);

    manager.login(password()).await.unwrap();
    let mut ended = manager.broadcaster().subscribe();

    // A burst of concurrent requests all coming back 401
    let url = url::Url::parse("https://api.example.com/v1/orders").unwrap();
    for _ in 0..5 {
        aegis_session::api::enforce_session_policy(
            manager.broadcaster(),
            WireOutcome::Status(401),
            &url,
        )
        .await;
    }
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }

    assert!(!manager.state().is_authenticated());
    // The clear sequence ran once: one session-ended emission
    assert!(ended.try_recv().is_ok());
    assert!(ended.try_recv().is_err());
}

#[tokio::test]
async fn biometric_enrollment_releases_on_next_login() {
    let issuer = Arc::new(StubIssuer::new(token_expiring_at(
        chrono::Utc::now().timestamp() + 3600,
    )));
    let vault = memory_vault();
    let store = Arc::new(StateStore::in_memory());
    let manager = manager_over(Arc::clone(&issuer), Arc::clone(&vault), store);

    manager.login(password()).await.unwrap();
    manager
        .enroll_biometrics(
            "alice",
            aegis_session::SecretKind::Password,
            &"validpass123".into(),
        )
        .await
        .unwrap();
    manager.logout(LogoutReason::Explicit).await;

    let outcome = manager
        .login(Credentials::Biometric {
            username: "alice".to_string(),
        })
        .await
        .unwrap();
    assert!(matches!(outcome, LoginOutcome::LoggedIn(_)));
    assert_eq!(issuer.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn wrong_password_leaves_the_machine_unauthenticated() {
    let issuer = Arc::new(StubIssuer::new(token_expiring_at(
        chrono::Utc::now().timestamp() + 3600,
    )));
    let store = Arc::new(StateStore::in_memory());
    let manager = manager_over(issuer, memory_vault(), store);

    let err = manager
        .login(Credentials::Password {
            username: "alice".to_string(),
            secret: "wrong".into(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials));
    assert_eq!(manager.state().current(), SessionState::Unauthenticated);
}
