//! Authentication endpoint client
//!
//! The issuer is an external collaborator; this module owns the request/
//! response shapes the core depends on and classifies every transport outcome
//! into the error taxonomy exactly once. Nothing above this layer ever sees a
//! raw status code or reqwest error.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use crate::broadcast::{
    ForcedLogoutBroadcaster, response_demands_logout, transport_error_demands_logout,
};
use crate::errors::{AuthError, AuthResult};

/// Credentials as the issuer expects them.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    /// Username or other account identifier.
    pub identifier: String,
    /// Password or released vault secret.
    pub secret: String,
    /// Stable per-install device id.
    pub device_id: String,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("identifier", &self.identifier)
            .field("secret", &"[REDACTED]")
            .field("device_id", &self.device_id)
            .finish()
    }
}

/// The authenticated user as reported by the issuer.
#[derive(Debug, Clone, Deserialize)]
pub struct UserPayload {
    /// Stable user id.
    pub id: Uuid,
    /// Username.
    pub username: String,
    /// Role string, mapped onto [`crate::session::Role`].
    pub role: String,
}

/// Successful issuer response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    /// Bearer token for subsequent requests.
    pub token: String,
    /// Refresh token; the issuer may omit it.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// The authenticated user.
    pub user: UserPayload,
}

/// Issuer port. The session manager depends on this seam, not on transport.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Exchange credentials for a session token.
    async fn login(&self, request: &LoginRequest) -> AuthResult<LoginResponse>;
}

/// reqwest-backed issuer client.
#[derive(Debug, Clone)]
pub struct HttpAuthClient {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpAuthClient {
    /// Client against the given issuer base URL.
    pub fn new(base_url: Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    fn login_url(&self) -> AuthResult<Url> {
        self.base_url
            .join("auth/login")
            .map_err(|e| AuthError::Internal(format!("invalid issuer base URL: {e}")))
    }
}

#[async_trait]
impl AuthApi for HttpAuthClient {
    async fn login(&self, request: &LoginRequest) -> AuthResult<LoginResponse> {
        let url = self.login_url()?;
        let response = self
            .http
            .post(url.clone())
            .json(request)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e))?;

        let status = response.status();
        match status.as_u16() {
            200 => response
                .json::<LoginResponse>()
                .await
                .map_err(|e| AuthError::Internal(format!("malformed issuer response: {e}"))),
            400 | 401 | 403 | 422 => {
                debug!(%status, "issuer rejected credentials");
                Err(AuthError::InvalidCredentials)
            }
            500..=599 => {
                warn!(%status, "issuer unavailable");
                Err(AuthError::NetworkUnavailable(format!(
                    "issuer returned {status}"
                )))
            }
            _ => Err(AuthError::Internal(format!(
                "unexpected issuer status {status}"
            ))),
        }
    }
}

/// Classify a reqwest failure into the taxonomy. Timeouts and connection
/// failures preserve the session; everything else is internal.
pub fn classify_transport_error(err: &reqwest::Error) -> AuthError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        AuthError::NetworkUnavailable(err.to_string())
    } else {
        AuthError::Internal(err.to_string())
    }
}

/// Observed outcome of an arbitrary (non-issuer) API request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireOutcome {
    /// The server answered with this status.
    Status(u16),
    /// The request failed without a status, e.g. a gateway stripping headers
    /// off an auth rejection.
    TransportError,
}

/// Network-interceptor hook: route session-terminating responses into the
/// forced-logout broadcaster.
///
/// Returns whether a forced logout was requested, so the caller can swallow
/// the original error instead of surfacing it.
pub async fn enforce_session_policy(
    broadcaster: &ForcedLogoutBroadcaster,
    outcome: WireOutcome,
    url: &Url,
) -> bool {
    let demands = match outcome {
        WireOutcome::Status(status) => response_demands_logout(status, url.path()),
        WireOutcome::TransportError => transport_error_demands_logout(url),
    };
    if demands {
        debug!(%url, ?outcome, "response classified as session-terminating");
        broadcaster.trigger().await;
    }
    demands
}
