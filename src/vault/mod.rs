//! Biometric-backed credential vault
//!
//! Wraps the platform's encrypted keyed store behind a capability-typed
//! backend. Two kinds of state live here and nowhere else: per-username
//! secrets (password or transaction PIN, each with a 30-day max age enforced
//! lazily on read) and the session-scoped token entries cleared on every
//! logout.
//!
//! Vault unavailability is a normal, expected condition: reads report absent,
//! writes fail with [`VaultError::Unavailable`], and callers degrade the
//! biometric/remember-me features instead of surfacing an error.

mod biometric;
mod secret;
mod store;

pub use biometric::{BiometricGate, BiometricVerdict, verify_bounded};
pub use secret::SecretString;
pub use store::{MemorySecretStore, SecretBackend, SecretStore, VaultRecord};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::VaultError;

const ACCESS_TOKEN_KEY: &str = "session.access_token";
const REFRESH_TOKEN_KEY: &str = "session.refresh_token";
const CREDENTIAL_PREFIX: &str = "credential.";

/// What kind of secret a credential entry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretKind {
    /// Account password, released by biometric unlock.
    Password,
    /// Transaction PIN.
    TransactionPin,
}

/// A per-username secret read back from the vault.
#[derive(Debug, Clone)]
pub struct StoredSecret {
    /// Username the secret belongs to.
    pub username: String,
    /// Password or PIN.
    pub kind: SecretKind,
    /// The secret itself.
    pub secret: SecretString,
    /// When the secret was written.
    pub stored_at: DateTime<Utc>,
}

/// On-disk shape of a credential entry. The timestamp lives on the
/// surrounding [`VaultRecord`].
#[derive(Debug, Serialize, Deserialize)]
struct CredentialPayload {
    kind: SecretKind,
    secret: String,
}

/// Capability-gated wrapper over the platform secure store.
#[derive(Debug, Clone)]
pub struct CredentialVault {
    backend: SecretBackend,
    password_max_age: chrono::Duration,
    pin_max_age: chrono::Duration,
}

impl CredentialVault {
    /// Build a vault over the given backend with per-kind max ages.
    pub fn new(
        backend: SecretBackend,
        password_max_age: chrono::Duration,
        pin_max_age: chrono::Duration,
    ) -> Self {
        Self {
            backend,
            password_max_age,
            pin_max_age,
        }
    }

    /// Whether the platform exposes a secure store.
    pub fn is_available(&self) -> bool {
        self.backend.is_available()
    }

    fn credential_key(username: &str) -> String {
        format!("{CREDENTIAL_PREFIX}{username}")
    }

    fn max_age(&self, kind: SecretKind) -> chrono::Duration {
        match kind {
            SecretKind::Password => self.password_max_age,
            SecretKind::TransactionPin => self.pin_max_age,
        }
    }

    /// Store a secret for `username`, replacing any existing entry.
    pub async fn set_secret(
        &self,
        username: &str,
        kind: SecretKind,
        secret: &SecretString,
    ) -> Result<(), VaultError> {
        let SecretBackend::Available(store) = &self.backend else {
            return Err(VaultError::Unavailable);
        };

        let payload = CredentialPayload {
            kind,
            secret: secret.expose().to_string(),
        };
        let record = VaultRecord {
            value: serde_json::to_string(&payload)
                .map_err(|e| VaultError::Backend(e.to_string()))?,
            stored_at: Utc::now(),
        };
        store.write(&Self::credential_key(username), record).await?;
        debug!(username, ?kind, "stored credential");
        Ok(())
    }

    /// Read the secret for `username`.
    ///
    /// A secret older than its kind's max age is reported absent even though
    /// it is physically still present (lazy expiry); the caller is expected to
    /// issue [`CredentialVault::remove_secret`] once it observes that.
    pub async fn get_secret(&self, username: &str) -> Result<Option<StoredSecret>, VaultError> {
        let SecretBackend::Available(store) = &self.backend else {
            return Ok(None);
        };

        let key = Self::credential_key(username);
        let Some(record) = store.read(&key).await? else {
            return Ok(None);
        };
        let payload: CredentialPayload = serde_json::from_str(&record.value)
            .map_err(|_| VaultError::CorruptedRecord(key))?;

        let age = Utc::now().signed_duration_since(record.stored_at);
        if age > self.max_age(payload.kind) {
            warn!(
                username,
                kind = ?payload.kind,
                age_days = age.num_days(),
                "stored secret exceeded its max age, treating as absent"
            );
            return Ok(None);
        }

        Ok(Some(StoredSecret {
            username: username.to_string(),
            kind: payload.kind,
            secret: SecretString::new(payload.secret),
            stored_at: record.stored_at,
        }))
    }

    /// Remove the secret for `username`. Absent entries are not an error.
    pub async fn remove_secret(&self, username: &str) -> Result<(), VaultError> {
        let SecretBackend::Available(store) = &self.backend else {
            return Ok(());
        };
        store.remove(&Self::credential_key(username)).await?;
        debug!(username, "removed credential");
        Ok(())
    }

    /// Persist the session tokens.
    ///
    /// With no secure store this fails with [`VaultError::Unavailable`]; the
    /// session manager treats that as "session will not survive a restart"
    /// and continues.
    pub async fn store_session_tokens(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> Result<(), VaultError> {
        let SecretBackend::Available(store) = &self.backend else {
            return Err(VaultError::Unavailable);
        };

        store
            .write(
                ACCESS_TOKEN_KEY,
                VaultRecord {
                    value: access_token.to_string(),
                    stored_at: Utc::now(),
                },
            )
            .await?;
        match refresh_token {
            Some(refresh) => {
                store
                    .write(
                        REFRESH_TOKEN_KEY,
                        VaultRecord {
                            value: refresh.to_string(),
                            stored_at: Utc::now(),
                        },
                    )
                    .await?;
            }
            // The issuer may omit the refresh token; make sure a token from a
            // previous session does not linger.
            None => store.remove(REFRESH_TOKEN_KEY).await?,
        }
        Ok(())
    }

    /// Read the persisted access token, if any.
    pub async fn session_token(&self) -> Result<Option<SecretString>, VaultError> {
        let SecretBackend::Available(store) = &self.backend else {
            return Ok(None);
        };
        Ok(store
            .read(ACCESS_TOKEN_KEY)
            .await?
            .map(|record| SecretString::new(record.value)))
    }

    /// Read the persisted refresh token, if any.
    pub async fn refresh_token(&self) -> Result<Option<SecretString>, VaultError> {
        let SecretBackend::Available(store) = &self.backend else {
            return Ok(None);
        };
        Ok(store
            .read(REFRESH_TOKEN_KEY)
            .await?
            .map(|record| SecretString::new(record.value)))
    }

    /// Remove the session-scoped entries. Per-username credentials survive.
    pub async fn clear_session(&self) -> Result<(), VaultError> {
        let SecretBackend::Available(store) = &self.backend else {
            return Ok(());
        };
        store.remove(ACCESS_TOKEN_KEY).await?;
        store.remove(REFRESH_TOKEN_KEY).await?;
        debug!("cleared session-scoped vault entries");
        Ok(())
    }

    /// Backdated write, used to exercise the lazy-expiry policy.
    #[cfg(test)]
    async fn set_secret_stored_at(
        &self,
        username: &str,
        kind: SecretKind,
        secret: &str,
        stored_at: DateTime<Utc>,
    ) -> Result<(), VaultError> {
        let SecretBackend::Available(store) = &self.backend else {
            return Err(VaultError::Unavailable);
        };
        let payload = CredentialPayload {
            kind,
            secret: secret.to_string(),
        };
        store
            .write(
                &Self::credential_key(username),
                VaultRecord {
                    value: serde_json::to_string(&payload).unwrap(),
                    stored_at,
                },
            )
            .await
    }
}
