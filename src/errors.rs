//! Error taxonomy for the session lifecycle core
//!
//! Transport and platform failures are classified once, at the boundary where
//! they occur, into the variants below. UI code and the session state machine
//! only ever see these classified errors, never raw transport errors.

use thiserror::Error;

/// Classified authentication and session errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The issuer rejected the supplied credentials. Surfaced inline to the
    /// user, no retry.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The issuer could not be reached. The current session, if any, is
    /// preserved; this never forces a logout.
    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),

    /// The session token is no longer valid.
    ///
    /// The expiry path itself routes through the forced-logout broadcaster
    /// rather than an error return; this variant exists for shells that need
    /// to classify the resulting redirect (it is [`AuthError::is_silent`]).
    #[error("session expired")]
    SessionExpired,

    /// The platform has no hardware-backed secure store. Biometric and
    /// remember-me features degrade silently; password login still works.
    #[error("secure storage unavailable")]
    VaultUnavailable,

    /// No biometric sensor is available on this device.
    #[error("biometric authentication unavailable")]
    BiometricUnavailable,

    /// The biometric prompt was dismissed.
    #[error("biometric authentication cancelled")]
    BiometricCancelled {
        /// True when the user dismissed the prompt themselves, in which case
        /// the cancellation is not surfaced as an error.
        user_initiated: bool,
    },

    /// The biometric prompt did not resolve within its bounded wait.
    #[error("biometric authentication timed out")]
    BiometricTimeout,

    /// Biometric login was requested but no secret is stored for the user.
    #[error("no stored credential for {0}")]
    CredentialMissing(String),

    /// Persistent store failure.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Vault failure other than plain unavailability.
    #[error("vault error: {0}")]
    Vault(#[from] VaultError),

    /// Unexpected internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Whether this error should be swallowed rather than shown to the user.
    ///
    /// Session expiry redirects silently, and a user-initiated biometric
    /// cancellation is not an error from the user's point of view.
    pub fn is_silent(&self) -> bool {
        matches!(
            self,
            AuthError::SessionExpired
                | AuthError::BiometricCancelled {
                    user_initiated: true
                }
        )
    }
}

/// Errors from the plain key-value state store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The store could not be initialized.
    #[error("failed to initialize storage: {0}")]
    InitFailed(String),

    /// Reading persisted state failed.
    #[error("failed to read from storage")]
    ReadFailed(#[source] std::io::Error),

    /// Writing persisted state failed.
    #[error("failed to write to storage")]
    WriteFailed(#[source] std::io::Error),

    /// Persisted state did not deserialize.
    #[error("corrupted storage data")]
    CorruptedData,
}

/// Errors from the credential vault.
#[derive(Debug, Error)]
pub enum VaultError {
    /// No secure store capability on this platform. Writes fail with this
    /// variant; reads report the secret as absent instead.
    #[error("secure store not available on this platform")]
    Unavailable,

    /// The underlying platform store rejected the operation.
    #[error("secure store operation failed: {0}")]
    Backend(String),

    /// A stored record did not deserialize.
    #[error("corrupted vault record for key {0}")]
    CorruptedRecord(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(_: serde_json::Error) -> Self {
        StorageError::CorruptedData
    }
}

/// Result type alias for session lifecycle operations.
pub type AuthResult<T> = Result<T, AuthError>;
