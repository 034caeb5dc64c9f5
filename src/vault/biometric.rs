//! Biometric gate capability
//!
//! The platform's fingerprint/face sensor sits behind [`BiometricGate`]. The
//! prompt is always invoked through [`BiometricGate::verify`] wrapped in the
//! crate-wide bounded wait, so a hung sensor driver returns the UI affordance
//! to idle instead of blocking forever.

use std::time::Duration;

use async_trait::async_trait;

use crate::errors::AuthError;
use crate::timeout::bounded;

/// Outcome of a biometric prompt that ran to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiometricVerdict {
    /// The sensor matched the enrolled identity.
    Confirmed,
    /// The user dismissed the prompt.
    CancelledByUser,
    /// The platform dismissed the prompt (lockout, sensor error, focus loss).
    CancelledBySystem,
}

/// Platform biometric sensor broker.
#[async_trait]
pub trait BiometricGate: Send + Sync + std::fmt::Debug {
    /// Whether a sensor with enrolled biometrics exists on this device.
    fn is_available(&self) -> bool;

    /// Show the platform prompt and wait for its verdict.
    async fn verify(&self, reason: &str) -> Result<BiometricVerdict, AuthError>;
}

/// Run the biometric prompt with the configured upper bound.
///
/// Classifies the outcome into the error taxonomy: an unavailable sensor,
/// either flavor of cancellation, and a prompt that outlived the bound each
/// map to their own variant.
pub async fn verify_bounded(
    gate: &dyn BiometricGate,
    reason: &str,
    limit: Duration,
) -> Result<(), AuthError> {
    if !gate.is_available() {
        return Err(AuthError::BiometricUnavailable);
    }

    match bounded(limit, gate.verify(reason)).await {
        Err(_) => {
            tracing::warn!(limit = ?limit, "biometric prompt timed out");
            Err(AuthError::BiometricTimeout)
        }
        Ok(Err(err)) => Err(err),
        Ok(Ok(BiometricVerdict::Confirmed)) => Ok(()),
        Ok(Ok(BiometricVerdict::CancelledByUser)) => Err(AuthError::BiometricCancelled {
            user_initiated: true,
        }),
        Ok(Ok(BiometricVerdict::CancelledBySystem)) => Err(AuthError::BiometricCancelled {
            user_initiated: false,
        }),
    }
}
