//! Session lifecycle configuration

use std::time::Duration;

/// Tunable timeouts and policy for the session core.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Inactivity before the warning dialog is shown.
    pub warning_timeout: Duration,

    /// Inactivity before the session is forcibly ended. Must exceed
    /// `warning_timeout`; the visible countdown runs for the difference.
    pub logout_timeout: Duration,

    /// Minimum spacing between processed activity events. Input events
    /// arriving faster than this are coalesced to bound timer-reset overhead.
    pub activity_throttle: Duration,

    /// Cadence of the token expiry poll while authenticated.
    pub token_poll_interval: Duration,

    /// Bounded wait for the platform biometric prompt.
    pub biometric_timeout: Duration,

    /// Maximum age of a stored password before it is treated as absent.
    pub password_max_age: chrono::Duration,

    /// Maximum age of a stored transaction PIN before it is treated as absent.
    pub pin_max_age: chrono::Duration,

    /// Grace window after which the forced-logout guard clears itself, so a
    /// run that failed partway cannot lock the channel permanently.
    pub broadcast_grace: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            warning_timeout: Duration::from_secs(2 * 60),
            logout_timeout: Duration::from_secs(3 * 60),
            activity_throttle: Duration::from_secs(1),
            token_poll_interval: Duration::from_secs(1),
            biometric_timeout: Duration::from_secs(15),
            password_max_age: chrono::Duration::days(30),
            pin_max_age: chrono::Duration::days(30),
            broadcast_grace: Duration::from_secs(1),
        }
    }
}
