//! Token expiry monitor
//!
//! A pure decision pipeline over the current bearer token plus a separately
//! stored fallback expiry, and the 1 Hz polling task that runs it while a
//! session is live.
//!
//! The policy is asymmetric on purpose: the *presence* check fails closed (no
//! token is never "valid"), while expiry *detection* fails open (a token we
//! cannot date is not grounds for logging the user out).

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::broadcast::ForcedLogoutBroadcaster;
use crate::session::SessionStateStore;
use crate::store::StateStore;
use crate::vault::CredentialVault;

/// Numeric fallback expiries below this are seconds since epoch, at or above
/// it milliseconds. Inherited heuristic; a unit-tagged value would be the
/// better shape, but existing persisted hints rely on this boundary.
pub const EPOCH_SECONDS_CEILING: i64 = 10_000_000_000;

/// What one stage of the pipeline could determine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStatus {
    /// The stage found a date in the past.
    Expired,
    /// The stage found a date in the future.
    Valid,
    /// The stage could not find a usable date at all.
    Indeterminate,
}

#[derive(Debug, Deserialize)]
struct ExpiryClaims {
    exp: Option<i64>,
}

/// Read the token's self-describing expiry claim.
///
/// Malformed tokens and tokens without an `exp` claim report
/// [`TokenStatus::Indeterminate`], never `Expired`: the fallback hint gets a
/// say before any policy applies.
pub fn claim_status(token: &str, now: DateTime<Utc>) -> TokenStatus {
    let parts = token.split('.').count();
    if parts != 3 {
        debug!(parts, "token is not in claim-bearing format");
        return TokenStatus::Indeterminate;
    }

    // Claims only; the issuer's signature is not this component's concern.
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims = HashSet::new();

    match decode::<ExpiryClaims>(token, &DecodingKey::from_secret(b"unused"), &validation) {
        Ok(data) => match data.claims.exp {
            Some(exp) if now.timestamp() >= exp => TokenStatus::Expired,
            Some(_) => TokenStatus::Valid,
            None => {
                debug!("token carries no expiry claim");
                TokenStatus::Indeterminate
            }
        },
        Err(e) => {
            debug!(error = %e, "token claim segment did not decode");
            TokenStatus::Indeterminate
        }
    }
}

fn epoch_status(raw: f64, now: DateTime<Utc>) -> TokenStatus {
    let raw = raw as i64;
    let expiry_ms = if raw < EPOCH_SECONDS_CEILING {
        raw.saturating_mul(1000)
    } else {
        raw
    };
    match DateTime::from_timestamp_millis(expiry_ms) {
        Some(expiry) if now >= expiry => TokenStatus::Expired,
        Some(_) => TokenStatus::Valid,
        None => TokenStatus::Indeterminate,
    }
}

/// Interpret the separately stored expiry hint.
///
/// Accepts a numeric epoch (seconds or milliseconds, see
/// [`EPOCH_SECONDS_CEILING`]), a numeric string, or an absolute date string.
pub fn fallback_status(hint: &Value, now: DateTime<Utc>) -> TokenStatus {
    match hint {
        Value::Number(n) => n
            .as_f64()
            .map(|raw| epoch_status(raw, now))
            .unwrap_or(TokenStatus::Indeterminate),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(raw) = s.parse::<f64>() {
                return epoch_status(raw, now);
            }
            if let Ok(parsed) = DateTime::parse_from_rfc3339(s) {
                return if now >= parsed.with_timezone(&Utc) {
                    TokenStatus::Expired
                } else {
                    TokenStatus::Valid
                };
            }
            for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
                if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
                    let parsed = naive.and_utc();
                    return if now >= parsed {
                        TokenStatus::Expired
                    } else {
                        TokenStatus::Valid
                    };
                }
            }
            debug!(hint = %s, "unparseable fallback expiry");
            TokenStatus::Indeterminate
        }
        _ => TokenStatus::Indeterminate,
    }
}

/// Full pipeline: is the session token stale?
///
/// Absence of a token is stale; a decodable claim is authoritative; otherwise
/// the fallback hint decides; two indeterminate stages report "not stale".
pub fn is_stale(token: Option<&str>, hint: Option<&Value>, now: DateTime<Utc>) -> bool {
    let Some(token) = token.filter(|t| !t.is_empty()) else {
        return true;
    };

    match claim_status(token, now) {
        TokenStatus::Expired => true,
        TokenStatus::Valid => false,
        TokenStatus::Indeterminate => match hint.map(|h| fallback_status(h, now)) {
            Some(TokenStatus::Expired) => true,
            Some(TokenStatus::Valid) => false,
            // Fail open on detection: never log someone out over a token we
            // simply cannot date.
            Some(TokenStatus::Indeterminate) | None => false,
        },
    }
}

/// Spawn the expiry poll loop.
///
/// Runs until aborted by the session manager on logout. A stale verdict is
/// routed through the forced-logout broadcaster, never a direct `logout`
/// call, so all forced-logout causes funnel through one auditable channel.
pub(crate) fn spawn_poller(
    poll_interval: Duration,
    state: SessionStateStore,
    vault: Arc<CredentialVault>,
    store: Arc<StateStore>,
    broadcaster: Arc<ForcedLogoutBroadcaster>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;

            if !state.is_authenticated() {
                continue;
            }

            let session_token = state.access_token();
            let vault_token = match &session_token {
                Some(_) => None,
                None => match vault.session_token().await {
                    Ok(token) => token,
                    Err(e) => {
                        warn!(error = %e, "vault read failed during expiry poll");
                        None
                    }
                },
            };
            let token = session_token
                .as_deref()
                .or_else(|| vault_token.as_ref().map(|t| t.expose()));
            let hint = store.token_expiry_hint().await;

            if is_stale(token, hint.as_ref(), Utc::now()) {
                info!("session token is stale, requesting forced logout");
                // Trigger from a fresh task and exit the loop first: the
                // delegated logout aborts this poller, and must not cancel
                // itself mid-run by doing so.
                let broadcaster = Arc::clone(&broadcaster);
                tokio::spawn(async move { broadcaster.trigger().await });
                break;
            }
        }
    })
}
