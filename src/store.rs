//! Plain persisted key-value state
//!
//! Everything persistent that is not a secret lives here as logical keys over
//! a JSON document: the cached username, the "last logout was explicit" flag,
//! the fallback token expiry, the cached session profile, and ordinary
//! preferences. Secrets and tokens never touch this store; they go through the
//! vault.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::StorageError;
use crate::session::Role;

const USERNAME_KEY: &str = "auth.username";
const EXPLICIT_LOGOUT_KEY: &str = "auth.explicit_logout";
const TOKEN_EXPIRY_KEY: &str = "auth.token_expiry";
const PROFILE_KEY: &str = "session.profile";
const DEVICE_ID_KEY: &str = "device.id";

/// Minimal session snapshot persisted for cached-session restore.
///
/// Tokens are deliberately absent; they live in the vault.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedProfile {
    /// Authenticated user id.
    pub user_id: Uuid,
    /// Username, also the vault credential key.
    pub username: String,
    /// Role at last login.
    pub role: Role,
    /// When the persisted token was issued.
    pub token_issued_at: DateTime<Utc>,
}

/// JSON-file-backed key-value store with an in-memory mode for tests.
#[derive(Debug)]
pub struct StateStore {
    path: Option<PathBuf>,
    entries: Mutex<HashMap<String, Value>>,
}

impl StateStore {
    /// Open (or create) the store at `path`.
    ///
    /// A corrupted file is logged and replaced with an empty document rather
    /// than failing startup.
    pub async fn open(path: PathBuf) -> Result<Self, StorageError> {
        let entries = if path.exists() {
            let raw = tokio::fs::read_to_string(&path)
                .await
                .map_err(StorageError::ReadFailed)?;
            match serde_json::from_str(&raw) {
                Ok(map) => map,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "state file corrupted, starting empty");
                    HashMap::new()
                }
            }
        } else {
            HashMap::new()
        };

        Ok(Self {
            path: Some(path),
            entries: Mutex::new(entries),
        })
    }

    /// Purely in-memory store; nothing survives the process.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: Mutex::new(HashMap::new()),
        }
    }

    async fn persist(&self, entries: &HashMap<String, Value>) -> Result<(), StorageError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(StorageError::WriteFailed)?;
        }
        let data = serde_json::to_string_pretty(entries)?;
        tokio::fs::write(path, data)
            .await
            .map_err(StorageError::WriteFailed)?;
        Ok(())
    }

    /// Read a raw value.
    pub async fn get(&self, key: &str) -> Option<Value> {
        self.entries.lock().await.get(key).cloned()
    }

    /// Write a raw value and persist the document.
    pub async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), value);
        self.persist(&entries).await
    }

    /// Remove a key and persist the document. Absent keys are not an error.
    pub async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().await;
        if entries.remove(key).is_some() {
            self.persist(&entries).await?;
        }
        Ok(())
    }

    /// Last username that logged in on this device.
    pub async fn cached_username(&self) -> Option<String> {
        self.get(USERNAME_KEY)
            .await
            .and_then(|v| v.as_str().map(str::to_string))
    }

    /// Record the username for the next biometric prompt.
    pub async fn set_cached_username(&self, username: &str) -> Result<(), StorageError> {
        self.set(USERNAME_KEY, Value::String(username.to_string()))
            .await
    }

    /// Whether the last logout was an explicit user action. Used to suppress
    /// the automatic biometric prompt on next start.
    pub async fn explicit_logout(&self) -> bool {
        self.get(EXPLICIT_LOGOUT_KEY)
            .await
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// Set or clear the explicit-logout flag.
    pub async fn set_explicit_logout(&self, explicit: bool) -> Result<(), StorageError> {
        self.set(EXPLICIT_LOGOUT_KEY, Value::Bool(explicit)).await
    }

    /// Separately stored token expiry, used when the token itself carries no
    /// decodable claim. Either an absolute date string or a numeric epoch.
    pub async fn token_expiry_hint(&self) -> Option<Value> {
        self.get(TOKEN_EXPIRY_KEY).await
    }

    /// Persist the fallback token expiry.
    pub async fn set_token_expiry_hint(&self, hint: Value) -> Result<(), StorageError> {
        self.set(TOKEN_EXPIRY_KEY, hint).await
    }

    /// Persisted session profile for cached restore.
    pub async fn profile(&self) -> Option<PersistedProfile> {
        let value = self.get(PROFILE_KEY).await?;
        match serde_json::from_value(value) {
            Ok(profile) => Some(profile),
            Err(e) => {
                warn!(error = %e, "persisted profile corrupted, ignoring");
                None
            }
        }
    }

    /// Persist the session profile.
    pub async fn set_profile(&self, profile: &PersistedProfile) -> Result<(), StorageError> {
        self.set(PROFILE_KEY, serde_json::to_value(profile)?).await
    }

    /// Stable per-install device id, generated on first use and persisted.
    /// Survives logout; identifies the install, not the session.
    pub async fn device_id(&self) -> Result<String, StorageError> {
        if let Some(existing) = self
            .get(DEVICE_ID_KEY)
            .await
            .and_then(|v| v.as_str().map(str::to_string))
        {
            return Ok(existing);
        }
        let fresh = Uuid::new_v4().to_string();
        self.set(DEVICE_ID_KEY, Value::String(fresh.clone())).await?;
        Ok(fresh)
    }

    /// Drop the session-scoped keys on logout. The cached username survives
    /// so the next start can offer biometric login.
    pub async fn clear_session_keys(&self) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.remove(TOKEN_EXPIRY_KEY);
        entries.remove(PROFILE_KEY);
        if entries.len() != before {
            self.persist(&entries).await?;
        }
        debug!("cleared session-scoped state keys");
        Ok(())
    }
}
