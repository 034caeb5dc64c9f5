//! Secret store port
//!
//! The vault never touches a platform keystore directly; it goes through the
//! [`SecretStore`] trait so the secure enclave, where one exists, stays behind
//! a seam. Platforms without one use [`SecretBackend::Unavailable`], which
//! makes absence a typed state every call site must handle rather than a null
//! check.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::errors::VaultError;

/// One record in the platform keystore: an opaque value plus the timestamp
/// the vault uses for lazy expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultRecord {
    /// Serialized payload. The vault owns the shape; the store treats it as
    /// opaque.
    pub value: String,
    /// When the record was written.
    pub stored_at: DateTime<Utc>,
}

/// Keyed access to a platform-provided encrypted store.
#[async_trait]
pub trait SecretStore: Send + Sync + std::fmt::Debug {
    /// Read a record, `None` when the key is absent.
    async fn read(&self, key: &str) -> Result<Option<VaultRecord>, VaultError>;

    /// Write or replace a record.
    async fn write(&self, key: &str, record: VaultRecord) -> Result<(), VaultError>;

    /// Remove a record. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<(), VaultError>;
}

/// Capability-typed handle to the platform keystore.
#[derive(Debug, Clone)]
pub enum SecretBackend {
    /// A hardware-backed store exists on this platform.
    Available(Arc<dyn SecretStore>),
    /// No secure store. Writes fail softly, reads report absent.
    Unavailable,
}

impl SecretBackend {
    /// Whether the platform exposes a secure store at all.
    pub fn is_available(&self) -> bool {
        matches!(self, SecretBackend::Available(_))
    }
}

/// In-memory secret store.
///
/// Stands in for the platform keystore in tests and on desktop development
/// builds where the real keystore broker is not wired up.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    records: Mutex<HashMap<String, VaultRecord>>,
}

impl MemorySecretStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    /// Whether the store holds no records.
    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn read(&self, key: &str) -> Result<Option<VaultRecord>, VaultError> {
        Ok(self.records.lock().await.get(key).cloned())
    }

    async fn write(&self, key: &str, record: VaultRecord) -> Result<(), VaultError> {
        self.records.lock().await.insert(key.to_string(), record);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), VaultError> {
        self.records.lock().await.remove(key);
        Ok(())
    }
}
