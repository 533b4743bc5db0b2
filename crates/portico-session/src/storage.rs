//! Durable client-side token records
//!
//! Two string records survive a reload: the identity token and the backend
//! session token. Absence of either means "signed out". Only the session
//! controller writes them, and always in full.

mod durable;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;

use async_trait::async_trait;

pub use self::durable::RedbTokenStorage;
use crate::error::StorageResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StorageKey {
    IdentityToken,
    BackendToken,
}

impl StorageKey {
    pub const ALL: [StorageKey; 2] = [StorageKey::IdentityToken, StorageKey::BackendToken];

    pub fn as_str(self) -> &'static str {
        match self {
            StorageKey::IdentityToken => "portico.id_token",
            StorageKey::BackendToken => "portico.backend_token",
        }
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait TokenStorage: Send + Sync {
    async fn load(&self, key: StorageKey) -> StorageResult<Option<String>>;

    /// Replace the whole record under `key`
    async fn store(&self, key: StorageKey, value: &str) -> StorageResult<()>;

    async fn remove(&self, key: StorageKey) -> StorageResult<()>;
}

/// Token storage that lives as long as the process
#[derive(Debug, Default)]
pub struct MemoryTokenStorage {
    records: Mutex<BTreeMap<StorageKey, String>>,
}

impl MemoryTokenStorage {
    pub fn get(&self, key: StorageKey) -> Option<String> {
        self.records
            .lock()
            .expect("Locking failed")
            .get(&key)
            .cloned()
    }

    pub fn insert(&self, key: StorageKey, value: impl Into<String>) {
        self.records
            .lock()
            .expect("Locking failed")
            .insert(key, value.into());
    }
}

#[async_trait]
impl TokenStorage for MemoryTokenStorage {
    async fn load(&self, key: StorageKey) -> StorageResult<Option<String>> {
        Ok(self.get(key))
    }

    async fn store(&self, key: StorageKey, value: &str) -> StorageResult<()> {
        self.insert(key, value);
        Ok(())
    }

    async fn remove(&self, key: StorageKey) -> StorageResult<()> {
        self.records.lock().expect("Locking failed").remove(&key);
        Ok(())
    }
}
