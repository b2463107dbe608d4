//! Credential Storage
//!
//! In-memory credential cache keyed by principal, with an optional
//! persistence hook behind it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{AccessError, AccessResult, StorageError};
use crate::resilience::fallback_on_error;
use crate::types::TokenRecord;

/// Durable storage behind the credential cache.
#[async_trait]
pub trait TokenPersistence: Send + Sync {
    /// Load the record for a principal.
    async fn load(&self, principal: &str) -> AccessResult<Option<TokenRecord>>;

    /// Save the record for a principal, replacing any previous one.
    async fn save(&self, principal: &str, record: &TokenRecord) -> AccessResult<()>;

    /// Delete the record for a principal.
    async fn delete(&self, principal: &str) -> AccessResult<()>;
}

/// Cached state for one principal.
#[derive(Clone, Debug)]
pub enum StoreEntry {
    /// Record in use.
    Active(TokenRecord),
    /// Record rejected by the provider; kept until a new authorization.
    Invalidated {
        record: TokenRecord,
        reason: String,
        invalidated_at: DateTime<Utc>,
    },
}

impl StoreEntry {
    /// Underlying record.
    pub fn record(&self) -> &TokenRecord {
        match self {
            Self::Active(record) => record,
            Self::Invalidated { record, .. } => record,
        }
    }

    /// Record, if the entry is still active.
    pub fn active(&self) -> Option<&TokenRecord> {
        match self {
            Self::Active(record) => Some(record),
            Self::Invalidated { .. } => None,
        }
    }

    pub fn is_invalidated(&self) -> bool {
        matches!(self, Self::Invalidated { .. })
    }
}

/// Credential cache shared by everything acting for the same principals.
///
/// The map lock is only held for in-memory reads and writes, never across a
/// persistence call.
pub struct CredentialStore {
    entries: RwLock<HashMap<String, StoreEntry>>,
    persistence: Option<Arc<dyn TokenPersistence>>,
}

impl CredentialStore {
    /// Create a memory-only store.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            persistence: None,
        }
    }

    /// Create a store backed by `persistence`.
    pub fn with_persistence(persistence: Arc<dyn TokenPersistence>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            persistence: Some(persistence),
        }
    }

    /// Get the cached entry without consulting persistence.
    pub fn get_cached(&self, principal: &str) -> Option<StoreEntry> {
        self.entries.read().get(principal).cloned()
    }

    /// Get the entry, loading it from persistence on a cache miss.
    ///
    /// A failing load is logged and treated as a miss.
    pub async fn get(&self, principal: &str) -> Option<StoreEntry> {
        if let Some(entry) = self.get_cached(principal) {
            return Some(entry);
        }

        let persistence = self.persistence.as_ref()?;
        let loaded = fallback_on_error(persistence.load(principal), None).await?;

        debug!(principal = %principal, "Loaded credentials from persistence");

        // Keep whatever a concurrent writer stored while we were loading.
        let entry = self
            .entries
            .write()
            .entry(principal.to_string())
            .or_insert(StoreEntry::Active(loaded))
            .clone();
        Some(entry)
    }

    /// Store a record, replacing any entry for the principal.
    ///
    /// The cache is updated first; a persistence failure is returned after.
    pub async fn put(&self, principal: &str, record: TokenRecord) -> AccessResult<()> {
        self.entries
            .write()
            .insert(principal.to_string(), StoreEntry::Active(record.clone()));

        if let Some(persistence) = &self.persistence {
            persistence.save(principal, &record).await.map_err(|e| {
                warn!(principal = %principal, error = %e, "Failed to persist credentials");
                e
            })?;
        }

        Ok(())
    }

    /// Mark the principal's record unusable.
    ///
    /// The persisted copy is deleted; a delete failure is only logged.
    pub async fn invalidate(
        &self,
        principal: &str,
        reason: impl Into<String>,
        invalidated_at: DateTime<Utc>,
    ) -> bool {
        let reason = reason.into();
        let invalidated = {
            let mut entries = self.entries.write();
            match entries.remove(principal) {
                Some(entry) => {
                    let record = match entry {
                        StoreEntry::Active(record) => record,
                        StoreEntry::Invalidated { record, .. } => record,
                    };
                    entries.insert(
                        principal.to_string(),
                        StoreEntry::Invalidated {
                            record,
                            reason: reason.clone(),
                            invalidated_at,
                        },
                    );
                    true
                }
                None => false,
            }
        };

        if invalidated {
            warn!(principal = %principal, reason = %reason, "Credentials invalidated");
            if let Some(persistence) = &self.persistence {
                if let Err(e) = persistence.delete(principal).await {
                    warn!(principal = %principal, error = %e, "Failed to delete invalidated credentials");
                }
            }
        }

        invalidated
    }

    /// Remove the principal's entry and its persisted copy.
    pub async fn remove(&self, principal: &str) -> AccessResult<bool> {
        let removed = self.entries.write().remove(principal).is_some();

        if let Some(persistence) = &self.persistence {
            persistence.delete(principal).await?;
        }

        Ok(removed)
    }

    /// Principals with a cached entry.
    pub fn principals(&self) -> Vec<String> {
        let mut principals: Vec<String> = self.entries.read().keys().cloned().collect();
        principals.sort();
        principals
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("principals", &self.principals())
            .field("persistent", &self.persistence.is_some())
            .finish()
    }
}

/// Process-local persistence.
#[derive(Default)]
pub struct InMemoryTokenPersistence {
    records: Mutex<HashMap<String, TokenRecord>>,
}

impl InMemoryTokenPersistence {
    /// Create new in-memory persistence.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of saved records.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl TokenPersistence for InMemoryTokenPersistence {
    async fn load(&self, principal: &str) -> AccessResult<Option<TokenRecord>> {
        Ok(self.records.lock().get(principal).cloned())
    }

    async fn save(&self, principal: &str, record: &TokenRecord) -> AccessResult<()> {
        self.records
            .lock()
            .insert(principal.to_string(), record.clone());
        Ok(())
    }

    async fn delete(&self, principal: &str) -> AccessResult<()> {
        self.records.lock().remove(principal);
        Ok(())
    }
}

/// Mock persistence for testing.
#[derive(Default)]
pub struct MockTokenPersistence {
    records: Mutex<HashMap<String, TokenRecord>>,
    load_history: Mutex<Vec<String>>,
    save_history: Mutex<Vec<String>>,
    delete_history: Mutex<Vec<String>>,
    fail_loads: Mutex<bool>,
    fail_writes: Mutex<bool>,
}

impl MockTokenPersistence {
    /// Create new mock persistence.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a record.
    pub fn seed(&self, principal: &str, record: TokenRecord) -> &Self {
        self.records.lock().insert(principal.to_string(), record);
        self
    }

    /// Make every load fail.
    pub fn set_fail_loads(&self, fail: bool) -> &Self {
        *self.fail_loads.lock() = fail;
        self
    }

    /// Make every save and delete fail.
    pub fn set_fail_writes(&self, fail: bool) -> &Self {
        *self.fail_writes.lock() = fail;
        self
    }

    /// Saved record for a principal.
    pub fn saved(&self, principal: &str) -> Option<TokenRecord> {
        self.records.lock().get(principal).cloned()
    }

    /// Get load history.
    pub fn get_load_history(&self) -> Vec<String> {
        self.load_history.lock().clone()
    }

    /// Get save history.
    pub fn get_save_history(&self) -> Vec<String> {
        self.save_history.lock().clone()
    }

    /// Get delete history.
    pub fn get_delete_history(&self) -> Vec<String> {
        self.delete_history.lock().clone()
    }
}

#[async_trait]
impl TokenPersistence for MockTokenPersistence {
    async fn load(&self, principal: &str) -> AccessResult<Option<TokenRecord>> {
        self.load_history.lock().push(principal.to_string());
        if *self.fail_loads.lock() {
            return Err(AccessError::Storage(StorageError::ReadFailed {
                message: "mock read failure".to_string(),
            }));
        }
        Ok(self.records.lock().get(principal).cloned())
    }

    async fn save(&self, principal: &str, record: &TokenRecord) -> AccessResult<()> {
        self.save_history.lock().push(principal.to_string());
        if *self.fail_writes.lock() {
            return Err(AccessError::Storage(StorageError::WriteFailed {
                message: "mock write failure".to_string(),
            }));
        }
        self.records
            .lock()
            .insert(principal.to_string(), record.clone());
        Ok(())
    }

    async fn delete(&self, principal: &str) -> AccessResult<()> {
        self.delete_history.lock().push(principal.to_string());
        if *self.fail_writes.lock() {
            return Err(AccessError::Storage(StorageError::DeleteFailed {
                message: "mock delete failure".to_string(),
            }));
        }
        self.records.lock().remove(principal);
        Ok(())
    }
}
