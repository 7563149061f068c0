use crate::db::Database;
use crate::ragflow::models::Document;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// How long a value read from or written to the store is served from memory.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage error: {0}")]
    Db(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

struct CacheEntry {
    value: Value,
    stored_at: Instant,
}

/// Local key-value store with a short-lived in-memory cache in front of it.
///
/// Entries are only invalidated by expiry or by writes through this handle;
/// a concurrent writer going straight to the database is not observed until
/// the cached copy expires.
pub struct Storage {
    db: Arc<Database>,
    cache: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl Storage {
    pub fn new(db: Arc<Database>) -> Self {
        Self::with_ttl(db, DEFAULT_CACHE_TTL)
    }

    pub fn with_ttl(db: Arc<Database>, ttl: Duration) -> Self {
        Self {
            db,
            cache: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        let value = match self.cached(key) {
            Some(value) => Some(value),
            None => {
                let stored = self.db.kv_get(key)?;
                let value = stored
                    .map(|raw| serde_json::from_str::<Value>(&raw))
                    .transpose()?;
                if let Some(value) = &value {
                    self.update_cache(key, value.clone());
                }
                value
            }
        };
        Ok(value.map(serde_json::from_value).transpose()?)
    }

    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let value = serde_json::to_value(value)?;
        self.db.kv_set(key, &value.to_string())?;
        self.update_cache(key, value);
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.db.kv_remove(key)?;
        self.cache.lock().unwrap().remove(key);
        Ok(())
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        self.db.kv_clear()?;
        self.cache.lock().unwrap().clear();
        Ok(())
    }

    // ── Document list cache ──

    pub fn cache_documents(&self, dataset_id: &str, docs: &[Document]) -> Result<(), StorageError> {
        self.set(&documents_key(dataset_id), docs)
    }

    pub fn cached_documents(&self, dataset_id: &str) -> Result<Option<Vec<Document>>, StorageError> {
        self.get(&documents_key(dataset_id))
    }

    fn cached(&self, key: &str) -> Option<Value> {
        let mut cache = self.cache.lock().unwrap();
        let expired = match cache.get(key) {
            None => return None,
            Some(entry) => entry.stored_at.elapsed() > self.ttl,
        };
        if expired {
            cache.remove(key);
            return None;
        }
        cache.get(key).map(|entry| entry.value.clone())
    }

    fn update_cache(&self, key: &str, value: Value) {
        self.cache.lock().unwrap().insert(
            key.to_string(),
            CacheEntry {
                value,
                stored_at: Instant::now(),
            },
        );
    }
}

fn documents_key(dataset_id: &str) -> String {
    format!("documents:{}", dataset_id)
}
