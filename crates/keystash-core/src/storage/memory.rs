use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;

use super::{AsyncStorage, Storage, StorageError};

/// In-memory store for tests and ephemeral sessions.
/// Clones share the same entries; nothing survives the process.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStorage {
    inner: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> Result<MutexGuard<'_, HashMap<String, Vec<u8>>>, StorageError> {
        self.inner.lock().map_err(|err| StorageError::Backend {
            reason: format!("lock poisoned: {err}"),
        })
    }
}

impl Storage for InMemoryStorage {
    fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.entries()?.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.entries()?.remove(key);
        Ok(())
    }
}

#[async_trait]
impl AsyncStorage for InMemoryStorage {
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        Storage::put(self, key, value)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Storage::get(self, key)
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        Storage::delete(self, key)
    }
}
