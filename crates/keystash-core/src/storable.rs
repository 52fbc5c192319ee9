//! Cached, typed accessors bound to a single storage key.
//!
//! A storable value loads once when it is created and afterwards answers every
//! read from memory. Writes update memory first and then go to the backend on
//! a best-effort basis: a failed write is logged and otherwise ignored, so the
//! in-memory value never depends on the backend being healthy.

use std::{fmt, ops::Deref, sync::Arc};

use serde::{de::DeserializeOwned, Serialize};
use tokio::{runtime::Handle, task::JoinHandle};
use tracing::{debug, warn};

use crate::storage::{AsyncStorage, AsyncStorageExt, Storage, StorageExt};

/// A value of type `T` persisted under `key` in a synchronous [`Storage`].
///
/// # Example
/// ```rust
/// use std::sync::Arc;
/// use keystash_core::{storage::InMemoryStorage, StorableValue};
///
/// let store = Arc::new(InMemoryStorage::new());
/// let mut counter = StorableValue::new(0u32, "counter", store.clone());
/// counter.set(5);
/// assert_eq!(*counter.get(), 5);
///
/// let reopened = StorableValue::new(0u32, "counter", store);
/// assert_eq!(*reopened, 5);
/// ```
pub struct StorableValue<T, S: ?Sized = dyn Storage> {
    key: String,
    default_value: T,
    storage: Arc<S>,
    value: T,
}

impl<T, S> StorableValue<T, S>
where
    T: Serialize + DeserializeOwned + Clone,
    S: Storage + ?Sized,
{
    /// Bind to `key`, seeding the cache from storage or falling back to `default_value`.
    pub fn new(default_value: T, key: impl AsRef<str>, storage: Arc<S>) -> Self {
        let key = key.as_ref().to_string();
        let value = match storage.load_object::<T>(&key) {
            Some(stored) => {
                debug!(%key, "loaded stored value");
                stored
            }
            None => {
                debug!(%key, "no stored value, using default");
                default_value.clone()
            }
        };

        Self {
            key,
            default_value,
            storage,
            value,
        }
    }

    /// Replace the value and write it through to storage.
    pub fn set(&mut self, value: T) {
        self.value = value;
        self.persist();
    }

    /// Mutate the value in place, then write it through to storage.
    pub fn update(&mut self, f: impl FnOnce(&mut T)) {
        f(&mut self.value);
        self.persist();
    }

    fn persist(&self) {
        if let Err(err) = self.storage.save_object(&self.key, &self.value) {
            warn!(key = %self.key, error = %err, "dropping write for storable value");
        }
    }
}

impl<T, S: ?Sized> StorableValue<T, S> {
    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn default_value(&self) -> &T {
        &self.default_value
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T, S: ?Sized> Deref for StorableValue<T, S> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

// Only the visible value takes part in equality; key and backend are plumbing.
impl<T: PartialEq, S: ?Sized> PartialEq for StorableValue<T, S> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T: Eq, S: ?Sized> Eq for StorableValue<T, S> {}

impl<T: fmt::Debug, S: ?Sized> fmt::Debug for StorableValue<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorableValue")
            .field("key", &self.key)
            .field("value", &self.value)
            .finish_non_exhaustive()
    }
}

/// A value of type `T` persisted under `key` in an [`AsyncStorage`].
///
/// Loading is the only point that waits on the backend. [`set`](Self::set)
/// spawns the write on the current Tokio runtime and returns immediately;
/// concurrent writes carry no ordering guarantee.
pub struct AsyncStorableValue<T, S: ?Sized = dyn AsyncStorage> {
    key: String,
    default_value: T,
    storage: Arc<S>,
    value: T,
}

impl<T, S> AsyncStorableValue<T, S>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    S: AsyncStorage + ?Sized + 'static,
{
    /// Bind to `key`, seeding the cache from storage or falling back to `default_value`.
    pub async fn load(default_value: T, key: impl AsRef<str>, storage: Arc<S>) -> Self {
        let key = key.as_ref().to_string();
        let value = match storage.load_object::<T>(&key).await {
            Some(stored) => {
                debug!(%key, "loaded stored value");
                stored
            }
            None => {
                debug!(%key, "no stored value, using default");
                default_value.clone()
            }
        };

        Self {
            key,
            default_value,
            storage,
            value,
        }
    }

    /// Replace the value and spawn a write-through to storage.
    ///
    /// The returned handle can be dropped; awaiting it only waits for the
    /// write to settle. Write failures are logged, never returned. Outside a
    /// Tokio runtime the value still changes, the write is dropped with a
    /// warning, and `None` is returned.
    pub fn set(&mut self, value: T) -> Option<JoinHandle<()>> {
        self.value = value;
        self.persist()
    }

    /// Mutate the value in place, then spawn a write-through to storage.
    pub fn update(&mut self, f: impl FnOnce(&mut T)) -> Option<JoinHandle<()>> {
        f(&mut self.value);
        self.persist()
    }

    fn persist(&self) -> Option<JoinHandle<()>> {
        let Ok(runtime) = Handle::try_current() else {
            warn!(key = %self.key, "no async runtime, dropping write for storable value");
            return None;
        };
        let storage = Arc::clone(&self.storage);
        let key = self.key.clone();
        let value = self.value.clone();
        Some(runtime.spawn(async move {
            if let Err(err) = storage.save_object(&key, &value).await {
                warn!(%key, error = %err, "dropping write for storable value");
            }
        }))
    }
}

impl<T, S: ?Sized> AsyncStorableValue<T, S> {
    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn default_value(&self) -> &T {
        &self.default_value
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T, S: ?Sized> Deref for AsyncStorableValue<T, S> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: PartialEq, S: ?Sized> PartialEq for AsyncStorableValue<T, S> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T: Eq, S: ?Sized> Eq for AsyncStorableValue<T, S> {}

impl<T: fmt::Debug, S: ?Sized> fmt::Debug for AsyncStorableValue<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncStorableValue")
            .field("key", &self.key)
            .field("value", &self.value)
            .finish_non_exhaustive()
    }
}
