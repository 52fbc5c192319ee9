//! Key-value storage contracts.
//!
//! Backends implement a handful of raw primitives (`put`/`get`/`delete`);
//! everything application code calls is layered on top of them here, so every
//! backend gets the same absence and error semantics:
//!
//! - a key that was never stored and a payload that fails to decode are both
//!   reported as `None`, never as an error;
//! - encoding failures surface from `save_object`;
//! - backend failures surface only from the raw primitives and the string
//!   helpers, and are logged and swallowed everywhere else.

mod memory;

pub use memory::InMemoryStorage;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors produced by storage backends.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StorageError {
    /// Value could not be serialized to JSON.
    #[error("failed to encode value for key {key}: {reason}")]
    Encoding { key: String, reason: String },
    /// Stored payload is not UTF-8 text.
    #[error("value for key {key} is not valid UTF-8")]
    InvalidUtf8 { key: String },
    /// Underlying store failure (unreachable, access denied, poisoned lock).
    #[error("storage failure: {reason}")]
    Backend { reason: String },
}

/// Synchronous key-value store keyed by flat string keys.
pub trait Storage: Send + Sync {
    /// Persist bytes under a key, overwriting any existing entry.
    fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Retrieve the bytes for a key, `None` when absent.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Remove a key and its value (idempotent).
    fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Store raw bytes. `None` is a no-op; backend failures are logged, not returned.
    fn save_bytes(&self, key: &str, data: Option<&[u8]>) {
        let Some(data) = data else {
            return;
        };
        if let Err(err) = self.put(key, data) {
            warn!(key, error = %err, "failed to save bytes");
        }
    }

    /// Load raw bytes; backend failures are reported as absence.
    fn load_bytes(&self, key: &str) -> Option<Vec<u8>> {
        match self.get(key) {
            Ok(data) => data,
            Err(err) => {
                warn!(key, error = %err, "failed to load bytes");
                None
            }
        }
    }

    /// Remove an entry; removing an absent key is a no-op.
    fn remove_object(&self, key: &str) {
        if let Err(err) = self.delete(key) {
            warn!(key, error = %err, "failed to remove entry");
        }
    }

    /// Store UTF-8 text, or remove the key when `value` is `None`.
    fn save_string(&self, key: &str, value: Option<&str>) -> Result<(), StorageError> {
        match value {
            Some(text) => self.put(key, text.as_bytes()),
            None => self.delete(key),
        }
    }

    /// Load UTF-8 text stored under a key.
    fn load_string(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.get(key)?
            .map(|bytes| {
                String::from_utf8(bytes).map_err(|_| StorageError::InvalidUtf8 {
                    key: key.to_string(),
                })
            })
            .transpose()
    }
}

/// Typed JSON helpers available on every [`Storage`], including `dyn Storage`.
pub trait StorageExt: Storage {
    /// Serialize `value` as JSON and store it.
    ///
    /// Only encoding failures are returned; the write itself is best-effort.
    fn save_object<T>(&self, key: &str, value: &T) -> Result<(), StorageError>
    where
        T: Serialize + ?Sized,
    {
        let bytes = encode(key, value)?;
        self.save_bytes(key, Some(&bytes));
        Ok(())
    }

    /// Load and deserialize a value. Absent and undecodable entries are both `None`.
    fn load_object<T>(&self, key: &str) -> Option<T>
    where
        T: DeserializeOwned,
    {
        decode(key, &self.load_bytes(key)?)
    }
}

impl<S: Storage + ?Sized> StorageExt for S {}

/// Asynchronous counterpart of [`Storage`] for backends whose medium may suspend.
#[async_trait]
pub trait AsyncStorage: Send + Sync {
    /// Persist bytes under a key, overwriting any existing entry.
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Retrieve the bytes for a key, `None` when absent.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Remove a key and its value (idempotent).
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// Typed JSON helpers for every [`AsyncStorage`]. Same semantics as [`StorageExt`].
#[async_trait]
pub trait AsyncStorageExt: AsyncStorage {
    async fn save_object<T>(&self, key: &str, value: &T) -> Result<(), StorageError>
    where
        T: Serialize + Sync + ?Sized,
    {
        let bytes = encode(key, value)?;
        if let Err(err) = self.put(key, &bytes).await {
            warn!(key, error = %err, "failed to save object");
        }
        Ok(())
    }

    async fn load_object<T>(&self, key: &str) -> Option<T>
    where
        T: DeserializeOwned + Send,
    {
        match self.get(key).await {
            Ok(Some(bytes)) => decode(key, &bytes),
            Ok(None) => None,
            Err(err) => {
                warn!(key, error = %err, "failed to load object");
                None
            }
        }
    }

    async fn remove_object(&self, key: &str) {
        if let Err(err) = self.delete(key).await {
            warn!(key, error = %err, "failed to remove entry");
        }
    }
}

#[async_trait]
impl<S: AsyncStorage + ?Sized> AsyncStorageExt for S {}

fn encode<T: Serialize + ?Sized>(key: &str, value: &T) -> Result<Vec<u8>, StorageError> {
    serde_json::to_vec(value).map_err(|err| StorageError::Encoding {
        key: key.to_string(),
        reason: err.to_string(),
    })
}

fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> Option<T> {
    match serde_json::from_slice(bytes) {
        Ok(value) => Some(value),
        Err(err) => {
            debug!(key, error = %err, "stored value did not decode, treating as absent");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde::{Deserialize, Serialize};

    use super::{InMemoryStorage, Storage, StorageError, StorageExt};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Profile {
        name: String,
        launches: u32,
    }

    struct UnavailableStorage;

    impl Storage for UnavailableStorage {
        fn put(&self, _key: &str, _value: &[u8]) -> Result<(), StorageError> {
            Err(unavailable())
        }

        fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, StorageError> {
            Err(unavailable())
        }

        fn delete(&self, _key: &str) -> Result<(), StorageError> {
            Err(unavailable())
        }
    }

    fn unavailable() -> StorageError {
        StorageError::Backend {
            reason: "store locked".to_string(),
        }
    }

    #[test]
    fn object_round_trip() {
        let store = InMemoryStorage::new();
        let profile = Profile {
            name: "ada".into(),
            launches: 3,
        };

        store.save_object("profile", &profile).expect("save");
        assert_eq!(store.load_object::<Profile>("profile"), Some(profile));
    }

    #[test]
    fn malformed_payload_reads_as_absent() {
        let store = InMemoryStorage::new();
        Storage::put(&store, "profile", b"{not json").expect("put");

        assert_eq!(store.load_object::<Profile>("profile"), None);
        // raw bytes are still there; only the typed view hides them
        assert!(store.load_bytes("profile").is_some());
    }

    #[test]
    fn type_mismatch_reads_as_absent() {
        let store = InMemoryStorage::new();
        store.save_object("count", &"seven").expect("save");

        assert_eq!(store.load_object::<u32>("count"), None);
    }

    #[test]
    fn unserializable_value_is_an_encoding_error() {
        let store = InMemoryStorage::new();
        let mut map = HashMap::new();
        map.insert((1u8, 2u8), "tuple keys are not JSON object keys");

        let err = store.save_object("map", &map).expect_err("encode should fail");
        assert!(matches!(err, StorageError::Encoding { ref key, .. } if key == "map"));
        assert_eq!(store.load_bytes("map"), None);
    }

    #[test]
    fn remove_object_clears_entry_and_is_idempotent() {
        let store = InMemoryStorage::new();
        store.save_object("k", &1u8).expect("save");

        store.remove_object("k");
        store.remove_object("k");

        assert_eq!(store.load_object::<u8>("k"), None);
    }

    #[test]
    fn save_bytes_ignores_none() {
        let store = InMemoryStorage::new();
        store.save_bytes("k", Some(b"v"));
        store.save_bytes("k", None);

        assert_eq!(store.load_bytes("k"), Some(b"v".to_vec()));
    }

    #[test]
    fn save_string_none_removes_key() {
        let store = InMemoryStorage::new();
        store.save_string("token", Some("abc")).expect("save");
        assert_eq!(
            store.load_string("token").expect("load"),
            Some("abc".to_string())
        );

        store.save_string("token", None).expect("remove");
        assert_eq!(store.load_string("token").expect("load"), None);
    }

    #[test]
    fn string_and_byte_paths_share_one_entry() {
        let store = InMemoryStorage::new();
        store.save_string("token", Some("héllo")).expect("save");
        assert_eq!(store.load_bytes("token"), Some("héllo".as_bytes().to_vec()));

        store.save_bytes("token", Some(b"raw"));
        assert_eq!(
            store.load_string("token").expect("load"),
            Some("raw".to_string())
        );
    }

    #[test]
    fn load_string_rejects_non_utf8() {
        let store = InMemoryStorage::new();
        Storage::put(&store, "blob", &[0xff, 0xfe]).expect("put");

        let err = store.load_string("blob").expect_err("should fail");
        assert_eq!(
            err,
            StorageError::InvalidUtf8 {
                key: "blob".to_string()
            }
        );
    }

    #[test]
    fn backend_errors_surface_only_on_string_paths() {
        let store = UnavailableStorage;

        assert_eq!(store.load_bytes("k"), None);
        assert_eq!(store.load_object::<u32>("k"), None);
        store.save_bytes("k", Some(b"v"));
        store.remove_object("k");
        store.save_object("k", &1u32).expect("write failure is swallowed");

        assert_eq!(store.save_string("k", Some("v")), Err(unavailable()));
        assert_eq!(store.load_string("k"), Err(unavailable()));
    }

    #[test]
    fn helpers_work_through_trait_objects() {
        let store: Box<dyn Storage> = Box::new(InMemoryStorage::new());
        store.save_object("k", &vec![1, 2, 3]).expect("save");

        assert_eq!(store.load_object::<Vec<i32>>("k"), Some(vec![1, 2, 3]));
    }

    mod non_blocking {
        use super::super::{AsyncStorage, AsyncStorageExt, InMemoryStorage};
        use super::Profile;

        #[tokio::test]
        async fn object_round_trip_and_remove() {
            let store = InMemoryStorage::new();
            let profile = Profile {
                name: "grace".into(),
                launches: 1,
            };

            store.save_object("profile", &profile).await.expect("save");
            assert_eq!(
                store.load_object::<Profile>("profile").await,
                Some(profile)
            );

            store.remove_object("profile").await;
            assert_eq!(store.load_object::<Profile>("profile").await, None);
        }

        #[tokio::test]
        async fn malformed_payload_reads_as_absent() {
            let store = InMemoryStorage::new();
            AsyncStorage::put(&store, "profile", b"[1, 2")
                .await
                .expect("put");

            assert_eq!(store.load_object::<Profile>("profile").await, None);
        }
    }
}
