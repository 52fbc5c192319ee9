//! File-backed [`AsyncStorage`] with AES-256-GCM encryption at rest.
//!
//! Each key maps to one file named by the URL-safe base64 of the key. A file
//! holds a JSON envelope with the nonce and ciphertext. Replacing a file goes
//! through a temp file in the same directory so readers never see a torn write.
//! Filesystem and cipher work runs on Tokio's blocking pool.

use std::{
    fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use keystash_core::storage::{AsyncStorage, StorageError};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tokio::task;
use tracing::instrument;

use crate::key_provider::KeyProvider;

const NONCE_LEN: usize = 12;

pub struct EncryptedFileStorage<P: KeyProvider> {
    root: PathBuf,
    key_provider: P,
}

impl<P: KeyProvider> EncryptedFileStorage<P> {
    pub fn new(root: impl Into<PathBuf>, key_provider: P) -> Self {
        Self {
            root: root.into(),
            key_provider,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_for(&self, key: &str) -> PathBuf {
        self.root.join(URL_SAFE_NO_PAD.encode(key))
    }

    async fn cipher(&self) -> Result<Aes256Gcm, StorageError> {
        let material = self
            .key_provider
            .get_or_create()
            .await
            .map_err(|e| backend("key provider", e))?;
        Aes256Gcm::new_from_slice(&material.bytes).map_err(|e| backend("cipher init", e))
    }
}

#[async_trait]
impl<P: KeyProvider> AsyncStorage for EncryptedFileStorage<P> {
    #[instrument(skip_all, fields(key = %key))]
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let cipher = self.cipher().await?;
        let path = self.file_for(key);
        let plaintext = value.to_vec();
        off_runtime(move || {
            let envelope = Envelope::seal(&cipher, &plaintext)?;
            let body = serde_json::to_vec(&envelope).map_err(|e| backend("envelope encode", e))?;
            replace_file(&path, &body)
        })
        .await
    }

    #[instrument(skip_all, fields(key = %key))]
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.file_for(key);
        let Some(body) = off_runtime(move || read_if_present(&path)).await? else {
            return Ok(None);
        };
        let cipher = self.cipher().await?;
        off_runtime(move || {
            let envelope: Envelope =
                serde_json::from_slice(&body).map_err(|e| backend("envelope decode", e))?;
            envelope.open(&cipher).map(Some)
        })
        .await
    }

    #[instrument(skip_all, fields(key = %key))]
    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.file_for(key);
        off_runtime(move || match fs::remove_file(&path) {
            Err(err) if err.kind() != ErrorKind::NotFound => Err(backend("remove", err)),
            _ => Ok(()),
        })
        .await
    }
}

/// On-disk form of one entry.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    nonce: String,
    ciphertext: String,
}

impl Envelope {
    fn seal(cipher: &Aes256Gcm, plaintext: &[u8]) -> Result<Self, StorageError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| backend("encrypt", e))?;
        Ok(Self {
            nonce: URL_SAFE_NO_PAD.encode(nonce),
            ciphertext: URL_SAFE_NO_PAD.encode(sealed),
        })
    }

    fn open(&self, cipher: &Aes256Gcm) -> Result<Vec<u8>, StorageError> {
        let nonce = URL_SAFE_NO_PAD
            .decode(&self.nonce)
            .map_err(|e| backend("nonce decode", e))?;
        if nonce.len() != NONCE_LEN {
            return Err(StorageError::Backend {
                reason: format!("expected {NONCE_LEN}-byte nonce, got {}", nonce.len()),
            });
        }
        let sealed = URL_SAFE_NO_PAD
            .decode(&self.ciphertext)
            .map_err(|e| backend("ciphertext decode", e))?;
        cipher
            .decrypt(Nonce::from_slice(&nonce), sealed.as_ref())
            .map_err(|e| backend("decrypt", e))
    }
}

async fn off_runtime<T, F>(work: F) -> Result<T, StorageError>
where
    F: FnOnce() -> Result<T, StorageError> + Send + 'static,
    T: Send + 'static,
{
    task::spawn_blocking(work)
        .await
        .map_err(|e| backend("blocking task", e))?
}

fn replace_file(path: &Path, body: &[u8]) -> Result<(), StorageError> {
    let dir = path.parent().ok_or_else(|| StorageError::Backend {
        reason: format!("no parent directory for {}", path.display()),
    })?;
    fs::create_dir_all(dir).map_err(|e| backend("create dir", e))?;

    let mut staged = NamedTempFile::new_in(dir).map_err(|e| backend("temp file", e))?;
    staged
        .write_all(body)
        .and_then(|_| staged.as_file().sync_all())
        .map_err(|e| backend("write", e))?;
    staged.persist(path).map_err(|e| backend("rename", e.error))?;
    Ok(())
}

fn read_if_present(path: &Path) -> Result<Option<Vec<u8>>, StorageError> {
    match fs::read(path) {
        Ok(body) => Ok(Some(body)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(backend("read", err)),
    }
}

fn backend(context: &str, err: impl std::fmt::Display) -> StorageError {
    StorageError::Backend {
        reason: format!("{context}: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use keystash_core::{
        storage::{AsyncStorageExt, InMemoryStorage},
        AsyncStorableValue, StorableValue,
    };

    use super::*;
    use crate::key_provider::{StoredKeyProvider, DATA_KEY_ACCOUNT};

    type TestStore = EncryptedFileStorage<StoredKeyProvider<InMemoryStorage>>;

    fn store_with_keys(root: &Path, keys: &InMemoryStorage) -> TestStore {
        EncryptedFileStorage::new(root, StoredKeyProvider::new(keys.clone(), DATA_KEY_ACCOUNT))
    }

    #[tokio::test]
    async fn ciphertext_on_disk_hides_plaintext() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_with_keys(dir.path(), &InMemoryStorage::new());

        store
            .put("session/token", b"hunter2-session")
            .await
            .expect("put");
        assert_eq!(
            store.get("session/token").await.expect("get").as_deref(),
            Some(&b"hunter2-session"[..])
        );

        let on_disk = fs::read(store.file_for("session/token")).expect("read file");
        assert!(
            !String::from_utf8_lossy(&on_disk).contains("hunter2"),
            "plaintext must not be stored"
        );
    }

    #[tokio::test]
    async fn absent_and_deleted_keys_read_as_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_with_keys(dir.path(), &InMemoryStorage::new());
        assert_eq!(store.get("never-written").await.expect("get"), None);

        store.put("k", b"v").await.expect("put");
        store.delete("k").await.expect("delete");
        store.delete("k").await.expect("delete again");
        assert_eq!(store.get("k").await.expect("get"), None);
    }

    #[tokio::test]
    async fn truncated_envelope_is_absent_for_typed_reads() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_with_keys(dir.path(), &InMemoryStorage::new());
        store.save_object("count", &3u32).await.expect("save");

        fs::write(store.file_for("count"), br#"{"nonce":"AAAA"}"#).expect("truncate");

        assert!(store.get("count").await.is_err());
        assert_eq!(store.load_object::<u32>("count").await, None);
    }

    #[tokio::test]
    async fn entries_survive_a_fresh_store_over_the_same_key() {
        let dir = tempfile::tempdir().expect("tempdir");
        let keys = InMemoryStorage::new();

        let first = Arc::new(store_with_keys(dir.path(), &keys));
        let mut theme = AsyncStorableValue::load("light".to_string(), "theme", first).await;
        theme
            .set("dark".to_string())
            .expect("runtime present")
            .await
            .expect("write task");

        let reopened = Arc::new(store_with_keys(dir.path(), &keys));
        let theme = AsyncStorableValue::load("light".to_string(), "theme", reopened).await;
        assert_eq!(theme.get(), "dark");
    }

    #[tokio::test]
    async fn application_key_named_like_data_key_cannot_clobber_it() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = Arc::new(InMemoryStorage::new());
        let keys = InMemoryStorage::new();

        let store = store_with_keys(dir.path(), &keys);
        store.save_object("theme", &"dark").await.expect("save");

        let mut clash = StorableValue::new(String::new(), DATA_KEY_ACCOUNT, app);
        clash.set("hello".to_string());

        let reopened = store_with_keys(dir.path(), &keys);
        assert!(reopened.get("theme").await.is_ok());
        assert_eq!(
            reopened.load_object::<String>("theme").await.as_deref(),
            Some("dark")
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_writes_to_distinct_keys_all_land() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(store_with_keys(dir.path(), &InMemoryStorage::new()));

        let writes = (0..8u32).map(|i| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.save_object(&format!("slot-{i}"), &i).await })
        });
        for write in writes.collect::<Vec<_>>() {
            write.await.expect("join").expect("save");
        }

        for i in 0..8u32 {
            assert_eq!(store.load_object::<u32>(&format!("slot-{i}")).await, Some(i));
        }
    }
}
