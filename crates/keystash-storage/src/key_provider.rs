use std::sync::Mutex;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use keystash_core::storage::Storage;
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;
use tracing::{debug, instrument};

/// Credential-store service holding the file-store data key. Separate from the
/// application namespace so a caller key named like the account cannot
/// overwrite it.
pub const DATA_KEY_SERVICE: &str = "bundle.keychain.environment.data-key";

/// Account the file-store data key is kept under within [`DATA_KEY_SERVICE`].
pub const DATA_KEY_ACCOUNT: &str = "data-key";

/// Key material used for encryption at rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    /// Identifier for logging/rotation (never log key bytes).
    pub id: String,
    /// 256-bit symmetric key.
    pub bytes: [u8; 32],
}

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("keyring error: {0}")]
    Keyring(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("generation error: {0}")]
    Generation(String),
}

/// Provides access to encryption keys.
#[async_trait]
pub trait KeyProvider: Send + Sync {
    async fn get_or_create(&self) -> Result<KeyMaterial, KeyError>;
}

/// Keeps a data key as base64 text in a [`Storage`], generating it on first use.
///
/// Production wires this to its own keychain service; tests use an in-memory store.
/// The key is cached after the first lookup, and lookups are serialized so two
/// concurrent first writers cannot mint different keys.
pub struct StoredKeyProvider<S: Storage> {
    storage: S,
    account: String,
    cached: Mutex<Option<KeyMaterial>>,
}

impl<S: Storage> StoredKeyProvider<S> {
    pub fn new(storage: S, account: impl Into<String>) -> Self {
        Self {
            storage,
            account: account.into(),
            cached: Mutex::new(None),
        }
    }

    fn cached_or_load(&self) -> Result<KeyMaterial, KeyError> {
        let mut guard = self
            .cached
            .lock()
            .map_err(|err| KeyError::Generation(format!("lock poisoned: {err}")))?;

        if let Some(existing) = guard.clone() {
            return Ok(existing);
        }

        let material = self.load_or_generate()?;
        *guard = Some(material.clone());
        Ok(material)
    }

    fn load_or_generate(&self) -> Result<KeyMaterial, KeyError> {
        let stored = self
            .storage
            .load_string(&self.account)
            .map_err(|e| KeyError::Keyring(e.to_string()))?;
        if let Some(secret) = stored {
            return decode_key(&self.account, &secret);
        }

        debug!(account = %self.account, "generating new data key");
        let material = generate_key(&self.account);
        self.storage
            .save_string(&self.account, Some(&encode_key(&material)))
            .map_err(|e| KeyError::Keyring(e.to_string()))?;
        Ok(material)
    }
}

#[async_trait]
impl<S: Storage> KeyProvider for StoredKeyProvider<S> {
    #[instrument(skip_all, fields(account = %self.account))]
    async fn get_or_create(&self) -> Result<KeyMaterial, KeyError> {
        // Storage calls are synchronous; keep the lock out of the async body.
        self.cached_or_load()
    }
}

fn generate_key(id: &str) -> KeyMaterial {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    KeyMaterial {
        id: id.to_string(),
        bytes,
    }
}

fn encode_key(material: &KeyMaterial) -> String {
    general_purpose::STANDARD.encode(material.bytes)
}

fn decode_key(id: &str, secret: &str) -> Result<KeyMaterial, KeyError> {
    let bytes = general_purpose::STANDARD
        .decode(secret)
        .map_err(|e| KeyError::Decode(e.to_string()))?;

    let bytes: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
        KeyError::Decode(format!("expected 32 bytes, got {}", bytes.len()))
    })?;

    Ok(KeyMaterial {
        id: id.to_string(),
        bytes,
    })
}
