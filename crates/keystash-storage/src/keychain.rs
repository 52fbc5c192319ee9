use keystash_core::storage::{Storage, StorageError};
use tracing::instrument;

/// Service namespace every keychain entry is filed under.
/// Existing installs have data under this name, so it must not change.
pub const SERVICE_NAME: &str = "bundle.keychain.environment";

/// `kSecAttrAccessible` policy of the entries: readable only while the device
/// is unlocked (`kSecAttrAccessibleWhenUnlocked`). `keyring` cannot set it
/// explicitly; it is the default the Apple keychain assigns to the entries it
/// creates.
pub const ACCESSIBILITY: &str = "ak";

/// Storage backed by the OS credential store via the `keyring` crate.
///
/// Each key becomes its own credential entry: the service is the namespace and
/// the key is the account. Text and bytes both go through the secret API, so
/// `save_string` and `load_bytes` see the same UTF-8 payload on every platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeychainStorage {
    service: String,
}

impl Default for KeychainStorage {
    fn default() -> Self {
        Self::new(SERVICE_NAME)
    }
}

impl KeychainStorage {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    fn entry(&self, key: &str) -> Result<keyring::Entry, StorageError> {
        keyring::Entry::new(&self.service, key).map_err(keyring_err)
    }
}

impl Storage for KeychainStorage {
    #[instrument(skip_all, fields(key = %key))]
    fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.entry(key)?.set_secret(value).map_err(keyring_err)
    }

    #[instrument(skip_all, fields(key = %key))]
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        match self.entry(key)?.get_secret() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(keyring_err(err)),
        }
    }

    #[instrument(skip_all, fields(key = %key))]
    fn delete(&self, key: &str) -> Result<(), StorageError> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(keyring_err(err)),
        }
    }
}

fn keyring_err(err: keyring::Error) -> StorageError {
    StorageError::Backend {
        reason: format!("keyring: {err}"),
    }
}
