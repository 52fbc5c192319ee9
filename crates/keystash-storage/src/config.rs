use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Result};
use dirs::{config_dir, data_dir};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    encrypted_file_store::EncryptedFileStorage,
    key_provider::{StoredKeyProvider, DATA_KEY_ACCOUNT, DATA_KEY_SERVICE},
    keychain::{KeychainStorage, SERVICE_NAME},
};

/// Storage configuration loaded from `~/.config/keystash/config.toml` (platform-specific).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct StorageConfig {
    /// Keychain service namespace handed to application code.
    pub service: String,
    /// Keychain service holding the file-store data key. Kept apart from
    /// `service` so no application key can collide with it.
    pub key_service: String,
    /// Override for the encrypted file store root.
    pub data_dir: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            service: SERVICE_NAME.to_string(),
            key_service: DATA_KEY_SERVICE.to_string(),
            data_dir: None,
        }
    }
}

impl StorageConfig {
    /// Keychain-backed storage for this service namespace.
    pub fn keychain(&self) -> KeychainStorage {
        KeychainStorage::new(self.service.clone())
    }

    /// Data key provider that keeps its key in the dedicated keychain service.
    pub fn key_provider(&self) -> StoredKeyProvider<KeychainStorage> {
        StoredKeyProvider::new(
            KeychainStorage::new(self.key_service.clone()),
            DATA_KEY_ACCOUNT,
        )
    }

    /// Encrypted file store rooted at `data_dir`, or the platform data dir.
    pub fn file_store(&self) -> Result<EncryptedFileStorage<StoredKeyProvider<KeychainStorage>>> {
        let root = match &self.data_dir {
            Some(root) => root.clone(),
            None => default_data_dir()?,
        };
        debug!(?root, "initializing encrypted store");
        Ok(EncryptedFileStorage::new(root, self.key_provider()))
    }
}

/// Load config from the default path; if missing, return defaults.
pub fn load() -> Result<StorageConfig> {
    let path = default_path()?;
    load_from_path(path)
}

/// Load config from a given path; if missing or empty, return defaults.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<StorageConfig> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(StorageConfig::default());
    }
    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(StorageConfig::default());
    }
    let cfg: StorageConfig = toml::from_str(&contents)?;
    Ok(cfg)
}

/// Resolve the default config path (platform aware).
pub fn default_path() -> Result<PathBuf> {
    let base = config_dir().ok_or_else(|| anyhow!("no config dir available"))?;
    Ok(base.join("keystash").join("config.toml"))
}

/// Resolve the default root for the encrypted file store.
pub fn default_data_dir() -> Result<PathBuf> {
    let base = data_dir().ok_or_else(|| anyhow!("no data dir available"))?;
    Ok(base.join("keystash"))
}

/// Write the config to the default path unless a file is already there.
pub fn write_default_if_missing(config: &StorageConfig) -> Result<PathBuf> {
    let path = default_path()?;
    write_if_missing(config, &path)?;
    Ok(path)
}

/// Write the config to `path`, creating parent directories as needed.
/// Never clobbers an existing file; returns whether a file was written.
pub fn write_if_missing(config: &StorageConfig, path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = toml::to_string_pretty(config)?;
    fs::write(path, body)?;
    Ok(true)
}
