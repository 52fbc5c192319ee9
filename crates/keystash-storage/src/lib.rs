//! Concrete storage backends for keystash.
//! The OS credential store backs small secrets directly and wraps the data key
//! for the AES-GCM encrypted file store.

pub mod config;
pub mod encrypted_file_store;
pub mod key_provider;
pub mod keychain;
