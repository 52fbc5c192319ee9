//! Core abstractions for keystash: key-value storage contracts and the cached
//! storable value facade built on top of them.
//! Concrete OS-backed stores live in `keystash-storage`.

pub mod key;
pub mod storable;
pub mod storage;

pub use storable::{AsyncStorableValue, StorableValue};
pub use storage::{AsyncStorage, AsyncStorageExt, Storage, StorageError, StorageExt};
