//! Durable storage for the single symmetric key.
//!
//! The persistence core never sees where or how the key is stored. It talks to
//! a [`SecretKeeper`], which platforms implement on top of their secure-storage
//! facility:
//!
//! - iOS / macOS: Keychain Services ([`KeychainSecretKeeper`], feature `platform-ios`)
//! - Tests: [`MemorySecretKeeper`]
//! - Desktop development hosts: [`FileSecretKeeper`] (unauthenticated, never
//!   selected implicitly)
//!
//! # Failure semantics
//!
//! A keeper must distinguish "no value stored under this name" (`Ok(None)`)
//! from "the storage facility refused to answer" (`Err(KeyUnavailable)`), e.g.
//! while the device is locked. Conflating the two would make the cipher
//! engine generate a fresh key and orphan every existing blob.

mod file;
mod memory;

#[cfg(all(feature = "platform-ios", target_vendor = "apple"))]
mod keychain;

pub use file::FileSecretKeeper;
pub use memory::MemorySecretKeeper;

#[cfg(all(feature = "platform-ios", target_vendor = "apple"))]
pub use keychain::KeychainSecretKeeper;

use zeroize::Zeroizing;

use crate::error::StoreResult;

/// Access-controlled storage for named secrets.
///
/// `set` is an idempotent overwrite: callers observe either the previous value
/// or the new one, never an intermediate state.
pub trait SecretKeeper: Send + Sync {
    /// Returns the secret stored under `name`, or `None` if there is none.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::KeyUnavailable`](crate::StoreError::KeyUnavailable)
    /// if the underlying storage cannot be queried.
    fn get(&self, name: &str) -> StoreResult<Option<Zeroizing<Vec<u8>>>>;

    /// Stores `secret` under `name`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::KeyUnavailable`](crate::StoreError::KeyUnavailable)
    /// if the value cannot be persisted.
    fn set(&self, name: &str, secret: &[u8]) -> StoreResult<()>;

    /// Removes the secret stored under `name`. Removing an absent secret is
    /// not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::KeyUnavailable`](crate::StoreError::KeyUnavailable)
    /// if the storage refuses the operation.
    fn delete(&self, name: &str) -> StoreResult<()>;
}
