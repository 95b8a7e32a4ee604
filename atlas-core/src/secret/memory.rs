//! In-memory secret keeper.
//!
//! NOT durable and NOT protected. Intended for unit and integration tests of
//! the layers above, including simulating a locked device.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use zeroize::Zeroizing;

use super::SecretKeeper;
use crate::error::{StoreError, StoreResult};

/// Secret keeper backed by a `HashMap`.
#[derive(Default)]
pub struct MemorySecretKeeper {
    secrets: RwLock<HashMap<String, Zeroizing<Vec<u8>>>>,
    locked: AtomicBool,
}

impl MemorySecretKeeper {
    /// Creates an empty, unlocked keeper.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates the device locking: every call fails with `KeyUnavailable`
    /// until [`unlock`](Self::unlock) is called.
    pub fn lock(&self) {
        self.locked.store(true, Ordering::SeqCst);
    }

    /// Reverses [`lock`](Self::lock).
    pub fn unlock(&self) {
        self.locked.store(false, Ordering::SeqCst);
    }

    /// Number of stored secrets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.secrets.read().map_or(0, |secrets| secrets.len())
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_unlocked(&self) -> StoreResult<()> {
        if self.locked.load(Ordering::SeqCst) {
            return Err(StoreError::key_unavailable("secure storage is locked"));
        }
        Ok(())
    }
}

impl std::fmt::Debug for MemorySecretKeeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySecretKeeper")
            .field("entries", &self.len())
            .field("locked", &self.locked.load(Ordering::SeqCst))
            .finish()
    }
}

fn poisoned() -> StoreError {
    StoreError::key_unavailable("secret map poisoned")
}

impl SecretKeeper for MemorySecretKeeper {
    fn get(&self, name: &str) -> StoreResult<Option<Zeroizing<Vec<u8>>>> {
        self.ensure_unlocked()?;
        let secrets = self.secrets.read().map_err(|_| poisoned())?;
        Ok(secrets.get(name).cloned())
    }

    fn set(&self, name: &str, secret: &[u8]) -> StoreResult<()> {
        self.ensure_unlocked()?;
        self.secrets
            .write()
            .map_err(|_| poisoned())?
            .insert(name.to_string(), Zeroizing::new(secret.to_vec()));
        Ok(())
    }

    fn delete(&self, name: &str) -> StoreResult<()> {
        self.ensure_unlocked()?;
        self.secrets.write().map_err(|_| poisoned())?.remove(name);
        Ok(())
    }
}
