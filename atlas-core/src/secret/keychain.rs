//! Keychain-backed secret keeper for iOS and macOS.
//!
//! Secrets are stored as generic password items under a fixed service
//! identifier, one account per secret name. `security-framework` updates an
//! existing item in place, so `set` never exposes a moment where the key is
//! missing.
//!
//! Status mapping:
//!
//! - `errSecItemNotFound` (-25300) → `Ok(None)`
//! - `errSecInteractionNotAllowed` (-25308, device locked) and every other
//!   failure → `KeyUnavailable`

use security_framework::passwords::{
    delete_generic_password, get_generic_password, set_generic_password,
};
use zeroize::Zeroizing;

use super::SecretKeeper;
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};

const ERR_SEC_ITEM_NOT_FOUND: i32 = -25300;
const ERR_SEC_INTERACTION_NOT_ALLOWED: i32 = -25308;

/// Keychain Services implementation of [`SecretKeeper`].
#[derive(Debug, Clone)]
pub struct KeychainSecretKeeper {
    service: String,
}

impl KeychainSecretKeeper {
    /// Creates a keeper that stores items under `service`.
    #[must_use]
    pub fn new<S: Into<String>>(service: S) -> Self {
        Self {
            service: service.into(),
        }
    }

    /// Creates a keeper for the [`keychain_service`](StoreConfig::keychain_service)
    /// of `config`.
    #[must_use]
    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(config.keychain_service.clone())
    }

    /// The Keychain service identifier.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }
}

fn unavailable(action: &str, name: &str, err: &security_framework::base::Error) -> StoreError {
    if err.code() == ERR_SEC_INTERACTION_NOT_ALLOWED {
        StoreError::key_unavailable(format!("keychain locked while trying to {action} '{name}'"))
    } else {
        StoreError::key_unavailable(format!("keychain failed to {action} '{name}': {err}"))
    }
}

impl SecretKeeper for KeychainSecretKeeper {
    fn get(&self, name: &str) -> StoreResult<Option<Zeroizing<Vec<u8>>>> {
        match get_generic_password(&self.service, name) {
            Ok(bytes) => Ok(Some(Zeroizing::new(bytes))),
            Err(e) if e.code() == ERR_SEC_ITEM_NOT_FOUND => Ok(None),
            Err(e) => Err(unavailable("read", name, &e)),
        }
    }

    fn set(&self, name: &str, secret: &[u8]) -> StoreResult<()> {
        set_generic_password(&self.service, name, secret)
            .map_err(|e| unavailable("store", name, &e))
    }

    fn delete(&self, name: &str) -> StoreResult<()> {
        match delete_generic_password(&self.service, name) {
            Ok(()) => Ok(()),
            Err(e) if e.code() == ERR_SEC_ITEM_NOT_FOUND => Ok(()),
            Err(e) => Err(unavailable("delete", name, &e)),
        }
    }
}
