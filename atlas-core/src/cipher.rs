//! Authenticated encryption of arbitrary payloads.
//!
//! Uses XChaCha20-Poly1305 with a 24-byte random nonce per call. The nonce and
//! tag travel inside the blob so nothing above this module needs algorithm
//! knowledge.
//!
//! # Blob Format
//!
//! ```text
//! [nonce (24 bytes)][ciphertext][tag (16 bytes)]
//! ```
//!
//! # Key Lifecycle
//!
//! The key lives in a [`SecretKeeper`] under one fixed name. [`CipherEngine::ensure_key`]
//! is the single initialization step: it loads the key, or generates and
//! persists one if the keeper has none, while holding an initialization mutex.
//! `encrypt`/`decrypt` call it implicitly, so a lazily used engine is still
//! race-free.

use std::sync::{Arc, Mutex, OnceLock};

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    Key, XChaCha20Poly1305, XNonce,
};
use rand::{rngs::OsRng, RngCore};
use zeroize::Zeroizing;

use crate::error::{StoreError, StoreResult};
use crate::secret::SecretKeeper;

/// Size of the symmetric key in bytes.
pub const KEY_SIZE: usize = 32;

/// Size of the XChaCha20 nonce in bytes.
pub const NONCE_SIZE: usize = 24;

/// Size of the Poly1305 authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// Encrypts and decrypts payloads with the installation's single key.
pub struct CipherEngine {
    keeper: Arc<dyn SecretKeeper>,
    key_name: String,
    key: OnceLock<Zeroizing<[u8; KEY_SIZE]>>,
    init: Mutex<()>,
}

impl std::fmt::Debug for CipherEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherEngine")
            .field("key_name", &self.key_name)
            .field("key_loaded", &self.key.get().is_some())
            .finish_non_exhaustive()
    }
}

impl CipherEngine {
    /// Creates an engine whose key lives in `keeper` under `key_name`.
    ///
    /// No storage access happens until [`ensure_key`](Self::ensure_key) or
    /// the first encrypt/decrypt.
    #[must_use]
    pub fn new<S: Into<String>>(keeper: Arc<dyn SecretKeeper>, key_name: S) -> Self {
        Self {
            keeper,
            key_name: key_name.into(),
            key: OnceLock::new(),
            init: Mutex::new(()),
        }
    }

    /// Loads the key, creating and persisting one if none exists.
    ///
    /// Idempotent; concurrent callers observe exactly one key.
    ///
    /// # Errors
    ///
    /// Returns `KeyUnavailable` if the keeper cannot be read or written, or if
    /// the stored key has the wrong length.
    pub fn ensure_key(&self) -> StoreResult<()> {
        self.key().map(|_| ())
    }

    /// Returns `true` once the key has been loaded into memory.
    #[must_use]
    pub fn is_key_loaded(&self) -> bool {
        self.key.get().is_some()
    }

    /// Encrypts `plaintext`, binding it to `associated_data` when given.
    ///
    /// # Errors
    ///
    /// Returns `KeyUnavailable` if the key cannot be obtained.
    pub fn encrypt(
        &self,
        plaintext: &[u8],
        associated_data: Option<&[u8]>,
    ) -> StoreResult<Vec<u8>> {
        let cipher = XChaCha20Poly1305::new(Key::from_slice(&self.key()?[..]));

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);

        let ciphertext = cipher
            .encrypt(
                XNonce::from_slice(&nonce_bytes),
                Payload {
                    msg: plaintext,
                    aad: associated_data.unwrap_or_default(),
                },
            )
            .map_err(|e| StoreError::encode(format!("encryption failed: {e}")))?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Decrypts a blob produced by [`encrypt`](Self::encrypt).
    ///
    /// `associated_data` must match what was supplied at encryption time.
    ///
    /// # Errors
    ///
    /// Returns `AuthenticationFailed` if the blob is truncated, tampered with,
    /// was sealed under another key, or the associated data differs. Returns
    /// `KeyUnavailable` if the key cannot be obtained.
    pub fn decrypt(&self, blob: &[u8], associated_data: Option<&[u8]>) -> StoreResult<Vec<u8>> {
        if blob.len() < NONCE_SIZE + TAG_SIZE {
            return Err(StoreError::authentication(format!(
                "blob too short: {} bytes (minimum {})",
                blob.len(),
                NONCE_SIZE + TAG_SIZE
            )));
        }

        let cipher = XChaCha20Poly1305::new(Key::from_slice(&self.key()?[..]));
        let (nonce, payload) = blob.split_at(NONCE_SIZE);

        cipher
            .decrypt(
                XNonce::from_slice(nonce),
                Payload {
                    msg: payload,
                    aad: associated_data.unwrap_or_default(),
                },
            )
            .map_err(|_| StoreError::authentication("tag mismatch"))
    }

    fn key(&self) -> StoreResult<&Zeroizing<[u8; KEY_SIZE]>> {
        if let Some(key) = self.key.get() {
            return Ok(key);
        }

        let _guard = self
            .init
            .lock()
            .map_err(|_| StoreError::key_unavailable("key initialization lock poisoned"))?;

        // Another thread may have finished initialization while we waited.
        if let Some(key) = self.key.get() {
            return Ok(key);
        }

        let key = self.load_or_create_key()?;
        Ok(self.key.get_or_init(|| key))
    }

    fn load_or_create_key(&self) -> StoreResult<Zeroizing<[u8; KEY_SIZE]>> {
        if let Some(bytes) = self.keeper.get(&self.key_name)? {
            if bytes.len() != KEY_SIZE {
                return Err(StoreError::key_unavailable(format!(
                    "stored key has invalid length: {} (expected {KEY_SIZE})",
                    bytes.len()
                )));
            }
            let mut key = Zeroizing::new([0u8; KEY_SIZE]);
            key.copy_from_slice(&bytes);
            log::debug!("loaded encryption key '{}'", self.key_name);
            return Ok(key);
        }

        let mut key = Zeroizing::new([0u8; KEY_SIZE]);
        OsRng.fill_bytes(&mut key[..]);
        self.keeper.set(&self.key_name, &key[..])?;
        log::info!("generated encryption key '{}'", self.key_name);
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret::MemorySecretKeeper;
    use test_case::test_case;

    const KEY_NAME: &str = "encryption-key-v1";

    fn engine() -> (Arc<MemorySecretKeeper>, CipherEngine) {
        let keeper = Arc::new(MemorySecretKeeper::new());
        let engine = CipherEngine::new(keeper.clone(), KEY_NAME);
        (keeper, engine)
    }

    #[test_case(b"" ; "empty")]
    #[test_case(b"x" ; "single byte")]
    #[test_case(b"{\"patients\":[]}" ; "json")]
    #[test_case(&[0u8; 4096] ; "zeros")]
    fn test_round_trip(plaintext: &[u8]) {
        let (_, engine) = engine();
        let blob = engine.encrypt(plaintext, None).expect("encrypt");
        assert_eq!(blob.len(), NONCE_SIZE + plaintext.len() + TAG_SIZE);
        assert_eq!(engine.decrypt(&blob, None).expect("decrypt"), plaintext);
    }

    #[test]
    fn test_fresh_nonce_per_encryption() {
        let (_, engine) = engine();
        let a = engine.encrypt(b"same", None).expect("encrypt");
        let b = engine.encrypt(b"same", None).expect("encrypt");
        assert_ne!(a[..NONCE_SIZE], b[..NONCE_SIZE]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_any_flipped_byte_fails_closed() {
        let (_, engine) = engine();
        let blob = engine.encrypt(b"patient: Jane Doe", None).expect("encrypt");
        for i in 0..blob.len() {
            let mut tampered = blob.clone();
            tampered[i] ^= 0x01;
            match engine.decrypt(&tampered, None) {
                Err(StoreError::AuthenticationFailed { .. }) => {}
                other => panic!("byte {i}: expected AuthenticationFailed, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_wrong_key_fails() {
        let (_, first) = engine();
        let (_, second) = engine();
        let blob = first.encrypt(b"secret", None).expect("encrypt");
        assert!(second
            .decrypt(&blob, None)
            .expect_err("must fail")
            .is_authentication_failure());
    }

    #[test]
    fn test_associated_data_mismatch_fails() {
        let (_, engine) = engine();
        let blob = engine.encrypt(b"secret", Some(b"photos/a.jpg.enc")).expect("encrypt");
        assert_eq!(
            engine.decrypt(&blob, Some(b"photos/a.jpg.enc")).expect("decrypt"),
            b"secret"
        );
        assert!(engine
            .decrypt(&blob, Some(b"photos/b.jpg.enc"))
            .expect_err("must fail")
            .is_authentication_failure());
        assert!(engine
            .decrypt(&blob, None)
            .expect_err("must fail")
            .is_authentication_failure());
    }

    #[test]
    fn test_truncated_blob_fails() {
        let (_, engine) = engine();
        assert!(engine
            .decrypt(&[0u8; NONCE_SIZE + TAG_SIZE - 1], None)
            .expect_err("must fail")
            .is_authentication_failure());
    }

    #[test]
    fn test_key_is_created_once_and_reused() {
        let (keeper, engine) = engine();
        assert!(!engine.is_key_loaded());
        engine.ensure_key().expect("ensure");
        assert!(engine.is_key_loaded());
        let stored = keeper.get(KEY_NAME).expect("get").expect("present");
        assert_eq!(stored.len(), KEY_SIZE);

        let blob = engine.encrypt(b"durable", None).expect("encrypt");
        let restarted = CipherEngine::new(keeper.clone(), KEY_NAME);
        assert_eq!(restarted.decrypt(&blob, None).expect("decrypt"), b"durable");
        assert_eq!(keeper.get(KEY_NAME).expect("get").expect("present"), stored);
    }

    #[test]
    fn test_locked_keeper_does_not_generate_key() {
        let (keeper, engine) = engine();
        keeper.lock();
        assert!(matches!(
            engine.encrypt(b"x", None),
            Err(StoreError::KeyUnavailable { .. })
        ));
        keeper.unlock();
        assert!(keeper.is_empty());
    }

    #[test]
    fn test_wrong_length_key_is_unavailable() {
        let (keeper, engine) = engine();
        keeper.set(KEY_NAME, &[1u8; 16]).expect("set");
        assert!(matches!(
            engine.ensure_key(),
            Err(StoreError::KeyUnavailable { .. })
        ));
    }

    #[test]
    fn test_concurrent_initialization_yields_single_key() {
        let keeper = Arc::new(MemorySecretKeeper::new());
        let engine = Arc::new(CipherEngine::new(keeper.clone(), KEY_NAME));

        let blobs: Vec<Vec<u8>> = (0..8)
            .map(|i| {
                let engine = Arc::clone(&engine);
                std::thread::spawn(move || engine.encrypt(&[i; 8], None).expect("encrypt"))
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|handle| handle.join().expect("join"))
            .collect();

        let reopened = CipherEngine::new(keeper, KEY_NAME);
        for (i, blob) in (0u8..).zip(&blobs) {
            assert_eq!(reopened.decrypt(blob, None).expect("decrypt"), vec![i; 8]);
        }
    }
}
