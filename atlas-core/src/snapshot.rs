//! Whole-value snapshots persisted as one encrypted blob.
//!
//! A [`SnapshotStore`] binds a serializable type to a single logical path.
//! Every save replaces the previous snapshot completely through the blob
//! store's atomic write, so a reader never observes a half-written value.
//!
//! Loading is fail-soft: a missing, undecryptable or undecodable snapshot
//! yields the caller's default and a `warn` log line. Saving propagates every
//! failure.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};

use crate::blob_store::EncryptedBlobStore;
use crate::error::{StoreError, StoreResult};
use crate::paths::validate_logical_path;

/// Typed snapshot persisted at one logical path of an [`EncryptedBlobStore`].
#[derive(Debug)]
pub struct SnapshotStore<T> {
    blobs: Arc<EncryptedBlobStore>,
    path: String,
    _value: PhantomData<fn() -> T>,
}

impl<T: Serialize + DeserializeOwned> SnapshotStore<T> {
    /// Creates a snapshot store writing to `path` inside `blobs`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPath` if `path` is not a valid logical path.
    pub fn new<S: Into<String>>(blobs: Arc<EncryptedBlobStore>, path: S) -> StoreResult<Self> {
        let path = path.into();
        validate_logical_path(&path)?;
        Ok(Self {
            blobs,
            path,
            _value: PhantomData,
        })
    }

    /// Logical path of the snapshot blob.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns `true` if a snapshot has been saved.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.blobs.exists(&self.path)
    }

    /// Loads the stored value, or returns `default` if none can be read.
    pub fn load(&self, default: T) -> T {
        match self.try_load() {
            Ok(Some(value)) => value,
            Ok(None) => {
                log::debug!("no snapshot at '{}', starting from default", self.path);
                default
            }
            Err(err) => {
                log::warn!("discarding unreadable snapshot '{}': {err}", self.path);
                default
            }
        }
    }

    /// Loads the stored value, distinguishing "never saved" from a failure.
    ///
    /// # Errors
    ///
    /// Returns the blob store's error, or `Encode` if the plaintext does not
    /// decode as `T`.
    pub fn try_load(&self) -> StoreResult<Option<T>> {
        let bytes = match self.blobs.read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(err),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StoreError::encode(format!("decoding '{}': {e}", self.path)))
    }

    /// Encodes `value` and atomically replaces the stored snapshot.
    ///
    /// # Errors
    ///
    /// Returns `Encode` if serialization fails, or any blob store error.
    pub fn save(&self, value: &T) -> StoreResult<()> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| StoreError::encode(format!("encoding '{}': {e}", self.path)))?;
        self.blobs.write(&bytes, &self.path)?;
        Ok(())
    }

    /// Removes the stored snapshot. Absent is not an error.
    ///
    /// # Errors
    ///
    /// Returns any blob store error.
    pub fn delete(&self) -> StoreResult<()> {
        self.blobs.delete(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use serde::Deserialize;

    use super::*;
    use crate::cipher::CipherEngine;
    use crate::secret::MemorySecretKeeper;

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Counter {
        #[serde(default)]
        total_count: u32,
        #[serde(default)]
        names: Vec<String>,
    }

    fn store(root: &Path) -> SnapshotStore<Counter> {
        let cipher = Arc::new(CipherEngine::new(
            Arc::new(MemorySecretKeeper::new()),
            "encryption-key-v1",
        ));
        let blobs = Arc::new(EncryptedBlobStore::open(root, cipher).expect("open"));
        SnapshotStore::new(blobs, "db.json").expect("snapshot")
    }

    #[test]
    fn test_fresh_install_loads_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        let snapshots = store(dir.path());
        assert!(!snapshots.exists());
        assert_eq!(snapshots.try_load().expect("load"), None);
        assert_eq!(snapshots.load(Counter::default()), Counter::default());
    }

    #[test]
    fn test_save_then_load_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let snapshots = store(dir.path());
        let value = Counter {
            total_count: 3,
            names: vec!["a".into(), "b".into()],
        };
        snapshots.save(&value).expect("save");
        assert_eq!(snapshots.load(Counter::default()), value);
    }

    #[test]
    fn test_saving_loaded_value_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let snapshots = store(dir.path());
        snapshots
            .save(&Counter {
                total_count: 9,
                names: vec!["x".into()],
            })
            .expect("save");

        let first = snapshots.load(Counter::default());
        snapshots.save(&first).expect("save again");
        assert_eq!(snapshots.load(Counter::default()), first);
    }

    #[test]
    fn test_corrupted_snapshot_loads_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        let snapshots = store(dir.path());
        snapshots
            .save(&Counter {
                total_count: 1,
                names: vec![],
            })
            .expect("save");
        fs::write(dir.path().join("db.json"), b"garbage").expect("corrupt");

        assert!(snapshots
            .try_load()
            .expect_err("corrupt")
            .is_authentication_failure());
        assert_eq!(snapshots.load(Counter::default()), Counter::default());
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let snapshots = store(dir.path());
        snapshots
            .blobs
            .write(br#"{"totalCount":4}"#, "db.json")
            .expect("write");
        assert_eq!(
            snapshots.load(Counter::default()),
            Counter {
                total_count: 4,
                names: vec![],
            }
        );
    }

    #[test]
    fn test_undecodable_plaintext_is_encode_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let snapshots = store(dir.path());
        snapshots.blobs.write(b"[1, 2", "db.json").expect("write");
        assert!(matches!(
            snapshots.try_load(),
            Err(StoreError::Encode { .. })
        ));
    }

    #[test]
    fn test_rejects_invalid_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cipher = Arc::new(CipherEngine::new(
            Arc::new(MemorySecretKeeper::new()),
            "encryption-key-v1",
        ));
        let blobs = Arc::new(EncryptedBlobStore::open(dir.path(), cipher).expect("open"));
        assert!(SnapshotStore::<Counter>::new(blobs, "../db.json").is_err());
    }
}
