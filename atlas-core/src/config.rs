//! Settings for opening a repository, with the defaults a fresh install uses.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::paths::StoragePaths;

/// Keychain service identifier under which the key is stored. Matches the
/// identifier existing installations wrote their key under.
pub const DEFAULT_KEYCHAIN_SERVICE: &str = "com.miguel.AtlasBeforeAfter.keychain";

/// Account (secret name) of the single active key.
pub const DEFAULT_KEY_ACCOUNT: &str = "encryption-key-v1";

/// Logical path of the aggregate snapshot.
pub const DEFAULT_SNAPSHOT_PATH: &str = "db.json";

/// JPEG quality for stored photographs.
pub const DEFAULT_JPEG_QUALITY: u8 = 95;

/// Shortest delay handed to the notification scheduler.
pub const DEFAULT_MIN_REMINDER_LEAD: Duration = Duration::from_secs(1);

/// Settings for opening a [`Repository`](crate::Repository).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StoreConfig {
    /// Application-support directory. Blobs live in its `AtlasBeforeAfter`
    /// subdirectory.
    pub root_dir: PathBuf,
    /// Keychain service identifier. Read by
    /// `KeychainSecretKeeper::from_config` and
    /// [`FileSecretKeeper::from_config`](crate::secret::FileSecretKeeper::from_config).
    pub keychain_service: String,
    /// Name of the key inside the secret keeper.
    pub key_account: String,
    /// JPEG quality (1 to 100) for photographs.
    pub jpeg_quality: u8,
    /// Reminders due sooner than this, or in the past, fire after this delay.
    pub min_reminder_lead: Duration,
    /// Logical path of the snapshot blob.
    pub snapshot_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("."),
            keychain_service: DEFAULT_KEYCHAIN_SERVICE.to_string(),
            key_account: DEFAULT_KEY_ACCOUNT.to_string(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            min_reminder_lead: DEFAULT_MIN_REMINDER_LEAD,
            snapshot_path: DEFAULT_SNAPSHOT_PATH.to_string(),
        }
    }
}

impl StoreConfig {
    /// Default settings rooted at `root_dir`.
    #[must_use]
    pub fn new<P: Into<PathBuf>>(root_dir: P) -> Self {
        Self {
            root_dir: root_dir.into(),
            ..Self::default()
        }
    }

    /// Storage paths derived from [`root_dir`](Self::root_dir).
    #[must_use]
    pub fn paths(&self) -> StoragePaths {
        StoragePaths::new(&self.root_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::new("/data/app");
        assert_eq!(config.key_account, "encryption-key-v1");
        assert_eq!(config.keychain_service, "com.miguel.AtlasBeforeAfter.keychain");
        assert_eq!(config.jpeg_quality, 95);
        assert_eq!(config.min_reminder_lead, Duration::from_secs(1));
        assert_eq!(
            config.paths().store_dir(),
            PathBuf::from("/data/app/AtlasBeforeAfter")
        );
    }

    #[test]
    fn test_partial_config_deserializes() {
        let config: StoreConfig =
            serde_json::from_str(r#"{"rootDir":"/tmp/x","jpegQuality":80}"#).expect("json");
        assert_eq!(config.root_dir, PathBuf::from("/tmp/x"));
        assert_eq!(config.jpeg_quality, 80);
        assert_eq!(config.snapshot_path, "db.json");
    }
}
