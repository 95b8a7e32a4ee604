//! Storage path helpers.

use std::path::{Component, Path, PathBuf};

use crate::error::{StoreError, StoreResult};

const STORE_DIRNAME: &str = "AtlasBeforeAfter";
const KEYS_DIRNAME: &str = "AtlasBeforeAfter-keys";

/// Suffix of in-flight temporary files. Logical paths may not use it.
pub(crate) const TEMP_SUFFIX: &str = ".tmp";

/// Paths for persistence artifacts under an application-support root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoragePaths {
    root: PathBuf,
    store_dir: PathBuf,
}

impl StoragePaths {
    /// Builds storage paths rooted at `root` (typically the platform's
    /// application-support directory).
    #[must_use]
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let store_dir = root.join(STORE_DIRNAME);
        Self { root, store_dir }
    }

    /// Returns the application-support root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the private, backup-excluded directory holding every blob.
    #[must_use]
    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    /// Returns the directory used by [`FileSecretKeeper`](crate::secret::FileSecretKeeper)
    /// on development hosts. Kept outside the store directory so a store reset
    /// does not destroy the key.
    #[must_use]
    pub fn keys_dir(&self) -> PathBuf {
        self.root.join(KEYS_DIRNAME)
    }
}

/// Checks that `logical` is a relative, normalized path that stays inside the
/// store root and does not collide with temporary files.
///
/// # Errors
///
/// Returns `InvalidPath` describing the first violation found.
pub fn validate_logical_path(logical: &str) -> StoreResult<()> {
    if logical.is_empty() {
        return Err(StoreError::invalid_path(logical, "empty path"));
    }
    if logical.contains('\\') {
        return Err(StoreError::invalid_path(logical, "backslash separators are not allowed"));
    }

    for component in Path::new(logical).components() {
        match component {
            Component::Normal(part) => {
                let part = part.to_string_lossy();
                if part.starts_with('.') {
                    return Err(StoreError::invalid_path(logical, "hidden components are reserved"));
                }
            }
            Component::ParentDir => {
                return Err(StoreError::invalid_path(logical, "parent traversal"));
            }
            Component::CurDir => {
                return Err(StoreError::invalid_path(logical, "non-normalized component"));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(StoreError::invalid_path(logical, "absolute path"));
            }
        }
    }

    if logical.ends_with('/') {
        return Err(StoreError::invalid_path(logical, "trailing separator"));
    }
    if logical.ends_with(TEMP_SUFFIX) {
        return Err(StoreError::invalid_path(logical, "reserved temporary suffix"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_store_paths() {
        let root = PathBuf::from("/tmp/atlas-paths");
        let paths = StoragePaths::new(&root);
        assert_eq!(paths.root(), root);
        assert_eq!(paths.store_dir(), root.join("AtlasBeforeAfter"));
        assert_eq!(paths.keys_dir(), root.join("AtlasBeforeAfter-keys"));
    }

    #[test_case("db.json" ; "top level")]
    #[test_case("photos/abc/before-def.jpg.enc" ; "nested")]
    #[test_case("consents/abc/def.png.enc" ; "consent")]
    fn test_valid_logical_paths(path: &str) {
        validate_logical_path(path).expect("valid");
    }

    #[test_case("" ; "empty")]
    #[test_case("/etc/passwd" ; "absolute")]
    #[test_case("../outside" ; "parent")]
    #[test_case("photos/../../outside" ; "nested parent")]
    #[test_case("./db.json" ; "current dir")]
    #[test_case("photos/.db.json.1234.tmp" ; "temp file")]
    #[test_case("db.json.tmp" ; "temp suffix")]
    #[test_case("photos/" ; "trailing slash")]
    #[test_case("photos\\a" ; "backslash")]
    fn test_invalid_logical_paths(path: &str) {
        assert!(matches!(
            validate_logical_path(path),
            Err(StoreError::InvalidPath { .. })
        ));
    }
}
