//! File-backed secret keeper for development hosts.
//!
//! Each secret is a raw file `<directory>/<name>.key`, written with the
//! write-to-temp-then-rename pattern and `0600` permissions on Unix. The file
//! is NOT access-controlled beyond filesystem permissions, so anything that can
//! read the directory can read the key. Use it for the CLI and local testing,
//! never as a silent fallback for a failing platform keychain.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use zeroize::Zeroizing;

use super::SecretKeeper;
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};

fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Secret keeper that stores each secret in its own file.
#[derive(Debug, Clone)]
pub struct FileSecretKeeper {
    directory: PathBuf,
}

impl FileSecretKeeper {
    /// Creates a keeper rooted at `directory`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns `KeyUnavailable` if the directory cannot be created.
    pub fn new<P: AsRef<Path>>(directory: P) -> StoreResult<Self> {
        let directory = directory.as_ref().to_path_buf();
        fs::create_dir_all(&directory).map_err(|e| {
            StoreError::key_unavailable(format!(
                "cannot create key directory '{}': {e}",
                directory.display()
            ))
        })?;
        Ok(Self { directory })
    }

    /// Creates a keeper for `config`: one directory per
    /// [`keychain_service`](StoreConfig::keychain_service) under the
    /// development key directory, mirroring a Keychain service.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the service is not a plain name and
    /// `KeyUnavailable` if the directory cannot be created.
    pub fn from_config(config: &StoreConfig) -> StoreResult<Self> {
        if !is_plain_name(&config.keychain_service) {
            return Err(StoreError::invalid_input(
                "keychain_service",
                "must only contain [A-Za-z0-9._-] and must not start with '.'",
            ));
        }
        Self::new(config.paths().keys_dir().join(&config.keychain_service))
    }

    /// Directory holding the key files.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn secret_path(&self, name: &str) -> StoreResult<PathBuf> {
        if !is_plain_name(name) {
            return Err(StoreError::invalid_input(
                "name",
                "secret names may only contain [A-Za-z0-9._-] and must not start with '.'",
            ));
        }
        Ok(self.directory.join(format!("{name}.key")))
    }
}

impl SecretKeeper for FileSecretKeeper {
    fn get(&self, name: &str) -> StoreResult<Option<Zeroizing<Vec<u8>>>> {
        let path = self.secret_path(name)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(Zeroizing::new(bytes))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::key_unavailable(format!(
                "cannot read '{}': {e}",
                path.display()
            ))),
        }
    }

    fn set(&self, name: &str, secret: &[u8]) -> StoreResult<()> {
        let path = self.secret_path(name)?;
        let temp_path = self.directory.join(format!(".{name}.key.tmp"));

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let write = || -> std::io::Result<()> {
            let mut file = options.open(&temp_path)?;
            file.write_all(secret)?;
            file.sync_all()?;
            drop(file);
            fs::rename(&temp_path, &path)
        };

        write().map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            StoreError::key_unavailable(format!("cannot write '{}': {e}", path.display()))
        })
    }

    fn delete(&self, name: &str) -> StoreResult<()> {
        let path = self.secret_path(name)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::key_unavailable(format!(
                "cannot delete '{}': {e}",
                path.display()
            ))),
        }
    }
}
