//! Encrypted blob store with atomic write semantics.
//!
//! Maps logical relative paths (e.g. `photos/<case>/before-<photo>.jpg.enc`) to
//! ciphertext files under a private root directory. Every blob is sealed by
//! the [`CipherEngine`] with the logical path as associated data, so a blob
//! copied to another location no longer opens.
//!
//! # Atomic Write Pattern
//!
//! 1. Seal the payload
//! 2. Write it to `.<name>.<uuid>.tmp` in the destination directory
//! 3. `fsync` the temporary file
//! 4. Rename it over the final name
//! 5. `fsync` the parent directory
//!
//! Readers therefore see either the complete old blob or the complete new one.
//! Temporary files orphaned by a crash between steps 2 and 4 are swept the
//! next time the store is opened.
//!
//! # Backups
//!
//! On macOS the root gets the Time Machine exclusion attribute
//! (`com.apple.metadata:com_apple_backup_excludeItem`). iOS has no such
//! attribute: the host app must set `isExcludedFromBackup`
//! (`NSURLIsExcludedFromBackupKey`) on [`StoragePaths::store_dir`] itself.
//! Other platforms have nothing to exclude from.
//!
//! [`StoragePaths::store_dir`]: crate::paths::StoragePaths::store_dir

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use uuid::Uuid;

use crate::cipher::CipherEngine;
use crate::error::{StoreError, StoreResult};
use crate::paths::{validate_logical_path, TEMP_SUFFIX};

/// Prefix of the associated data bound into every blob.
const BLOB_AD_PREFIX: &[u8] = b"atlas:blob:";

/// Encrypted file store rooted at a private directory.
#[derive(Debug)]
pub struct EncryptedBlobStore {
    root: PathBuf,
    cipher: Arc<CipherEngine>,
    #[cfg(test)]
    fail_before_rename: std::sync::atomic::AtomicBool,
    #[cfg(test)]
    fail_during_clear: std::sync::atomic::AtomicBool,
}

impl EncryptedBlobStore {
    /// Opens (creating if needed) a store rooted at `root`.
    ///
    /// Marks the root as excluded from device backups and removes temporary
    /// files left behind by interrupted writes.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the root cannot be created or scanned.
    pub fn open<P: AsRef<Path>>(root: P, cipher: Arc<CipherEngine>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| {
            StoreError::io(format!("creating store root '{}'", root.display()), e)
        })?;

        if let Err(err) = exclude_from_backup(&root) {
            log::warn!("could not exclude store root from backups: {err}");
        }

        let swept = sweep_temp_files(&root)?;
        if swept > 0 {
            log::warn!("removed {swept} temporary file(s) left by interrupted writes");
        }

        Ok(Self {
            root,
            cipher,
            #[cfg(test)]
            fail_before_rename: std::sync::atomic::AtomicBool::new(false),
            #[cfg(test)]
            fail_during_clear: std::sync::atomic::AtomicBool::new(false),
        })
    }

    /// Returns the private root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Encrypts `data` and atomically stores it at `relative_path`, creating
    /// intermediate directories as needed.
    ///
    /// Returns the physical location of the blob.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPath` for a malformed logical path, `KeyUnavailable` if
    /// the key cannot be obtained, and `Io` for filesystem failures. On error
    /// any previous blob at `relative_path` is left intact.
    pub fn write(&self, data: &[u8], relative_path: &str) -> StoreResult<PathBuf> {
        let final_path = self.resolve(relative_path)?;
        let sealed = self
            .cipher
            .encrypt(data, Some(&associated_data(relative_path)))?;

        let parent = final_path.parent().unwrap_or(&self.root).to_path_buf();
        fs::create_dir_all(&parent).map_err(|e| {
            StoreError::io(format!("creating directory for '{relative_path}'"), e)
        })?;

        let file_name = final_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp_path = parent.join(format!(
            ".{file_name}.{}{TEMP_SUFFIX}",
            Uuid::new_v4().simple()
        ));

        write_durable(&temp_path, &sealed).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            StoreError::io(format!("writing temporary file for '{relative_path}'"), e)
        })?;

        #[cfg(test)]
        if self
            .fail_before_rename
            .swap(false, std::sync::atomic::Ordering::SeqCst)
        {
            // Leaves the temporary file behind, like a crash would.
            return Err(StoreError::io(
                format!("renaming '{relative_path}' into place"),
                std::io::Error::other("injected fault"),
            ));
        }

        fs::rename(&temp_path, &final_path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            StoreError::io(format!("renaming '{relative_path}' into place"), e)
        })?;

        sync_directory(&parent)?;
        log::debug!("wrote blob '{relative_path}' ({} bytes sealed)", sealed.len());
        Ok(final_path)
    }

    /// Reads and decrypts the blob at `relative_path`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no blob exists, `AuthenticationFailed` if it does
    /// not verify, and `Io` for other filesystem failures.
    pub fn read(&self, relative_path: &str) -> StoreResult<Vec<u8>> {
        let path = self.resolve(relative_path)?;
        let sealed = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::not_found(format!("blob '{relative_path}'")));
            }
            Err(e) => return Err(StoreError::io(format!("reading '{relative_path}'"), e)),
        };

        self.cipher
            .decrypt(&sealed, Some(&associated_data(relative_path)))
            .map_err(|err| match err {
                StoreError::AuthenticationFailed { context } => {
                    StoreError::authentication(format!("blob '{relative_path}': {context}"))
                }
                other => other,
            })
    }

    /// Returns `true` if a blob exists at `relative_path`. Does not decrypt.
    #[must_use]
    pub fn exists(&self, relative_path: &str) -> bool {
        self.resolve(relative_path)
            .map(|path| path.is_file())
            .unwrap_or(false)
    }

    /// Deletes the blob at `relative_path`. Deleting a missing blob is not an
    /// error.
    ///
    /// Callers must drop every reference to the blob before deleting it.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPath` or `Io`.
    pub fn delete(&self, relative_path: &str) -> StoreResult<()> {
        let path = self.resolve(relative_path)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                if let Some(parent) = path.parent() {
                    sync_directory(parent)?;
                }
                log::debug!("deleted blob '{relative_path}'");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(format!("deleting '{relative_path}'"), e)),
        }
    }

    /// Lists the logical paths of every blob below the directory `prefix`,
    /// sorted. Temporary files are skipped; a missing directory lists as empty.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPath` or `Io`.
    pub fn list(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let dir = self.resolve(prefix)?;
        let mut found = Vec::new();
        if dir.is_dir() {
            collect_blobs(&dir, prefix, &mut found)?;
        }
        found.sort();
        Ok(found)
    }

    /// Removes every blob and directory under the root, keeping the root.
    ///
    /// Entries are removed one by one, so a failure can leave some of them
    /// behind.
    ///
    /// # Errors
    ///
    /// Returns `Io` if an entry cannot be removed.
    pub fn clear(&self) -> StoreResult<()> {
        let entries = fs::read_dir(&self.root)
            .map_err(|e| StoreError::io("listing store root", e))?;
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io("listing store root", e))?;
            let path = entry.path();
            let result = if path.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            result.map_err(|e| StoreError::io(format!("removing '{}'", path.display()), e))?;

            #[cfg(test)]
            if self
                .fail_during_clear
                .swap(false, std::sync::atomic::Ordering::SeqCst)
            {
                return Err(StoreError::io(
                    "clearing store root",
                    std::io::Error::other("injected fault"),
                ));
            }
        }
        sync_directory(&self.root)
    }

    fn resolve(&self, relative_path: &str) -> StoreResult<PathBuf> {
        validate_logical_path(relative_path)?;
        Ok(self.root.join(relative_path))
    }

    #[cfg(test)]
    pub(crate) fn inject_failure_before_rename(&self) {
        self.fail_before_rename
            .store(true, std::sync::atomic::Ordering::SeqCst);
    }

    /// Makes the next `clear` fail after removing its first entry.
    #[cfg(test)]
    pub(crate) fn inject_failure_during_clear(&self) {
        self.fail_during_clear
            .store(true, std::sync::atomic::Ordering::SeqCst);
    }
}

fn associated_data(relative_path: &str) -> Vec<u8> {
    let mut ad = Vec::with_capacity(BLOB_AD_PREFIX.len() + relative_path.len());
    ad.extend_from_slice(BLOB_AD_PREFIX);
    ad.extend_from_slice(relative_path.as_bytes());
    ad
}

fn write_durable(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

#[cfg(unix)]
fn sync_directory(dir: &Path) -> StoreResult<()> {
    File::open(dir)
        .and_then(|handle| handle.sync_all())
        .map_err(|e| StoreError::io(format!("syncing directory '{}'", dir.display()), e))
}

#[cfg(not(unix))]
#[allow(clippy::unnecessary_wraps)]
fn sync_directory(_dir: &Path) -> StoreResult<()> {
    // Directory handles cannot be synced here; rename is still atomic.
    Ok(())
}

fn is_temp_file(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(TEMP_SUFFIX)
}

fn sweep_temp_files(dir: &Path) -> StoreResult<usize> {
    let mut removed = 0;
    let entries =
        fs::read_dir(dir).map_err(|e| StoreError::io(format!("scanning '{}'", dir.display()), e))?;
    for entry in entries {
        let entry = entry.map_err(|e| StoreError::io(format!("scanning '{}'", dir.display()), e))?;
        let path = entry.path();
        if path.is_dir() {
            removed += sweep_temp_files(&path)?;
        } else if is_temp_file(&entry.file_name().to_string_lossy()) {
            fs::remove_file(&path)
                .map_err(|e| StoreError::io(format!("removing '{}'", path.display()), e))?;
            removed += 1;
        }
    }
    Ok(removed)
}

fn collect_blobs(dir: &Path, logical_dir: &str, out: &mut Vec<String>) -> StoreResult<()> {
    let entries =
        fs::read_dir(dir).map_err(|e| StoreError::io(format!("listing '{logical_dir}'"), e))?;
    for entry in entries {
        let entry = entry.map_err(|e| StoreError::io(format!("listing '{logical_dir}'"), e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let logical = format!("{logical_dir}/{name}");
        let path = entry.path();
        if path.is_dir() {
            collect_blobs(&path, &logical, out)?;
        } else if !is_temp_file(&name) {
            out.push(logical);
        }
    }
    Ok(())
}

#[cfg(target_os = "macos")]
fn exclude_from_backup(path: &Path) -> StoreResult<()> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| StoreError::invalid_path(path.display().to_string(), "contains NUL"))?;

    // SAFETY: `c_path` and `BACKUP_EXCLUDE_ATTR` are NUL-terminated and outlive
    // the call; the value is passed with its exact length.
    let rc = unsafe {
        libc::setxattr(
            c_path.as_ptr(),
            BACKUP_EXCLUDE_ATTR.as_ptr().cast(),
            BACKUP_EXCLUDE_VALUE.as_ptr().cast(),
            BACKUP_EXCLUDE_VALUE.len(),
            0,
            0,
        )
    };
    if rc != 0 {
        return Err(StoreError::io(
            "setting backup exclusion attribute",
            std::io::Error::last_os_error(),
        ));
    }
    Ok(())
}

#[cfg(target_os = "macos")]
const BACKUP_EXCLUDE_ATTR: &[u8] = b"com.apple.metadata:com_apple_backup_excludeItem\0";
#[cfg(target_os = "macos")]
const BACKUP_EXCLUDE_VALUE: &[u8] = b"com.apple.backupd";

#[cfg(not(target_os = "macos"))]
#[allow(clippy::unnecessary_wraps)]
fn exclude_from_backup(path: &Path) -> StoreResult<()> {
    if cfg!(target_vendor = "apple") {
        log::info!("host must mark '{}' with isExcludedFromBackup", path.display());
    } else {
        log::debug!(
            "no device backup facility on this platform; '{}' left as is",
            path.display()
        );
    }
    Ok(())
}
