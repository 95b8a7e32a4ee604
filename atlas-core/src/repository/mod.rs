//! The domain repository: the in-memory aggregate and its encrypted mirror.
//!
//! [`Repository`] owns the [`Database`] and is the only writer of the
//! snapshot. Every mutation follows the same sequence:
//!
//! 1. Validate the inputs
//! 2. Write any blob the mutation references
//! 3. Mutate the in-memory aggregate
//! 4. Save the snapshot
//!
//! A blob write failure aborts before step 3, so no reference ever points at
//! a blob that was not written. A failed save is absorbed: it is logged,
//! kept in [`Repository::last_persist_error`] and retried implicitly by the
//! next mutation. Memory is never rolled back.
//!
//! Mutations take `&mut self`. Hosts that share a repository across threads
//! wrap it in their own lock; background photo decryption goes through a
//! [`PhotoReader`] instead.

pub mod layout;

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::blob_store::EncryptedBlobStore;
use crate::cipher::CipherEngine;
use crate::collaborators::{ImageCodec, NotificationScheduler};
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::model::{
    AuditEvent, AuditEventId, AuditEventKind, CaseId, ConsentId, ConsentRecord, Database, Patient,
    PatientId, PhotoAsset, PhotoId, PhotoRole, Procedure, Reminder, ReminderId, SurgicalCase,
};
use crate::secret::SecretKeeper;
use crate::snapshot::SnapshotStore;

/// Title of reminder notifications.
const REMINDER_TITLE: &str = "Follow-up reminder";

/// Read-only access to encrypted photographs from any thread.
#[derive(Debug, Clone)]
pub struct PhotoReader {
    blobs: Arc<EncryptedBlobStore>,
}

impl PhotoReader {
    /// Decrypts the image behind `asset`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `AuthenticationFailed`, `KeyUnavailable` or `Io`.
    pub fn load(&self, asset: &PhotoAsset) -> StoreResult<Vec<u8>> {
        self.blobs.read(&asset.relative_path)
    }
}

/// Clinical records backed by the encrypted store.
pub struct Repository {
    config: StoreConfig,
    blobs: Arc<EncryptedBlobStore>,
    snapshots: SnapshotStore<Database>,
    codec: Arc<dyn ImageCodec>,
    notifier: Arc<dyn NotificationScheduler>,
    db: Database,
    last_persist_error: Option<StoreError>,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("root", &self.blobs.root())
            .field("patients", &self.db.patients.len())
            .field("cases", &self.db.cases.len())
            .field("last_persist_error", &self.last_persist_error)
            .finish_non_exhaustive()
    }
}

impl Repository {
    /// Opens the repository described by `config`.
    ///
    /// Obtains the key first (creating one on a fresh install), then loads the
    /// snapshot. A missing or unreadable snapshot yields an empty database.
    ///
    /// # Errors
    ///
    /// Returns `KeyUnavailable` if the secret keeper refuses access, or `Io`
    /// if the store directory cannot be prepared.
    pub fn open(
        config: StoreConfig,
        keeper: Arc<dyn SecretKeeper>,
        codec: Arc<dyn ImageCodec>,
        notifier: Arc<dyn NotificationScheduler>,
    ) -> StoreResult<Self> {
        let cipher = Arc::new(CipherEngine::new(keeper, config.key_account.clone()));
        cipher.ensure_key()?;

        let blobs = Arc::new(EncryptedBlobStore::open(config.paths().store_dir(), cipher)?);
        let snapshots = SnapshotStore::new(Arc::clone(&blobs), config.snapshot_path.clone())?;
        let db = snapshots.load(Database::default());

        log::info!(
            "opened repository: {} patients, {} cases, {} reminders, {} consents",
            db.patients.len(),
            db.cases.len(),
            db.reminders.len(),
            db.consents.len()
        );

        Ok(Self {
            config,
            blobs,
            snapshots,
            codec,
            notifier,
            db,
            last_persist_error: None,
        })
    }

    /// The whole aggregate.
    #[must_use]
    pub const fn database(&self) -> &Database {
        &self.db
    }

    /// All patients, in creation order.
    #[must_use]
    pub fn patients(&self) -> &[Patient] {
        &self.db.patients
    }

    /// All cases, in creation order.
    #[must_use]
    pub fn cases(&self) -> &[SurgicalCase] {
        &self.db.cases
    }

    /// Looks up a case.
    #[must_use]
    pub fn case(&self, id: CaseId) -> Option<&SurgicalCase> {
        self.db.case(id)
    }

    /// Pending reminders, in scheduling order.
    #[must_use]
    pub fn reminders(&self) -> &[Reminder] {
        &self.db.reminders
    }

    /// Signed consents, in signing order.
    #[must_use]
    pub fn consents(&self) -> &[ConsentRecord] {
        &self.db.consents
    }

    /// The audit log, newest first.
    #[must_use]
    pub fn audit_events(&self) -> &[AuditEvent] {
        &self.db.audit_events
    }

    /// The settings this repository was opened with.
    #[must_use]
    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The most recent save failure, cleared by the next successful save.
    ///
    /// While set, the in-memory aggregate is ahead of the stored snapshot.
    #[must_use]
    pub const fn last_persist_error(&self) -> Option<&StoreError> {
        self.last_persist_error.as_ref()
    }

    /// A handle for decrypting photographs off the mutation thread.
    #[must_use]
    pub fn photo_reader(&self) -> PhotoReader {
        PhotoReader {
            blobs: Arc::clone(&self.blobs),
        }
    }

    /// Adds a patient.
    pub fn create_patient<S: Into<String>>(
        &mut self,
        full_name: S,
        date_of_birth: Option<NaiveDate>,
    ) -> Patient {
        let patient = Patient {
            id: PatientId::new(),
            full_name: full_name.into(),
            date_of_birth,
        };
        self.db.patients.push(patient.clone());
        self.persist();
        patient
    }

    /// Opens a case with both photo slots empty. `patient_id` is not checked.
    pub fn create_case<T: Into<String>, S: Into<String>>(
        &mut self,
        patient_id: PatientId,
        title: T,
        specialty: S,
        procedure: Option<Procedure>,
    ) -> SurgicalCase {
        let case = SurgicalCase {
            id: CaseId::new(),
            patient_id,
            title: title.into(),
            specialty: specialty.into(),
            procedure,
            created_at: Utc::now(),
            before_photo: None,
            after_photo: None,
        };
        self.db.cases.push(case.clone());
        self.persist();
        case
    }

    /// Stores `image` as the case's `role` photo.
    ///
    /// Returns `Ok(None)` without side effects if the case does not exist. A
    /// photo already in the slot is replaced; its blob stays on disk until
    /// [`reclaim_orphaned_blobs`](Self::reclaim_orphaned_blobs).
    ///
    /// # Errors
    ///
    /// Returns `Encode` if the image cannot be converted to JPEG, or any blob
    /// store error. The aggregate is unchanged on error.
    pub fn attach_photo(
        &mut self,
        case_id: CaseId,
        image: &[u8],
        role: PhotoRole,
    ) -> StoreResult<Option<PhotoAsset>> {
        let Some(index) = self.db.cases.iter().position(|c| c.id == case_id) else {
            log::warn!("attach_photo: no case {case_id}");
            return Ok(None);
        };

        let jpeg = self.codec.encode_jpeg(image, self.config.jpeg_quality)?;
        let photo_id = PhotoId::new();
        let relative_path = layout::photo_path(case_id, role, photo_id);
        self.blobs.write(&jpeg, &relative_path)?;

        let asset = PhotoAsset {
            id: photo_id,
            relative_path,
            captured_at: Utc::now(),
            notes: None,
        };
        let case = &mut self.db.cases[index];
        if let Some(previous) = case.photo(role) {
            log::debug!(
                "replacing {role} photo of case {case_id}; '{}' is now unreferenced",
                previous.relative_path
            );
        }
        case.set_photo(role, asset.clone());
        self.persist();
        Ok(Some(asset))
    }

    /// Decrypts the image behind `asset`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `AuthenticationFailed`, `KeyUnavailable` or `Io`.
    pub fn load_photo_data(&self, asset: &PhotoAsset) -> StoreResult<Vec<u8>> {
        self.blobs.read(&asset.relative_path)
    }

    /// Adds a reminder and asks the notifier to deliver it.
    ///
    /// A `fire_date` in the past or closer than the configured minimum lead
    /// is delivered after that minimum lead.
    pub fn schedule_reminder<S: Into<String>>(
        &mut self,
        case_id: CaseId,
        fire_date: DateTime<Utc>,
        message: S,
    ) -> Reminder {
        let reminder = Reminder {
            id: ReminderId::new(),
            case_id,
            fire_date,
            message: message.into(),
        };
        self.db.reminders.push(reminder.clone());
        self.persist();

        let delay = self.reminder_delay(fire_date, Utc::now());
        self.notifier.schedule(
            reminder.id,
            fire_date,
            delay,
            REMINDER_TITLE,
            &reminder.message,
        );

        self.record_audit(
            AuditEventKind::ReminderScheduled,
            Some(case_id),
            Some(format!(
                "reminder {} for {}",
                reminder.id,
                fire_date.to_rfc3339()
            )),
        );
        reminder
    }

    /// Removes a reminder and cancels its notification.
    ///
    /// An unknown id still cancels the notification and is audited.
    pub fn cancel_reminder(&mut self, id: ReminderId) {
        let removed = self
            .db
            .reminders
            .iter()
            .position(|r| r.id == id)
            .map(|index| self.db.reminders.remove(index));
        if removed.is_none() {
            log::debug!("cancel_reminder: no reminder {id}");
        }
        self.persist();
        self.notifier.cancel(id);

        self.record_audit(
            AuditEventKind::ReminderCancelled,
            removed.map(|r| r.case_id),
            Some(format!("reminder {id}")),
        );
    }

    /// Stores a signed consent.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a blank patient name, `Encode` if the
    /// signature cannot be converted to PNG, or any blob store error. The
    /// aggregate is unchanged on error.
    pub fn save_consent<S: Into<String>>(
        &mut self,
        case_id: CaseId,
        patient_name: S,
        procedure: Option<String>,
        signature: &[u8],
    ) -> StoreResult<ConsentRecord> {
        let patient_name = patient_name.into();
        if patient_name.trim().is_empty() {
            return Err(StoreError::invalid_input("patient_name", "must not be blank"));
        }

        let png = self.codec.encode_png(signature)?;
        let consent_id = ConsentId::new();
        let relative_path = layout::consent_path(case_id, consent_id);
        self.blobs.write(&png, &relative_path)?;

        let signed_at = Utc::now();
        let record = ConsentRecord {
            id: consent_id,
            case_id,
            patient_name,
            procedure,
            signed_at,
            signature_asset: PhotoAsset {
                id: PhotoId::new(),
                relative_path,
                captured_at: signed_at,
                notes: None,
            },
        };
        self.db.consents.push(record.clone());
        self.persist();

        self.record_audit(
            AuditEventKind::ConsentCaptured,
            Some(case_id),
            Some(format!("consent {consent_id}")),
        );
        Ok(record)
    }

    /// Prepends an event to the audit log and saves.
    pub fn record_audit(
        &mut self,
        kind: AuditEventKind,
        case_id: Option<CaseId>,
        details: Option<String>,
    ) -> AuditEvent {
        let event = AuditEvent {
            id: AuditEventId::new(),
            timestamp: Utc::now(),
            kind,
            case_id,
            details,
        };
        self.db.audit_events.insert(0, event.clone());
        self.persist();
        log::info!("audit: {kind}");
        event
    }

    /// Writes a plaintext PNG copy of `asset` into `dest_dir` for sharing and
    /// audits the export.
    ///
    /// The file gets a fresh random name. The caller owns it afterwards and
    /// should delete it once the share completes.
    ///
    /// # Errors
    ///
    /// Returns any error from decrypting the photo, `Encode` if it cannot be
    /// converted, or `Io` if the file cannot be written.
    pub fn export_photo(
        &mut self,
        asset: &PhotoAsset,
        case_id: Option<CaseId>,
        dest_dir: &Path,
    ) -> StoreResult<PathBuf> {
        let image = self.blobs.read(&asset.relative_path)?;
        let png = self.codec.encode_png(&image)?;

        let name = Uuid::new_v4().hyphenated().to_string().to_uppercase();
        let destination = dest_dir.join(format!("{name}.png"));
        let temp = dest_dir.join(format!(".{name}.png.tmp"));
        let write = || -> std::io::Result<()> {
            fs::create_dir_all(dest_dir)?;
            let mut file = fs::File::create(&temp)?;
            file.write_all(&png)?;
            file.sync_all()?;
            fs::rename(&temp, &destination)
        };
        write().map_err(|e| {
            let _ = fs::remove_file(&temp);
            StoreError::io(format!("exporting photo {}", asset.id), e)
        })?;

        self.record_audit(
            AuditEventKind::ShareExport,
            case_id,
            Some(format!("photo {}", asset.id)),
        );
        Ok(destination)
    }

    /// Deletes photo and consent blobs that nothing in the aggregate refers
    /// to, such as the previous photo of a replaced slot. Returns how many
    /// were deleted.
    ///
    /// # Errors
    ///
    /// Returns any blob store error; blobs deleted before it stay deleted.
    pub fn reclaim_orphaned_blobs(&mut self) -> StoreResult<usize> {
        let referenced: HashSet<&str> = self.db.referenced_paths().collect();
        let mut reclaimed = 0;
        for prefix in [layout::PHOTOS_DIR, layout::CONSENTS_DIR] {
            for path in self.blobs.list(prefix)? {
                if !referenced.contains(path.as_str()) {
                    self.blobs.delete(&path)?;
                    reclaimed += 1;
                }
            }
        }
        if reclaimed > 0 {
            log::info!("reclaimed {reclaimed} orphaned blob(s)");
        }
        Ok(reclaimed)
    }

    /// Erases every blob, the snapshot and the in-memory aggregate, including
    /// the audit log. Pending reminder notifications are cancelled. The key is
    /// kept.
    ///
    /// The snapshot goes first, then memory, then the remaining blobs. If
    /// emptying the store fails partway, no record survives that could point
    /// at a deleted blob; leftover blobs are orphans for
    /// [`reclaim_orphaned_blobs`](Self::reclaim_orphaned_blobs).
    ///
    /// # Errors
    ///
    /// Returns `Io` if the snapshot or the store cannot be removed. When the
    /// snapshot cannot be deleted nothing has changed.
    pub fn reset(&mut self) -> StoreResult<()> {
        self.snapshots.delete()?;

        let erased = std::mem::take(&mut self.db);
        self.last_persist_error = None;
        for reminder in &erased.reminders {
            self.notifier.cancel(reminder.id);
        }

        self.blobs.clear()?;
        log::warn!("store reset: all records erased");
        Ok(())
    }

    fn reminder_delay(&self, fire_date: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
        (fire_date - now)
            .to_std()
            .unwrap_or(Duration::ZERO)
            .max(self.config.min_reminder_lead)
    }

    fn persist(&mut self) {
        match self.snapshots.save(&self.db) {
            Ok(()) => {
                if self.last_persist_error.take().is_some() {
                    log::info!("snapshot saved after earlier failure");
                }
            }
            Err(err) => {
                log::error!("failed to save snapshot, continuing in memory: {err}");
                self.last_persist_error = Some(err);
            }
        }
    }
}
