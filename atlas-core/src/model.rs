//! Clinical records held by the repository.
//!
//! Everything here is plain data. The whole graph hangs off [`Database`],
//! which is persisted as one snapshot; field names serialize in camelCase and
//! timestamps as RFC 3339 strings.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use uuid::Uuid;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generates a fresh random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wraps an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// The underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                // Uppercase hyphenated, matching identifiers already on disk.
                write!(f, "{}", self.0.hyphenated().encode_upper(&mut Uuid::encode_buffer()))
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

id_type!(
    /// Identifies a [`Patient`].
    PatientId
);
id_type!(
    /// Identifies a [`SurgicalCase`].
    CaseId
);
id_type!(
    /// Identifies a [`PhotoAsset`].
    PhotoId
);
id_type!(
    /// Identifies a [`Reminder`].
    ReminderId
);
id_type!(
    /// Identifies a [`ConsentRecord`].
    ConsentId
);
id_type!(
    /// Identifies an [`AuditEvent`].
    AuditEventId
);

/// A patient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    /// Identifier.
    pub id: PatientId,
    /// Full name as entered.
    pub full_name: String,
    /// Optional date of birth.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<NaiveDate>,
}

/// Oculoplastic procedures offered in the case picker.
///
/// Serializes as its display name.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter, EnumString,
)]
pub enum Procedure {
    /// Upper Blepharoplasty.
    #[serde(rename = "Upper Blepharoplasty")]
    #[strum(serialize = "Upper Blepharoplasty")]
    UpperBlepharoplasty,
    /// Lower Blepharoplasty.
    #[serde(rename = "Lower Blepharoplasty")]
    #[strum(serialize = "Lower Blepharoplasty")]
    LowerBlepharoplasty,
    /// Ptosis Repair.
    #[serde(rename = "Ptosis Repair")]
    #[strum(serialize = "Ptosis Repair")]
    PtosisRepair,
    /// Brow Lift.
    #[serde(rename = "Brow Lift")]
    #[strum(serialize = "Brow Lift")]
    BrowLift,
    /// Ectropion Repair.
    #[serde(rename = "Ectropion Repair")]
    #[strum(serialize = "Ectropion Repair")]
    EctropionRepair,
    /// Entropion Repair.
    #[serde(rename = "Entropion Repair")]
    #[strum(serialize = "Entropion Repair")]
    EntropionRepair,
    /// Dacryocystorhinostomy (DCR).
    #[serde(rename = "Dacryocystorhinostomy (DCR)")]
    #[strum(serialize = "Dacryocystorhinostomy (DCR)")]
    Dacryocystorhinostomy,
    /// Canthoplasty/Canthopexy.
    #[serde(rename = "Canthoplasty/Canthopexy")]
    #[strum(serialize = "Canthoplasty/Canthopexy")]
    Canthoplasty,
    /// Orbital Decompression.
    #[serde(rename = "Orbital Decompression")]
    #[strum(serialize = "Orbital Decompression")]
    OrbitalDecompression,
}

/// A surgical case with its before and after photo slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurgicalCase {
    /// Identifier.
    pub id: CaseId,
    /// Owning patient. Not checked against the patient list.
    pub patient_id: PatientId,
    /// Free-form title.
    pub title: String,
    /// Specialty, e.g. "Oculoplastics".
    pub specialty: String,
    /// Procedure performed, if chosen.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub procedure: Option<Procedure>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Pre-operative photograph.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_photo: Option<PhotoAsset>,
    /// Post-operative photograph.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_photo: Option<PhotoAsset>,
}

impl SurgicalCase {
    /// The photo occupying `role`'s slot.
    #[must_use]
    pub const fn photo(&self, role: PhotoRole) -> Option<&PhotoAsset> {
        match role {
            PhotoRole::Before => self.before_photo.as_ref(),
            PhotoRole::After => self.after_photo.as_ref(),
        }
    }

    pub(crate) fn set_photo(&mut self, role: PhotoRole, asset: PhotoAsset) {
        match role {
            PhotoRole::Before => self.before_photo = Some(asset),
            PhotoRole::After => self.after_photo = Some(asset),
        }
    }
}

/// Reference to an encrypted image blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoAsset {
    /// Identifier.
    pub id: PhotoId,
    /// Logical path inside the encrypted store.
    pub relative_path: String,
    /// Capture time.
    pub captured_at: DateTime<Utc>,
    /// Optional clinician notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Which slot of a case a photo fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum PhotoRole {
    /// Pre-operative.
    Before,
    /// Post-operative.
    After,
}

impl PhotoRole {
    /// File name prefix used for blobs in this slot.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Before => "before",
            Self::After => "after",
        }
    }
}

/// A scheduled follow-up reminder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    /// Identifier, also used as the notification identifier.
    pub id: ReminderId,
    /// Case the reminder concerns.
    pub case_id: CaseId,
    /// Requested delivery time.
    pub fire_date: DateTime<Utc>,
    /// Notification body.
    pub message: String,
}

/// Kinds of audited events.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter, EnumString,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum AuditEventKind {
    /// A photo left the app through the share sheet.
    ShareExport,
    /// A reminder was scheduled.
    ReminderScheduled,
    /// A reminder was cancelled.
    ReminderCancelled,
    /// A consent signature was captured.
    ConsentCaptured,
    /// The OS reported a screenshot or screen recording.
    ScreenCaptureDetected,
}

/// One entry of the append-only audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    /// Identifier.
    pub id: AuditEventId,
    /// When the event was recorded.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    #[serde(rename = "type")]
    pub kind: AuditEventKind,
    /// Related case, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_id: Option<CaseId>,
    /// Free-form details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// A signed consent form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentRecord {
    /// Identifier.
    pub id: ConsentId,
    /// Case the consent covers.
    pub case_id: CaseId,
    /// Name of the signing patient.
    pub patient_name: String,
    /// Procedure consented to, as free text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub procedure: Option<String>,
    /// Signing time.
    pub signed_at: DateTime<Utc>,
    /// Encrypted PNG of the signature.
    pub signature_asset: PhotoAsset,
}

/// The complete aggregate persisted as one snapshot.
///
/// `audit_events` is kept newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Database {
    /// All patients.
    #[serde(default)]
    pub patients: Vec<Patient>,
    /// All cases.
    #[serde(default)]
    pub cases: Vec<SurgicalCase>,
    /// Pending reminders.
    #[serde(default)]
    pub reminders: Vec<Reminder>,
    /// Signed consents.
    #[serde(default)]
    pub consents: Vec<ConsentRecord>,
    /// Audit log, newest first.
    #[serde(default)]
    pub audit_events: Vec<AuditEvent>,
}

impl Database {
    /// Looks up a case by id.
    #[must_use]
    pub fn case(&self, id: CaseId) -> Option<&SurgicalCase> {
        self.cases.iter().find(|c| c.id == id)
    }

    /// Looks up a patient by id.
    #[must_use]
    pub fn patient(&self, id: PatientId) -> Option<&Patient> {
        self.patients.iter().find(|p| p.id == id)
    }

    /// Returns `true` if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patients.is_empty()
            && self.cases.is_empty()
            && self.reminders.is_empty()
            && self.consents.is_empty()
            && self.audit_events.is_empty()
    }

    /// Logical paths of every blob the aggregate references.
    pub fn referenced_paths(&self) -> impl Iterator<Item = &str> {
        self.cases
            .iter()
            .flat_map(|c| c.before_photo.iter().chain(c.after_photo.iter()))
            .chain(self.consents.iter().map(|c| &c.signature_asset))
            .map(|asset| asset.relative_path.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;
    use test_case::test_case;

    #[test_case(Procedure::UpperBlepharoplasty, "Upper Blepharoplasty")]
    #[test_case(Procedure::Dacryocystorhinostomy, "Dacryocystorhinostomy (DCR)")]
    #[test_case(Procedure::Canthoplasty, "Canthoplasty/Canthopexy")]
    fn test_procedure_names(procedure: Procedure, name: &str) {
        assert_eq!(procedure.to_string(), name);
        assert_eq!(
            serde_json::to_string(&procedure).expect("json"),
            format!("\"{name}\"")
        );
        assert_eq!(name.parse::<Procedure>().expect("parse"), procedure);
    }

    #[test]
    fn test_procedure_list_is_complete() {
        assert_eq!(Procedure::iter().count(), 9);
    }

    #[test]
    fn test_audit_event_wire_format() {
        let event = AuditEvent {
            id: AuditEventId::new(),
            timestamp: DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
                .expect("date")
                .with_timezone(&Utc),
            kind: AuditEventKind::ReminderScheduled,
            case_id: None,
            details: Some("Reminder at 2024-05-02".into()),
        };
        let json: serde_json::Value = serde_json::to_value(&event).expect("json");
        assert_eq!(json["type"], "reminderScheduled");
        assert_eq!(json["timestamp"], "2024-05-01T10:00:00Z");
        assert!(json.get("caseId").is_none());
        assert_eq!(AuditEventKind::ShareExport.to_string(), "shareExport");
    }

    #[test]
    fn test_partial_database_loads() {
        let db: Database = serde_json::from_str(
            r#"{"patients":[{"id":"6F9619FF-8B86-D011-B42D-00C04FC964FF","fullName":"Jane Doe"}]}"#,
        )
        .expect("decode");
        assert_eq!(db.patients.len(), 1);
        assert_eq!(db.patients[0].date_of_birth, None);
        assert!(db.cases.is_empty());
        assert!(db.audit_events.is_empty());
    }

    #[test]
    fn test_id_display_and_parse() {
        let id = CaseId::new();
        let text = id.to_string();
        assert_eq!(text, text.to_uppercase());
        assert_eq!(text.parse::<CaseId>().expect("parse"), id);
    }

    #[test]
    fn test_referenced_paths() {
        let now = Utc::now();
        let asset = |path: &str| PhotoAsset {
            id: PhotoId::new(),
            relative_path: path.into(),
            captured_at: now,
            notes: None,
        };
        let case_id = CaseId::new();
        let db = Database {
            cases: vec![SurgicalCase {
                id: case_id,
                patient_id: PatientId::new(),
                title: "t".into(),
                specialty: "s".into(),
                procedure: None,
                created_at: now,
                before_photo: Some(asset("photos/a/before-1.jpg.enc")),
                after_photo: None,
            }],
            consents: vec![ConsentRecord {
                id: ConsentId::new(),
                case_id,
                patient_name: "p".into(),
                procedure: None,
                signed_at: now,
                signature_asset: asset("consents/a/2.png.enc"),
            }],
            ..Database::default()
        };
        let paths: Vec<_> = db.referenced_paths().collect();
        assert_eq!(paths, vec!["photos/a/before-1.jpg.enc", "consents/a/2.png.enc"]);
    }
}
