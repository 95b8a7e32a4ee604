//! Logical blob paths for clinical assets.

use crate::model::{CaseId, ConsentId, PhotoId, PhotoRole};

/// Directory holding case photographs.
pub const PHOTOS_DIR: &str = "photos";

/// Directory holding consent signatures.
pub const CONSENTS_DIR: &str = "consents";

/// `photos/<caseId>/<before|after>-<photoId>.jpg.enc`
#[must_use]
pub fn photo_path(case_id: CaseId, role: PhotoRole, photo_id: PhotoId) -> String {
    format!("{PHOTOS_DIR}/{case_id}/{}-{photo_id}.jpg.enc", role.as_str())
}

/// `consents/<caseId>/<consentId>.png.enc`
#[must_use]
pub fn consent_path(case_id: CaseId, consent_id: ConsentId) -> String {
    format!("{CONSENTS_DIR}/{case_id}/{consent_id}.png.enc")
}
