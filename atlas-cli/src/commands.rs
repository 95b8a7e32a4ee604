//! Command implementations. Each writes human-readable output to `out`.

use std::io::Write;
use std::path::Path;

use atlas_core::{
    AuditEventKind, CaseId, PatientId, PhotoRole, Procedure, ReminderId, Repository,
};
use chrono::{DateTime, NaiveDate, Utc};
use eyre::WrapErr;

fn warn_if_unsaved(repo: &Repository, out: &mut dyn Write) -> eyre::Result<()> {
    if let Some(err) = repo.last_persist_error() {
        writeln!(out, "warning: change kept in memory only, save failed: {err}")?;
    }
    Ok(())
}

pub fn patient_add(
    repo: &mut Repository,
    out: &mut dyn Write,
    name: String,
    dob: Option<NaiveDate>,
) -> eyre::Result<()> {
    let patient = repo.create_patient(name, dob);
    writeln!(out, "{}", patient.id)?;
    warn_if_unsaved(repo, out)
}

pub fn patient_list(repo: &Repository, out: &mut dyn Write) -> eyre::Result<()> {
    for patient in repo.patients() {
        let dob = patient
            .date_of_birth
            .map_or_else(|| "-".to_string(), |d| d.to_string());
        writeln!(out, "{}  {}  {}", patient.id, dob, patient.full_name)?;
    }
    Ok(())
}

pub fn case_add(
    repo: &mut Repository,
    out: &mut dyn Write,
    patient: PatientId,
    title: String,
    specialty: String,
    procedure: Option<Procedure>,
) -> eyre::Result<()> {
    if repo.database().patient(patient).is_none() {
        tracing::warn!(%patient, "creating case for unknown patient");
    }
    let case = repo.create_case(patient, title, specialty, procedure);
    writeln!(out, "{}", case.id)?;
    warn_if_unsaved(repo, out)
}

pub fn case_list(repo: &Repository, out: &mut dyn Write) -> eyre::Result<()> {
    for case in repo.cases() {
        let slot = |role| if case.photo(role).is_some() { role_mark(role) } else { '-' };
        writeln!(
            out,
            "{}  [{}{}]  {}  ({}{})",
            case.id,
            slot(PhotoRole::Before),
            slot(PhotoRole::After),
            case.title,
            case.specialty,
            case.procedure.map(|p| format!(", {p}")).unwrap_or_default(),
        )?;
    }
    Ok(())
}

const fn role_mark(role: PhotoRole) -> char {
    match role {
        PhotoRole::Before => 'B',
        PhotoRole::After => 'A',
    }
}

pub fn photo_attach(
    repo: &mut Repository,
    out: &mut dyn Write,
    case: CaseId,
    role: PhotoRole,
    file: &Path,
) -> eyre::Result<()> {
    let image = std::fs::read(file).wrap_err_with(|| format!("reading {}", file.display()))?;
    let Some(asset) = repo
        .attach_photo(case, &image, role)
        .wrap_err("attaching photo")?
    else {
        eyre::bail!("no case {case}");
    };
    writeln!(out, "{}  {}", asset.id, asset.relative_path)?;
    warn_if_unsaved(repo, out)
}

pub fn photo_export(
    repo: &mut Repository,
    out: &mut dyn Write,
    case: CaseId,
    role: PhotoRole,
    dest: &Path,
) -> eyre::Result<()> {
    let asset = repo
        .case(case)
        .ok_or_else(|| eyre::eyre!("no case {case}"))?
        .photo(role)
        .cloned()
        .ok_or_else(|| eyre::eyre!("case {case} has no {role} photo"))?;
    let path = repo
        .export_photo(&asset, Some(case), dest)
        .wrap_err("exporting photo")?;
    writeln!(out, "{}", path.display())?;
    warn_if_unsaved(repo, out)
}

pub fn reminder_add(
    repo: &mut Repository,
    out: &mut dyn Write,
    case: CaseId,
    fire_date: DateTime<Utc>,
    message: String,
) -> eyre::Result<()> {
    let reminder = repo.schedule_reminder(case, fire_date, message);
    writeln!(out, "{}  {}", reminder.id, reminder.fire_date.to_rfc3339())?;
    warn_if_unsaved(repo, out)
}

pub fn reminder_list(repo: &Repository, out: &mut dyn Write) -> eyre::Result<()> {
    for reminder in repo.reminders() {
        writeln!(
            out,
            "{}  {}  case {}  {}",
            reminder.id,
            reminder.fire_date.to_rfc3339(),
            reminder.case_id,
            reminder.message
        )?;
    }
    Ok(())
}

pub fn reminder_cancel(
    repo: &mut Repository,
    out: &mut dyn Write,
    id: ReminderId,
) -> eyre::Result<()> {
    repo.cancel_reminder(id);
    writeln!(out, "cancelled {id}")?;
    warn_if_unsaved(repo, out)
}

pub fn consent_add(
    repo: &mut Repository,
    out: &mut dyn Write,
    case: CaseId,
    patient_name: String,
    procedure: Option<String>,
    signature: &Path,
) -> eyre::Result<()> {
    let image =
        std::fs::read(signature).wrap_err_with(|| format!("reading {}", signature.display()))?;
    let record = repo
        .save_consent(case, patient_name, procedure, &image)
        .wrap_err("saving consent")?;
    writeln!(out, "{}  {}", record.id, record.signature_asset.relative_path)?;
    warn_if_unsaved(repo, out)
}

pub fn audit_list(repo: &Repository, out: &mut dyn Write) -> eyre::Result<()> {
    for event in repo.audit_events() {
        let case = event.case_id.map(|c| c.to_string()).unwrap_or_default();
        writeln!(
            out,
            "{}  {:<22} {}  {}",
            event.timestamp.to_rfc3339(),
            event.kind.to_string(),
            case,
            event.details.as_deref().unwrap_or_default()
        )?;
    }
    Ok(())
}

pub fn audit_record(
    repo: &mut Repository,
    out: &mut dyn Write,
    kind: AuditEventKind,
    case: Option<CaseId>,
    details: Option<String>,
) -> eyre::Result<()> {
    let event = repo.record_audit(kind, case, details);
    writeln!(out, "{}", event.id)?;
    warn_if_unsaved(repo, out)
}

pub fn reclaim(repo: &mut Repository, out: &mut dyn Write) -> eyre::Result<()> {
    let count = repo.reclaim_orphaned_blobs().wrap_err("reclaiming blobs")?;
    writeln!(out, "reclaimed {count} blob(s)")?;
    Ok(())
}

pub fn reset(repo: &mut Repository, out: &mut dyn Write) -> eyre::Result<()> {
    repo.reset().wrap_err("resetting store")?;
    writeln!(out, "store erased")?;
    Ok(())
}
