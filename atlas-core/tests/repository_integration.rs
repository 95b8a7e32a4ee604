//! End-to-end repository behavior against a real on-disk store.

mod common;

use std::fs;
use std::sync::Arc;

use atlas_core::{
    AuditEventKind, ImageCodec, NoopNotifier, NotifierCall, PhotoRole, Procedure, RasterCodec,
    Repository, StoreError,
};
use chrono::{TimeDelta, Utc};

#[test]
fn test_fresh_install_starts_empty() {
    let harness = common::Harness::new();
    let repo = harness.open();

    assert!(repo.database().is_empty());
    assert!(repo.last_persist_error().is_none());
    assert_eq!(harness.keeper.len(), 1, "key generated on first open");
}

#[test]
fn test_records_survive_reopen() {
    let harness = common::Harness::new();

    let (case_id, asset) = {
        let mut repo = harness.open();
        let patient = repo.create_patient("Jane Doe", None);
        let case = repo.create_case(
            patient.id,
            "Bilateral upper lids",
            "Oculoplastics",
            Some(Procedure::UpperBlepharoplasty),
        );
        let asset = repo
            .attach_photo(case.id, &common::png(1024, 768), PhotoRole::Before)
            .expect("attach")
            .expect("case exists");
        repo.schedule_reminder(case.id, Utc::now() + TimeDelta::days(7), "Follow-up photos");
        let signature = common::png(400, 120);
        repo.save_consent(case.id, "Jane Doe", Some("Upper Blepharoplasty".into()), &signature)
            .expect("consent");
        (case.id, asset)
    };

    let repo = harness.open();
    assert_eq!(repo.patients().len(), 1);
    assert_eq!(repo.patients()[0].full_name, "Jane Doe");

    let case = repo.case(case_id).expect("case");
    assert_eq!(case.procedure, Some(Procedure::UpperBlepharoplasty));
    assert_eq!(case.before_photo.as_ref(), Some(&asset));

    let jpeg = repo.load_photo_data(&asset).expect("photo");
    assert_eq!(RasterCodec.dimensions(&jpeg).expect("dims"), (1024, 768));

    assert_eq!(repo.reminders().len(), 1);
    assert_eq!(repo.consents().len(), 1);
    let kinds: Vec<_> = repo.audit_events().iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![AuditEventKind::ConsentCaptured, AuditEventKind::ReminderScheduled]
    );
}

#[test]
fn test_camera_jpeg_attaches_as_before_photo() {
    let harness = common::Harness::new();
    let mut repo = Repository::open(
        harness.config(),
        harness.keeper.clone(),
        Arc::new(RasterCodec),
        Arc::new(NoopNotifier),
    )
    .expect("open repository");
    let case = repo.create_case(atlas_core::PatientId::new(), "Left ptosis", "Oculoplastics", None);

    let asset = repo
        .attach_photo(case.id, &common::jpeg(1024, 768), PhotoRole::Before)
        .expect("attach")
        .expect("case exists");
    assert!(repo.last_persist_error().is_none());
    drop(repo);

    let repo = harness.open();
    let case = repo.case(case.id).expect("case");
    assert_eq!(case.before_photo.as_ref(), Some(&asset));
    assert!(case.after_photo.is_none());

    let decoded = repo.load_photo_data(&asset).expect("photo");
    assert_eq!(RasterCodec.dimensions(&decoded).expect("dims"), (1024, 768));
}

#[test]
fn test_nothing_sensitive_is_stored_in_plaintext() {
    let harness = common::Harness::new();
    let mut repo = harness.open();
    let patient = repo.create_patient("Jane Doe", None);
    let case = repo.create_case(patient.id, "Ptosis left", "Oculoplastics", None);
    repo.save_consent(case.id, "Jane Doe", None, &common::png(64, 32))
        .expect("consent");

    let store_dir = harness.store_dir();
    assert!(store_dir.join("db.json").exists());
    assert!(!common::any_file_contains(&store_dir, b"Jane Doe"));
    assert!(!common::any_file_contains(&store_dir, b"Ptosis left"));
    assert!(!common::any_file_contains(&store_dir, b"\x89PNG"));
}

#[test]
fn test_corrupted_snapshot_falls_back_to_empty() {
    let harness = common::Harness::new();
    {
        let mut repo = harness.open();
        repo.create_patient("Jane Doe", None);
    }
    fs::write(harness.store_dir().join("db.json"), b"truncated").expect("corrupt");

    let repo = harness.open();
    assert!(repo.database().is_empty());
}

#[test]
fn test_locked_keychain_is_not_a_fresh_install() {
    let harness = common::Harness::new();
    {
        let mut repo = harness.open();
        repo.create_patient("Jane Doe", None);
    }

    harness.keeper.lock();
    let err = Repository::open(
        harness.config(),
        harness.keeper.clone(),
        Arc::new(RasterCodec),
        harness.notifier.clone(),
    )
    .expect_err("locked");
    assert!(matches!(err, StoreError::KeyUnavailable { .. }));

    harness.keeper.unlock();
    let repo = harness.open();
    assert_eq!(repo.patients().len(), 1);
}

#[test]
fn test_reminder_lifecycle_reaches_notifier() {
    let harness = common::Harness::new();
    let mut repo = harness.open();
    let case = repo.create_case(atlas_core::PatientId::new(), "t", "s", None);

    let reminder = repo.schedule_reminder(case.id, Utc::now() - TimeDelta::hours(1), "test");
    repo.cancel_reminder(reminder.id);

    let calls = harness.notifier.calls();
    assert_eq!(calls.len(), 2);
    assert!(matches!(
        &calls[0],
        NotifierCall::Schedule { id, delay, .. } if *id == reminder.id && !delay.is_zero()
    ));
    assert_eq!(calls[1], NotifierCall::Cancel { id: reminder.id });
    assert!(repo.reminders().is_empty());
}

#[test]
fn test_reset_then_reopen_is_empty() {
    let harness = common::Harness::new();
    {
        let mut repo = harness.open();
        let case = repo.create_case(atlas_core::PatientId::new(), "t", "s", None);
        repo.attach_photo(case.id, &common::png(8, 8), PhotoRole::After)
            .expect("attach");
        repo.record_audit(AuditEventKind::ScreenCaptureDetected, None, None);
        repo.reset().expect("reset");
    }

    let repo = harness.open();
    assert!(repo.database().is_empty());
    assert!(harness.store_dir().exists());
}
