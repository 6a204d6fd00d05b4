//! End-to-end flows with an employer and an employee client sharing one store

use chrono::Duration as ChronoDuration;
use std::sync::Arc;
use std::time::Duration;

use gigwork::domain::SequenceOtpGenerator;
use gigwork::{
    ApplicationRecord, ApplicationStatus, Clock, Config, CoreError, ErrorKind, GigClient, Identity,
    InMemoryApplicationStore, ManualClock, MemoryReconsiderationStore, SessionStatus,
};

struct Marketplace {
    store: Arc<InMemoryApplicationStore>,
    clock: Arc<ManualClock>,
    employee: GigClient,
    employer: GigClient,
}

async fn marketplace(employee_codes: &[&str], employer_codes: &[&str]) -> Marketplace {
    let store = Arc::new(InMemoryApplicationStore::new());
    let clock = Arc::new(ManualClock::default());
    let build = |codes: &[&str]| {
        GigClient::builder(Config::default())
            .reconsideration_store(Arc::new(MemoryReconsiderationStore::new()))
            .otp_generator(Arc::new(SequenceOtpGenerator::new(codes.iter().copied()).unwrap()))
            .clock(clock.clone())
            .build(store.clone())
            .unwrap()
    };
    let employee = build(employee_codes);
    let employer = build(employer_codes);
    employee.sign_in(Identity::employee("ana")).await.unwrap();
    employer.sign_in(Identity::employer("acme")).await.unwrap();
    store.set_hourly_rate("job-7", 2000).await;
    Marketplace {
        store,
        clock,
        employee,
        employer,
    }
}

#[tokio::test]
async fn test_full_work_session() {
    let m = marketplace(&["555000"], &["482913"]).await;

    let applied = m.employee.machine().apply("job-7", "acme").await.unwrap();
    m.employee.flush().await;
    assert!(m.employee.cache().is_applied("job-7"));
    let app_id = applied.application_id.clone();

    let selected = m
        .employer
        .machine()
        .employer_decide(&app_id, ApplicationStatus::Selected)
        .await
        .unwrap();
    assert_eq!(selected.status, ApplicationStatus::Selected);

    let otp = m.employer.sessions().generate_start_otp(&app_id).await.unwrap();
    assert_eq!(otp.as_str(), "482913");
    assert_eq!(otp.as_str().len(), 6);

    let started = m.employee.sessions().verify_start_otp(&app_id, "482913").await.unwrap();
    assert_eq!(started.status, SessionStatus::WorkInProgress);
    assert_eq!(started.started_at, Some(m.clock.now()));
    assert_eq!(
        m.store.application(&app_id).await.unwrap().status,
        ApplicationStatus::WorkInProgress
    );

    m.clock.advance(ChronoDuration::minutes(90));
    let completion = m.employee.sessions().request_completion(&app_id).await.unwrap();
    assert_eq!(completion.as_str(), "555000");

    let writes = m.store.write_count();
    let err = m
        .employer
        .sessions()
        .verify_completion_otp(&app_id, "000555")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::OtpMismatch { .. }));
    assert_eq!(m.store.write_count(), writes);
    assert_eq!(
        m.store.session(&app_id).await.unwrap().status,
        SessionStatus::CompletionPending
    );

    let done = m
        .employer
        .sessions()
        .verify_completion_otp(&app_id, "555000")
        .await
        .unwrap();
    assert_eq!(done.status, SessionStatus::WorkCompleted);
    assert_eq!(done.duration_minutes, Some(90));
    assert_eq!(done.computed_wage_cents, Some(3000));
    assert_eq!(
        m.store.application(&app_id).await.unwrap().status,
        ApplicationStatus::Completed
    );

    let again = m
        .employer
        .sessions()
        .verify_completion_otp(&app_id, "555000")
        .await
        .unwrap_err();
    assert_eq!(again.kind(), ErrorKind::Conflict);

    // Completed work stays in the applied bucket after a resync
    m.employee.sync().refresh().await.unwrap();
    assert!(m.employee.cache().is_applied("job-7"));
    assert!(!m.employee.cache().is_rejected("job-7"));
}

#[tokio::test]
async fn test_regenerated_start_otp_invalidates_first() {
    let m = marketplace(&[], &["111111", "222222"]).await;
    let record = m.employee.machine().apply("job-7", "acme").await.unwrap();
    m.employee.flush().await;
    m.employer
        .machine()
        .employer_decide(&record.application_id, ApplicationStatus::Selected)
        .await
        .unwrap();

    m.employer.sessions().generate_start_otp(&record.application_id).await.unwrap();
    m.employer.sessions().generate_start_otp(&record.application_id).await.unwrap();

    let err = m
        .employee
        .sessions()
        .verify_start_otp(&record.application_id, "111111")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    m.employee
        .sessions()
        .verify_start_otp(&record.application_id, "222222")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_reconsideration_is_one_time() {
    let m = marketplace(&[], &[]).await;
    let cache = m.employee.cache();

    m.employee.machine().mark_not_interested("J1", "acme").await.unwrap();
    assert!(cache.is_rejected("J1"));
    assert!(!cache.is_visible("J1"));

    cache.set_reconsideration_mode(true).await.unwrap();
    assert_eq!(cache.eligible_for_reconsideration(), vec!["J1".to_string()]);
    assert!(cache.is_visible("J1"));

    m.employee.machine().apply("J1", "acme").await.unwrap();
    cache.mark_reconsidered("J1").await.unwrap();
    assert!(cache.is_applied("J1"));
    assert!(!cache.is_rejected("J1"));

    cache.set_reconsideration_mode(false).await.unwrap();
    cache.set_reconsideration_mode(true).await.unwrap();
    assert!(cache.eligible_for_reconsideration().is_empty());
    assert!(!cache.is_visible("J1"));
}

#[tokio::test]
async fn test_latest_record_decides_outcome() {
    let m = marketplace(&[], &[]).await;
    let t1 = m.clock.now() - ChronoDuration::days(3);
    let t2 = m.clock.now() - ChronoDuration::days(1);
    m.store
        .insert_application(ApplicationRecord::new("J2", "ana", "acme", ApplicationStatus::Rejected).at(t1))
        .await;
    m.store
        .insert_application(ApplicationRecord::new("J2", "ana", "acme", ApplicationStatus::Applied).at(t2))
        .await;

    let report = m.employee.sync().refresh().await.unwrap();
    assert_eq!(report.applied, 1);
    assert!(m.employee.cache().is_applied("J2"));
    assert!(!m.employee.cache().is_rejected("J2"));
}

#[tokio::test]
async fn test_sync_timeout_keeps_stale_state() {
    let store = Arc::new(InMemoryApplicationStore::new());
    let mut config = Config::default();
    config.sync.timeout_ms = 40;
    let client = GigClient::builder(config)
        .reconsideration_store(Arc::new(MemoryReconsiderationStore::new()))
        .build(store.clone())
        .unwrap();
    store
        .insert_application(ApplicationRecord::new("J1", "ana", "acme", ApplicationStatus::Applied))
        .await;
    client.sign_in(Identity::employee("ana")).await.unwrap();
    let before = client.cache().snapshot();

    store.set_latency(Duration::from_millis(400));
    let err = client.sync().refresh().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(err.is_retryable());

    let after = client.cache().snapshot();
    assert_eq!(after.version(), before.version());
    assert!(client.cache().is_applied("J1"));
}

#[tokio::test]
async fn test_employer_cannot_drive_employee_transitions() {
    let m = marketplace(&[], &[]).await;
    let err = m.employer.machine().apply("job-7", "acme").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);

    let record = m.employee.machine().apply("job-7", "acme").await.unwrap();
    m.employee.flush().await;
    let err = m
        .employee
        .machine()
        .employer_decide(&record.application_id, ApplicationStatus::Selected)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
}

#[tokio::test]
async fn test_employer_request_normalized_to_rejected() {
    let m = marketplace(&[], &[]).await;
    let record = m.employee.machine().apply("job-7", "acme").await.unwrap();
    m.employee.flush().await;

    let decided = m
        .employer
        .machine()
        .employer_decide(&record.application_id, ApplicationStatus::Shortlisted)
        .await
        .unwrap();
    assert_eq!(decided.status, ApplicationStatus::Rejected);

    m.employee.sync().refresh().await.unwrap();
    assert!(m.employee.cache().is_rejected("job-7"));
}

#[tokio::test]
async fn test_duplicate_application_conflicts() {
    let m = marketplace(&[], &[]).await;
    m.employee.machine().apply("job-7", "acme").await.unwrap();
    let err = m.employee.machine().apply("job-7", "acme").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn test_write_through_failure_keeps_local_state() {
    let m = marketplace(&[], &[]).await;
    m.store.set_offline(true);
    m.employee.machine().mark_not_interested("J5", "acme").await.unwrap();
    m.employee.flush().await;

    assert!(m.employee.cache().is_rejected("J5"));
    assert_eq!(m.employee.write_failures(), 1);
    m.store.set_offline(false);
    assert_eq!(m.store.application_count().await, 0);
}

#[tokio::test]
async fn test_reconsideration_survives_offline_start() {
    let store = Arc::new(InMemoryApplicationStore::new());
    let client = GigClient::builder(Config::default())
        .reconsideration_store(Arc::new(MemoryReconsiderationStore::with_ids(["J1"])))
        .build(store.clone())
        .unwrap();
    store.set_offline(true);

    let err = client.sign_in(Identity::employee("ana")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unavailable);
    assert!(client.user().current().is_some());

    client.machine().mark_not_interested("J1", "acme").await.unwrap();
    client.cache().set_reconsideration_mode(true).await.unwrap();
    assert!(client.cache().eligible_for_reconsideration().is_empty());
}
