//! End-to-end tests for the breach workflow.
//!
//! Every test drives a [`ManualClock`] so deadlines are crossed
//! deterministically, stores everything in a [`MemoryStore`] and sends through
//! a [`RecordingNotifier`].

use std::sync::Arc;
use std::thread;

use breachflow_types::{
    ActorId, IncidentId, IncidentStatus, NotificationStatus, Severity, StageKind, StageStatus,
    TenantId,
};
use breachflow_workflow::{
    BreachIncident, BreachWorkflowService, Clock, ErrorKind, ManualClock, MemoryStore,
    NewBreachIncident, RecordingNotifier, TimelineEventType, VerificationDecision, WorkflowError,
};
use chrono::{DateTime, Duration, TimeZone, Utc};

struct Fixture {
    service: BreachWorkflowService,
    clock: Arc<ManualClock>,
    transport: Arc<RecordingNotifier>,
    tenant: TenantId,
    officer: ActorId,
    reviewer: ActorId,
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 9, 1, 8, 0, 0).unwrap()
}

fn fixture() -> Fixture {
    let clock = Arc::new(ManualClock::new(t0()));
    let transport = Arc::new(RecordingNotifier::new());
    let service = BreachWorkflowService::builder(Arc::new(MemoryStore::new()), transport.clone())
        .clock(clock.clone())
        .build()
        .expect("service");

    Fixture {
        service,
        clock,
        transport,
        tenant: TenantId::generate(),
        officer: ActorId::generate(),
        reviewer: ActorId::generate(),
    }
}

fn report(f: &Fixture, severity: Option<Severity>) -> NewBreachIncident {
    NewBreachIncident {
        tenant_id: f.tenant,
        title: "Customer database exposed".to_string(),
        description: "Read replica reachable from the internet".to_string(),
        breach_type: Some("unauthorized_access".to_string()),
        breach_date: t0() - Duration::hours(6),
        detection_date: Some(t0()),
        containment_date: None,
        severity,
        affected_users_count: 2,
    }
}

fn create(f: &Fixture, severity: Option<Severity>) -> BreachIncident {
    f.service
        .create_breach_with_workflow(report(f, severity), f.officer)
        .expect("create")
}

fn verified(f: &Fixture) -> BreachIncident {
    let incident = create(f, Some(Severity::High));
    f.service
        .submit_for_verification(incident.id, f.officer)
        .expect("submit");
    f.service
        .verify_breach(incident.id, f.reviewer, VerificationDecision::Approve)
        .expect("verify")
}

fn timeline_len(f: &Fixture, id: IncidentId) -> usize {
    f.service.get_timeline(id).expect("timeline").len()
}

fn in_progress(f: &Fixture, id: IncidentId) -> Vec<StageKind> {
    f.service
        .get_stages(id)
        .expect("stages")
        .into_iter()
        .filter(|s| s.status == StageStatus::InProgress)
        .map(|s| s.stage)
        .collect()
}

fn emails(list: &[&str]) -> Vec<String> {
    list.iter().map(ToString::to_string).collect()
}

// ============================================================================
// Creation
// ============================================================================

#[test]
fn creation_opens_six_stages_with_detection_in_progress() {
    let f = fixture();
    let incident = create(&f, Some(Severity::Low));

    let stages = f.service.get_stages(incident.id).expect("stages");
    assert_eq!(stages.len(), 6);
    assert_eq!(
        stages.iter().map(|s| s.stage).collect::<Vec<_>>(),
        StageKind::ALL.to_vec()
    );
    assert_eq!(in_progress(&f, incident.id), vec![StageKind::Detection]);
    assert!(
        stages[1..]
            .iter()
            .all(|s| s.status == StageStatus::Pending)
    );

    assert_eq!(incident.status(), IncidentStatus::Draft);
    assert_eq!(timeline_len(&f, incident.id), 1);
}

#[test]
fn creation_rejects_invalid_report_without_writing() {
    let f = fixture();
    let mut bad = report(&f, None);
    bad.title.clear();

    let err = f
        .service
        .create_breach_with_workflow(bad, f.officer)
        .expect_err("blank title");
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(f.service.get_breach_register(f.tenant).expect("register").is_empty());
}

// ============================================================================
// Verification
// ============================================================================

#[test]
fn approved_verification_opens_notification_stage() {
    let f = fixture();
    let incident = create(&f, Some(Severity::Medium));
    f.service
        .submit_for_verification(incident.id, f.officer)
        .expect("submit");
    assert_eq!(in_progress(&f, incident.id), vec![StageKind::Verification]);

    let before = timeline_len(&f, incident.id);
    let incident = f
        .service
        .verify_breach(incident.id, f.reviewer, VerificationDecision::Approve)
        .expect("verify");

    assert_eq!(incident.status(), IncidentStatus::Verified);
    assert_eq!(incident.verification().map(|v| v.by), Some(f.reviewer));
    assert_eq!(timeline_len(&f, incident.id), before + 1);

    let stages = f.service.get_stages(incident.id).expect("stages");
    let verification = &stages[StageKind::Verification.ordinal()];
    assert_eq!(verification.status, StageStatus::Approved);
    assert_eq!(verification.approved_by, Some(f.reviewer));
    assert_eq!(in_progress(&f, incident.id), vec![StageKind::Notification]);
}

#[test]
fn rejected_verification_is_terminal() {
    let f = fixture();
    let incident = create(&f, Some(Severity::Medium));
    f.service
        .submit_for_verification(incident.id, f.officer)
        .expect("submit");

    let before = timeline_len(&f, incident.id);
    let incident = f
        .service
        .verify_breach(
            incident.id,
            f.reviewer,
            VerificationDecision::Reject {
                reason: "false positive from IDS".to_string(),
            },
        )
        .expect("reject");

    assert_eq!(incident.status(), IncidentStatus::Rejected);
    assert_eq!(timeline_len(&f, incident.id), before + 1);

    let stages = f.service.get_stages(incident.id).expect("stages");
    let verification = &stages[StageKind::Verification.ordinal()];
    assert_eq!(verification.status, StageStatus::Rejected);
    assert_eq!(
        verification.rejection_reason.as_deref(),
        Some("false positive from IDS")
    );
    assert!(in_progress(&f, incident.id).is_empty());

    let err = f
        .service
        .verify_breach(incident.id, f.reviewer, VerificationDecision::Approve)
        .expect_err("already decided");
    assert_eq!(err.kind(), ErrorKind::Precondition);
}

#[test]
fn approval_of_data_principal_notice_requires_verified() {
    let f = fixture();
    let incident = create(&f, None);

    let err = f
        .service
        .approve_data_principal_notification(incident.id, f.reviewer)
        .expect_err("draft");
    assert_eq!(err.kind(), ErrorKind::Precondition);
    assert!(
        !f.service
            .get_incident(incident.id)
            .expect("get")
            .data_principal_notification_approved()
    );
    assert_eq!(timeline_len(&f, incident.id), 1);
}

// ============================================================================
// Notification
// ============================================================================

#[test]
fn dpb_notice_before_verification_writes_nothing() {
    let f = fixture();
    let incident = create(&f, Some(Severity::Critical));

    let err = f
        .service
        .send_dpb_notification(incident.id, f.officer)
        .expect_err("draft");
    assert!(matches!(err, WorkflowError::Precondition(_)));
    assert!(f.service.get_stakeholders(incident.id).expect("rows").is_empty());
    assert!(f.service.get_communications(incident.id).expect("rows").is_empty());
    assert_eq!(timeline_len(&f, incident.id), 1);
    assert!(f.transport.sent().is_empty());
}

#[test]
fn failed_dpb_notice_is_recorded_and_retriable() {
    let f = fixture();
    let incident = verified(&f);
    f.transport.fail_for("dpb@meity.gov.in");

    let err = f
        .service
        .send_dpb_notification(incident.id, f.officer)
        .expect_err("transport down");
    assert_eq!(err.kind(), ErrorKind::Transport);

    let after_failure = f.service.get_incident(incident.id).expect("get");
    assert_eq!(after_failure.status(), IncidentStatus::Verified);
    assert!(!after_failure.dpb_reported());
    let last = f
        .service
        .get_timeline(incident.id)
        .expect("timeline")
        .pop()
        .expect("entry");
    assert_eq!(last.event_type, TimelineEventType::DpbNotificationFailed);

    f.transport.recover("dpb@meity.gov.in");
    f.service
        .send_dpb_notification(incident.id, f.officer)
        .expect("retry");

    let rows = f.service.get_stakeholders(incident.id).expect("rows");
    assert_eq!(
        rows.iter().map(|r| r.status).collect::<Vec<_>>(),
        vec![NotificationStatus::Failed, NotificationStatus::Sent]
    );
    assert_eq!(f.service.get_communications(incident.id).expect("rows").len(), 2);
}

#[test]
fn data_principal_notice_without_approval_is_refused() {
    let f = fixture();
    let incident = verified(&f);

    let err = f
        .service
        .send_data_principal_notifications(incident.id, &emails(&["a@x.org"]), f.officer)
        .expect_err("not approved");
    assert!(matches!(err, WorkflowError::Precondition(_)));
    assert!(f.transport.sent().is_empty());
}

#[test]
fn fan_out_counts_are_independent_of_which_recipient_fails() {
    for failing in ["a@x.org", "b@x.org", "c@x.org"] {
        let f = fixture();
        let incident = verified(&f);
        f.service
            .approve_data_principal_notification(incident.id, f.reviewer)
            .expect("approve");
        f.transport.fail_for(failing);

        let report = f
            .service
            .send_data_principal_notifications(
                incident.id,
                &emails(&["a@x.org", "b@x.org", "c@x.org"]),
                f.officer,
            )
            .expect("fan-out");

        assert_eq!(report.success_count, 2, "failing {failing}");
        assert_eq!(report.fail_count, 1, "failing {failing}");

        let incident = f.service.get_incident(incident.id).expect("get");
        assert_eq!(incident.notified_users_count(), 2);
        assert_eq!(incident.status(), IncidentStatus::Notified);

        let rows = f.service.get_stakeholders(incident.id).expect("rows");
        let failed: Vec<_> = rows
            .iter()
            .filter(|r| r.status == NotificationStatus::Failed)
            .map(|r| r.contact_email.as_str())
            .collect();
        assert_eq!(failed, vec![failing]);
    }
}

#[test]
fn malformed_address_counts_as_one_failure() {
    let f = fixture();
    let incident = verified(&f);
    f.service
        .approve_data_principal_notification(incident.id, f.reviewer)
        .expect("approve");

    let report = f
        .service
        .send_data_principal_notifications(
            incident.id,
            &emails(&["a@x", "b@x", "not-an-email"]),
            f.officer,
        )
        .expect("fan-out");

    assert_eq!(report.success_count, 2);
    assert_eq!(report.fail_count, 1);
    assert_eq!(f.transport.sent().len(), 2);

    let incident = f.service.get_incident(incident.id).expect("get");
    assert_eq!(incident.status(), IncidentStatus::Notified);
    assert_eq!(incident.notified_users_count(), 2);
}

#[test]
fn follow_up_batch_accumulates_notified_count() {
    let f = fixture();
    let incident = verified(&f);
    f.service
        .approve_data_principal_notification(incident.id, f.reviewer)
        .expect("approve");
    f.service
        .send_data_principal_notifications(incident.id, &emails(&["a@x.org"]), f.officer)
        .expect("first batch");
    let first_notified_at = f
        .service
        .get_incident(incident.id)
        .expect("get")
        .data_principal_notified_at();

    f.clock.advance(Duration::hours(1));
    f.service
        .send_data_principal_notifications(incident.id, &emails(&["late@x.org"]), f.officer)
        .expect("follow-up");

    let incident = f.service.get_incident(incident.id).expect("get");
    assert_eq!(incident.notified_users_count(), 2);
    assert_eq!(incident.data_principal_notified_at(), first_notified_at);
}

// ============================================================================
// SLA and escalation
// ============================================================================

#[test]
fn critical_incident_at_25_hours_is_late_for_principals_only() {
    let f = fixture();
    let incident = create(&f, Some(Severity::Critical));
    assert_eq!(incident.dpb_deadline(), t0() + Duration::hours(72));
    assert_eq!(incident.data_principal_deadline(), t0() + Duration::hours(24));

    f.clock.set(t0() + Duration::hours(25));
    let sla = f.service.check_sla_compliance(incident.id).expect("sla");

    assert!(sla.data_principal.overdue);
    assert!(!sla.data_principal.within_sla);
    assert!(!sla.dpb.overdue);
    assert!(sla.dpb.within_sla);
    assert!(!sla.is_overdue);
}

#[test]
fn missed_dpb_deadline_is_overdue() {
    let f = fixture();
    let incident = create(&f, Some(Severity::Low));

    f.clock.set(t0() + Duration::hours(73));
    let sla = f.service.check_sla_compliance(incident.id).expect("sla");
    assert!(sla.dpb.overdue);
    assert!(!sla.dpb.notified);
    assert!(sla.is_overdue);

    // Read-only: nothing persisted.
    assert!(!f.service.get_incident(incident.id).expect("get").is_overdue());
    assert_eq!(timeline_len(&f, incident.id), 1);
}

#[test]
fn escalation_only_flags_unreported_incidents_past_deadline() {
    let f = fixture();
    let late = create(&f, Some(Severity::Low));
    let reported = verified(&f);
    f.service
        .send_dpb_notification(reported.id, f.officer)
        .expect("dpb");

    f.clock.set(t0() + Duration::hours(80));
    let mut recent = report(&f, Some(Severity::Low));
    recent.detection_date = Some(f.clock.now());
    let fresh = f
        .service
        .create_breach_with_workflow(recent, f.officer)
        .expect("create");

    let report = f
        .service
        .escalate_overdue_breaches(f.tenant)
        .expect("sweep");
    assert_eq!(report.escalated, vec![late.id]);

    assert!(f.service.get_incident(late.id).expect("get").is_overdue());
    assert!(!f.service.get_incident(reported.id).expect("get").is_overdue());
    assert!(!f.service.get_incident(fresh.id).expect("get").is_overdue());

    let last = f
        .service
        .get_timeline(late.id)
        .expect("timeline")
        .pop()
        .expect("entry");
    assert_eq!(last.event_type, TimelineEventType::Escalation);
    assert_eq!(last.performed_by, None);
}

#[test]
fn escalation_is_scoped_to_tenant() {
    let f = fixture();
    create(&f, None);
    f.clock.set(t0() + Duration::hours(100));

    let other = f
        .service
        .escalate_overdue_breaches(TenantId::generate())
        .expect("sweep");
    assert!(other.escalated.is_empty());
}

// ============================================================================
// Full lifecycle
// ============================================================================

#[test]
fn full_lifecycle_shows_up_in_register() {
    let f = fixture();
    let incident = create(&f, Some(Severity::High));
    let id = incident.id;

    f.clock.advance(Duration::hours(1));
    f.service.submit_for_verification(id, f.officer).expect("submit");
    f.clock.advance(Duration::hours(1));
    f.service
        .verify_breach(id, f.reviewer, VerificationDecision::Approve)
        .expect("verify");
    f.clock.advance(Duration::minutes(10));
    f.service
        .approve_data_principal_notification(id, f.reviewer)
        .expect("approve");
    f.clock.advance(Duration::minutes(10));
    f.service.send_dpb_notification(id, f.officer).expect("dpb");
    f.clock.advance(Duration::minutes(10));
    let report = f
        .service
        .send_data_principal_notifications(id, &emails(&["a@x", "b@x"]), f.officer)
        .expect("principals");
    assert_eq!(report.success_count, 2);

    let register = f.service.get_breach_register(f.tenant).expect("register");
    assert_eq!(register.len(), 1);
    let entry = &register[0];

    assert!(entry.incident.dpb_reported());
    assert_eq!(entry.incident.notified_users_count(), 2);
    assert_eq!(entry.incident.status(), IncidentStatus::Notified);
    assert_eq!(
        entry
            .timeline
            .iter()
            .map(|e| e.event_type)
            .collect::<Vec<_>>(),
        vec![
            TimelineEventType::BreachCreated,
            TimelineEventType::SubmittedForVerification,
            TimelineEventType::BreachVerified,
            TimelineEventType::DataPrincipalNotificationApproved,
            TimelineEventType::DpbNotified,
            TimelineEventType::DataPrincipalsNotified,
        ]
    );
    assert!(
        entry
            .timeline
            .windows(2)
            .all(|pair| pair[0].occurred_at <= pair[1].occurred_at)
    );

    let sla = f.service.check_sla_compliance(id).expect("sla");
    assert!(sla.dpb.notified && sla.dpb.within_sla);
    assert!(sla.data_principal.notified && sla.data_principal.within_sla);

    let stages = f.service.get_stages(id).expect("stages");
    assert_eq!(
        stages[StageKind::Notification.ordinal()].status,
        StageStatus::Approved
    );
    assert!(in_progress(&f, id).is_empty());

    // 1 regulator notice + 2 data principal notices.
    assert_eq!(f.transport.sent().len(), 3);
    assert_eq!(f.service.get_communications(id).expect("rows").len(), 3);
}

#[test]
fn timeline_is_stable_across_rereads() {
    let f = fixture();
    let incident = verified(&f);
    f.service
        .approve_data_principal_notification(incident.id, f.reviewer)
        .expect("approve");

    let first = f.service.get_timeline(incident.id).expect("timeline");
    assert_eq!(first.len(), 4);

    f.clock.advance(Duration::hours(2));
    f.service
        .send_dpb_notification(incident.id, f.officer)
        .expect("dpb");

    let second = f.service.get_timeline(incident.id).expect("timeline");
    assert_eq!(second.len(), 5);
    assert_eq!(&second[..4], &first[..]);
}

#[test]
fn register_is_ordered_by_detection_date() {
    let f = fixture();
    let mut later = report(&f, None);
    later.detection_date = Some(t0() + Duration::hours(5));
    let later = f
        .service
        .create_breach_with_workflow(later, f.officer)
        .expect("create");
    let earlier = create(&f, None);

    let ids: Vec<_> = f
        .service
        .get_breach_register(f.tenant)
        .expect("register")
        .into_iter()
        .map(|e| e.incident.id)
        .collect();
    assert_eq!(ids, vec![earlier.id, later.id]);
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn concurrent_verifications_produce_one_decision() {
    let f = fixture();
    let incident = create(&f, Some(Severity::High));
    f.service
        .submit_for_verification(incident.id, f.officer)
        .expect("submit");

    let service = Arc::new(f.service);
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let service = Arc::clone(&service);
            let id = incident.id;
            thread::spawn(move || {
                service.verify_breach(id, ActorId::generate(), VerificationDecision::Approve)
            })
        })
        .collect();

    let results: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().expect("thread"))
        .collect();
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| e.kind() == ErrorKind::Precondition)
    );

    let verified_entries = service
        .get_timeline(incident.id)
        .expect("timeline")
        .into_iter()
        .filter(|e| e.event_type == TimelineEventType::BreachVerified)
        .count();
    assert_eq!(verified_entries, 1);
    assert_eq!(f.clock.now(), t0());
}
