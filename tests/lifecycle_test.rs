//! Lifecycle integration tests
//!
//! Drives the application service end to end over the in-memory stores:
//! - Exactly one active hearing row under sequential and concurrent actions
//! - Closed applications stay closed

use chrono::{Duration, Utc};
use futures::future::join_all;
use std::sync::Arc;

use docket::db::schemas::ApplicationDescription;
use docket::db::{ApplicationDoc, ApplicationStatus, Role};
use docket::lifecycle::{
    Actor, ApplicationService, ApplicationStore, Commit, CommitOutcome, LifecycleAction,
    MemoryApplicationStore, MemoryNotificationSink, NewApplication,
};
use docket::logging::{AuditLogger, MemoryAuditSink};
use docket::DocketError;

// =============================================================================
// Fixtures
// =============================================================================

fn service() -> (ApplicationService, Arc<MemoryAuditSink>) {
    let audit = Arc::new(MemoryAuditSink::new());
    let service = ApplicationService::new(
        Arc::new(MemoryApplicationStore::new()),
        Arc::new(MemoryNotificationSink::new()),
        AuditLogger::new(audit.clone()),
    );
    (service, audit)
}

fn applicant() -> Actor {
    Actor::new("applicant-7", Role::Applicant)
}

fn registrar() -> Actor {
    Actor::new("registrar-2", Role::Registrar)
}

fn officer() -> Actor {
    Actor::new("officer-3", Role::HearingOfficer)
}

fn adjourn(days: i64) -> LifecycleAction {
    LifecycleAction::Adjourn {
        hearing_date: Utc::now() + Duration::days(days),
        reason: Some("counsel unavailable".into()),
    }
}

/// Submit, complete, schedule and open a hearing
async fn under_hearing(service: &ApplicationService) -> ApplicationDoc {
    let new = NewApplication {
        description: ApplicationDescription {
            district: Some("Lahore".into()),
            category: Some("Building".into()),
            ..Default::default()
        },
    };
    let app = service.submit(&applicant(), new).await.unwrap();
    let id = app._id.unwrap();

    service
        .apply(&id, &registrar(), LifecycleAction::MarkComplete)
        .await
        .unwrap();
    service
        .apply(
            &id,
            &registrar(),
            LifecycleAction::ScheduleHearing {
                hearing_date: Utc::now() + Duration::days(3),
                hearing_officer_id: Some("officer-3".into()),
            },
        )
        .await
        .unwrap();
    service
        .apply(&id, &officer(), LifecycleAction::StartHearing)
        .await
        .unwrap()
}

async fn active_rows(service: &ApplicationService, app: &ApplicationDoc) -> usize {
    service
        .hearings(&app._id.unwrap())
        .await
        .unwrap()
        .iter()
        .filter(|h| h.is_active)
        .count()
}

// =============================================================================
// Single active hearing
// =============================================================================

#[tokio::test]
async fn test_adjourn_cycles_keep_one_active_hearing() {
    let (service, _) = service();
    let app = under_hearing(&service).await;
    let id = app._id.unwrap();

    for round in 1..=3 {
        service.apply(&id, &officer(), adjourn(round * 7)).await.unwrap();
        assert_eq!(active_rows(&service, &app).await, 1);

        service
            .apply(&id, &officer(), LifecycleAction::StartHearing)
            .await
            .unwrap();
        assert_eq!(active_rows(&service, &app).await, 1);
    }

    // Initial schedule plus one row per adjournment
    let rows = service.hearings(&id).await.unwrap();
    assert_eq!(rows.len(), 4);
    assert!(rows.last().unwrap().is_active);
    assert!(rows[..3].iter().all(|h| h.deactivated_at.is_some()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_adjournments_one_wins() {
    let (service, _) = service();
    let app = under_hearing(&service).await;
    let id = app._id.unwrap();

    let tasks = (1..=8).map(|n| {
        let service = service.clone();
        tokio::spawn(async move { service.apply(&id, &officer(), adjourn(n)).await })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let wins = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 1, "{results:?}");
    for lost in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(
            matches!(
                lost,
                DocketError::InvalidTransition { .. } | DocketError::Conflict(_)
            ),
            "unexpected error {lost:?}"
        );
    }

    let stored = service.get(&id).await.unwrap();
    assert_eq!(stored.status, ApplicationStatus::HearingScheduled);
    assert_eq!(active_rows(&service, &app).await, 1);
    assert_eq!(service.hearings(&id).await.unwrap().len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_commits_from_same_revision() {
    let store = Arc::new(MemoryApplicationStore::new());
    let service = ApplicationService::new(
        store.clone(),
        Arc::new(MemoryNotificationSink::new()),
        AuditLogger::new(Arc::new(MemoryAuditSink::new())),
    );
    let app = under_hearing(&service).await;
    let id = app._id.unwrap();
    let revision = app.revision;

    let tasks = (1..=6).map(|n| {
        let store = store.clone();
        let current = app.clone();
        tokio::spawn(async move {
            let transition = docket::lifecycle::machine::apply(
                &current,
                &officer(),
                adjourn(n),
                Utc::now(),
            )
            .unwrap();
            store
                .commit(Commit {
                    expected_revision: revision,
                    application: transition.application,
                    hearing: transition.hearing,
                })
                .await
                .unwrap()
        })
    });
    let outcomes: Vec<CommitOutcome> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let committed = outcomes
        .iter()
        .filter(|o| matches!(o, CommitOutcome::Committed(_)))
        .count();
    assert_eq!(committed, 1);

    let stored = store.get(&id).await.unwrap().unwrap();
    assert_eq!(stored.revision, revision + 1);
    assert!(store.active_hearing(&id).await.unwrap().is_some());
    assert_eq!(active_rows(&service, &app).await, 1);
}

// =============================================================================
// Terminal immutability
// =============================================================================

#[tokio::test]
async fn test_approved_application_rejects_every_action() {
    let (service, audit) = service();
    let app = under_hearing(&service).await;
    let id = app._id.unwrap();

    service
        .apply(
            &id,
            &officer(),
            LifecycleAction::SetViolation {
                violation_type_ids: vec!["encroachment".into()],
                remarks: None,
            },
        )
        .await
        .unwrap();
    let approved = service
        .apply(
            &id,
            &officer(),
            LifecycleAction::Approve {
                remarks: Some("violation confirmed".into()),
            },
        )
        .await
        .unwrap();
    assert_eq!(approved.status, ApplicationStatus::ApprovedResolved);
    assert!(approved.closed_at.is_some());
    assert_eq!(approved.closed_by.as_deref(), Some("officer-3"));
    let audited = audit.entries().await.len();

    let err = service
        .apply(
            &id,
            &officer(),
            LifecycleAction::Reject {
                remarks: Some("changed my mind".into()),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DocketError::InvalidTransition { .. }));
    assert_eq!(err.status_code().as_u16(), 409);

    for action in [adjourn(1), LifecycleAction::StartHearing, LifecycleAction::MarkComplete] {
        assert!(service.apply(&id, &officer(), action).await.is_err());
    }

    let after = service.get(&id).await.unwrap();
    assert_eq!(after.status, approved.status);
    assert_eq!(after.closed_at, approved.closed_at);
    assert_eq!(after.closed_by, approved.closed_by);
    assert_eq!(after.revision, approved.revision);
    assert_eq!(audit.entries().await.len(), audited);
}

#[tokio::test]
async fn test_rejected_application_stays_rejected() {
    let (service, _) = service();
    let app = under_hearing(&service).await;
    let id = app._id.unwrap();

    let rejected = service
        .apply(&id, &officer(), LifecycleAction::Reject { remarks: None })
        .await
        .unwrap();
    assert_eq!(rejected.status, ApplicationStatus::RejectedClosed);

    let err = service
        .apply(&id, &officer(), LifecycleAction::Approve { remarks: None })
        .await
        .unwrap_err();
    assert!(matches!(err, DocketError::InvalidTransition { .. }));
    assert_eq!(service.get(&id).await.unwrap(), rejected);
}
