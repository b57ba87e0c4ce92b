//! Application service
//!
//! Load, transition, commit. A commit that loses a race is retried once from
//! a fresh read; losing twice surfaces `DocketError::Conflict`. Notifications
//! and audit entries go out after a successful commit and never fail the call.

use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::machine::{self, Actor, LifecycleAction, NewApplication, Transition};
use super::notify::NotificationSink;
use super::store::{ApplicationStore, Commit, CommitOutcome};
use crate::db::schemas::{ApplicationDoc, ApplicationStatus, HearingDateDoc};
use crate::logging::AuditLogger;
use crate::types::{DocketError, Result};

/// Attempts per action: the first plus one retry
const MAX_ATTEMPTS: usize = 2;

#[derive(Clone)]
pub struct ApplicationService {
    store: Arc<dyn ApplicationStore>,
    notifications: Arc<dyn NotificationSink>,
    audit: AuditLogger,
}

impl ApplicationService {
    pub fn new(
        store: Arc<dyn ApplicationStore>,
        notifications: Arc<dyn NotificationSink>,
        audit: AuditLogger,
    ) -> Self {
        Self {
            store,
            notifications,
            audit,
        }
    }

    pub fn store(&self) -> &Arc<dyn ApplicationStore> {
        &self.store
    }

    /// Create a `submitted` application for the acting applicant
    pub async fn submit(&self, actor: &Actor, new: NewApplication) -> Result<ApplicationDoc> {
        let transition = machine::submit(actor, new, Utc::now())?;
        let stored = self.store.insert(transition.application.clone()).await?;

        info!(
            application = %stored.tracking_id,
            applicant = %actor.user_id,
            "Application submitted"
        );
        self.emit(transition).await;
        Ok(stored)
    }

    /// Fetch an application or fail with `NotFound`
    pub async fn get(&self, id: &ObjectId) -> Result<ApplicationDoc> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| DocketError::NotFound(format!("application {}", id.to_hex())))
    }

    /// Hearing rows for an application
    pub async fn hearings(&self, id: &ObjectId) -> Result<Vec<HearingDateDoc>> {
        self.store.hearings(id).await
    }

    /// Apply an action using the current time
    pub async fn apply(
        &self,
        id: &ObjectId,
        actor: &Actor,
        action: LifecycleAction,
    ) -> Result<ApplicationDoc> {
        self.apply_at(id, actor, action, Utc::now()).await
    }

    /// Apply an action as of `now`
    pub async fn apply_at(
        &self,
        id: &ObjectId,
        actor: &Actor,
        action: LifecycleAction,
        now: DateTime<Utc>,
    ) -> Result<ApplicationDoc> {
        for attempt in 1..=MAX_ATTEMPTS {
            let current = self.get(id).await?;
            let transition = machine::apply(&current, actor, action.clone(), now)?;

            let commit = Commit {
                expected_revision: current.revision,
                application: transition.application.clone(),
                hearing: transition.hearing.clone(),
            };

            match self.store.commit(commit).await? {
                CommitOutcome::Committed(stored) => {
                    info!(
                        application = %stored.tracking_id,
                        action = action.name(),
                        from = %transition.from,
                        to = %stored.status,
                        actor = %actor.user_id,
                        "Application transitioned"
                    );
                    self.emit(transition).await;
                    return Ok(stored);
                }
                CommitOutcome::Conflict => {
                    warn!(
                        application = %current.tracking_id,
                        action = action.name(),
                        attempt = attempt,
                        "Concurrent modification, re-reading"
                    );
                }
            }
        }

        Err(DocketError::Conflict(format!(
            "application {} was modified concurrently, try again",
            id.to_hex()
        )))
    }

    /// Move scheduled applications whose hearing date has arrived to `under_hearing`
    ///
    /// Returns the ids that were opened. Per-application failures are logged
    /// and skipped; a concurrent officer action simply wins.
    pub async fn open_due_hearings(&self, now: DateTime<Utc>) -> Result<Vec<ObjectId>> {
        let scheduled = self
            .store
            .list_by_status(ApplicationStatus::HearingScheduled)
            .await?;
        let cutoff = bson::DateTime::from_chrono(now);
        let system = Actor::system();
        let mut opened = Vec::new();

        for app in scheduled {
            let Some(id) = app._id else { continue };
            let due = match self.store.active_hearing(&id).await? {
                Some(hearing) => hearing.is_due(cutoff),
                None => false,
            };
            if !due {
                continue;
            }

            match self
                .apply_at(&id, &system, LifecycleAction::StartHearing, now)
                .await
            {
                Ok(_) => opened.push(id),
                Err(e) => warn!(
                    application = %app.tracking_id,
                    error = %e,
                    "Could not open due hearing"
                ),
            }
        }

        debug!(opened = opened.len(), "Due hearings processed");
        Ok(opened)
    }

    async fn emit(&self, transition: Transition) {
        let sends = transition.notifications.into_iter().map(|notification| {
            let sink = self.notifications.clone();
            async move {
                let recipient = notification.recipient_user_id.clone();
                if let Err(e) = sink.notify(notification).await {
                    warn!(recipient = %recipient, error = %e, "Failed to store notification");
                }
            }
        });
        join_all(sends).await;

        self.audit.log(transition.audit).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::Role;
    use crate::lifecycle::notify::MemoryNotificationSink;
    use crate::lifecycle::store::MemoryApplicationStore;
    use crate::logging::MemoryAuditSink;
    use async_trait::async_trait;
    use chrono::Duration;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Harness {
        service: ApplicationService,
        notifications: Arc<MemoryNotificationSink>,
        audit: Arc<MemoryAuditSink>,
    }

    fn harness_with(store: Arc<dyn ApplicationStore>) -> Harness {
        let notifications = Arc::new(MemoryNotificationSink::new());
        let audit = Arc::new(MemoryAuditSink::new());
        Harness {
            service: ApplicationService::new(
                store,
                notifications.clone(),
                AuditLogger::new(audit.clone()),
            ),
            notifications,
            audit,
        }
    }

    fn harness() -> Harness {
        harness_with(Arc::new(MemoryApplicationStore::new()))
    }

    fn applicant() -> Actor {
        Actor::new("applicant-1", Role::Applicant)
    }

    fn registrar() -> Actor {
        Actor::new("registrar-1", Role::Registrar)
    }

    /// Store that reports a conflict for the first `conflicts` commits
    struct ContendedStore {
        inner: MemoryApplicationStore,
        conflicts: AtomicUsize,
    }

    #[async_trait]
    impl ApplicationStore for ContendedStore {
        async fn insert(&self, application: ApplicationDoc) -> Result<ApplicationDoc> {
            self.inner.insert(application).await
        }
        async fn get(&self, id: &ObjectId) -> Result<Option<ApplicationDoc>> {
            self.inner.get(id).await
        }
        async fn list_by_status(&self, status: ApplicationStatus) -> Result<Vec<ApplicationDoc>> {
            self.inner.list_by_status(status).await
        }
        async fn active_hearing(&self, id: &ObjectId) -> Result<Option<HearingDateDoc>> {
            self.inner.active_hearing(id).await
        }
        async fn hearings(&self, id: &ObjectId) -> Result<Vec<HearingDateDoc>> {
            self.inner.hearings(id).await
        }
        async fn commit(&self, commit: Commit) -> Result<CommitOutcome> {
            let left = self.conflicts.load(Ordering::SeqCst);
            if left > 0 {
                self.conflicts.store(left - 1, Ordering::SeqCst);
                return Ok(CommitOutcome::Conflict);
            }
            self.inner.commit(commit).await
        }
    }

    fn contended(conflicts: usize) -> Arc<ContendedStore> {
        Arc::new(ContendedStore {
            inner: MemoryApplicationStore::new(),
            conflicts: AtomicUsize::new(conflicts),
        })
    }

    #[tokio::test]
    async fn test_submit_and_mark_complete() {
        let h = harness();
        let app = h
            .service
            .submit(&applicant(), NewApplication::default())
            .await
            .unwrap();
        let id = app._id.unwrap();

        let next = h
            .service
            .apply(&id, &registrar(), LifecycleAction::MarkComplete)
            .await
            .unwrap();

        assert_eq!(next.status, ApplicationStatus::Complete);
        assert_eq!(next.revision, 1);
        assert_eq!(h.notifications.for_recipient("applicant-1").await.len(), 2);

        let audit = h.audit.entries().await;
        let actions: Vec<_> = audit.iter().map(|e| e.action.as_str()).collect();
        assert_eq!(actions, vec!["submit", "mark_complete"]);
    }

    #[tokio::test]
    async fn test_guard_failure_leaves_state_untouched() {
        let h = harness();
        let app = h
            .service
            .submit(&applicant(), NewApplication::default())
            .await
            .unwrap();
        let id = app._id.unwrap();

        let err = h
            .service
            .apply(
                &id,
                &registrar(),
                LifecycleAction::MarkIncomplete { remarks: String::new() },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DocketError::Validation(_)));

        let stored = h.service.get(&id).await.unwrap();
        assert_eq!(stored.status, ApplicationStatus::Submitted);
        assert_eq!(stored.revision, 0);
        assert_eq!(h.audit.entries().await.len(), 1);
    }

    #[tokio::test]
    async fn test_single_conflict_is_retried() {
        let store = contended(1);
        let h = harness_with(store.clone());
        let app = h
            .service
            .submit(&applicant(), NewApplication::default())
            .await
            .unwrap();

        let next = h
            .service
            .apply(&app._id.unwrap(), &registrar(), LifecycleAction::MarkComplete)
            .await
            .unwrap();
        assert_eq!(next.status, ApplicationStatus::Complete);
    }

    #[tokio::test]
    async fn test_second_conflict_surfaces() {
        let store = contended(2);
        let h = harness_with(store.clone());
        let app = h
            .service
            .submit(&applicant(), NewApplication::default())
            .await
            .unwrap();

        let err = h
            .service
            .apply(&app._id.unwrap(), &registrar(), LifecycleAction::MarkComplete)
            .await
            .unwrap_err();
        assert!(matches!(err, DocketError::Conflict(_)));
        assert_eq!(err.status_code(), hyper::StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_unknown_application_is_not_found() {
        let h = harness();
        let err = h
            .service
            .apply(&ObjectId::new(), &registrar(), LifecycleAction::MarkComplete)
            .await
            .unwrap_err();
        assert!(matches!(err, DocketError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_open_due_hearings() {
        let h = harness();
        let now = Utc::now();
        let app = h
            .service
            .submit(&applicant(), NewApplication::default())
            .await
            .unwrap();
        let id = app._id.unwrap();

        h.service
            .apply_at(&id, &registrar(), LifecycleAction::MarkComplete, now)
            .await
            .unwrap();
        h.service
            .apply_at(
                &id,
                &registrar(),
                LifecycleAction::ScheduleHearing {
                    hearing_date: now + Duration::hours(2),
                    hearing_officer_id: None,
                },
                now,
            )
            .await
            .unwrap();

        // Not yet due
        assert!(h.service.open_due_hearings(now).await.unwrap().is_empty());

        let later = now + Duration::hours(3);
        assert_eq!(h.service.open_due_hearings(later).await.unwrap(), vec![id]);
        assert_eq!(
            h.service.get(&id).await.unwrap().status,
            ApplicationStatus::UnderHearing
        );
    }
}
