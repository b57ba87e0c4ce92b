//! Application persistence
//!
//! `commit` is the only write path for an existing application. It applies
//! the application write only if the stored `revision` still equals the one
//! the transition was computed from, and in the same atomic unit deactivates
//! every active hearing row before inserting the new one. A lost race comes
//! back as `CommitOutcome::Conflict` rather than an error.

use async_trait::async_trait;
use bson::{doc, oid::ObjectId, Bson, DateTime, Document};
use mongodb::error::TRANSIENT_TRANSACTION_ERROR;
use mongodb::ClientSession;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::db::mongo::{MongoClient, MongoCollection, Timestamped};
use crate::db::schemas::{
    ApplicationDoc, ApplicationStatus, HearingDateDoc, APPLICATION_COLLECTION, HEARING_COLLECTION,
};
use crate::types::{DocketError, Result};

/// Index guarding tracking id uniqueness
const TRACKING_INDEX: &str = "tracking_id_1";

/// Filter selecting the stored application only if it is still at `expected`
///
/// Applications written before revisions existed have no `revision` field and
/// decode as revision 0, so revision 0 also matches a missing field.
fn commit_filter(id: ObjectId, expected: i64) -> Document {
    if expected == 0 {
        doc! { "_id": id, "revision": { "$in": [0_i64, Bson::Null] } }
    } else {
        doc! { "_id": id, "revision": expected }
    }
}

/// A revision-conditional write
#[derive(Debug, Clone, PartialEq)]
pub struct Commit {
    /// Revision the transition was computed from
    pub expected_revision: i64,
    pub application: ApplicationDoc,
    /// New active hearing row, replacing any currently active one
    pub hearing: Option<HearingDateDoc>,
}

/// Result of a commit attempt
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    /// Written; carries the stored application with its new revision
    Committed(ApplicationDoc),
    /// Someone else wrote first; nothing was changed
    Conflict,
}

/// Storage for applications and their hearing rows
#[async_trait]
pub trait ApplicationStore: Send + Sync {
    /// Store a new application; duplicate tracking ids are a constraint violation
    async fn insert(&self, application: ApplicationDoc) -> Result<ApplicationDoc>;

    async fn get(&self, id: &ObjectId) -> Result<Option<ApplicationDoc>>;

    async fn list_by_status(&self, status: ApplicationStatus) -> Result<Vec<ApplicationDoc>>;

    /// The single authoritative hearing row, if any
    async fn active_hearing(&self, application_id: &ObjectId) -> Result<Option<HearingDateDoc>>;

    /// All hearing rows, active or not, oldest first
    async fn hearings(&self, application_id: &ObjectId) -> Result<Vec<HearingDateDoc>>;

    async fn commit(&self, commit: Commit) -> Result<CommitOutcome>;
}

fn application_id(application: &ApplicationDoc) -> Result<ObjectId> {
    application
        ._id
        .ok_or_else(|| DocketError::Internal("application has no id".into()))
}

// ============================================================================
// MongoDB
// ============================================================================

/// MongoDB-backed store; `commit` runs in a multi-document transaction
///
/// Transactions need a replica set or sharded cluster.
#[derive(Clone)]
pub struct MongoApplicationStore {
    client: MongoClient,
    applications: MongoCollection<ApplicationDoc>,
    hearings: MongoCollection<HearingDateDoc>,
}

impl MongoApplicationStore {
    pub fn new(client: MongoClient) -> Self {
        Self {
            applications: client.collection(APPLICATION_COLLECTION),
            hearings: client.collection(HEARING_COLLECTION),
            client,
        }
    }

    async fn commit_in(
        &self,
        session: &mut ClientSession,
        id: ObjectId,
        commit: Commit,
    ) -> mongodb::error::Result<CommitOutcome> {
        let now = DateTime::now();

        let mut application = commit.application;
        application.revision = commit.expected_revision + 1;
        application.stamp(now);

        let replaced = self
            .applications
            .inner()
            .replace_one(commit_filter(id, commit.expected_revision), &application)
            .session(&mut *session)
            .await?;

        if replaced.matched_count == 0 {
            return Ok(CommitOutcome::Conflict);
        }

        if let Some(mut hearing) = commit.hearing {
            self.hearings
                .inner()
                .update_many(
                    doc! { "application_id": id, "is_active": true },
                    doc! { "$set": { "is_active": false, "deactivated_at": now } },
                )
                .session(&mut *session)
                .await?;

            hearing.stamp(now);
            self.hearings
                .inner()
                .insert_one(&hearing)
                .session(&mut *session)
                .await?;
        }

        Ok(CommitOutcome::Committed(application))
    }
}

#[async_trait]
impl ApplicationStore for MongoApplicationStore {
    async fn insert(&self, application: ApplicationDoc) -> Result<ApplicationDoc> {
        let mut stored = application;
        stored.stamp(DateTime::now());
        let id = self
            .applications
            .insert_one(stored.clone())
            .await
            .map_err(|e| e.for_index(APPLICATION_COLLECTION, TRACKING_INDEX))?;
        stored._id = Some(id);
        Ok(stored)
    }

    async fn get(&self, id: &ObjectId) -> Result<Option<ApplicationDoc>> {
        self.applications.find_one(doc! { "_id": *id }).await
    }

    async fn list_by_status(&self, status: ApplicationStatus) -> Result<Vec<ApplicationDoc>> {
        self.applications
            .find_many(doc! { "status": status.as_str() })
            .await
    }

    async fn active_hearing(&self, application_id: &ObjectId) -> Result<Option<HearingDateDoc>> {
        self.hearings
            .find_one(doc! { "application_id": *application_id, "is_active": true })
            .await
    }

    async fn hearings(&self, application_id: &ObjectId) -> Result<Vec<HearingDateDoc>> {
        self.hearings
            .find_many(doc! { "application_id": *application_id })
            .await
    }

    async fn commit(&self, commit: Commit) -> Result<CommitOutcome> {
        let id = application_id(&commit.application)?;
        let mut session = self.client.inner().start_session().await?;
        session.start_transaction().await?;

        let outcome = match self.commit_in(&mut session, id, commit).await {
            Ok(outcome) => outcome,
            Err(e) => {
                if let Err(abort) = session.abort_transaction().await {
                    warn!(error = %abort, "Failed to abort transaction");
                }
                if e.contains_label(TRANSIENT_TRANSACTION_ERROR) {
                    debug!(error = %e, "Transaction write conflict");
                    return Ok(CommitOutcome::Conflict);
                }
                return Err(e.into());
            }
        };

        if outcome == CommitOutcome::Conflict {
            session.abort_transaction().await?;
            return Ok(outcome);
        }

        match session.commit_transaction().await {
            Ok(()) => Ok(outcome),
            // Another transaction touched the same documents
            Err(e) if e.contains_label(TRANSIENT_TRANSACTION_ERROR) => {
                debug!(error = %e, "Transaction write conflict");
                Ok(CommitOutcome::Conflict)
            }
            Err(e) => Err(e.into()),
        }
    }
}

// ============================================================================
// In-memory
// ============================================================================

#[derive(Default)]
struct MemoryState {
    applications: HashMap<ObjectId, ApplicationDoc>,
    hearings: Vec<HearingDateDoc>,
}

/// In-process store; one lock makes every commit atomic
#[derive(Default)]
pub struct MemoryApplicationStore {
    state: Mutex<MemoryState>,
}

impl MemoryApplicationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ApplicationStore for MemoryApplicationStore {
    async fn insert(&self, mut application: ApplicationDoc) -> Result<ApplicationDoc> {
        let id = *application._id.get_or_insert_with(ObjectId::new);
        application.stamp(DateTime::now());

        let mut state = self.state.lock().await;
        if state
            .applications
            .values()
            .any(|a| a.tracking_id == application.tracking_id)
        {
            return Err(DocketError::ConstraintViolation {
                collection: APPLICATION_COLLECTION.to_string(),
                index: TRACKING_INDEX.to_string(),
                message: format!("duplicate tracking id {}", application.tracking_id),
            });
        }
        state.applications.insert(id, application.clone());
        Ok(application)
    }

    async fn get(&self, id: &ObjectId) -> Result<Option<ApplicationDoc>> {
        Ok(self.state.lock().await.applications.get(id).cloned())
    }

    async fn list_by_status(&self, status: ApplicationStatus) -> Result<Vec<ApplicationDoc>> {
        let state = self.state.lock().await;
        let mut found: Vec<_> = state
            .applications
            .values()
            .filter(|a| a.status == status)
            .cloned()
            .collect();
        found.sort_by_key(|a| a.created_at);
        Ok(found)
    }

    async fn active_hearing(&self, application_id: &ObjectId) -> Result<Option<HearingDateDoc>> {
        let state = self.state.lock().await;
        Ok(state
            .hearings
            .iter()
            .find(|h| h.application_id == *application_id && h.is_active)
            .cloned())
    }

    async fn hearings(&self, application_id: &ObjectId) -> Result<Vec<HearingDateDoc>> {
        let state = self.state.lock().await;
        Ok(state
            .hearings
            .iter()
            .filter(|h| h.application_id == *application_id)
            .cloned()
            .collect())
    }

    async fn commit(&self, commit: Commit) -> Result<CommitOutcome> {
        let id = application_id(&commit.application)?;
        let now = DateTime::now();
        let mut state = self.state.lock().await;

        let current = state
            .applications
            .get(&id)
            .ok_or_else(|| DocketError::NotFound(format!("application {}", id.to_hex())))?;
        if current.revision != commit.expected_revision {
            return Ok(CommitOutcome::Conflict);
        }

        let mut application = commit.application;
        application.revision = commit.expected_revision + 1;
        application.stamp(now);

        if let Some(mut hearing) = commit.hearing {
            for row in state
                .hearings
                .iter_mut()
                .filter(|h| h.application_id == id && h.is_active)
            {
                row.is_active = false;
                row.deactivated_at = Some(now);
            }
            hearing.stamp(now);
            state.hearings.push(hearing);
        }

        state.applications.insert(id, application.clone());
        Ok(CommitOutcome::Committed(application))
    }
}
