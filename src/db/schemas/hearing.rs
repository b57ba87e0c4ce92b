//! Hearing date schema
//!
//! One row per scheduled or adjourned hearing. Only the row with
//! `is_active = true` is authoritative for its application.

use bson::{doc, oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

use crate::db::catalog::IndexSpec;
use crate::db::mongo::{IntoIndexes, Timestamped};

/// Collection name for hearing dates
pub const HEARING_COLLECTION: &str = "hearingdates";

/// Hearing date document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct HearingDateDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    pub application_id: ObjectId,

    pub hearing_date: DateTime,

    #[serde(default)]
    pub is_active: bool,

    /// User who scheduled or adjourned to this date
    pub scheduled_by: String,

    /// Adjournment reason, if this row replaced an earlier date
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub deactivated_at: Option<DateTime>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime>,
}

impl HearingDateDoc {
    /// Create a new active hearing row
    pub fn active(
        application_id: ObjectId,
        hearing_date: DateTime,
        scheduled_by: String,
        reason: Option<String>,
    ) -> Self {
        Self {
            _id: Some(ObjectId::new()),
            application_id,
            hearing_date,
            is_active: true,
            scheduled_by,
            reason,
            deactivated_at: None,
            created_at: None,
        }
    }

    /// Whether the hearing date has arrived
    pub fn is_due(&self, now: DateTime) -> bool {
        self.is_active && self.hearing_date <= now
    }
}

impl IntoIndexes for HearingDateDoc {
    const COLLECTION: &'static str = HEARING_COLLECTION;

    fn into_indices() -> Vec<IndexSpec> {
        vec![
            IndexSpec::new(doc! { "application_id": 1 }),
            IndexSpec::new(doc! { "hearing_date": 1 }),
            IndexSpec::new(doc! { "is_active": 1 }),
        ]
    }
}

impl Timestamped for HearingDateDoc {
    fn stamp(&mut self, now: DateTime) {
        self.created_at.get_or_insert(now);
    }
}
