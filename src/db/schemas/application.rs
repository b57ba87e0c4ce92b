//! Application document schema
//!
//! A compliance application and the fields its lifecycle reads and writes.
//! Workflow state lives in `status` alone; `revision` only serialises
//! concurrent writers.

use bson::{doc, oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::db::catalog::IndexSpec;
use crate::db::mongo::{IntoIndexes, Timestamped};

/// Collection name for applications
pub const APPLICATION_COLLECTION: &str = "applications";

/// Lifecycle status of an application
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    /// Submitted by the applicant, awaiting completeness review
    #[default]
    Submitted,
    /// Found complete by the registrar
    Complete,
    /// Returned to the applicant with remarks
    Incomplete,
    /// A hearing date is set
    HearingScheduled,
    /// The hearing is in progress
    UnderHearing,
    /// Closed with approval
    ApprovedResolved,
    /// Closed with rejection
    RejectedClosed,
}

impl ApplicationStatus {
    pub const ALL: [ApplicationStatus; 7] = [
        Self::Submitted,
        Self::Complete,
        Self::Incomplete,
        Self::HearingScheduled,
        Self::UnderHearing,
        Self::ApprovedResolved,
        Self::RejectedClosed,
    ];

    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Complete => "complete",
            Self::Incomplete => "incomplete",
            Self::HearingScheduled => "hearing_scheduled",
            Self::UnderHearing => "under_hearing",
            Self::ApprovedResolved => "approved_resolved",
            Self::RejectedClosed => "rejected_closed",
        }
    }

    /// Terminal statuses accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ApprovedResolved | Self::RejectedClosed)
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed description record
///
/// `district` replaced the older `division` key; documents written before the
/// rename are converted by the migration plan.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ApplicationDescription {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,

    /// Requested actions, keyed by action name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub action_flags: BTreeMap<String, bool>,
}

/// Violations recorded by the hearing officer
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ViolationFinding {
    pub violation_type_ids: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,

    pub recorded_by: String,

    pub recorded_at: DateTime,
}

/// Application document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ApplicationDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Public tracking number
    pub tracking_id: String,

    /// Owning applicant's user id
    pub applicant_id: String,

    #[serde(default)]
    pub status: ApplicationStatus,

    #[serde(default)]
    pub description: ApplicationDescription,

    /// Registrar remarks while the application is incomplete
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incomplete_reason: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub registrar_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub hearing_officer_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub violation: Option<ViolationFinding>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_remarks: Option<String>,

    /// Set once on approval or rejection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_by: Option<String>,

    /// Incremented on every committed write
    #[serde(default)]
    pub revision: i64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime>,
}

impl ApplicationDoc {
    /// Whether closing fields have been written
    pub fn is_closed(&self) -> bool {
        self.closed_at.is_some()
    }
}

impl IntoIndexes for ApplicationDoc {
    const COLLECTION: &'static str = APPLICATION_COLLECTION;

    fn into_indices() -> Vec<IndexSpec> {
        vec![
            IndexSpec::new(doc! { "tracking_id": 1 }).unique(),
            IndexSpec::new(doc! { "status": 1 }),
            IndexSpec::new(doc! { "created_at": -1 }),
            IndexSpec::new(doc! { "description.district": 1 }),
        ]
    }
}

impl Timestamped for ApplicationDoc {
    fn stamp(&mut self, now: DateTime) {
        self.created_at.get_or_insert(now);
        self.updated_at = Some(now);
    }
}
