//! Audit log schema

use bson::{doc, oid::ObjectId, DateTime, Document};
use serde::{Deserialize, Serialize};

use crate::db::catalog::IndexSpec;
use crate::db::mongo::{IntoIndexes, Timestamped};

/// Collection name for audit logs
pub const AUDIT_LOG_COLLECTION: &str = "auditlogs";

/// One audited action
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AuditLogEntry {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Acting user
    pub user_id: String,

    /// Kind of entity touched (e.g. "application")
    pub entity_type: String,

    pub entity_id: String,

    /// Action name (e.g. "mark_incomplete")
    pub action: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Document>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime>,
}

impl AuditLogEntry {
    /// Create a new audit entry
    pub fn new(user_id: String, entity_type: &str, entity_id: String, action: &str) -> Self {
        Self {
            _id: None,
            user_id,
            entity_type: entity_type.to_string(),
            entity_id,
            action: action.to_string(),
            details: None,
            created_at: None,
        }
    }

    /// Attach details
    pub fn with_details(mut self, details: Document) -> Self {
        self.details = Some(details);
        self
    }

    /// Set the timestamp
    pub fn at(mut self, now: DateTime) -> Self {
        self.created_at = Some(now);
        self
    }
}

impl IntoIndexes for AuditLogEntry {
    const COLLECTION: &'static str = AUDIT_LOG_COLLECTION;

    fn into_indices() -> Vec<IndexSpec> {
        vec![
            IndexSpec::new(doc! { "created_at": -1 }),
            IndexSpec::new(doc! { "user_id": 1 }),
            IndexSpec::new(doc! { "entity_type": 1 }),
        ]
    }
}

impl Timestamped for AuditLogEntry {
    fn stamp(&mut self, now: DateTime) {
        self.created_at.get_or_insert(now);
    }
}
