//! Notification schema
//!
//! In-app notification rows. Delivery (email, push) is handled elsewhere.

use bson::{doc, oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

use crate::db::catalog::IndexSpec;
use crate::db::mongo::{IntoIndexes, Timestamped};

/// Collection name for notifications
pub const NOTIFICATION_COLLECTION: &str = "notifications";

/// Notification document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NotificationDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    pub recipient_user_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_id: Option<ObjectId>,

    pub title: String,

    pub message: String,

    #[serde(default)]
    pub is_read: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime>,
}

impl NotificationDoc {
    /// Create an unread notification about an application
    pub fn new(
        recipient_user_id: String,
        application_id: Option<ObjectId>,
        title: &str,
        message: String,
    ) -> Self {
        Self {
            _id: None,
            recipient_user_id,
            application_id,
            title: title.to_string(),
            message,
            is_read: false,
            created_at: None,
        }
    }
}

impl IntoIndexes for NotificationDoc {
    const COLLECTION: &'static str = NOTIFICATION_COLLECTION;

    fn into_indices() -> Vec<IndexSpec> {
        vec![
            IndexSpec::new(doc! { "recipient_user_id": 1 }),
            IndexSpec::new(doc! { "is_read": 1 }),
            IndexSpec::new(doc! { "created_at": -1 }),
        ]
    }
}

impl Timestamped for NotificationDoc {
    fn stamp(&mut self, now: DateTime) {
        self.created_at.get_or_insert(now);
    }
}
