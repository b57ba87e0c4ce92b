//! In-app notifications emitted by lifecycle transitions

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::db::mongo::{MongoClient, MongoCollection};
use crate::db::schemas::{NotificationDoc, NOTIFICATION_COLLECTION};
use crate::types::Result;

/// Destination for notifications
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: NotificationDoc) -> Result<()>;
}

/// Writes notifications to the `notifications` collection
pub struct MongoNotificationSink {
    collection: MongoCollection<NotificationDoc>,
}

impl MongoNotificationSink {
    pub fn new(client: &MongoClient) -> Self {
        Self {
            collection: client.collection(NOTIFICATION_COLLECTION),
        }
    }
}

#[async_trait]
impl NotificationSink for MongoNotificationSink {
    async fn notify(&self, notification: NotificationDoc) -> Result<()> {
        self.collection.insert_one(notification).await?;
        Ok(())
    }
}

/// Keeps notifications in memory
#[derive(Default)]
pub struct MemoryNotificationSink {
    sent: Mutex<Vec<NotificationDoc>>,
}

impl MemoryNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<NotificationDoc> {
        self.sent.lock().await.clone()
    }

    /// Notifications addressed to one user
    pub async fn for_recipient(&self, user_id: &str) -> Vec<NotificationDoc> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|n| n.recipient_user_id == user_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl NotificationSink for MemoryNotificationSink {
    async fn notify(&self, notification: NotificationDoc) -> Result<()> {
        self.sent.lock().await.push(notification);
        Ok(())
    }
}
