//! Audit trail
//!
//! Lifecycle handlers record who did what to which application. Writing the
//! trail must never fail the action it describes, so `AuditLogger` logs sink
//! errors and swallows them.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::db::mongo::{MongoClient, MongoCollection};
use crate::db::schemas::{AuditLogEntry, AUDIT_LOG_COLLECTION};
use crate::types::Result;

/// Destination for audit entries
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: AuditLogEntry) -> Result<()>;
}

/// Writes entries to the `auditlogs` collection
pub struct MongoAuditSink {
    collection: MongoCollection<AuditLogEntry>,
}

impl MongoAuditSink {
    pub fn new(client: &MongoClient) -> Self {
        Self {
            collection: client.collection(AUDIT_LOG_COLLECTION),
        }
    }
}

#[async_trait]
impl AuditSink for MongoAuditSink {
    async fn record(&self, entry: AuditLogEntry) -> Result<()> {
        self.collection.insert_one(entry).await?;
        Ok(())
    }
}

/// Keeps entries in memory
#[derive(Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditLogEntry>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<AuditLogEntry> {
        self.entries.lock().await.clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, entry: AuditLogEntry) -> Result<()> {
        self.entries.lock().await.push(entry);
        Ok(())
    }
}

/// Fire-and-forget front for an `AuditSink`
#[derive(Clone)]
pub struct AuditLogger {
    sink: Arc<dyn AuditSink>,
}

impl AuditLogger {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Record an entry; failures are logged, never returned
    pub async fn log(&self, entry: AuditLogEntry) {
        let action = entry.action.clone();
        let entity_id = entry.entity_id.clone();

        match self.sink.record(entry).await {
            Ok(()) => debug!(action = %action, entity_id = %entity_id, "Audit entry written"),
            Err(e) => error!(
                action = %action,
                entity_id = %entity_id,
                error = %e,
                "Failed to write audit entry"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DocketError;

    struct BrokenSink;

    #[async_trait]
    impl AuditSink for BrokenSink {
        async fn record(&self, _entry: AuditLogEntry) -> Result<()> {
            Err(DocketError::Connection("store unreachable".into()))
        }
    }

    #[tokio::test]
    async fn test_logger_records_entries() {
        let sink = Arc::new(MemoryAuditSink::new());
        let logger = AuditLogger::new(sink.clone());

        logger
            .log(AuditLogEntry::new("u1".into(), "application", "a1".into(), "approve"))
            .await;

        let entries = sink.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, "approve");
    }

    #[tokio::test]
    async fn test_logger_swallows_sink_errors() {
        let logger = AuditLogger::new(Arc::new(BrokenSink));
        // Completes without panicking or returning an error
        logger
            .log(AuditLogEntry::new("u1".into(), "application", "a1".into(), "reject"))
            .await;
    }
}
