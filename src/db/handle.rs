//! Store-agnostic collection access
//!
//! The migrator and reconciler only talk to a collection through
//! `CollectionHandle`, so the same steps run against MongoDB and against the
//! in-memory store used in tests.

use async_trait::async_trait;
use bson::{doc, Document};
use mongodb::options::UpdateModifications;
use serde::Serialize;
use std::sync::Arc;

use crate::db::catalog::IndexSpec;
use crate::types::Result;

/// Field-level bulk update applied to every matched document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldUpdate {
    /// Copy the value at `from` into `to`, leaving `from` in place
    Copy { from: String, to: String },
    /// Remove the field at `path`
    Unset { path: String },
}

impl FieldUpdate {
    /// Driver representation of this update
    ///
    /// A copy needs the aggregation pipeline form so the new field can refer
    /// to the old field's value.
    pub fn to_modifications(&self) -> UpdateModifications {
        match self {
            Self::Copy { from, to } => {
                UpdateModifications::Pipeline(vec![doc! { "$set": { to: format!("${}", from) } }])
            }
            Self::Unset { path } => UpdateModifications::Document(doc! { "$unset": { path: "" } }),
        }
    }
}

/// Counts reported by a bulk update
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpdateCounts {
    pub matched: u64,
    pub modified: u64,
}

/// One collection in a live store
#[async_trait]
pub trait CollectionHandle: Send + Sync {
    /// Collection name
    fn name(&self) -> &str;

    /// Current secondary and primary indexes
    async fn list_indexes(&self) -> Result<Vec<IndexSpec>>;

    /// Drop an index by catalog name
    async fn drop_index(&self, name: &str) -> Result<()>;

    /// Build an index; duplicate existing values surface as a constraint violation
    async fn create_index(&self, spec: &IndexSpec) -> Result<()>;

    /// Apply one update to every document matching `filter`
    async fn update_many(&self, filter: Document, update: &FieldUpdate) -> Result<UpdateCounts>;

    /// Count documents matching `filter`
    async fn count_documents(&self, filter: Document) -> Result<u64>;
}

/// A connected store that hands out collection handles
#[async_trait]
pub trait Database: Send + Sync {
    /// Handle for the named collection
    fn handle(&self, name: &str) -> Arc<dyn CollectionHandle>;

    /// Release the connection
    async fn shutdown(&self);
}
