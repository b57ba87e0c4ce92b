//! Reference data schemas
//!
//! Violation types and application categories. Both are read far more often
//! than written and are memoised by `cache::ReferenceData`.

use bson::{doc, oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

use crate::db::catalog::IndexSpec;
use crate::db::mongo::{IntoIndexes, Timestamped};

/// Collection name for violation types
pub const VIOLATION_TYPE_COLLECTION: &str = "violationtypes";

/// Collection name for categories
pub const CATEGORY_COLLECTION: &str = "categories";

/// A sub-violation nested under a violation type
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SubViolation {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Violation type document
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ViolationTypeDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub sub_violations: Vec<SubViolation>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime>,
}

impl IntoIndexes for ViolationTypeDoc {
    const COLLECTION: &'static str = VIOLATION_TYPE_COLLECTION;

    fn into_indices() -> Vec<IndexSpec> {
        vec![IndexSpec::new(doc! { "name": 1 }).unique()]
    }
}

impl Timestamped for ViolationTypeDoc {
    fn stamp(&mut self, now: DateTime) {
        self.created_at.get_or_insert(now);
    }
}

/// Application category with its subcategories
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct CategoryDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    pub name: String,

    #[serde(default)]
    pub subcategories: Vec<String>,
}
