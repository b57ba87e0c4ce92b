//! Cache keys for reference data

use crate::db::schemas::{CATEGORY_COLLECTION, USER_COLLECTION, VIOLATION_TYPE_COLLECTION};

/// All categories with their subcategories
pub const CATEGORIES: &str = "ref:categories";

/// All violation types with nested sub-violations
pub const VIOLATION_TYPES: &str = "ref:violation_types";

/// Active hearing officers
pub const HEARING_OFFICERS: &str = "ref:hearing_officers";

/// Cache key derived from a collection's contents, if any
pub fn key_for_collection(collection: &str) -> Option<&'static str> {
    match collection {
        CATEGORY_COLLECTION => Some(CATEGORIES),
        VIOLATION_TYPE_COLLECTION => Some(VIOLATION_TYPES),
        USER_COLLECTION => Some(HEARING_OFFICERS),
        _ => None,
    }
}
