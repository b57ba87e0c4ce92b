//! Bulk document reshaping
//!
//! Each operation is one `update_many` whose filter excludes documents that
//! are already in the target shape, so a repeat run matches nothing.

use bson::{doc, Bson, Document};
use tracing::info;

use crate::db::handle::{CollectionHandle, FieldUpdate, UpdateCounts};
use crate::types::Result;

/// Documents still carrying a usable `old` value and no `new` value
pub fn rename_filter(old: &str, new: &str) -> Document {
    doc! {
        new: { "$exists": false },
        old: { "$exists": true, "$nin": [Bson::Null, ""] },
    }
}

/// Documents where `path` is still present
pub fn unset_filter(path: &str) -> Document {
    doc! { path: { "$exists": true } }
}

/// Documents where `path` is present but null or empty
pub fn cleanup_filter(path: &str) -> Document {
    doc! { path: { "$exists": true, "$in": [Bson::Null, ""] } }
}

/// Copy `old` into `new` wherever `new` is absent
///
/// The old field stays in place; `remove_field` is the separate pass that
/// drops it. Counts come straight from the store.
pub async fn apply_rename(handle: &dyn CollectionHandle, old: &str, new: &str) -> Result<UpdateCounts> {
    let update = FieldUpdate::Copy {
        from: old.to_string(),
        to: new.to_string(),
    };
    let counts = handle.update_many(rename_filter(old, new), &update).await?;

    info!(
        collection = handle.name(),
        from = old,
        to = new,
        matched = counts.matched,
        modified = counts.modified,
        "Copied field"
    );
    Ok(counts)
}

/// Unset `path` wherever it still exists
pub async fn remove_field(handle: &dyn CollectionHandle, path: &str) -> Result<UpdateCounts> {
    let update = FieldUpdate::Unset {
        path: path.to_string(),
    };
    let counts = handle.update_many(unset_filter(path), &update).await?;

    info!(
        collection = handle.name(),
        field = path,
        matched = counts.matched,
        modified = counts.modified,
        "Removed field"
    );
    Ok(counts)
}

/// Unset `path` where it holds null or an empty string
///
/// An unset field is the only state a sparse unique index ignores, so this
/// must finish before such an index is reconciled.
pub async fn apply_cleanup(handle: &dyn CollectionHandle, path: &str) -> Result<UpdateCounts> {
    let update = FieldUpdate::Unset {
        path: path.to_string(),
    };
    let counts = handle.update_many(cleanup_filter(path), &update).await?;

    info!(
        collection = handle.name(),
        field = path,
        matched = counts.matched,
        modified = counts.modified,
        "Cleaned empty values"
    );
    Ok(counts)
}

/// Number of documents `apply_rename` would touch
pub async fn preview_rename(handle: &dyn CollectionHandle, old: &str, new: &str) -> Result<u64> {
    handle.count_documents(rename_filter(old, new)).await
}

/// Number of documents `remove_field` would touch
pub async fn preview_remove(handle: &dyn CollectionHandle, path: &str) -> Result<u64> {
    handle.count_documents(unset_filter(path)).await
}

/// Number of documents `apply_cleanup` would touch
pub async fn preview_cleanup(handle: &dyn CollectionHandle, path: &str) -> Result<u64> {
    handle.count_documents(cleanup_filter(path)).await
}
