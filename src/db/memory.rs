//! In-memory document store
//!
//! Implements `Database`/`CollectionHandle` without a server. Unique and
//! sparse indexes are enforced on insert, update and index build, and filters
//! support the operator subset the migrator emits (`$exists`, `$eq`, `$ne`,
//! `$in`, `$nin` and plain equality on dotted paths), with MongoDB's rule that
//! a missing field equals `null`.

use async_trait::async_trait;
use bson::{doc, oid::ObjectId, Bson, Document};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::db::catalog::{IndexSpec, PRIMARY_INDEX_NAME};
use crate::db::handle::{CollectionHandle, Database, FieldUpdate, UpdateCounts};
use crate::types::{DocketError, Result};

/// In-memory database: collections are created on first access
#[derive(Default)]
pub struct MemoryDatabase {
    collections: DashMap<String, Arc<MemoryCollection>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Concrete collection, for seeding and inspecting test data
    pub fn collection(&self, name: &str) -> Arc<MemoryCollection> {
        self.collections
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryCollection::new(name)))
            .clone()
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    fn handle(&self, name: &str) -> Arc<dyn CollectionHandle> {
        self.collection(name)
    }

    async fn shutdown(&self) {
        debug!("Memory database released");
    }
}

#[derive(Default)]
struct CollectionState {
    docs: Vec<Document>,
    indexes: Vec<IndexSpec>,
}

/// One in-memory collection
pub struct MemoryCollection {
    name: String,
    state: Mutex<CollectionState>,
}

impl MemoryCollection {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Mutex::new(CollectionState::default()),
        }
    }

    /// Insert a document, assigning an `_id` when absent
    pub async fn insert_one(&self, mut document: Document) -> Result<ObjectId> {
        let id = match document.get("_id") {
            Some(Bson::ObjectId(id)) => *id,
            _ => {
                let id = ObjectId::new();
                document.insert("_id", id);
                id
            }
        };

        let mut state = self.state.lock().await;
        let mut candidate = state.docs.clone();
        candidate.push(document);
        self.check_unique(&candidate, &state.indexes)?;
        state.docs = candidate;
        Ok(id)
    }

    /// Documents matching a filter, in insertion order
    pub async fn find(&self, filter: &Document) -> Vec<Document> {
        let state = self.state.lock().await;
        state
            .docs
            .iter()
            .filter(|d| matches_filter(d, filter))
            .cloned()
            .collect()
    }

    /// All documents, in insertion order
    pub async fn documents(&self) -> Vec<Document> {
        self.find(&doc! {}).await
    }

    fn check_unique(&self, docs: &[Document], indexes: &[IndexSpec]) -> Result<()> {
        for spec in indexes.iter().filter(|s| s.unique) {
            if let Some(key) = find_duplicate(docs, spec) {
                return Err(DocketError::ConstraintViolation {
                    collection: self.name.clone(),
                    index: spec.name.clone(),
                    message: format!("E11000 duplicate key error, dup key: {:?}", key),
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CollectionHandle for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_indexes(&self) -> Result<Vec<IndexSpec>> {
        let state = self.state.lock().await;
        let mut indexes = vec![IndexSpec::new(doc! { "_id": 1 }).named(PRIMARY_INDEX_NAME)];
        indexes.extend(state.indexes.iter().cloned());
        Ok(indexes)
    }

    async fn drop_index(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let before = state.indexes.len();
        state.indexes.retain(|s| s.name != name);
        if state.indexes.len() == before {
            return Err(DocketError::Database(format!(
                "index not found with name [{}] on {}",
                name, self.name
            )));
        }
        Ok(())
    }

    async fn create_index(&self, spec: &IndexSpec) -> Result<()> {
        let mut state = self.state.lock().await;

        if let Some(existing) = state.indexes.iter().find(|s| s.name == spec.name) {
            if existing == spec {
                return Ok(());
            }
            return Err(DocketError::Database(format!(
                "An existing index has the same name as the requested index: {}",
                spec.name
            )));
        }

        if spec.unique {
            if let Some(key) = find_duplicate(&state.docs, spec) {
                return Err(DocketError::ConstraintViolation {
                    collection: self.name.clone(),
                    index: spec.name.clone(),
                    message: format!("E11000 duplicate key error, dup key: {:?}", key),
                });
            }
        }

        state.indexes.push(spec.clone());
        Ok(())
    }

    async fn update_many(&self, filter: Document, update: &FieldUpdate) -> Result<UpdateCounts> {
        let mut state = self.state.lock().await;
        let mut candidate = state.docs.clone();
        let mut counts = UpdateCounts::default();

        for document in candidate.iter_mut().filter(|d| matches_filter(d, &filter)) {
            counts.matched += 1;
            if apply_update(document, update) {
                counts.modified += 1;
            }
        }

        self.check_unique(&candidate, &state.indexes)?;
        state.docs = candidate;
        Ok(counts)
    }

    async fn count_documents(&self, filter: Document) -> Result<u64> {
        let state = self.state.lock().await;
        Ok(state.docs.iter().filter(|d| matches_filter(d, &filter)).count() as u64)
    }
}

// =============================================================================
// Document helpers
// =============================================================================

/// Read a dotted path
pub fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut parts = path.split('.');
    let first = parts.next()?;
    let mut current = document.get(first)?;
    for part in parts {
        current = match current {
            Bson::Document(inner) => inner.get(part)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Write a dotted path, creating intermediate documents; returns whether anything changed
fn set_path(document: &mut Document, path: &str, value: Bson) -> bool {
    match path.split_once('.') {
        None => {
            if document.get(path) == Some(&value) {
                return false;
            }
            document.insert(path, value);
            true
        }
        Some((head, rest)) => {
            if !matches!(document.get(head), Some(Bson::Document(_))) {
                document.insert(head, Document::new());
            }
            match document.get_mut(head) {
                Some(Bson::Document(inner)) => set_path(inner, rest, value),
                _ => false,
            }
        }
    }
}

/// Remove a dotted path; returns whether the field existed
fn unset_path(document: &mut Document, path: &str) -> bool {
    match path.split_once('.') {
        None => document.remove(path).is_some(),
        Some((head, rest)) => match document.get_mut(head) {
            Some(Bson::Document(inner)) => unset_path(inner, rest),
            _ => false,
        },
    }
}

fn apply_update(document: &mut Document, update: &FieldUpdate) -> bool {
    match update {
        FieldUpdate::Copy { from, to } => match lookup(document, from).cloned() {
            Some(value) => set_path(document, to, value),
            None => false,
        },
        FieldUpdate::Unset { path } => unset_path(document, path),
    }
}

/// Evaluate a filter document against a document
pub fn matches_filter(document: &Document, filter: &Document) -> bool {
    filter.iter().all(|(path, condition)| {
        if path.starts_with('$') {
            // Top-level logical operators are not part of the supported subset
            return false;
        }
        let value = lookup(document, path);
        match condition {
            Bson::Document(ops) if is_operator_document(ops) => {
                ops.iter().all(|(op, arg)| eval_operator(value, op, arg))
            }
            expected => equals(value, expected),
        }
    })
}

fn is_operator_document(document: &Document) -> bool {
    document.keys().next().is_some_and(|k| k.starts_with('$'))
}

fn equals(value: Option<&Bson>, expected: &Bson) -> bool {
    match (value, expected) {
        (None, Bson::Null) => true,
        (None, _) => false,
        (Some(actual), expected) => actual == expected,
    }
}

fn eval_operator(value: Option<&Bson>, op: &str, arg: &Bson) -> bool {
    match op {
        "$exists" => value.is_some() == truthy(arg),
        "$eq" => equals(value, arg),
        "$ne" => !equals(value, arg),
        "$in" => match arg {
            Bson::Array(items) => items.iter().any(|item| equals(value, item)),
            _ => false,
        },
        "$nin" => match arg {
            Bson::Array(items) => !items.iter().any(|item| equals(value, item)),
            _ => false,
        },
        _ => false,
    }
}

fn truthy(arg: &Bson) -> bool {
    match arg {
        Bson::Boolean(b) => *b,
        Bson::Int32(n) => *n != 0,
        Bson::Int64(n) => *n != 0,
        Bson::Double(n) => *n != 0.0,
        Bson::Null => false,
        _ => true,
    }
}

/// Index key of a document, or `None` when a sparse index skips it
fn index_key(document: &Document, spec: &IndexSpec) -> Option<Vec<Bson>> {
    let values: Vec<Option<&Bson>> = spec.fields().iter().map(|f| lookup(document, f)).collect();
    if spec.sparse && values.iter().all(Option::is_none) {
        return None;
    }
    Some(
        values
            .into_iter()
            .map(|v| v.cloned().unwrap_or(Bson::Null))
            .collect(),
    )
}

fn find_duplicate(docs: &[Document], spec: &IndexSpec) -> Option<Vec<Bson>> {
    let mut seen: Vec<Vec<Bson>> = Vec::new();
    for key in docs.iter().filter_map(|d| index_key(d, spec)) {
        if seen.contains(&key) {
            return Some(key);
        }
        seen.push(key);
    }
    None
}
