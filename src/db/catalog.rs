//! Index catalog entries
//!
//! `IndexSpec` is both the declared target (from schema `IntoIndexes`) and the
//! observed state read back from a collection's index catalog.

use bson::{Bson, Document};
use mongodb::{options::IndexOptions, IndexModel};
use serde::Serialize;

/// Name of the built-in primary key index, never reconciled
pub const PRIMARY_INDEX_NAME: &str = "_id_";

/// A secondary index definition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexSpec {
    /// Catalog name, unique within a collection
    pub name: String,
    /// Ordered field -> direction mapping
    pub keys: Document,
    pub unique: bool,
    pub sparse: bool,
}

impl IndexSpec {
    /// Plain ascending/descending index with the driver's default naming
    pub fn new(keys: Document) -> Self {
        let name = default_index_name(&keys);
        Self {
            name,
            keys,
            unique: false,
            sparse: false,
        }
    }

    /// Mark the index unique
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Mark the index sparse
    pub fn sparse(mut self) -> Self {
        self.sparse = true;
        self
    }

    /// Override the catalog name
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Field paths covered by this index, in key order
    pub fn fields(&self) -> Vec<&str> {
        self.keys.keys().map(String::as_str).collect()
    }

    /// Whether the key pattern matches another pattern field-for-field
    ///
    /// Directions are compared numerically so `1`, `1i64` and `1.0` agree.
    pub fn same_key_pattern(&self, other: &Document) -> bool {
        if self.keys.len() != other.len() {
            return false;
        }
        self.keys
            .iter()
            .zip(other.iter())
            .all(|((field_a, dir_a), (field_b, dir_b))| {
                field_a == field_b && normalize_direction(dir_a) == normalize_direction(dir_b)
            })
    }

    /// Build the driver model used to create this index
    pub fn to_index_model(&self) -> IndexModel {
        let options = IndexOptions::builder()
            .name(self.name.clone())
            .unique(self.unique)
            .sparse(self.sparse)
            .build();

        IndexModel::builder()
            .keys(self.keys.clone())
            .options(options)
            .build()
    }

    /// Read an index back from the driver's catalog listing
    pub fn from_index_model(model: &IndexModel) -> Self {
        let options = model.options.as_ref();
        let name = options
            .and_then(|o| o.name.clone())
            .unwrap_or_else(|| default_index_name(&model.keys));

        Self {
            name,
            keys: model.keys.clone(),
            unique: options.and_then(|o| o.unique).unwrap_or(false),
            sparse: options.and_then(|o| o.sparse).unwrap_or(false),
        }
    }
}

/// Name MongoDB assigns when none is given: `field_dir` pairs joined by `_`
pub fn default_index_name(keys: &Document) -> String {
    keys.iter()
        .map(|(field, dir)| match normalize_direction(dir) {
            Some(n) => format!("{}_{}", field, n),
            None => match dir {
                Bson::String(s) => format!("{}_{}", field, s),
                other => format!("{}_{}", field, other),
            },
        })
        .collect::<Vec<_>>()
        .join("_")
}

fn normalize_direction(dir: &Bson) -> Option<i64> {
    match dir {
        Bson::Int32(n) => Some(i64::from(*n)),
        Bson::Int64(n) => Some(*n),
        Bson::Double(n) if n.fract() == 0.0 => Some(*n as i64),
        _ => None,
    }
}
