//! Migration step descriptors
//!
//! A plan is plain data: an ordered list of (collection, operation) pairs
//! consumed by the generic runner.

use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

use crate::db::catalog::IndexSpec;
use crate::db::mongo::IntoIndexes;
use crate::db::schemas::{
    ApplicationDoc, AuditLogEntry, HearingDateDoc, NotificationDoc, UserDoc, ViolationTypeDoc,
};
use crate::types::{DocketError, Result};

/// One operation against a collection
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MigrationOp {
    /// Copy `from` into `to` where `to` is absent
    RenameField { from: String, to: String },
    /// Unset `path` wherever it exists
    UnsetField { path: String },
    /// Unset `path` where it is null or empty
    CleanupEmpty { path: String },
    /// Bring an index into conformance
    ReconcileIndex(IndexSpec),
}

impl MigrationOp {
    /// Short name used in logs and reports
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RenameField { .. } => "rename_field",
            Self::UnsetField { .. } => "unset_field",
            Self::CleanupEmpty { .. } => "cleanup_empty",
            Self::ReconcileIndex(_) => "reconcile_index",
        }
    }

    /// Data-reshaping steps must run before index steps on the same collection
    pub fn is_data_step(&self) -> bool {
        !matches!(self, Self::ReconcileIndex(_))
    }
}

impl fmt::Display for MigrationOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RenameField { from, to } => write!(f, "rename {} -> {}", from, to),
            Self::UnsetField { path } => write!(f, "unset {}", path),
            Self::CleanupEmpty { path } => write!(f, "cleanup empty {}", path),
            Self::ReconcileIndex(spec) => write!(f, "reconcile index {}", spec.name),
        }
    }
}

/// One step of a plan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationStep {
    pub collection: String,
    pub op: MigrationOp,
}

impl MigrationStep {
    pub fn new(collection: &str, op: MigrationOp) -> Self {
        Self {
            collection: collection.to_string(),
            op,
        }
    }
}

/// Ordered list of steps
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MigrationPlan {
    steps: Vec<MigrationStep>,
}

impl MigrationPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy `from` into `to`, then unset `from` in a separate pass
    pub fn rename(mut self, collection: &str, from: &str, to: &str) -> Self {
        self.steps.push(MigrationStep::new(
            collection,
            MigrationOp::RenameField {
                from: from.to_string(),
                to: to.to_string(),
            },
        ));
        self.steps.push(MigrationStep::new(
            collection,
            MigrationOp::UnsetField {
                path: from.to_string(),
            },
        ));
        self
    }

    /// Unset null/empty values of `path`
    pub fn cleanup(mut self, collection: &str, path: &str) -> Self {
        self.steps.push(MigrationStep::new(
            collection,
            MigrationOp::CleanupEmpty {
                path: path.to_string(),
            },
        ));
        self
    }

    /// Reconcile one index
    pub fn index(mut self, collection: &str, spec: IndexSpec) -> Self {
        self.steps
            .push(MigrationStep::new(collection, MigrationOp::ReconcileIndex(spec)));
        self
    }

    /// Reconcile every index a schema declares
    pub fn indexes_for<T: IntoIndexes>(self) -> Self {
        T::into_indices()
            .into_iter()
            .fold(self, |plan, spec| plan.index(T::COLLECTION, spec))
    }

    /// Append an arbitrary step
    pub fn step(mut self, step: MigrationStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn steps(&self) -> &[MigrationStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The fixed production sequence
    ///
    /// Per collection: data fixes first, then indexes, since unique indexes
    /// cannot be built over residual empty values.
    pub fn standard() -> Self {
        Self::new()
            .cleanup(UserDoc::COLLECTION, "email")
            .cleanup(UserDoc::COLLECTION, "cnic")
            .indexes_for::<UserDoc>()
            .rename(
                ApplicationDoc::COLLECTION,
                "description.division",
                "description.district",
            )
            .indexes_for::<ApplicationDoc>()
            .indexes_for::<HearingDateDoc>()
            .indexes_for::<AuditLogEntry>()
            .cleanup(ViolationTypeDoc::COLLECTION, "name")
            .indexes_for::<ViolationTypeDoc>()
            .indexes_for::<NotificationDoc>()
    }

    /// Check ordering rules
    ///
    /// Steps for one collection must be contiguous, and no data step may
    /// follow an index step on the same collection.
    pub fn validate(&self) -> Result<()> {
        let mut finished: HashSet<&str> = HashSet::new();
        let mut current: Option<&str> = None;
        let mut indexed = false;

        for (position, step) in self.steps.iter().enumerate() {
            let collection = step.collection.as_str();

            if current != Some(collection) {
                if let Some(previous) = current {
                    finished.insert(previous);
                }
                if finished.contains(collection) {
                    return Err(DocketError::Config(format!(
                        "step {} returns to collection '{}' after other collections ran",
                        position, collection
                    )));
                }
                current = Some(collection);
                indexed = false;
            }

            if step.op.is_data_step() && indexed {
                return Err(DocketError::Config(format!(
                    "step {} ({}) on '{}' runs after an index step",
                    position, step.op, collection
                )));
            }
            if !step.op.is_data_step() {
                indexed = true;
            }
        }

        Ok(())
    }

    /// Distinct collections in execution order
    pub fn collections(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for step in &self.steps {
            if !seen.contains(&step.collection.as_str()) {
                seen.push(step.collection.as_str());
            }
        }
        seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_standard_plan_is_valid() {
        let plan = MigrationPlan::standard();
        plan.validate().unwrap();
        assert_eq!(
            plan.collections(),
            vec![
                "users",
                "applications",
                "hearingdates",
                "auditlogs",
                "violationtypes",
                "notifications"
            ]
        );
    }

    #[test]
    fn test_standard_plan_index_catalog() {
        let plan = MigrationPlan::standard();
        let names: Vec<(String, String)> = plan
            .steps()
            .iter()
            .filter_map(|s| match &s.op {
                MigrationOp::ReconcileIndex(spec) => Some((s.collection.clone(), spec.name.clone())),
                _ => None,
            })
            .collect();

        assert!(names.contains(&("users".into(), "email_1".into())));
        assert!(names.contains(&("users".into(), "cnic_1".into())));
        assert!(names.contains(&("applications".into(), "tracking_id_1".into())));
        assert!(names.contains(&("applications".into(), "description.district_1".into())));
        assert!(names.contains(&("violationtypes".into(), "name_1".into())));
        assert_eq!(names.len(), 16);
    }

    #[test]
    fn test_rename_expands_to_copy_and_unset() {
        let plan = MigrationPlan::new().rename("applications", "division", "district");
        let kinds: Vec<_> = plan.steps().iter().map(|s| s.op.kind()).collect();
        assert_eq!(kinds, vec!["rename_field", "unset_field"]);
    }

    #[test]
    fn test_validate_rejects_data_after_index() {
        let plan = MigrationPlan::new()
            .index("users", IndexSpec::new(doc! { "email": 1 }))
            .cleanup("users", "email");
        assert!(matches!(plan.validate(), Err(DocketError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_interleaved_collections() {
        let plan = MigrationPlan::new()
            .cleanup("users", "email")
            .cleanup("violationtypes", "name")
            .cleanup("users", "cnic");
        assert!(plan.validate().is_err());
    }
}
