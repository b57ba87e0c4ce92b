//! Schema evolution and index reconciliation
//!
//! - `index`: bring one named index into conformance with its `IndexSpec`
//! - `schema`: idempotent bulk rename/unset/cleanup passes
//! - `plan`: step descriptors and the fixed production plan
//! - `runner`: sequential, fail-fast execution with a structured report

pub mod index;
pub mod plan;
pub mod runner;
pub mod schema;

pub use index::{detect_drift, plan_reconcile, reconcile, Drift, ReconcileOutcome};
pub use plan::{MigrationOp, MigrationPlan, MigrationStep};
pub use runner::{IndexResult, MigrationReport, MigrationRunner, StepFailure, StepReport, StepResult};
pub use schema::{apply_cleanup, apply_rename, remove_field};
