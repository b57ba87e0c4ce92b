//! Sequential, fail-fast execution of a migration plan
//!
//! Steps run strictly one after another against one `Database`. The first
//! failure stops the run and is recorded alongside the steps that already
//! succeeded. Nothing is rolled back: every step is idempotent, so re-running
//! the whole plan converges.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::index::{plan_reconcile, reconcile, ReconcileOutcome};
use super::plan::{MigrationOp, MigrationPlan, MigrationStep};
use super::schema;
use crate::cache::{key_for_collection, EphemeralCache};
use crate::db::handle::{CollectionHandle, Database, UpdateCounts};
use crate::types::{DocketError, Result};

/// What one step did (or, in a dry run, would do)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StepResult {
    Data(UpdateCounts),
    Index(IndexResult),
}

/// Index step result as reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexResult {
    pub rebuilt: bool,
    pub created: bool,
}

impl From<ReconcileOutcome> for IndexResult {
    fn from(outcome: ReconcileOutcome) -> Self {
        Self {
            rebuilt: outcome.rebuilt,
            created: outcome.created(),
        }
    }
}

/// One completed step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepReport {
    pub index: usize,
    pub collection: String,
    pub kind: &'static str,
    pub target: String,
    #[serde(flatten)]
    pub result: StepResult,
}

/// The step that stopped the run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepFailure {
    pub index: usize,
    pub collection: String,
    pub kind: &'static str,
    pub error: String,
}

/// Outcome of a run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MigrationReport {
    pub dry_run: bool,
    pub success: bool,
    /// Completed steps grouped by collection, in plan order within each
    pub collections: BTreeMap<String, Vec<StepReport>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<StepFailure>,
}

impl MigrationReport {
    /// Number of steps that completed
    pub fn completed(&self) -> usize {
        self.collections.values().map(Vec::len).sum()
    }

    /// Turn a failed report into the error that stopped it
    pub fn into_result(self) -> Result<Self> {
        match &self.failure {
            Some(failure) => Err(DocketError::Internal(format!(
                "step {} ({}) on '{}' failed: {}",
                failure.index, failure.kind, failure.collection, failure.error
            ))),
            None => Ok(self),
        }
    }

    fn record(&mut self, report: StepReport) {
        self.collections
            .entry(report.collection.clone())
            .or_default()
            .push(report);
    }
}

/// Executes a `MigrationPlan`
pub struct MigrationRunner {
    plan: MigrationPlan,
    dry_run: bool,
    cache: Option<Arc<EphemeralCache<serde_json::Value>>>,
}

impl MigrationRunner {
    pub fn new(plan: MigrationPlan) -> Self {
        Self {
            plan,
            dry_run: false,
            cache: None,
        }
    }

    /// Count and inspect only; nothing is written
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Clear cached reference data when a step rewrites its collection
    pub fn with_cache(mut self, cache: Arc<EphemeralCache<serde_json::Value>>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn plan(&self) -> &MigrationPlan {
        &self.plan
    }

    /// Run every step in order, stopping at the first failure
    ///
    /// The report is returned in both cases; `success` is false and
    /// `failure` names the step when the run stopped early.
    pub async fn run(&self, db: &dyn Database) -> MigrationReport {
        let mut report = MigrationReport {
            dry_run: self.dry_run,
            ..Default::default()
        };

        if let Err(e) = self.plan.validate() {
            error!(error = %e, "Refusing to run invalid migration plan");
            report.failure = Some(StepFailure {
                index: 0,
                collection: String::new(),
                kind: "validate",
                error: e.to_string(),
            });
            return report;
        }

        info!(
            steps = self.plan.len(),
            dry_run = self.dry_run,
            "Starting migration run"
        );

        for (index, step) in self.plan.steps().iter().enumerate() {
            let handle = db.handle(&step.collection);

            match self.execute(handle.as_ref(), step).await {
                Ok(result) => {
                    self.invalidate(step, &result);
                    report.record(StepReport {
                        index,
                        collection: step.collection.clone(),
                        kind: step.op.kind(),
                        target: target_of(&step.op),
                        result,
                    });
                }
                Err(e) => {
                    error!(
                        step = index,
                        collection = %step.collection,
                        kind = step.op.kind(),
                        error = %e,
                        "Migration step failed, aborting run"
                    );
                    report.failure = Some(StepFailure {
                        index,
                        collection: step.collection.clone(),
                        kind: step.op.kind(),
                        error: e.to_string(),
                    });
                    return report;
                }
            }
        }

        report.success = true;
        info!(completed = report.completed(), "Migration run finished");
        report
    }

    async fn execute(&self, handle: &dyn CollectionHandle, step: &MigrationStep) -> Result<StepResult> {
        if self.dry_run {
            return self.preview(handle, step).await;
        }

        let result = match &step.op {
            MigrationOp::RenameField { from, to } => {
                StepResult::Data(schema::apply_rename(handle, from, to).await?)
            }
            MigrationOp::UnsetField { path } => {
                StepResult::Data(schema::remove_field(handle, path).await?)
            }
            MigrationOp::CleanupEmpty { path } => {
                StepResult::Data(schema::apply_cleanup(handle, path).await?)
            }
            MigrationOp::ReconcileIndex(spec) => {
                StepResult::Index(reconcile(handle, spec).await?.into())
            }
        };
        Ok(result)
    }

    async fn preview(&self, handle: &dyn CollectionHandle, step: &MigrationStep) -> Result<StepResult> {
        let would_match = match &step.op {
            MigrationOp::RenameField { from, to } => schema::preview_rename(handle, from, to).await?,
            MigrationOp::UnsetField { path } => schema::preview_remove(handle, path).await?,
            MigrationOp::CleanupEmpty { path } => schema::preview_cleanup(handle, path).await?,
            MigrationOp::ReconcileIndex(spec) => {
                return Ok(StepResult::Index(plan_reconcile(handle, spec).await?.into()));
            }
        };

        info!(
            collection = %step.collection,
            op = %step.op,
            would_match = would_match,
            "Dry run"
        );

        Ok(StepResult::Data(UpdateCounts {
            matched: would_match,
            modified: 0,
        }))
    }

    fn invalidate(&self, step: &MigrationStep, result: &StepResult) {
        let Some(cache) = &self.cache else {
            return;
        };
        let StepResult::Data(counts) = result else {
            return;
        };
        if counts.modified == 0 {
            return;
        }
        if let Some(key) = key_for_collection(&step.collection) {
            if cache.clear(key) {
                warn!(collection = %step.collection, key = key, "Cleared cached reference data");
            }
        }
    }
}

fn target_of(op: &MigrationOp) -> String {
    match op {
        MigrationOp::RenameField { from, to } => format!("{} -> {}", from, to),
        MigrationOp::UnsetField { path } | MigrationOp::CleanupEmpty { path } => path.clone(),
        MigrationOp::ReconcileIndex(spec) => spec.name.clone(),
    }
}
