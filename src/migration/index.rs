//! Index reconciliation
//!
//! Brings one named index into conformance with its declared spec, rebuilding
//! (drop + create) only when it is missing or has drifted. Drift covers the
//! `unique` and `sparse` flags and the key pattern itself.

use serde::Serialize;
use std::fmt;
use tracing::info;

use crate::db::catalog::{IndexSpec, PRIMARY_INDEX_NAME};
use crate::db::handle::CollectionHandle;
use crate::types::{DocketError, Result};

/// Result of reconciling one index
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
    /// The index was (or would be) created
    pub rebuilt: bool,
    /// An existing, drifted index was (or would be) dropped first
    pub dropped: bool,
}

impl ReconcileOutcome {
    /// Created from scratch rather than replacing a drifted index
    pub fn created(&self) -> bool {
        self.rebuilt && !self.dropped
    }
}

/// Why an index needs rebuilding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Drift {
    Missing,
    Unique { live: bool, wanted: bool },
    Sparse { live: bool, wanted: bool },
    KeyPattern,
}

impl fmt::Display for Drift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => write!(f, "missing"),
            Self::Unique { live, wanted } => write!(f, "unique {} -> {}", live, wanted),
            Self::Sparse { live, wanted } => write!(f, "sparse {} -> {}", live, wanted),
            Self::KeyPattern => write!(f, "key pattern changed"),
        }
    }
}

/// Compare a live index (if any) against its target
pub fn detect_drift(live: Option<&IndexSpec>, target: &IndexSpec) -> Option<Drift> {
    let Some(live) = live else {
        return Some(Drift::Missing);
    };
    if live.unique != target.unique {
        return Some(Drift::Unique {
            live: live.unique,
            wanted: target.unique,
        });
    }
    if live.sparse != target.sparse {
        return Some(Drift::Sparse {
            live: live.sparse,
            wanted: target.sparse,
        });
    }
    if !target.same_key_pattern(&live.keys) {
        return Some(Drift::KeyPattern);
    }
    None
}

async fn inspect(handle: &dyn CollectionHandle, spec: &IndexSpec) -> Result<(Option<Drift>, bool)> {
    if spec.name == PRIMARY_INDEX_NAME {
        return Err(DocketError::Config(format!(
            "refusing to reconcile the primary index on {}",
            handle.name()
        )));
    }

    let live = handle
        .list_indexes()
        .await?
        .into_iter()
        .find(|index| index.name == spec.name);

    let exists = live.is_some();
    Ok((detect_drift(live.as_ref(), spec), exists))
}

/// Decide what `reconcile` would do without touching the collection
pub async fn plan_reconcile(handle: &dyn CollectionHandle, spec: &IndexSpec) -> Result<ReconcileOutcome> {
    let (drift, exists) = inspect(handle, spec).await?;
    Ok(ReconcileOutcome {
        rebuilt: drift.is_some(),
        dropped: drift.is_some() && exists,
    })
}

/// Make the index named `spec.name` match `spec` exactly
///
/// Idempotent: a second call right after a successful one changes nothing.
/// Drop and create failures are returned, never swallowed; a duplicate-key
/// failure while building a unique index comes back as
/// `DocketError::ConstraintViolation` naming the collection and index.
pub async fn reconcile(handle: &dyn CollectionHandle, spec: &IndexSpec) -> Result<ReconcileOutcome> {
    let collection = handle.name().to_string();
    let (drift, exists) = inspect(handle, spec).await?;

    let Some(drift) = drift else {
        info!(collection = %collection, index = %spec.name, "Index already conforms");
        return Ok(ReconcileOutcome::default());
    };

    // Names are unique per collection, so a drifted index must go first
    if exists {
        info!(collection = %collection, index = %spec.name, drift = %drift, "Dropping drifted index");
        handle.drop_index(&spec.name).await?;
    }

    handle
        .create_index(spec)
        .await
        .map_err(|e| e.for_index(&collection, &spec.name))?;

    info!(
        collection = %collection,
        index = %spec.name,
        unique = spec.unique,
        sparse = spec.sparse,
        drift = %drift,
        "Index built"
    );

    Ok(ReconcileOutcome {
        rebuilt: true,
        dropped: exists,
    })
}
