//! Error types for reconciliation
//!
//! Build-execution outcomes are not errors: pending, running, succeeded and
//! failed are reported as status. These are the failures of the controller
//! itself, each mapped to a condition reason.

use crate::store::{ConflictError, StoreError};

pub type Result<T, E = BuildError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("cluster build policy is not configured")]
    MissingPolicy,

    #[error("build strategy not found: {0}")]
    BuildStrategyNotFound(String),

    #[error("{kind} {name} is owned by {owner}")]
    BuildConflict {
        kind: &'static str,
        name: String,
        owner: String,
    },

    #[error("source not reachable: {0}")]
    SourceAccessFailed(String),

    #[error("reconcile failed: {0}")]
    BuildReconcileFailed(#[from] StoreError),
}

impl BuildError {
    /// Condition reason for this failure
    pub fn reason(&self) -> &'static str {
        match self {
            BuildError::MissingPolicy => "MissingPolicy",
            BuildError::BuildStrategyNotFound(_) => "BuildStrategyNotFound",
            BuildError::BuildConflict { .. } => "BuildConflict",
            BuildError::SourceAccessFailed(_) => "SourceAccessFailed",
            BuildError::BuildReconcileFailed(_) => "BuildReconcileFailed",
        }
    }

    /// Whether this failure is an expected state that external action resolves
    ///
    /// These are recorded on the request as `Ready=False` instead of being
    /// surfaced to the controller runtime.
    pub fn is_recordable(&self) -> bool {
        !matches!(self, BuildError::BuildReconcileFailed(_))
    }
}

impl ConflictError for BuildError {
    fn is_conflict(&self) -> bool {
        matches!(self, BuildError::BuildReconcileFailed(e) if e.is_conflict())
    }
}
