//! buildwright model layer
//!
//! Rust types for the custom resources this controller reads and writes.
//!
//! Structure:
//! - `build_request.rs` - the user-facing `BuildRequest` and its status
//! - `build_template.rs` - the owned, 1:1 `BuildTemplate`
//! - `build_execution.rs` - one immutable `BuildExecution` per build attempt
//! - `build_strategy.rs` - cluster-scoped `ClusterBuildStrategy` references
//! - `conditions.rs` - condition bookkeeping shared by all statuses
//! - `policy.rs` - the cluster-wide build policy

pub mod build_execution;
pub mod build_request;
pub mod build_strategy;
pub mod build_template;
pub mod conditions;
pub mod policy;

pub use build_execution::{
    BuildExecution, BuildExecutionSpec, BuildExecutionStatus, ExecutionOutcome, ExecutionOutput,
    FailureDetails,
};
pub use build_request::{
    BuildFileMode, BuildRequest, BuildRequestSpec, BuildRequestStatus, BuildSnapshot, GitSource,
    OnCommit, OnCommitStatus, Output, PushRecord, Rebuild, RebuildMode, SecretKeyRef, Source,
    TriggeredExecution,
};
pub use build_strategy::{ClusterBuildStrategy, ClusterBuildStrategySpec};
pub use build_template::{
    BuildTemplate, BuildTemplateSpec, StrategyRef, TemplateOutput, TemplateSource,
};
pub use conditions::{Condition, ConditionStatus};
pub use policy::{BuildStrategies, ClusterPolicy};

/// API group shared by every buildwright custom resource
pub const API_GROUP: &str = "buildwright.dev";

/// Label selecting requests whose rebuild mode is `OnCommit`
pub const ON_COMMIT_LABEL: &str = "buildwright.dev/on-commit";

/// Label carrying the owning request's name on templates and executions
pub const BUILD_REQUEST_LABEL: &str = "buildwright.dev/build-request";

/// Label recording which path created an execution (`initial` or `on-commit`)
pub const TRIGGER_LABEL: &str = "buildwright.dev/trigger";

pub const TRIGGER_INITIAL: &str = "initial";
pub const TRIGGER_ON_COMMIT: &str = "on-commit";
