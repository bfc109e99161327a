//! `BuildExecution` custom resource
//!
//! One instance per triggered build attempt. Created once, never patched
//! by this controller; an external build system fills in its status.

use kube::CustomResource;
use serde::{Deserialize, Serialize};

use super::conditions::{Condition, ConditionStatus, SUCCEEDED, find_condition};

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[kube(
    group = "buildwright.dev",
    version = "v1alpha1",
    kind = "BuildExecution",
    namespaced
)]
#[kube(status = "BuildExecutionStatus", shortname = "bexec")]
#[kube(schema = "disabled")]
#[kube(printcolumn = r#"{"name":"Succeeded","type":"string","jsonPath":".status.conditions[?(@.type==\"Succeeded\")].status"}"#)]
#[serde(rename_all = "camelCase")]
pub struct BuildExecutionSpec {
    /// Name of the build template in the same namespace
    pub build_ref: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BuildExecutionStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<ExecutionOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_details: Option<FailureDetails>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct ExecutionOutput {
    /// Content digest of the pushed image, e.g. `sha256:…`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct FailureDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Outcome of an execution as read from its `Succeeded` condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// No outcome condition reported yet
    Pending,
    Running { message: Option<String> },
    Succeeded,
    Failed { message: Option<String> },
}

impl ExecutionOutcome {
    /// Whether the execution has reached a definitive result
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionOutcome::Succeeded | ExecutionOutcome::Failed { .. })
    }
}

impl BuildExecution {
    pub fn outcome(&self) -> ExecutionOutcome {
        let Some(status) = self.status.as_ref() else {
            return ExecutionOutcome::Pending;
        };
        let Some(condition) = find_condition(&status.conditions, SUCCEEDED) else {
            return ExecutionOutcome::Pending;
        };

        let condition_message = (!condition.message.is_empty()).then(|| condition.message.clone());
        match condition.status {
            ConditionStatus::True => ExecutionOutcome::Succeeded,
            ConditionStatus::False => ExecutionOutcome::Failed {
                message: status
                    .failure_details
                    .as_ref()
                    .and_then(|d| d.message.clone())
                    .or(condition_message),
            },
            ConditionStatus::Unknown => ExecutionOutcome::Running {
                message: condition_message,
            },
        }
    }

    /// Image digest reported by the execution, if any
    pub fn digest(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.output.as_ref())
            .and_then(|o| o.digest.as_deref())
            .filter(|d| !d.is_empty())
    }
}
