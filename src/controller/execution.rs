//! Build execution creation
//!
//! Executions are created exactly once under a deterministic name and never
//! patched afterwards. When the name is already taken the existing object is
//! re-read: one we own is adopted as the result of an earlier attempt,
//! anything else is a conflict.

use std::collections::BTreeMap;

use kube::ResourceExt;

use super::ownership::{ensure_owned, owner_reference, request_uid};
use crate::error::Result;
use crate::models::{
    BUILD_REQUEST_LABEL, BuildExecution, BuildExecutionSpec, BuildRequest, TRIGGER_LABEL,
};
use crate::store::{Store, StoreError};

/// Name of the `counter`-th execution started from a spec change
pub fn plain_execution_name(request: &str, counter: i64) -> String {
    format!("{}-buildrun-{}", request, counter)
}

/// Name of the `counter`-th execution started from a push
pub fn on_commit_execution_name(request: &str, counter: i64) -> String {
    format!("{}-buildrun-oncommit-{}", request, counter)
}

pub fn desired_execution(request: &BuildRequest, name: &str, trigger: &str) -> Result<BuildExecution> {
    let mut execution = BuildExecution::new(
        name,
        BuildExecutionSpec {
            build_ref: request.template_name(),
        },
    );
    execution.metadata.namespace = request.namespace();
    execution.metadata.owner_references = Some(vec![owner_reference(request)?]);
    execution.metadata.labels = Some(BTreeMap::from([
        (BUILD_REQUEST_LABEL.to_string(), request.name_any()),
        (TRIGGER_LABEL.to_string(), trigger.to_string()),
    ]));
    Ok(execution)
}

/// Create the named execution, or adopt it if this request already did
pub async fn create_execution<S: Store + ?Sized>(
    store: &S,
    request: &BuildRequest,
    name: &str,
    trigger: &str,
) -> Result<BuildExecution> {
    let execution = desired_execution(request, name, trigger)?;
    let namespace = execution.namespace().unwrap_or_default();

    match store.create_execution(&execution).await {
        Ok(created) => {
            tracing::info!(
                namespace = %namespace,
                request = %request.name_any(),
                execution = %name,
                trigger,
                "Created build execution"
            );
            Ok(created)
        }
        Err(StoreError::AlreadyExists { .. }) => {
            let existing = store
                .get_execution(&namespace, name)
                .await?
                .ok_or_else(|| StoreError::Conflict {
                    kind: "BuildExecution",
                    name: name.to_string(),
                })?;
            ensure_owned(&existing, &request_uid(request)?, "BuildExecution")?;
            tracing::debug!(namespace = %namespace, execution = %name, "Build execution already exists");
            Ok(existing)
        }
        Err(e) => Err(e.into()),
    }
}
