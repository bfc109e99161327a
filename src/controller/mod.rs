//! Build orchestration controller
//!
//! Structure:
//! - `policy.rs` - build strategy resolution from the cluster policy
//! - `ownership.rs` - controller-reference checks shared by templates and executions
//! - `template.rs` - the owned 1:1 build template
//! - `execution.rs` - deterministic, create-once build executions
//! - `trigger.rs` - debounce, rate limit and single-flight for on-commit builds
//! - `projector.rs` - execution outcome to request conditions and image
//! - `status.rs` - optimistic read-modify-write of request status
//! - `reconcile.rs` - one reconciliation pass over a request
//!
//! [`run`] wires the reconciler into a `kube` runtime controller watching
//! requests and the templates and executions they own.

pub mod execution;
pub mod ownership;
pub mod policy;
pub mod projector;
pub mod reconcile;
pub mod status;
pub mod template;
pub mod trigger;

pub use reconcile::{ReconcileOutcome, Reconciler};
pub use trigger::{TriggerDecision, TriggerOutcome, TriggerPolicy};

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher;
use kube::{Api, Client, ResourceExt};

use crate::error::BuildError;
use crate::models::{BuildExecution, BuildRequest, BuildTemplate};
use crate::store::{KubeStore, RetryPolicy};

/// Tunables for reconciliation
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerSettings {
    pub trigger: TriggerPolicy,
    /// Requeue delay after a recorded failure or a store error
    pub error_requeue: Duration,
    pub retry: RetryPolicy,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            trigger: TriggerPolicy::default(),
            error_requeue: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

impl From<ReconcileOutcome> for Action {
    fn from(outcome: ReconcileOutcome) -> Self {
        match outcome.requeue_after {
            Some(after) => Action::requeue(after),
            None => Action::await_change(),
        }
    }
}

/// Run the controller until shutdown is signalled
pub async fn run(
    client: Client,
    namespace: Option<String>,
    reconciler: Arc<Reconciler<KubeStore>>,
) -> anyhow::Result<()> {
    let (requests, templates, executions) = match &namespace {
        Some(ns) => (
            Api::<BuildRequest>::namespaced(client.clone(), ns),
            Api::<BuildTemplate>::namespaced(client.clone(), ns),
            Api::<BuildExecution>::namespaced(client.clone(), ns),
        ),
        None => (
            Api::<BuildRequest>::all(client.clone()),
            Api::<BuildTemplate>::all(client.clone()),
            Api::<BuildExecution>::all(client.clone()),
        ),
    };

    tracing::info!(
        namespace = namespace.as_deref().unwrap_or("<all>"),
        "Starting build request controller"
    );

    Controller::new(requests, watcher::Config::default())
        .owns(templates, watcher::Config::default())
        .owns(executions, watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, reconciler)
        .for_each(|result| async move {
            match result {
                Ok((object, action)) => {
                    tracing::debug!(object = %object, ?action, "Reconciled");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Reconcile failed");
                }
            }
        })
        .await;

    tracing::info!("Build request controller stopped");
    Ok(())
}

async fn reconcile(
    request: Arc<BuildRequest>,
    reconciler: Arc<Reconciler<KubeStore>>,
) -> Result<Action, BuildError> {
    let namespace = request.namespace().unwrap_or_default();
    let outcome = reconciler.reconcile(&namespace, &request.name_any()).await?;
    Ok(outcome.into())
}

fn error_policy(
    request: Arc<BuildRequest>,
    error: &BuildError,
    reconciler: Arc<Reconciler<KubeStore>>,
) -> Action {
    tracing::warn!(
        namespace = %request.namespace().unwrap_or_default(),
        request = %request.name_any(),
        reason = error.reason(),
        error = %error,
        "Reconcile error, requeueing"
    );
    Action::requeue(reconciler.settings().error_requeue)
}
