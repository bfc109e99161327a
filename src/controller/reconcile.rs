//! Reconciliation of a single `BuildRequest`
//!
//! One pass, in order:
//! 1. keep the on-commit selection label in step with the rebuild mode
//! 2. resolve the build strategy from the cluster policy
//! 3. converge the owned build template
//! 4. start a build when the build-relevant spec changed
//! 5. run the on-commit trigger coordinator
//! 6. project the latest execution's outcome and mark the request ready
//!
//! Expected failures (missing policy, missing strategy, ownership
//! conflicts) are recorded as `Ready=False` and requeued; store failures
//! are returned to the caller.

use std::sync::Arc;
use std::time::Duration;

use kube::ResourceExt;

use super::ControllerSettings;
use super::execution::{create_execution, plain_execution_name};
use super::policy::resolve_strategy;
use super::projector::{project_build_condition, resolve_image};
use super::status::modify_status;
use super::template::{build_ref, is_new_build_required, reconcile_template};
use super::trigger::{TriggerOutcome, coordinate, retire};
use crate::clock::Clock;
use crate::error::{BuildError, Result};
use crate::models::conditions::{READY, set_condition};
use crate::models::{
    BuildRequest, Condition, ConditionStatus, ExecutionOutcome, ON_COMMIT_LABEL, TRIGGER_INITIAL,
};
use crate::store::Store;

/// When the controller runtime should look at the request again
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub requeue_after: Option<Duration>,
}

impl ReconcileOutcome {
    pub fn done() -> Self {
        Self::default()
    }

    pub fn requeue(after: Duration) -> Self {
        Self {
            requeue_after: Some(after),
        }
    }

    /// Keep the sooner of two requeue requests
    fn merge(self, other: Option<Duration>) -> Self {
        let requeue_after = match (self.requeue_after, other) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        Self { requeue_after }
    }
}

/// Store-agnostic reconcile logic
pub struct Reconciler<S> {
    store: S,
    clock: Arc<dyn Clock>,
    settings: ControllerSettings,
}

impl<S: Store> Reconciler<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>, settings: ControllerSettings) -> Self {
        Self {
            store,
            clock,
            settings,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    /// Reconcile the request `namespace/name`
    pub async fn reconcile(&self, namespace: &str, name: &str) -> Result<ReconcileOutcome> {
        let Some(request) = self.store.get_request(namespace, name).await? else {
            tracing::debug!(namespace, request = name, "BuildRequest gone, nothing to do");
            return Ok(ReconcileOutcome::done());
        };

        let request = self.sync_selection_label(request).await?;

        match self.reconcile_request(&request).await {
            Ok(outcome) => Ok(outcome),
            Err(err) if err.is_recordable() => {
                tracing::warn!(
                    namespace,
                    request = name,
                    reason = err.reason(),
                    error = %err,
                    "Reconcile blocked"
                );
                self.record_failure(namespace, name, &err).await?;
                Ok(ReconcileOutcome::requeue(self.settings.error_requeue))
            }
            Err(err) => Err(err),
        }
    }

    async fn reconcile_request(&self, request: &BuildRequest) -> Result<ReconcileOutcome> {
        let namespace = request.namespace().unwrap_or_default();
        let name = request.name_any();
        let retry = &self.settings.retry;

        let strategy = resolve_strategy(&self.store, &request.spec).await?;
        let template = reconcile_template(&self.store, request, &strategy, retry).await?;

        let recorded = request.status.as_ref().and_then(|s| s.last_build_spec.as_ref());
        if is_new_build_required(recorded, &request.spec) {
            self.start_build(request).await?;
        }

        let mut outcome = ReconcileOutcome::done();
        if request.is_on_commit() {
            let triggered = coordinate(
                &self.store,
                self.clock.as_ref(),
                &self.settings.trigger,
                retry,
                &namespace,
                &name,
            )
            .await?;
            if let TriggerOutcome::Active(execution) = &triggered {
                tracing::debug!(namespace = %namespace, request = %name, execution = %execution, "Waiting on active build");
            }
            outcome = outcome.merge(triggered.requeue_after());
        } else {
            self.retire_on_commit_state(request).await?;
        }

        self.project_status(&namespace, &name, &build_ref(&template))
            .await?;
        Ok(outcome)
    }

    /// Add or remove the on-commit selection label
    async fn sync_selection_label(&self, request: BuildRequest) -> Result<BuildRequest> {
        let desired = request.is_on_commit().then(|| "true".to_string());
        if request.labels().get(ON_COMMIT_LABEL) == desired.as_ref() {
            return Ok(request);
        }

        let namespace = request.namespace().unwrap_or_default();
        let name = request.name_any();
        self.store
            .set_request_label(&namespace, &name, ON_COMMIT_LABEL, desired)
            .await?;
        Ok(self.store.get_request(&namespace, &name).await?.unwrap_or(request))
    }

    /// Drop on-commit state left over from before the request left `OnCommit`
    async fn retire_on_commit_state(&self, request: &BuildRequest) -> Result<()> {
        let leftover = request.status.as_ref().and_then(|s| s.on_commit.as_ref());
        if leftover.is_none_or(|state| retire(state).as_ref() == Some(state)) {
            return Ok(());
        }

        let namespace = request.namespace().unwrap_or_default();
        let name = request.name_any();
        modify_status(&self.store, &self.settings.retry, &namespace, &name, |current, status| {
            let Some(state) = status.on_commit.as_ref() else {
                return false;
            };
            let retired = retire(state);
            if current.is_on_commit() || retired.as_ref() == Some(state) {
                return false;
            }
            status.on_commit = retired;
            true
        })
        .await?;
        tracing::debug!(namespace = %namespace, request = %name, "Cleared on-commit state");
        Ok(())
    }

    /// Create the next plain execution and record the spec it was built from
    async fn start_build(&self, request: &BuildRequest) -> Result<()> {
        let namespace = request.namespace().unwrap_or_default();
        let name = request.name_any();
        let counter = request.status_or_default().build_run_counter + 1;
        let execution = plain_execution_name(&name, counter);

        create_execution(&self.store, request, &execution, TRIGGER_INITIAL).await?;

        let snapshot = request.spec.snapshot();
        modify_status(&self.store, &self.settings.retry, &namespace, &name, |_, status| {
            status.build_run_counter = status.build_run_counter.max(counter);
            status.last_build_run_ref = Some(execution.clone());
            status.last_build_spec = Some(snapshot.clone());
            true
        })
        .await?;
        Ok(())
    }

    /// Write conditions, image and references derived from the current state
    async fn project_status(&self, namespace: &str, name: &str, build_ref: &str) -> Result<()> {
        let Some(request) = self.store.get_request(namespace, name).await? else {
            return Ok(());
        };
        let status = request.status_or_default();

        let projected = match status.last_build_run_ref.as_deref() {
            Some(execution_name) => {
                let execution = self.store.get_execution(namespace, execution_name).await?;
                let outcome = execution
                    .as_ref()
                    .map(|e| e.outcome())
                    .unwrap_or(ExecutionOutcome::Pending);
                let digest = execution.as_ref().and_then(|e| e.digest());
                Some((
                    execution_name.to_string(),
                    project_build_condition(&outcome),
                    resolve_image(&request.spec.output.image, digest),
                ))
            }
            None => None,
        };

        let now = self.clock.now();
        modify_status(&self.store, &self.settings.retry, namespace, name, |current, status| {
            let generation = current.metadata.generation;
            let mut changed = false;

            if status.build_ref.as_deref() != Some(build_ref) {
                status.build_ref = Some(build_ref.to_string());
                changed = true;
            }
            if status.observed_generation != generation {
                status.observed_generation = generation;
                changed = true;
            }

            // Only project onto the execution it was computed for
            if let Some((execution, condition, image)) = &projected {
                if status.last_build_run_ref.as_ref() == Some(execution) {
                    changed |= set_condition(
                        &mut status.conditions,
                        condition.clone().with_generation(generation),
                        now,
                    );
                    if image.is_some() && status.latest_image != *image {
                        status.latest_image = image.clone();
                        changed = true;
                    }
                }
            }

            let ready = Condition::new(
                READY,
                ConditionStatus::True,
                "Reconciled",
                format!("build template {} is up to date", build_ref),
            )
            .with_generation(generation);
            changed |= set_condition(&mut status.conditions, ready, now);
            changed
        })
        .await?;
        Ok(())
    }

    async fn record_failure(&self, namespace: &str, name: &str, err: &BuildError) -> Result<()> {
        let now = self.clock.now();
        let message = err.to_string();
        modify_status(&self.store, &self.settings.retry, namespace, name, |current, status| {
            let condition = Condition::new(READY, ConditionStatus::False, err.reason(), message.clone())
                .with_generation(current.metadata.generation);
            set_condition(&mut status.conditions, condition, now)
        })
        .await?;
        Ok(())
    }
}
