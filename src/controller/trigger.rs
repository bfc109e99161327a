//! On-commit trigger coordination
//!
//! A request in `OnCommit` mode moves through these states, all derived
//! from its status rather than stored as an enum:
//!
//! - idle: nothing pending
//! - debouncing: a push is pending but arrived less than the debounce
//!   window ago
//! - rate-limited: the last fire was less than the minimum interval ago
//! - active: the last triggered execution is still running
//! - fired: a new execution was created, the counter advanced and the
//!   pending push cleared in one conditioned status write
//!
//! The decision logic is pure ([`evaluate`], [`record_push`],
//! [`apply_fire`]); [`coordinate`] runs it against the store.

use std::time::Duration;

use chrono::{DateTime, Utc};
use kube::ResourceExt;

use super::execution::{create_execution, on_commit_execution_name};
use super::ownership::{Ownership, ownership_of, request_uid};
use super::status::modify_status;
use crate::clock::Clock;
use crate::error::Result;
use crate::models::{
    BuildRequest, OnCommitStatus, PushRecord, TRIGGER_ON_COMMIT, TriggeredExecution,
};
use crate::providers::PushEvent;
use crate::store::{RetryPolicy, Store};

/// Timing policy for on-commit builds
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerPolicy {
    /// Quiet period after the latest push before it may fire
    pub debounce: chrono::Duration,
    /// Minimum spacing between two fires
    pub min_interval: chrono::Duration,
}

impl Default for TriggerPolicy {
    fn default() -> Self {
        Self {
            debounce: chrono::Duration::seconds(10),
            min_interval: chrono::Duration::seconds(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerDecision {
    Idle,
    Debouncing(Duration),
    RateLimited(Duration),
    /// The pending push may fire, subject to single-flight
    Fire(PushRecord),
}

impl TriggerDecision {
    pub fn requeue_after(&self) -> Option<Duration> {
        match self {
            TriggerDecision::Debouncing(wait) | TriggerDecision::RateLimited(wait) => Some(*wait),
            _ => None,
        }
    }
}

/// Decide what the pending push, if any, should do now
pub fn evaluate(
    state: Option<&OnCommitStatus>,
    policy: &TriggerPolicy,
    now: DateTime<Utc>,
) -> TriggerDecision {
    let Some(pending) = state.and_then(|s| s.pending.as_ref()) else {
        return TriggerDecision::Idle;
    };

    if let Some(wait) = remaining(deadline(pending.received_at, policy.debounce), now) {
        return TriggerDecision::Debouncing(wait);
    }

    let last_fired = state.and_then(|s| s.last_triggered_execution.as_ref());
    if let Some(wait) = last_fired.and_then(|last| remaining(deadline(last.triggered_at, policy.min_interval), now)) {
        return TriggerDecision::RateLimited(wait);
    }

    TriggerDecision::Fire(pending.clone())
}

/// `start + window`, saturating at the latest representable instant
fn deadline(start: DateTime<Utc>, window: chrono::Duration) -> DateTime<Utc> {
    start
        .checked_add_signed(window)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn remaining(until: DateTime<Utc>, now: DateTime<Utc>) -> Option<Duration> {
    (until - now).to_std().ok().filter(|d| !d.is_zero())
}

/// Record an authenticated push, replacing any push still waiting
pub fn record_push(state: &mut OnCommitStatus, event: &PushEvent, now: DateTime<Utc>) {
    let record = PushRecord {
        git_ref: event.git_ref.clone(),
        commit: event.commit.clone(),
        received_at: now,
    };
    state.last_received = Some(record.clone());
    state.pending = Some(record);
}

/// Record that `fired` produced execution `name` as trigger number `counter`
///
/// The pending push is only cleared if it is still the one that fired; a
/// newer push that arrived meanwhile stays pending.
pub fn apply_fire(
    state: &mut OnCommitStatus,
    fired: &PushRecord,
    name: &str,
    counter: i64,
    now: DateTime<Utc>,
) {
    state.trigger_counter = state.trigger_counter.max(counter);
    state.last_triggered_execution = Some(TriggeredExecution {
        name: name.to_string(),
        triggered_at: now,
    });
    if state.pending.as_ref() == Some(fired) {
        state.pending = None;
    }
}

/// What remains of the on-commit state once a request leaves `OnCommit` mode
///
/// Pending and triggered pushes are dropped. The counter is kept so that a
/// later return to `OnCommit` names executions after the ones already made.
pub fn retire(state: &OnCommitStatus) -> Option<OnCommitStatus> {
    (state.trigger_counter > 0).then(|| OnCommitStatus {
        trigger_counter: state.trigger_counter,
        ..Default::default()
    })
}

/// What a coordination pass did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    Idle,
    /// Waiting out the debounce window or the minimum interval
    Deferred(Duration),
    /// A previously triggered execution is still running
    Active(String),
    Fired {
        execution: String,
        requeue_after: Option<Duration>,
    },
}

impl TriggerOutcome {
    pub fn requeue_after(&self) -> Option<Duration> {
        match self {
            TriggerOutcome::Deferred(wait) => Some(*wait),
            TriggerOutcome::Fired { requeue_after, .. } => *requeue_after,
            _ => None,
        }
    }
}

/// Run one trigger evaluation for a request against the store
pub async fn coordinate<S: Store + ?Sized>(
    store: &S,
    clock: &dyn Clock,
    policy: &TriggerPolicy,
    retry: &RetryPolicy,
    namespace: &str,
    name: &str,
) -> Result<TriggerOutcome> {
    let Some(request) = store.get_request(namespace, name).await? else {
        return Ok(TriggerOutcome::Idle);
    };
    if !request.is_on_commit() {
        return Ok(TriggerOutcome::Idle);
    }

    let status = request.status_or_default();
    let state = status.on_commit.as_ref();
    let pending = match evaluate(state, policy, clock.now()) {
        TriggerDecision::Idle => return Ok(TriggerOutcome::Idle),
        TriggerDecision::Debouncing(wait) | TriggerDecision::RateLimited(wait) => {
            tracing::debug!(namespace, request = name, wait_ms = wait.as_millis() as u64, "On-commit trigger deferred");
            return Ok(TriggerOutcome::Deferred(wait));
        }
        TriggerDecision::Fire(pending) => pending,
    };

    if let Some(active) = active_execution(store, &request, state).await? {
        tracing::debug!(namespace, request = name, execution = %active, "Build execution still running, not firing");
        return Ok(TriggerOutcome::Active(active));
    }

    let counter = state.map(|s| s.trigger_counter).unwrap_or_default() + 1;
    let execution = on_commit_execution_name(name, counter);
    create_execution(store, &request, &execution, TRIGGER_ON_COMMIT).await?;

    let now = clock.now();
    let updated = modify_status(store, retry, namespace, name, |_, status| {
        let state = status.on_commit.get_or_insert_with(Default::default);
        if superseded(state, counter, &execution) {
            return false;
        }
        apply_fire(state, &pending, &execution, counter, now);
        status.last_build_run_ref = Some(execution.clone());
        true
    })
    .await?;
    let Some(updated) = updated else {
        return Ok(TriggerOutcome::Idle);
    };

    let fresh = updated.status.as_ref().and_then(|s| s.on_commit.as_ref());
    let recorded = fresh.and_then(|s| s.last_triggered_execution.as_ref());
    if recorded.map(|t| t.name.as_str()) != Some(execution.as_str()) {
        tracing::debug!(
            namespace,
            request = name,
            execution = %execution,
            counter,
            "Trigger counter moved on, another evaluator fired first"
        );
        if let Some(active) = active_execution(store, &updated, fresh).await? {
            return Ok(TriggerOutcome::Active(active));
        }
        return Ok(match evaluate(fresh, policy, clock.now()).requeue_after() {
            Some(wait) => TriggerOutcome::Deferred(wait),
            None => TriggerOutcome::Idle,
        });
    }

    tracing::info!(
        namespace,
        request = name,
        execution = %execution,
        counter,
        commit = %pending.commit,
        "Fired on-commit build"
    );

    let requeue_after = evaluate(fresh, policy, clock.now()).requeue_after();
    Ok(TriggerOutcome::Fired {
        execution,
        requeue_after,
    })
}

/// Whether a fire numbered `counter` has been overtaken by a later one
///
/// A retry of our own write sees its counter and name already recorded and
/// is not superseded.
fn superseded(state: &OnCommitStatus, counter: i64, execution: &str) -> bool {
    let recorded = state.last_triggered_execution.as_ref().map(|t| t.name.as_str());
    state.trigger_counter >= counter && recorded != Some(execution)
}

/// The last triggered execution, if it is ours and has not finished
async fn active_execution<S: Store + ?Sized>(
    store: &S,
    request: &BuildRequest,
    state: Option<&OnCommitStatus>,
) -> Result<Option<String>> {
    let Some(last) = state.and_then(|s| s.last_triggered_execution.as_ref()) else {
        return Ok(None);
    };
    let namespace = request.namespace().unwrap_or_default();
    let Some(execution) = store.get_execution(&namespace, &last.name).await? else {
        return Ok(None);
    };
    let owned = ownership_of(&execution, &request_uid(request)?) == Ownership::Owned;
    Ok((owned && !execution.outcome().is_terminal()).then(|| last.name.clone()))
}
