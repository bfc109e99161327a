//! End-to-end reconcile scenarios against the in-memory store

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use buildwright::clock::{Clock, ManualClock};
use buildwright::controller::status::modify_status;
use buildwright::controller::trigger::record_push;
use buildwright::controller::{ControllerSettings, ReconcileOutcome, Reconciler};
use buildwright::error::BuildError;
use buildwright::models::conditions::{BUILD_SUCCEEDED, READY, SUCCEEDED, find_condition};
use buildwright::models::{
    BuildExecution, BuildExecutionSpec, BuildExecutionStatus, BuildFileMode, BuildRequest,
    BuildRequestSpec, BuildRequestStatus, BuildStrategies, BuildTemplate, BuildTemplateSpec,
    ClusterPolicy, Condition, ConditionStatus, ExecutionOutput, GitSource, ON_COMMIT_LABEL,
    OnCommit, Output, Rebuild, RebuildMode, SecretKeyRef, Source, TRIGGER_INITIAL,
    TRIGGER_LABEL, TRIGGER_ON_COMMIT,
};
use buildwright::providers::PushEvent;
use buildwright::store::{MemoryStore, RetryPolicy};
use chrono::{TimeZone, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;

const NS: &str = "default";

struct Harness {
    store: MemoryStore,
    clock: ManualClock,
    reconciler: Reconciler<MemoryStore>,
}

impl Harness {
    fn new() -> Self {
        let store = MemoryStore::new();
        store.set_policy(Some(ClusterPolicy {
            build_strategies: BuildStrategies {
                buildfile: Some("buildkit".to_string()),
                no_buildfile: Some("buildpacks".to_string()),
            },
        }));
        store.insert_strategy("buildkit");
        store.insert_strategy("buildpacks");

        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap());
        let settings = ControllerSettings {
            retry: fast_retry(),
            ..Default::default()
        };
        let reconciler = Reconciler::new(
            store.clone(),
            Arc::new(clock.clone()) as Arc<dyn Clock>,
            settings,
        );

        Self {
            store,
            clock,
            reconciler,
        }
    }

    async fn reconcile(&self) -> ReconcileOutcome {
        self.reconciler.reconcile(NS, "app").await.unwrap()
    }

    fn status(&self) -> BuildRequestStatus {
        self.store
            .request(NS, "app")
            .and_then(|r| r.status)
            .unwrap_or_default()
    }

    fn condition(&self, condition_type: &str) -> Condition {
        find_condition(&self.status().conditions, condition_type)
            .cloned()
            .unwrap_or_else(|| panic!("no {} condition", condition_type))
    }

    fn execution_names(&self) -> Vec<String> {
        self.store
            .executions(NS)
            .iter()
            .map(|e| e.name_any())
            .collect()
    }

    async fn push(&self, commit: &str) {
        let event = PushEvent {
            repository_url: "https://github.com/org/app".to_string(),
            git_ref: "refs/heads/main".to_string(),
            commit: commit.to_string(),
        };
        let now = self.clock.now();
        modify_status(&self.store, &fast_retry(), NS, "app", |_, status| {
            record_push(status.on_commit.get_or_insert_with(Default::default), &event, now);
            true
        })
        .await
        .unwrap();
    }

    fn advance(&self, secs: i64) {
        self.clock.advance(chrono::Duration::seconds(secs));
    }
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 5,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(4),
    }
}

fn spec(mode: RebuildMode) -> BuildRequestSpec {
    BuildRequestSpec {
        source: Source {
            git: GitSource {
                url: "https://github.com/org/app.git".to_string(),
                revision: "main".to_string(),
                clone_secret: Some("git-creds".to_string()),
            },
            context_dir: Some("services/app".to_string()),
        },
        build_file: BuildFileMode::Present,
        output: Output {
            image: "registry.example.com/org/app".to_string(),
            push_secret: Some("registry-creds".to_string()),
        },
        rebuild: Some(Rebuild { mode }),
        on_commit: (mode == RebuildMode::OnCommit).then(|| OnCommit {
            webhook_secret: SecretKeyRef {
                name: "hook".to_string(),
                key: "secret".to_string(),
            },
        }),
    }
}

fn execution_status(status: ConditionStatus, digest: Option<&str>) -> BuildExecutionStatus {
    BuildExecutionStatus {
        conditions: vec![Condition::new(SUCCEEDED, status, "", "")],
        output: digest.map(|d| ExecutionOutput {
            digest: Some(d.to_string()),
        }),
        failure_details: None,
    }
}

fn foreign_owner() -> OwnerReference {
    OwnerReference {
        api_version: "apps/v1".to_string(),
        kind: "Deployment".to_string(),
        name: "intruder".to_string(),
        uid: "uid-foreign".to_string(),
        controller: Some(true),
        block_owner_deletion: None,
    }
}

#[tokio::test]
async fn test_first_reconcile_creates_template_and_build() {
    let h = Harness::new();
    h.store
        .insert_request(BuildRequest::new("app", spec(RebuildMode::Initial)));

    assert_eq!(h.reconcile().await, ReconcileOutcome::done());

    let template = h.store.template(NS, "app-build").unwrap();
    assert_eq!(template.spec.strategy.name, "buildkit");
    assert_eq!(template.spec.strategy.kind, "ClusterBuildStrategy");
    assert_eq!(template.spec.source.context_dir.as_deref(), Some("services/app"));
    assert_eq!(template.spec.source.clone_secret.as_deref(), Some("git-creds"));
    assert_eq!(template.spec.output.push_secret.as_deref(), Some("registry-creds"));

    let execution = h.store.execution(NS, "app-buildrun-1").unwrap();
    assert_eq!(execution.spec.build_ref, "app-build");
    assert_eq!(
        execution.labels().get(TRIGGER_LABEL).map(String::as_str),
        Some(TRIGGER_INITIAL)
    );

    let status = h.status();
    assert_eq!(status.build_ref.as_deref(), Some("default/app-build"));
    assert_eq!(status.build_run_counter, 1);
    assert_eq!(status.last_build_run_ref.as_deref(), Some("app-buildrun-1"));
    assert_eq!(status.observed_generation, Some(1));
    assert_eq!(status.latest_image, None);
    assert_eq!(h.condition(READY).status, ConditionStatus::True);
    assert_eq!(h.condition(BUILD_SUCCEEDED).reason, "Pending");
}

#[tokio::test]
async fn test_reconcile_is_idempotent() {
    let h = Harness::new();
    h.store
        .insert_request(BuildRequest::new("app", spec(RebuildMode::Initial)));

    h.reconcile().await;
    let first = h.store.request(NS, "app").unwrap();
    h.reconcile().await;
    h.reconcile().await;

    assert_eq!(h.execution_names(), vec!["app-buildrun-1"]);
    assert_eq!(h.store.request(NS, "app").unwrap().status, first.status);
}

#[tokio::test]
async fn test_spec_change_starts_next_build() {
    let h = Harness::new();
    h.store
        .insert_request(BuildRequest::new("app", spec(RebuildMode::Initial)));
    h.reconcile().await;

    h.store.update_request_spec(NS, "app", |spec| {
        spec.output.image = "registry.example.com/org/app-v2".to_string();
    });
    h.reconcile().await;

    assert_eq!(h.execution_names(), vec!["app-buildrun-1", "app-buildrun-2"]);
    let status = h.status();
    assert_eq!(status.build_run_counter, 2);
    assert_eq!(status.last_build_run_ref.as_deref(), Some("app-buildrun-2"));
    assert_eq!(status.observed_generation, Some(2));
    assert_eq!(
        h.store.template(NS, "app-build").unwrap().spec.output.image,
        "registry.example.com/org/app-v2"
    );
}

#[tokio::test]
async fn test_switching_rebuild_mode_only_relabels() {
    let h = Harness::new();
    h.store
        .insert_request(BuildRequest::new("app", spec(RebuildMode::Initial)));
    h.reconcile().await;
    assert!(!h.store.request(NS, "app").unwrap().labels().contains_key(ON_COMMIT_LABEL));

    h.store.update_request_spec(NS, "app", |s| *s = spec(RebuildMode::OnCommit));
    h.reconcile().await;

    let request = h.store.request(NS, "app").unwrap();
    assert_eq!(request.labels().get(ON_COMMIT_LABEL).map(String::as_str), Some("true"));
    assert_eq!(h.execution_names(), vec!["app-buildrun-1"]);

    h.store.update_request_spec(NS, "app", |s| *s = spec(RebuildMode::Initial));
    h.reconcile().await;
    assert!(!h.store.request(NS, "app").unwrap().labels().contains_key(ON_COMMIT_LABEL));
}

#[tokio::test]
async fn test_switching_back_to_on_commit_does_not_fire_stale_push() {
    let h = Harness::new();
    h.store
        .insert_request(BuildRequest::new("app", spec(RebuildMode::OnCommit)));
    h.reconcile().await;

    h.push("first").await;
    h.advance(10);
    h.reconcile().await;
    h.store.set_execution_status(
        NS,
        "app-buildrun-oncommit-1",
        execution_status(ConditionStatus::True, Some("sha256:first")),
    );
    h.push("old-commit").await;

    h.store.update_request_spec(NS, "app", |s| *s = spec(RebuildMode::Initial));
    h.reconcile().await;
    let on_commit = h.status().on_commit.unwrap();
    assert_eq!(on_commit.pending, None);
    assert_eq!(on_commit.last_triggered_execution, None);
    assert_eq!(on_commit.trigger_counter, 1);

    h.advance(30 * 24 * 60 * 60);
    h.store.update_request_spec(NS, "app", |s| *s = spec(RebuildMode::OnCommit));
    assert_eq!(h.reconcile().await, ReconcileOutcome::done());
    assert_eq!(
        h.execution_names(),
        vec!["app-buildrun-1", "app-buildrun-oncommit-1"]
    );

    h.push("new-commit").await;
    h.advance(10);
    h.reconcile().await;
    assert_eq!(
        h.execution_names(),
        vec![
            "app-buildrun-1",
            "app-buildrun-oncommit-1",
            "app-buildrun-oncommit-2"
        ]
    );
}

#[tokio::test]
async fn test_missing_policy_is_recorded() {
    let h = Harness::new();
    h.store.set_policy(None);
    h.store
        .insert_request(BuildRequest::new("app", spec(RebuildMode::Initial)));

    let outcome = h.reconcile().await;
    assert_eq!(outcome, ReconcileOutcome::requeue(Duration::from_secs(30)));

    let ready = h.condition(READY);
    assert_eq!(ready.status, ConditionStatus::False);
    assert_eq!(ready.reason, "MissingPolicy");
    assert!(h.store.template(NS, "app-build").is_none());
    assert!(h.execution_names().is_empty());
}

#[tokio::test]
async fn test_unknown_strategy_is_recorded_then_recovers() {
    let h = Harness::new();
    h.store.set_policy(Some(ClusterPolicy {
        build_strategies: BuildStrategies {
            buildfile: Some("kaniko".to_string()),
            no_buildfile: None,
        },
    }));
    h.store
        .insert_request(BuildRequest::new("app", spec(RebuildMode::Initial)));

    h.reconcile().await;
    let ready = h.condition(READY);
    assert_eq!(ready.reason, "BuildStrategyNotFound");
    assert!(ready.message.contains("kaniko"));

    h.store.insert_strategy("kaniko");
    assert_eq!(h.reconcile().await, ReconcileOutcome::done());
    assert_eq!(h.condition(READY).status, ConditionStatus::True);
    assert_eq!(h.store.template(NS, "app-build").unwrap().spec.strategy.name, "kaniko");
}

#[tokio::test]
async fn test_foreign_template_is_left_alone() {
    let h = Harness::new();
    h.store
        .insert_request(BuildRequest::new("app", spec(RebuildMode::Initial)));

    let mut template = BuildTemplate::new("app-build", BuildTemplateSpec::default());
    template.metadata.namespace = Some(NS.to_string());
    template.metadata.owner_references = Some(vec![foreign_owner()]);
    h.store.put_template(template);

    h.reconcile().await;

    let ready = h.condition(READY);
    assert_eq!(ready.reason, "BuildConflict");
    assert!(ready.message.contains("Deployment/intruder"));
    assert_eq!(h.store.template(NS, "app-build").unwrap().spec.strategy.name, "");
    assert!(h.execution_names().is_empty());
}

#[tokio::test]
async fn test_unowned_template_is_adopted() {
    let h = Harness::new();
    let request = h
        .store
        .insert_request(BuildRequest::new("app", spec(RebuildMode::Initial)));

    let mut template = BuildTemplate::new("app-build", BuildTemplateSpec::default());
    template.metadata.namespace = Some(NS.to_string());
    template.metadata.labels = Some(BTreeMap::from([("team".to_string(), "web".to_string())]));
    h.store.put_template(template);

    h.reconcile().await;

    let template = h.store.template(NS, "app-build").unwrap();
    assert_eq!(template.spec.strategy.name, "buildkit");
    assert_eq!(template.labels().get("team").map(String::as_str), Some("web"));
    assert_eq!(template.owner_references()[0].uid, request.uid().unwrap());
}

#[tokio::test]
async fn test_execution_name_taken_by_someone_else() {
    let h = Harness::new();
    h.store
        .insert_request(BuildRequest::new("app", spec(RebuildMode::Initial)));

    let mut squatter = BuildExecution::new(
        "app-buildrun-1",
        BuildExecutionSpec {
            build_ref: "other-build".to_string(),
        },
    );
    squatter.metadata.namespace = Some(NS.to_string());
    h.store.put_execution(squatter);

    let outcome = h.reconcile().await;
    assert_eq!(outcome.requeue_after, Some(Duration::from_secs(30)));

    let ready = h.condition(READY);
    assert_eq!(ready.reason, "BuildConflict");
    assert!(ready.message.contains("nobody"));
    assert_eq!(h.status().build_run_counter, 0);
    assert_eq!(
        h.store.execution(NS, "app-buildrun-1").unwrap().spec.build_ref,
        "other-build"
    );
}

#[tokio::test]
async fn test_success_projects_pinned_image() {
    let h = Harness::new();
    h.store
        .insert_request(BuildRequest::new("app", spec(RebuildMode::Initial)));
    h.reconcile().await;

    h.store.set_execution_status(
        NS,
        "app-buildrun-1",
        execution_status(ConditionStatus::True, Some("sha256:0123abcd")),
    );
    h.reconcile().await;

    assert_eq!(h.condition(BUILD_SUCCEEDED).status, ConditionStatus::True);
    assert_eq!(
        h.status().latest_image.as_deref(),
        Some("registry.example.com/org/app@sha256:0123abcd")
    );

    // A new build keeps the last known image until it reports its own
    h.store.update_request_spec(NS, "app", |spec| {
        spec.source.git.revision = "release".to_string();
    });
    h.reconcile().await;
    assert_eq!(h.condition(BUILD_SUCCEEDED).reason, "Pending");
    assert_eq!(
        h.status().latest_image.as_deref(),
        Some("registry.example.com/org/app@sha256:0123abcd")
    );
}

#[tokio::test]
async fn test_failed_build_is_reported_but_request_stays_ready() {
    let h = Harness::new();
    h.store
        .insert_request(BuildRequest::new("app", spec(RebuildMode::Initial)));
    h.reconcile().await;

    h.store.set_execution_status(
        NS,
        "app-buildrun-1",
        execution_status(ConditionStatus::False, None),
    );
    assert_eq!(h.reconcile().await, ReconcileOutcome::done());

    let build = h.condition(BUILD_SUCCEEDED);
    assert_eq!(build.status, ConditionStatus::False);
    assert_eq!(build.reason, "Failed");
    assert_eq!(h.condition(READY).status, ConditionStatus::True);
    assert_eq!(h.execution_names(), vec!["app-buildrun-1"]);
}

#[tokio::test]
async fn test_on_commit_flow() {
    let h = Harness::new();
    h.store
        .insert_request(BuildRequest::new("app", spec(RebuildMode::OnCommit)));

    assert_eq!(h.reconcile().await, ReconcileOutcome::done());
    assert_eq!(h.execution_names(), vec!["app-buildrun-1"]);

    h.push("c1").await;
    h.advance(4);
    assert_eq!(
        h.reconcile().await,
        ReconcileOutcome::requeue(Duration::from_secs(6))
    );

    h.advance(6);
    assert_eq!(h.reconcile().await, ReconcileOutcome::done());
    let fired = h.store.execution(NS, "app-buildrun-oncommit-1").unwrap();
    assert_eq!(
        fired.labels().get(TRIGGER_LABEL).map(String::as_str),
        Some(TRIGGER_ON_COMMIT)
    );
    let status = h.status();
    assert_eq!(status.last_build_run_ref.as_deref(), Some("app-buildrun-oncommit-1"));
    let on_commit = status.on_commit.unwrap();
    assert_eq!(on_commit.trigger_counter, 1);
    assert_eq!(on_commit.pending, None);

    // Within the minimum interval
    h.advance(2);
    h.push("c2").await;
    h.advance(10);
    assert_eq!(
        h.reconcile().await,
        ReconcileOutcome::requeue(Duration::from_secs(18))
    );

    // Interval elapsed, previous build still running
    h.advance(18);
    assert_eq!(h.reconcile().await, ReconcileOutcome::done());
    assert!(h.store.execution(NS, "app-buildrun-oncommit-2").is_none());

    h.store.set_execution_status(
        NS,
        "app-buildrun-oncommit-1",
        execution_status(ConditionStatus::True, Some("sha256:c1")),
    );
    h.reconcile().await;

    assert!(h.store.execution(NS, "app-buildrun-oncommit-2").is_some());
    let status = h.status();
    assert_eq!(status.on_commit.unwrap().trigger_counter, 2);
    assert_eq!(status.last_build_run_ref.as_deref(), Some("app-buildrun-oncommit-2"));
    assert_eq!(status.build_run_counter, 1);
}

#[tokio::test]
async fn test_status_conflicts_are_retried() {
    let h = Harness::new();
    h.store
        .insert_request(BuildRequest::new("app", spec(RebuildMode::Initial)));
    h.store.inject_status_conflicts(3);

    assert_eq!(h.reconcile().await, ReconcileOutcome::done());
    assert_eq!(h.execution_names(), vec!["app-buildrun-1"]);
    assert_eq!(h.status().build_run_counter, 1);
}

#[tokio::test]
async fn test_store_outage_is_returned() {
    let h = Harness::new();
    h.store
        .insert_request(BuildRequest::new("app", spec(RebuildMode::Initial)));
    h.store.set_unavailable(true);

    let err = h.reconciler.reconcile(NS, "app").await.unwrap_err();
    assert!(matches!(err, BuildError::BuildReconcileFailed(_)));
    assert!(!err.is_recordable());
}

#[tokio::test]
async fn test_deleted_request_needs_nothing() {
    let h = Harness::new();
    assert_eq!(h.reconcile().await, ReconcileOutcome::done());
}
