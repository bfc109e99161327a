//! Push acceptance
//!
//! Matches an inbound push against on-commit requests and authenticates it
//! with each matching request's own secret. Only once every match has been
//! checked is the push recorded as pending on the requests that accepted
//! it. Firing is left to reconciliation.

use kube::ResourceExt;

use super::{WebhookError, WebhookState};
use crate::controller::status::modify_status;
use crate::controller::trigger::record_push;
use crate::models::{BuildRequest, ON_COMMIT_LABEL};
use crate::providers::{PushEvent, PushProvider};
use crate::store::Store;

/// Result of a successfully ingested push
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acceptance {
    /// No on-commit request watches this repository and ref
    NoMatch,
    /// Recorded as pending on these requests (`namespace/name`)
    Recorded(Vec<String>),
}

/// Ingest one raw push delivery
pub async fn accept_push<S: Store>(
    state: &WebhookState<S>,
    headers: &axum::http::HeaderMap,
    body: &[u8],
) -> Result<Acceptance, WebhookError> {
    let provider = state.providers.detect(headers)?;
    let event = provider.parse(headers, body)?;

    let candidates = state
        .store
        .list_requests(&format!("{}=true", ON_COMMIT_LABEL))
        .await?;
    let matched: Vec<&BuildRequest> = candidates
        .iter()
        .filter(|r| r.is_on_commit())
        .filter(|r| event.matches(&r.spec.source.git.url, &r.spec.watched_ref()))
        .collect();

    if matched.is_empty() {
        tracing::debug!(
            provider = provider.name(),
            repository = %event.repository_url,
            git_ref = %event.git_ref,
            "Push matches no on-commit request"
        );
        return Ok(Acceptance::NoMatch);
    }

    // Every secret is resolved before anything is written
    let mut accepted = Vec::with_capacity(matched.len());
    for request in matched {
        if authenticates(state, provider, request, headers, body).await? {
            accepted.push(request);
        }
    }

    let mut recorded = Vec::with_capacity(accepted.len());
    for request in accepted {
        record(state, request, &event).await?;
        recorded.push(format!(
            "{}/{}",
            request.namespace().unwrap_or_default(),
            request.name_any()
        ));
    }

    if recorded.is_empty() {
        return Err(WebhookError::Unauthorized);
    }
    Ok(Acceptance::Recorded(recorded))
}

/// Check the delivery against one request's webhook secret
///
/// A missing secret or key only fails this request's attempt.
async fn authenticates<S: Store>(
    state: &WebhookState<S>,
    provider: &dyn PushProvider,
    request: &BuildRequest,
    headers: &axum::http::HeaderMap,
    body: &[u8],
) -> Result<bool, WebhookError> {
    let namespace = request.namespace().unwrap_or_default();
    let Some(secret_ref) = request.spec.on_commit.as_ref().map(|o| &o.webhook_secret) else {
        tracing::warn!(namespace = %namespace, request = %request.name_any(), "OnCommit request has no webhook secret");
        return Ok(false);
    };

    let data = state.store.get_secret_data(&namespace, &secret_ref.name).await?;
    let Some(secret) = data.as_ref().and_then(|d| d.get(&secret_ref.key)) else {
        tracing::warn!(
            namespace = %namespace,
            request = %request.name_any(),
            secret = %secret_ref.name,
            key = %secret_ref.key,
            "Webhook secret or key not found"
        );
        return Ok(false);
    };

    let ok = provider.authenticate(headers, body, secret);
    if !ok {
        tracing::debug!(namespace = %namespace, request = %request.name_any(), "Push failed authentication");
    }
    Ok(ok)
}

async fn record<S: Store>(
    state: &WebhookState<S>,
    request: &BuildRequest,
    event: &PushEvent,
) -> Result<(), WebhookError> {
    let namespace = request.namespace().unwrap_or_default();
    let name = request.name_any();
    let now = state.clock.now();

    modify_status(&state.store, &state.retry, &namespace, &name, |current, status| {
        if !current.is_on_commit() {
            return false;
        }
        record_push(status.on_commit.get_or_insert_with(Default::default), event, now);
        true
    })
    .await?;

    tracing::info!(
        namespace = %namespace,
        request = %name,
        commit = %event.commit,
        git_ref = %event.git_ref,
        "Recorded pending push"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::models::{
        BuildRequestSpec, GitSource, OnCommit, Rebuild, RebuildMode, SecretKeyRef, Source,
    };
    use crate::providers::github_signature;
    use crate::store::{MockStore, RetryPolicy, StoreError};

    const BODY: &str = r#"{
        "ref": "refs/heads/main",
        "after": "6113728f27ae82c7b1a177c8d03f9e96e0adf246",
        "repository": { "clone_url": "https://github.com/org/app.git" }
    }"#;

    fn watching(name: &str, secret_name: &str) -> BuildRequest {
        let mut request = BuildRequest::new(
            name,
            BuildRequestSpec {
                source: Source {
                    git: GitSource {
                        url: "https://github.com/org/app".to_string(),
                        revision: "main".to_string(),
                        clone_secret: None,
                    },
                    context_dir: None,
                },
                rebuild: Some(Rebuild {
                    mode: RebuildMode::OnCommit,
                }),
                on_commit: Some(OnCommit {
                    webhook_secret: SecretKeyRef {
                        name: secret_name.to_string(),
                        key: "token".to_string(),
                    },
                }),
                ..Default::default()
            },
        );
        request.metadata.namespace = Some("default".to_string());
        request
    }

    fn headers() -> axum::http::HeaderMap {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert("x-github-event", "push".parse().unwrap());
        headers.insert(
            "x-hub-signature-256",
            github_signature(b"s3cret", BODY.as_bytes()).parse().unwrap(),
        );
        headers
    }

    #[tokio::test]
    async fn test_secret_lookup_failure_records_nothing() {
        let mut store = MockStore::new();
        store
            .expect_list_requests()
            .returning(|_| Ok(vec![watching("app", "hook"), watching("mirror", "mirror-hook")]));
        store.expect_get_secret_data().returning(|_, name| match name {
            "hook" => Ok(Some(BTreeMap::from([(
                "token".to_string(),
                b"s3cret".to_vec(),
            )]))),
            _ => Err(StoreError::Backend("secrets unavailable".to_string())),
        });
        store.expect_get_request().never();
        store.expect_update_request_status().never();

        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap());
        let state = WebhookState::new(
            store,
            Arc::new(clock) as Arc<dyn Clock>,
            RetryPolicy::default(),
        );

        let err = accept_push(&state, &headers(), BODY.as_bytes())
            .await
            .unwrap_err();
        assert!(matches!(err, WebhookError::Store(StoreError::Backend(_))));
    }
}
