//! Build template reconciliation
//!
//! Each request owns exactly one template, named `{request}-build`. The
//! template is created once and then kept in step with the request: labels
//! are merged and the spec is replaced wholesale when it drifts. A template
//! controlled by anything else is reported as a conflict and left alone.

use std::collections::BTreeMap;

use kube::ResourceExt;

use super::ownership::{Ownership, ownership_of, owner_reference, request_uid};
use crate::error::{BuildError, Result};
use crate::models::build_strategy::CLUSTER_BUILD_STRATEGY_KIND;
use crate::models::{
    BUILD_REQUEST_LABEL, BuildRequest, BuildRequestSpec, BuildSnapshot, BuildTemplate,
    BuildTemplateSpec, StrategyRef, TemplateOutput, TemplateSource,
};
use crate::store::{RetryPolicy, Store, StoreError, retry_on_conflict};

/// The template a request should own, given its resolved strategy
pub fn desired_template(request: &BuildRequest, strategy: &str) -> Result<BuildTemplate> {
    let spec = &request.spec;
    let mut template = BuildTemplate::new(
        &request.template_name(),
        BuildTemplateSpec {
            strategy: StrategyRef {
                name: strategy.to_string(),
                kind: CLUSTER_BUILD_STRATEGY_KIND.to_string(),
            },
            source: TemplateSource {
                url: spec.source.git.url.clone(),
                revision: spec.source.git.revision.clone(),
                context_dir: spec.source.context_dir.clone(),
                clone_secret: spec.source.git.clone_secret.clone(),
            },
            output: TemplateOutput {
                image: spec.output.image.clone(),
                push_secret: spec.output.push_secret.clone(),
            },
        },
    );
    template.metadata.namespace = request.namespace();
    template.metadata.owner_references = Some(vec![owner_reference(request)?]);
    template.metadata.labels = Some(BTreeMap::from([(
        BUILD_REQUEST_LABEL.to_string(),
        request.name_any(),
    )]));
    Ok(template)
}

/// Create or converge the request's template
///
/// Lost races (a concurrent create, or a stale replace) are retried from a
/// fresh read.
pub async fn reconcile_template<S: Store + ?Sized>(
    store: &S,
    request: &BuildRequest,
    strategy: &str,
    retry: &RetryPolicy,
) -> Result<BuildTemplate> {
    let desired = desired_template(request, strategy)?;
    let uid = request_uid(request)?;
    retry_on_conflict(retry, || apply_template(store, &desired, &uid)).await
}

async fn apply_template<S: Store + ?Sized>(
    store: &S,
    desired: &BuildTemplate,
    owner_uid: &str,
) -> Result<BuildTemplate> {
    let namespace = desired.namespace().unwrap_or_default();
    let name = desired.name_any();

    let Some(existing) = store.get_template(&namespace, &name).await? else {
        return match store.create_template(desired).await {
            Ok(created) => {
                tracing::info!(namespace = %namespace, template = %name, "Created build template");
                Ok(created)
            }
            // Someone created it between our read and our write; go around again
            Err(StoreError::AlreadyExists { kind, name }) => {
                Err(BuildError::BuildReconcileFailed(StoreError::Conflict { kind, name }))
            }
            Err(e) => Err(e.into()),
        };
    };

    let mut updated = existing.clone();
    let mut changed = false;

    match ownership_of(&existing, owner_uid) {
        Ownership::Owned => {}
        Ownership::Unowned => {
            let owner = desired.owner_references().to_vec();
            updated.owner_references_mut().extend(owner);
            changed = true;
            tracing::info!(namespace = %namespace, template = %name, "Adopting unowned build template");
        }
        Ownership::Foreign(owner) => {
            return Err(BuildError::BuildConflict {
                kind: "BuildTemplate",
                name,
                owner,
            });
        }
    }

    for (key, value) in desired.labels() {
        if updated.labels().get(key) != Some(value) {
            updated.labels_mut().insert(key.clone(), value.clone());
            changed = true;
        }
    }

    if updated.spec != desired.spec {
        tracing::info!(namespace = %namespace, template = %name, "Build template drifted, replacing spec");
        updated.spec = desired.spec.clone();
        changed = true;
    }

    if !changed {
        return Ok(existing);
    }
    Ok(store.replace_template(&updated).await?)
}

/// Qualified `{namespace}/{name}` reference recorded on the request
pub fn build_ref(template: &BuildTemplate) -> String {
    format!(
        "{}/{}",
        template.namespace().unwrap_or_default(),
        template.name_any()
    )
}

/// Whether the request's build-relevant fields moved since the last build
///
/// Only the repository URL, revision and output image count; changing the
/// rebuild mode or the on-commit configuration never requires a build.
pub fn is_new_build_required(recorded: Option<&BuildSnapshot>, spec: &BuildRequestSpec) -> bool {
    match recorded {
        None => true,
        Some(recorded) => *recorded != spec.snapshot(),
    }
}
