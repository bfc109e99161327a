//! Kubernetes-backed store
//!
//! Status writes are merge patches that carry `metadata.resourceVersion`;
//! the API server rejects them with 409 when the object moved on, which is
//! reported as [`StoreError::Conflict`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::api::{ListParams, Patch, PatchParams, PostParams};
use kube::{Api, Client, ResourceExt};
use serde_json::json;

use super::{Store, StoreError};
use crate::models::{BuildExecution, BuildRequest, BuildTemplate, ClusterBuildStrategy, ClusterPolicy};

/// Store talking to the Kubernetes API server
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    /// Namespace to list requests in; `None` lists across all namespaces
    namespace: Option<String>,
    policy_name: String,
    policy_namespace: String,
}

impl KubeStore {
    pub fn new(
        client: Client,
        namespace: Option<String>,
        policy_name: impl Into<String>,
        policy_namespace: impl Into<String>,
    ) -> Self {
        Self {
            client,
            namespace,
            policy_name: policy_name.into(),
            policy_namespace: policy_namespace.into(),
        }
    }

    fn requests(&self, namespace: &str) -> Api<BuildRequest> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn templates(&self, namespace: &str) -> Api<BuildTemplate> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn executions(&self, namespace: &str) -> Api<BuildExecution> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Translate an API error into the store's vocabulary
fn map_err(err: kube::Error, kind: &'static str, name: &str) -> StoreError {
    match &err {
        kube::Error::Api(response) if response.code == 409 && response.reason == "AlreadyExists" => {
            StoreError::AlreadyExists {
                kind,
                name: name.to_string(),
            }
        }
        kube::Error::Api(response) if response.code == 409 => StoreError::Conflict {
            kind,
            name: name.to_string(),
        },
        _ => StoreError::Backend(format!("{} {}: {}", kind, name, err)),
    }
}

fn namespace_of<K: ResourceExt>(obj: &K) -> Result<String, StoreError> {
    obj.namespace()
        .ok_or_else(|| StoreError::Backend(format!("{} has no namespace", obj.name_any())))
}

#[async_trait]
impl Store for KubeStore {
    async fn get_request(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BuildRequest>, StoreError> {
        self.requests(namespace)
            .get_opt(name)
            .await
            .map_err(|e| map_err(e, "BuildRequest", name))
    }

    async fn list_requests(&self, label_selector: &str) -> Result<Vec<BuildRequest>, StoreError> {
        let api: Api<BuildRequest> = match &self.namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };
        let list = api
            .list(&ListParams::default().labels(label_selector))
            .await
            .map_err(|e| map_err(e, "BuildRequest", label_selector))?;
        Ok(list.items)
    }

    async fn update_request_status(
        &self,
        request: &BuildRequest,
    ) -> Result<BuildRequest, StoreError> {
        let name = request.name_any();
        let namespace = namespace_of(request)?;
        let patch = json!({
            "metadata": { "resourceVersion": request.resource_version() },
            "status": request.status,
        });
        self.requests(&namespace)
            .patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| map_err(e, "BuildRequest", &name))
    }

    async fn set_request_label(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
        value: Option<String>,
    ) -> Result<(), StoreError> {
        let patch = json!({ "metadata": { "labels": { key: value } } });
        self.requests(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| map_err(e, "BuildRequest", name))?;
        Ok(())
    }

    async fn get_template(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BuildTemplate>, StoreError> {
        self.templates(namespace)
            .get_opt(name)
            .await
            .map_err(|e| map_err(e, "BuildTemplate", name))
    }

    async fn create_template(&self, template: &BuildTemplate) -> Result<BuildTemplate, StoreError> {
        let name = template.name_any();
        self.templates(&namespace_of(template)?)
            .create(&PostParams::default(), template)
            .await
            .map_err(|e| map_err(e, "BuildTemplate", &name))
    }

    async fn replace_template(&self, template: &BuildTemplate) -> Result<BuildTemplate, StoreError> {
        let name = template.name_any();
        self.templates(&namespace_of(template)?)
            .replace(&name, &PostParams::default(), template)
            .await
            .map_err(|e| map_err(e, "BuildTemplate", &name))
    }

    async fn get_execution(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BuildExecution>, StoreError> {
        self.executions(namespace)
            .get_opt(name)
            .await
            .map_err(|e| map_err(e, "BuildExecution", name))
    }

    async fn create_execution(
        &self,
        execution: &BuildExecution,
    ) -> Result<BuildExecution, StoreError> {
        let name = execution.name_any();
        self.executions(&namespace_of(execution)?)
            .create(&PostParams::default(), execution)
            .await
            .map_err(|e| map_err(e, "BuildExecution", &name))
    }

    async fn get_strategy(&self, name: &str) -> Result<Option<ClusterBuildStrategy>, StoreError> {
        Api::<ClusterBuildStrategy>::all(self.client.clone())
            .get_opt(name)
            .await
            .map_err(|e| map_err(e, "ClusterBuildStrategy", name))
    }

    async fn get_policy(&self) -> Result<Option<ClusterPolicy>, StoreError> {
        let config_map = Api::<ConfigMap>::namespaced(self.client.clone(), &self.policy_namespace)
            .get_opt(&self.policy_name)
            .await
            .map_err(|e| map_err(e, "ConfigMap", &self.policy_name))?;

        let Some(config_map) = config_map else {
            return Ok(None);
        };
        match ClusterPolicy::from_config_map(&config_map) {
            Ok(policy) => Ok(policy),
            Err(e) => {
                tracing::warn!(
                    configmap = %self.policy_name,
                    namespace = %self.policy_namespace,
                    error = %e,
                    "Ignoring unparseable cluster build policy"
                );
                Ok(None)
            }
        }
    }

    async fn get_secret_data(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BTreeMap<String, Vec<u8>>>, StoreError> {
        let secret = Api::<Secret>::namespaced(self.client.clone(), namespace)
            .get_opt(name)
            .await
            .map_err(|e| map_err(e, "Secret", name))?;

        Ok(secret.map(|secret| {
            let mut data: BTreeMap<String, Vec<u8>> = secret
                .data
                .unwrap_or_default()
                .into_iter()
                .map(|(k, v)| (k, v.0))
                .collect();
            for (k, v) in secret.string_data.unwrap_or_default() {
                data.entry(k).or_insert_with(|| v.into_bytes());
            }
            data
        }))
    }
}
