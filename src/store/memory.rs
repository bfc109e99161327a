//! In-process store
//!
//! Keeps objects in maps behind a mutex and enforces the same
//! `resourceVersion` preconditions the API server does, so concurrency
//! behavior can be exercised without a cluster.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use kube::ResourceExt;

use super::{Store, StoreError, parse_selector};
use crate::models::{
    BuildExecution, BuildExecutionStatus, BuildRequest, BuildRequestSpec, BuildTemplate,
    ClusterBuildStrategy, ClusterBuildStrategySpec, ClusterPolicy,
};

type Key = (String, String);

#[derive(Default)]
struct Inner {
    next_version: u64,
    next_uid: u64,
    requests: BTreeMap<Key, BuildRequest>,
    templates: BTreeMap<Key, BuildTemplate>,
    executions: BTreeMap<Key, BuildExecution>,
    strategies: BTreeMap<String, ClusterBuildStrategy>,
    policy: Option<ClusterPolicy>,
    secrets: BTreeMap<Key, BTreeMap<String, Vec<u8>>>,
    /// Number of upcoming status updates to reject as conflicting
    injected_conflicts: u32,
    unavailable: bool,
}

impl Inner {
    fn bump(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }

    fn uid(&mut self) -> String {
        self.next_uid += 1;
        format!("uid-{}", self.next_uid)
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable {
            return Err(StoreError::Backend("store unavailable".to_string()));
        }
        Ok(())
    }
}

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

fn object_key<K: ResourceExt>(obj: &K) -> Key {
    key(&obj.namespace().unwrap_or_default(), &obj.name_any())
}

/// Store backed by in-memory maps
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a request as a user would, assigning uid, generation and version
    pub fn insert_request(&self, mut request: BuildRequest) -> BuildRequest {
        let mut inner = self.lock();
        if request.metadata.namespace.is_none() {
            request.metadata.namespace = Some("default".to_string());
        }
        request.metadata.uid = Some(inner.uid());
        request.metadata.generation = Some(1);
        request.metadata.resource_version = Some(inner.bump());
        inner.requests.insert(object_key(&request), request.clone());
        request
    }

    /// Change a request's spec as a user would, bumping its generation
    pub fn update_request_spec(
        &self,
        namespace: &str,
        name: &str,
        change: impl FnOnce(&mut BuildRequestSpec),
    ) -> Option<BuildRequest> {
        let mut inner = self.lock();
        let version = inner.bump();
        let request = inner.requests.get_mut(&key(namespace, name))?;
        change(&mut request.spec);
        request.metadata.generation = Some(request.metadata.generation.unwrap_or(0) + 1);
        request.metadata.resource_version = Some(version);
        Some(request.clone())
    }

    pub fn request(&self, namespace: &str, name: &str) -> Option<BuildRequest> {
        self.lock().requests.get(&key(namespace, name)).cloned()
    }

    pub fn template(&self, namespace: &str, name: &str) -> Option<BuildTemplate> {
        self.lock().templates.get(&key(namespace, name)).cloned()
    }

    pub fn execution(&self, namespace: &str, name: &str) -> Option<BuildExecution> {
        self.lock().executions.get(&key(namespace, name)).cloned()
    }

    /// All executions in a namespace, ordered by name
    pub fn executions(&self, namespace: &str) -> Vec<BuildExecution> {
        self.lock()
            .executions
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, e)| e.clone())
            .collect()
    }

    /// Place an object directly, bypassing create semantics
    pub fn put_execution(&self, mut execution: BuildExecution) {
        let mut inner = self.lock();
        execution.metadata.resource_version = Some(inner.bump());
        if execution.metadata.uid.is_none() {
            execution.metadata.uid = Some(inner.uid());
        }
        inner.executions.insert(object_key(&execution), execution);
    }

    pub fn put_template(&self, mut template: BuildTemplate) {
        let mut inner = self.lock();
        template.metadata.resource_version = Some(inner.bump());
        if template.metadata.uid.is_none() {
            template.metadata.uid = Some(inner.uid());
        }
        inner.templates.insert(object_key(&template), template);
    }

    /// Report an outcome on an execution, as the build system would
    pub fn set_execution_status(&self, namespace: &str, name: &str, status: BuildExecutionStatus) {
        let mut inner = self.lock();
        let version = inner.bump();
        if let Some(execution) = inner.executions.get_mut(&key(namespace, name)) {
            execution.status = Some(status);
            execution.metadata.resource_version = Some(version);
        }
    }

    pub fn set_policy(&self, policy: Option<ClusterPolicy>) {
        self.lock().policy = policy;
    }

    pub fn insert_strategy(&self, name: &str) {
        let strategy = ClusterBuildStrategy::new(name, ClusterBuildStrategySpec::default());
        self.lock().strategies.insert(name.to_string(), strategy);
    }

    pub fn insert_secret(&self, namespace: &str, name: &str, data_key: &str, value: &[u8]) {
        self.lock()
            .secrets
            .entry(key(namespace, name))
            .or_default()
            .insert(data_key.to_string(), value.to_vec());
    }

    /// Reject the next `count` status updates as if another writer won
    pub fn inject_status_conflicts(&self, count: u32) {
        self.lock().injected_conflicts = count;
    }

    /// Make every call fail with a backend error
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_request(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BuildRequest>, StoreError> {
        let inner = self.lock();
        inner.check_available()?;
        Ok(inner.requests.get(&key(namespace, name)).cloned())
    }

    async fn list_requests(&self, label_selector: &str) -> Result<Vec<BuildRequest>, StoreError> {
        let inner = self.lock();
        inner.check_available()?;
        let terms = parse_selector(label_selector);
        Ok(inner
            .requests
            .values()
            .filter(|r| {
                let labels = r.labels();
                terms
                    .iter()
                    .all(|(k, v)| labels.get(*k).map(String::as_str) == Some(*v))
            })
            .cloned()
            .collect())
    }

    async fn update_request_status(
        &self,
        request: &BuildRequest,
    ) -> Result<BuildRequest, StoreError> {
        let mut inner = self.lock();
        inner.check_available()?;
        let name = request.name_any();
        let conflict = || StoreError::Conflict {
            kind: "BuildRequest",
            name: name.clone(),
        };

        if inner.injected_conflicts > 0 {
            inner.injected_conflicts -= 1;
            return Err(conflict());
        }

        let version = inner.bump();
        let stored = inner
            .requests
            .get_mut(&object_key(request))
            .ok_or_else(|| StoreError::Backend(format!("BuildRequest {} not found", name)))?;
        if stored.metadata.resource_version != request.metadata.resource_version {
            return Err(conflict());
        }
        stored.status = request.status.clone();
        stored.metadata.resource_version = Some(version);
        Ok(stored.clone())
    }

    async fn set_request_label(
        &self,
        namespace: &str,
        name: &str,
        label: &str,
        value: Option<String>,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.check_available()?;
        let version = inner.bump();
        let stored = inner
            .requests
            .get_mut(&key(namespace, name))
            .ok_or_else(|| StoreError::Backend(format!("BuildRequest {} not found", name)))?;
        let labels = stored.labels_mut();
        match value {
            Some(value) => {
                labels.insert(label.to_string(), value);
            }
            None => {
                labels.remove(label);
            }
        }
        stored.metadata.resource_version = Some(version);
        Ok(())
    }

    async fn get_template(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BuildTemplate>, StoreError> {
        let inner = self.lock();
        inner.check_available()?;
        Ok(inner.templates.get(&key(namespace, name)).cloned())
    }

    async fn create_template(&self, template: &BuildTemplate) -> Result<BuildTemplate, StoreError> {
        let mut inner = self.lock();
        inner.check_available()?;
        let k = object_key(template);
        if inner.templates.contains_key(&k) {
            return Err(StoreError::AlreadyExists {
                kind: "BuildTemplate",
                name: template.name_any(),
            });
        }
        let mut created = template.clone();
        created.metadata.uid = Some(inner.uid());
        created.metadata.resource_version = Some(inner.bump());
        inner.templates.insert(k, created.clone());
        Ok(created)
    }

    async fn replace_template(&self, template: &BuildTemplate) -> Result<BuildTemplate, StoreError> {
        let mut inner = self.lock();
        inner.check_available()?;
        let version = inner.bump();
        let stored = inner
            .templates
            .get_mut(&object_key(template))
            .ok_or_else(|| StoreError::Backend(format!("BuildTemplate {} not found", template.name_any())))?;
        if stored.metadata.resource_version != template.metadata.resource_version {
            return Err(StoreError::Conflict {
                kind: "BuildTemplate",
                name: template.name_any(),
            });
        }
        stored.metadata.labels = template.metadata.labels.clone();
        stored.metadata.owner_references = template.metadata.owner_references.clone();
        stored.spec = template.spec.clone();
        stored.metadata.resource_version = Some(version);
        Ok(stored.clone())
    }

    async fn get_execution(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BuildExecution>, StoreError> {
        let inner = self.lock();
        inner.check_available()?;
        Ok(inner.executions.get(&key(namespace, name)).cloned())
    }

    async fn create_execution(
        &self,
        execution: &BuildExecution,
    ) -> Result<BuildExecution, StoreError> {
        let mut inner = self.lock();
        inner.check_available()?;
        let k = object_key(execution);
        if inner.executions.contains_key(&k) {
            return Err(StoreError::AlreadyExists {
                kind: "BuildExecution",
                name: execution.name_any(),
            });
        }
        let mut created = execution.clone();
        created.metadata.uid = Some(inner.uid());
        created.metadata.resource_version = Some(inner.bump());
        inner.executions.insert(k, created.clone());
        Ok(created)
    }

    async fn get_strategy(&self, name: &str) -> Result<Option<ClusterBuildStrategy>, StoreError> {
        let inner = self.lock();
        inner.check_available()?;
        Ok(inner.strategies.get(name).cloned())
    }

    async fn get_policy(&self) -> Result<Option<ClusterPolicy>, StoreError> {
        let inner = self.lock();
        inner.check_available()?;
        Ok(inner.policy.clone())
    }

    async fn get_secret_data(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BTreeMap<String, Vec<u8>>>, StoreError> {
        let inner = self.lock();
        inner.check_available()?;
        Ok(inner.secrets.get(&key(namespace, name)).cloned())
    }
}
