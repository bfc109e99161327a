//! Declarative store port
//!
//! Everything the controller and webhook read or write goes through the
//! [`Store`] trait. Writes to existing objects are conditioned on the
//! `resourceVersion` the caller read; a stale write fails with
//! [`StoreError::Conflict`] and must be retried from a fresh read with
//! [`retry_on_conflict`].
//!
//! Implementations:
//! - [`KubeStore`] talks to the Kubernetes API server
//! - [`MemoryStore`] keeps everything in process

mod kube_store;
mod memory;

pub use kube_store::KubeStore;
pub use memory::MemoryStore;

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::models::{BuildExecution, BuildRequest, BuildTemplate, ClusterBuildStrategy, ClusterPolicy};

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} {name} was modified concurrently")]
    Conflict { kind: &'static str, name: String },

    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: &'static str, name: String },

    #[error("store error: {0}")]
    Backend(String),
}

/// Access to the objects this controller manages
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_request(&self, namespace: &str, name: &str)
    -> Result<Option<BuildRequest>, StoreError>;

    /// List requests in the watched scope matching an equality label selector
    async fn list_requests(&self, label_selector: &str) -> Result<Vec<BuildRequest>, StoreError>;

    /// Write the request's status, conditioned on its `resourceVersion`
    async fn update_request_status(&self, request: &BuildRequest)
    -> Result<BuildRequest, StoreError>;

    /// Set (`Some`) or remove (`None`) a label on a request
    async fn set_request_label(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
        value: Option<String>,
    ) -> Result<(), StoreError>;

    async fn get_template(&self, namespace: &str, name: &str)
    -> Result<Option<BuildTemplate>, StoreError>;

    async fn create_template(&self, template: &BuildTemplate) -> Result<BuildTemplate, StoreError>;

    /// Replace a template, conditioned on its `resourceVersion`
    async fn replace_template(&self, template: &BuildTemplate) -> Result<BuildTemplate, StoreError>;

    async fn get_execution(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BuildExecution>, StoreError>;

    async fn create_execution(
        &self,
        execution: &BuildExecution,
    ) -> Result<BuildExecution, StoreError>;

    async fn get_strategy(&self, name: &str) -> Result<Option<ClusterBuildStrategy>, StoreError>;

    /// The singleton cluster policy, if configured
    async fn get_policy(&self) -> Result<Option<ClusterPolicy>, StoreError>;

    /// Decoded key/value data of a namespaced secret
    async fn get_secret_data(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BTreeMap<String, Vec<u8>>>, StoreError>;
}

/// Bounds for optimistic-concurrency retries
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_secs(1),
        }
    }
}

/// Errors that may signal a lost optimistic-concurrency race
pub trait ConflictError {
    fn is_conflict(&self) -> bool;
}

impl ConflictError for StoreError {
    fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Run a read-modify-write operation, retrying it from scratch on conflict
///
/// `op` must re-read whatever it modifies on every call. After
/// `max_attempts` the last conflict is returned.
pub async fn retry_on_conflict<T, E, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, E>
where
    E: ConflictError + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut backoff = policy.initial_backoff;
    let mut attempt = 1;
    loop {
        match op().await {
            Err(err) if err.is_conflict() && attempt < policy.max_attempts => {
                tracing::debug!(attempt, error = %err, "conflict, retrying from a fresh read");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(policy.max_backoff);
                attempt += 1;
            }
            result => return result,
        }
    }
}

/// Parse an equality-based label selector (`a=b,c=d`)
pub(crate) fn parse_selector(selector: &str) -> Vec<(&str, &str)> {
    selector
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|term| term.split_once('='))
        .map(|(k, v)| (k.trim(), v.trim()))
        .collect()
}
