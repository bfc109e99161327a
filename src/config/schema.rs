//! Configuration schema definitions
//!
//! Defines the structure of the configuration file using serde.

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::controller::{ControllerSettings, TriggerPolicy};
use crate::store::RetryPolicy;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Config {
    /// Namespace to watch; all namespaces when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(default)]
    pub webhook: WebhookConfig,

    #[serde(default)]
    pub trigger: TriggerConfig,

    #[serde(default)]
    pub reconcile: ReconcileConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    /// Location of the cluster build policy ConfigMap
    #[serde(default)]
    pub policy: PolicyConfig,
}

/// Webhook HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WebhookConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Route the push endpoint is mounted at
    #[serde(default = "default_webhook_path")]
    pub path: String,
}

/// On-commit trigger timing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TriggerConfig {
    #[serde(default = "default_debounce_seconds")]
    pub debounce_seconds: u64,

    #[serde(default = "default_min_interval_seconds")]
    pub min_interval_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ReconcileConfig {
    /// Requeue delay after a failed reconciliation
    #[serde(default = "default_error_requeue_seconds")]
    pub error_requeue_seconds: u64,
}

/// Optimistic-concurrency retry bounds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_millis")]
    pub initial_backoff_millis: u64,

    #[serde(default = "default_max_backoff_millis")]
    pub max_backoff_millis: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PolicyConfig {
    #[serde(default = "default_policy_name")]
    pub config_map_name: String,

    #[serde(default = "default_policy_namespace")]
    pub config_map_namespace: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            path: default_webhook_path(),
        }
    }
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            debounce_seconds: default_debounce_seconds(),
            min_interval_seconds: default_min_interval_seconds(),
        }
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            error_requeue_seconds: default_error_requeue_seconds(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_millis: default_initial_backoff_millis(),
            max_backoff_millis: default_max_backoff_millis(),
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            config_map_name: default_policy_name(),
            config_map_namespace: default_policy_namespace(),
        }
    }
}

impl Config {
    pub fn listen_addr(&self) -> anyhow::Result<SocketAddr> {
        self.webhook.listen_addr.parse().map_err(|e| {
            anyhow::anyhow!("webhook.listenAddr {:?} is not a socket address: {}", self.webhook.listen_addr, e)
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            initial_backoff: Duration::from_millis(self.retry.initial_backoff_millis),
            max_backoff: Duration::from_millis(self.retry.max_backoff_millis),
        }
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            trigger: TriggerPolicy {
                debounce: trigger_window(self.trigger.debounce_seconds),
                min_interval: trigger_window(self.trigger.min_interval_seconds),
            },
            error_requeue: Duration::from_secs(self.reconcile.error_requeue_seconds),
            retry: self.retry_policy(),
        }
    }
}

/// Seconds as a trigger window, saturating where chrono cannot represent them
fn trigger_window(seconds: u64) -> chrono::Duration {
    i64::try_from(seconds)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX)
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_webhook_path() -> String {
    "/webhooks/push".to_string()
}

fn default_debounce_seconds() -> u64 {
    10
}

fn default_min_interval_seconds() -> u64 {
    30
}

fn default_error_requeue_seconds() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_backoff_millis() -> u64 {
    10
}

fn default_max_backoff_millis() -> u64 {
    1000
}

fn default_policy_name() -> String {
    "buildwright-policy".to_string()
}

fn default_policy_namespace() -> String {
    "buildwright-system".to_string()
}
