//! Configuration system for buildwright
//!
//! YAML configuration layered over built-in defaults and overridden by
//! `BUILDWRIGHT_*` environment variables.

mod defaults;
pub mod loader;
pub mod paths;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::Config;

use anyhow::Context;

/// Get a configuration value by key (dot notation)
pub fn get_config_value(config: &Config, key: &str) -> anyhow::Result<String> {
    match key {
        "namespace" => Ok(config.namespace.clone().unwrap_or_default()),
        "webhook.listenAddr" => Ok(config.webhook.listen_addr.clone()),
        "webhook.path" => Ok(config.webhook.path.clone()),
        "trigger.debounceSeconds" => Ok(config.trigger.debounce_seconds.to_string()),
        "trigger.minIntervalSeconds" => Ok(config.trigger.min_interval_seconds.to_string()),
        "reconcile.errorRequeueSeconds" => Ok(config.reconcile.error_requeue_seconds.to_string()),
        "retry.maxAttempts" => Ok(config.retry.max_attempts.to_string()),
        "retry.initialBackoffMillis" => Ok(config.retry.initial_backoff_millis.to_string()),
        "retry.maxBackoffMillis" => Ok(config.retry.max_backoff_millis.to_string()),
        "policy.configMapName" => Ok(config.policy.config_map_name.clone()),
        "policy.configMapNamespace" => Ok(config.policy.config_map_namespace.clone()),
        _ => Err(anyhow::anyhow!("Unknown configuration key: {}", key)),
    }
}

/// Set a configuration value by key (dot notation)
pub fn set_config_value(config: &mut Config, key: &str, value: &str) -> anyhow::Result<()> {
    match key {
        "namespace" => {
            // Empty means all namespaces
            config.namespace = (!value.is_empty()).then(|| value.to_string());
        }
        "webhook.listenAddr" => {
            config.webhook.listen_addr = value.to_string();
        }
        "webhook.path" => {
            config.webhook.path = value.to_string();
        }
        "trigger.debounceSeconds" => {
            config.trigger.debounce_seconds = value
                .parse()
                .context("trigger.debounceSeconds must be a number")?;
        }
        "trigger.minIntervalSeconds" => {
            config.trigger.min_interval_seconds = value
                .parse()
                .context("trigger.minIntervalSeconds must be a number")?;
        }
        "reconcile.errorRequeueSeconds" => {
            config.reconcile.error_requeue_seconds = value
                .parse()
                .context("reconcile.errorRequeueSeconds must be a number")?;
        }
        "retry.maxAttempts" => {
            config.retry.max_attempts = value
                .parse()
                .context("retry.maxAttempts must be a number")?;
        }
        "retry.initialBackoffMillis" => {
            config.retry.initial_backoff_millis = value
                .parse()
                .context("retry.initialBackoffMillis must be a number")?;
        }
        "retry.maxBackoffMillis" => {
            config.retry.max_backoff_millis = value
                .parse()
                .context("retry.maxBackoffMillis must be a number")?;
        }
        "policy.configMapName" => {
            config.policy.config_map_name = value.to_string();
        }
        "policy.configMapNamespace" => {
            config.policy.config_map_namespace = value.to_string();
        }
        _ => return Err(anyhow::anyhow!("Unknown configuration key: {}", key)),
    }

    Ok(())
}
