//! Configuration loading and merging logic
//!
//! Precedence order (highest to lowest):
//! 1. Environment variable overrides (`BUILDWRIGHT_*`)
//! 2. Config file (`--config`, else the root config path)
//! 3. Built-in defaults

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::schema::Config;
use super::{defaults, paths, set_config_value};

/// Environment variables and the configuration keys they override
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("BUILDWRIGHT_NAMESPACE", "namespace"),
    ("BUILDWRIGHT_LISTEN_ADDR", "webhook.listenAddr"),
    ("BUILDWRIGHT_WEBHOOK_PATH", "webhook.path"),
    ("BUILDWRIGHT_DEBOUNCE_SECONDS", "trigger.debounceSeconds"),
    ("BUILDWRIGHT_MIN_INTERVAL_SECONDS", "trigger.minIntervalSeconds"),
    ("BUILDWRIGHT_ERROR_REQUEUE_SECONDS", "reconcile.errorRequeueSeconds"),
    ("BUILDWRIGHT_POLICY_CONFIGMAP", "policy.configMapName"),
    ("BUILDWRIGHT_POLICY_NAMESPACE", "policy.configMapNamespace"),
];

/// Upper bound for the trigger debounce and minimum interval
pub const MAX_TRIGGER_SECONDS: u64 = 24 * 60 * 60;

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with all layers merged
    ///
    /// An explicit `path` must exist; the default path is optional.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let config = match path {
            Some(path) => Self::load_file(path)?,
            None => {
                let root = paths::root_config_path();
                if root.exists() {
                    Self::load_file(&root)?
                } else {
                    Self::load_defaults()
                }
            }
        };

        Self::apply_overrides(config, |var| std::env::var(var).ok())
    }

    /// Load configuration from a file
    pub fn load_file(path: &Path) -> Result<Config> {
        if !path.exists() {
            return Err(anyhow::anyhow!("Config file not found: {}", path.display()));
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load and check configuration for values that would fail at startup
    pub fn validate(path: Option<&Path>) -> Result<Config> {
        let config = Self::load(path).context("Failed to load configuration")?;

        config.listen_addr()?;
        if !config.webhook.path.starts_with('/') {
            return Err(anyhow::anyhow!(
                "webhook.path must start with '/', got {:?}",
                config.webhook.path
            ));
        }
        if config.webhook.path == "/healthz" {
            return Err(anyhow::anyhow!("webhook.path must not be /healthz"));
        }
        for (key, seconds) in [
            ("trigger.debounceSeconds", config.trigger.debounce_seconds),
            ("trigger.minIntervalSeconds", config.trigger.min_interval_seconds),
        ] {
            if seconds > MAX_TRIGGER_SECONDS {
                return Err(anyhow::anyhow!(
                    "{} must be at most {} seconds, got {}",
                    key,
                    MAX_TRIGGER_SECONDS,
                    seconds
                ));
            }
        }
        if config.retry.max_attempts == 0 {
            return Err(anyhow::anyhow!("retry.maxAttempts must be at least 1"));
        }
        if config.retry.initial_backoff_millis > config.retry.max_backoff_millis {
            return Err(anyhow::anyhow!(
                "retry.initialBackoffMillis ({}) exceeds retry.maxBackoffMillis ({})",
                config.retry.initial_backoff_millis,
                config.retry.max_backoff_millis
            ));
        }

        Ok(config)
    }

    /// Load default configuration
    pub fn load_defaults() -> Config {
        defaults::default_config()
    }

    /// Apply overrides found through `lookup`
    fn apply_overrides(
        mut config: Config,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Config> {
        for (var, key) in ENV_OVERRIDES {
            if let Some(value) = lookup(var) {
                set_config_value(&mut config, key, &value)
                    .with_context(|| format!("Invalid value in {}", var))?;
            }
        }
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(config: &Config, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            paths::ensure_dir(parent)?;
        }

        let yaml =
            serde_yaml::to_string(config).context("Failed to serialize configuration to YAML")?;

        std::fs::write(path, yaml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// The file `load` reads from
    pub fn resolve_path(path: Option<&Path>) -> PathBuf {
        path.map(Path::to_path_buf)
            .unwrap_or_else(paths::root_config_path)
    }
}
