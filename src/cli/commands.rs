//! CLI command handlers

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Subcommand;

use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigLoader, get_config_value, set_config_value};
use crate::controller::{self, Reconciler};
use crate::store::KubeStore;
use crate::webhook::{self, WebhookState};

/// Configuration management subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigSubcommand {
    /// Get configuration value, or the whole configuration without a key
    Get {
        /// Configuration key (e.g., "trigger.debounceSeconds", "webhook.path")
        key: Option<String>,
    },
    /// Set configuration value in the config file
    Set {
        /// Configuration key (e.g., "trigger.debounceSeconds", "webhook.path")
        key: String,
        /// Configuration value
        value: String,
    },
    /// List all configuration
    List,
    /// Show configuration file path
    Path,
    /// Validate configuration
    Validate,
}

/// Handle configuration subcommands
pub fn handle_config_command(cmd: ConfigSubcommand, path: Option<&Path>) -> Result<()> {
    match cmd {
        ConfigSubcommand::Get { key } => {
            let config = ConfigLoader::load(path).context("Failed to load configuration")?;

            if let Some(key) = key {
                println!("{}", get_config_value(&config, &key)?);
            } else {
                let yaml =
                    serde_yaml::to_string(&config).context("Failed to serialize configuration")?;
                print!("{}", yaml);
            }
        }
        ConfigSubcommand::Set { key, value } => {
            let file = ConfigLoader::resolve_path(path);
            let mut config = if file.exists() {
                ConfigLoader::load_file(&file)?
            } else {
                ConfigLoader::load_defaults()
            };

            set_config_value(&mut config, &key, &value)
                .with_context(|| format!("Failed to set {} = {}", key, value))?;

            ConfigLoader::save(&config, &file).context("Failed to save configuration")?;
            println!("Configuration saved to {}", file.display());
        }
        ConfigSubcommand::List => {
            let config = ConfigLoader::load(path).context("Failed to load configuration")?;
            let yaml =
                serde_yaml::to_string(&config).context("Failed to serialize configuration")?;
            print!("{}", yaml);
        }
        ConfigSubcommand::Path => {
            println!("{}", ConfigLoader::resolve_path(path).display());
        }
        ConfigSubcommand::Validate => match ConfigLoader::validate(path) {
            Ok(_) => println!("Configuration is valid"),
            Err(e) => {
                eprintln!("Configuration validation failed: {:#}", e);
                std::process::exit(1);
            }
        },
    }

    Ok(())
}

/// Run the controller and the webhook server until Ctrl-C
pub async fn run(path: Option<&Path>) -> Result<()> {
    let config = ConfigLoader::validate(path)?;
    let listen_addr = config.listen_addr()?;
    let settings = config.controller_settings();

    tracing::debug!(?config, "Configuration loaded");

    let client = crate::kube::create_client(config.namespace.as_deref())
        .await
        .context("Failed to initialize Kubernetes client")?;

    let store = KubeStore::new(
        client.clone(),
        config.namespace.clone(),
        config.policy.config_map_name.clone(),
        config.policy.config_map_namespace.clone(),
    );
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let webhook_state = Arc::new(WebhookState::new(
        store.clone(),
        clock.clone(),
        settings.retry.clone(),
    ));
    let app = webhook::router(webhook_state, &config.webhook.path);

    let reconciler = Arc::new(Reconciler::new(store, clock, settings));

    tokio::try_join!(
        controller::run(client, config.namespace.clone(), reconciler),
        webhook::serve(app, listen_addr),
    )?;

    Ok(())
}
