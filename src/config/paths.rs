//! Where buildwright looks for its configuration file
//!
//! The directory is, in order:
//! 1. `$BUILDWRIGHT_CONFIG_DIR`
//! 2. `/etc/buildwright` inside a cluster, where the deployment mounts its
//!    ConfigMap
//! 3. `$XDG_CONFIG_HOME/buildwright`, else the platform config directory,
//!    for local runs against a kubeconfig

use std::path::{Path, PathBuf};

const CONFIG_DIR_VAR: &str = "BUILDWRIGHT_CONFIG_DIR";
const IN_CLUSTER_DIR: &str = "/etc/buildwright";
const CONFIG_FILE: &str = "config.yaml";

/// The configuration directory for this process
pub fn config_dir() -> PathBuf {
    resolve_config_dir(|var| std::env::var(var).ok())
}

fn resolve_config_dir(lookup: impl Fn(&str) -> Option<String>) -> PathBuf {
    let set = |var: &str| lookup(var).filter(|value| !value.is_empty());

    if let Some(dir) = set(CONFIG_DIR_VAR) {
        return PathBuf::from(dir);
    }
    // Set by the kubelet in every pod
    if set("KUBERNETES_SERVICE_HOST").is_some() {
        return PathBuf::from(IN_CLUSTER_DIR);
    }
    if let Some(xdg) = set("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("buildwright");
    }
    directories::ProjectDirs::from("dev", "buildwright", "buildwright")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".buildwright"))
}

/// The config file read when `--config` is not given
pub fn root_config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE)
}

pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}
