//! Kubernetes client construction
//!
//! The kubeconfig may route API traffic through `proxy-url`. Internal API
//! servers, and hosts listed in `NO_PROXY` / `no_proxy`, are reached directly.

use anyhow::{Context, Result};
use kube::{Client, Config};

/// Infer a client configuration and build the client
///
/// Uses the default kubeconfig loading strategy:
/// 1. In-cluster config (if running in a pod)
/// 2. KUBECONFIG environment variable
/// 3. ~/.kube/config
///
/// `namespace` becomes the client's default namespace when set.
pub async fn create_client(namespace: Option<&str>) -> Result<Client> {
    let mut config = Config::infer()
        .await
        .context("Failed to infer Kubernetes configuration")?;

    if let Some(namespace) = namespace {
        config.default_namespace = namespace.to_string();
    }

    if config.proxy_url.is_some() {
        let host = config.cluster_url.host().unwrap_or_default().to_string();
        if bypasses_proxy(&host, &no_proxy_from_env()) {
            tracing::debug!(host = %host, "Connecting to API server without proxy");
            config.proxy_url = None;
        }
    }

    Client::try_from(config).context("Failed to build Kubernetes client")
}

fn no_proxy_from_env() -> String {
    std::env::var("NO_PROXY")
        .ok()
        .filter(|value| !value.is_empty())
        .or_else(|| std::env::var("no_proxy").ok())
        .unwrap_or_default()
}

fn bypasses_proxy(host: &str, no_proxy: &str) -> bool {
    !host.is_empty() && (is_internal_host(host) || no_proxy_contains(no_proxy, host))
}

/// Private addresses, loopback and cluster-local names
fn is_internal_host(host: &str) -> bool {
    let host = host.trim_start_matches('[').trim_end_matches(']');

    if let Ok(ip) = host.parse::<std::net::IpAddr>() {
        return match ip {
            std::net::IpAddr::V4(v4) => v4.is_private() || v4.is_loopback(),
            std::net::IpAddr::V6(v6) => v6.is_loopback(),
        };
    }

    host == "localhost"
        || host.ends_with(".local")
        || host.ends_with(".internal")
        || host.ends_with(".cluster.local")
}

/// Whether a `NO_PROXY` list covers `host`
///
/// - Exact matches: "example.com" matches "example.com"
/// - Leading dot: ".example.com" matches "example.com" and its subdomains
/// - Plain domains also match their subdomains
/// - "*" matches everything
fn no_proxy_contains(no_proxy: &str, host: &str) -> bool {
    no_proxy
        .split(',')
        .map(str::trim)
        .filter(|pattern| !pattern.is_empty())
        .any(|pattern| {
            if pattern == "*" {
                return true;
            }
            let domain = pattern.strip_prefix('.').unwrap_or(pattern);
            host == domain || host.ends_with(&format!(".{}", domain))
        })
}
