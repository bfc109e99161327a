//! Cluster build policy
//!
//! A singleton `ConfigMap` whose `policy.yaml` key maps build-file modes to
//! cluster build strategy names.

use k8s_openapi::api::core::v1::ConfigMap;
use serde::{Deserialize, Serialize};

use super::build_request::BuildFileMode;

/// ConfigMap key holding the policy document
pub const POLICY_KEY: &str = "policy.yaml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterPolicy {
    #[serde(default)]
    pub build_strategies: BuildStrategies,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildStrategies {
    /// Strategy for repositories that carry a build file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buildfile: Option<String>,
    /// Strategy for repositories without one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_buildfile: Option<String>,
}

impl ClusterPolicy {
    /// Parse the policy out of its ConfigMap
    ///
    /// Returns `Ok(None)` when the ConfigMap carries no policy document.
    pub fn from_config_map(config_map: &ConfigMap) -> Result<Option<Self>, serde_yaml::Error> {
        let Some(document) = config_map
            .data
            .as_ref()
            .and_then(|data| data.get(POLICY_KEY))
            .filter(|doc| !doc.trim().is_empty())
        else {
            return Ok(None);
        };
        serde_yaml::from_str(document).map(Some)
    }

    pub fn strategy_for(&self, mode: BuildFileMode) -> Option<&str> {
        let name = match mode {
            BuildFileMode::Present => self.build_strategies.buildfile.as_deref(),
            BuildFileMode::Absent => self.build_strategies.no_buildfile.as_deref(),
        };
        name.filter(|n| !n.is_empty())
    }
}
