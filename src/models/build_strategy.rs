//! `ClusterBuildStrategy` custom resource
//!
//! Only existence matters here: the policy names a strategy and the
//! controller checks it is installed. Its content is opaque.

use std::collections::BTreeMap;

use kube::CustomResource;
use serde::{Deserialize, Serialize};

/// Cluster build strategy kind recorded on every template's `strategy.kind`
pub const CLUSTER_BUILD_STRATEGY_KIND: &str = "ClusterBuildStrategy";

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[kube(
    group = "buildwright.dev",
    version = "v1alpha1",
    kind = "ClusterBuildStrategy"
)]
#[kube(schema = "disabled")]
pub struct ClusterBuildStrategySpec {
    #[serde(flatten)]
    pub fields: BTreeMap<String, serde_json::Value>,
}
