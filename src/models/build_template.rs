//! `BuildTemplate` custom resource
//!
//! Derived 1:1 from a `BuildRequest` and owned by it. Describes how to
//! build: the resolved strategy plus the translated source and output.

use kube::CustomResource;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[kube(
    group = "buildwright.dev",
    version = "v1alpha1",
    kind = "BuildTemplate",
    namespaced
)]
#[kube(shortname = "btpl")]
#[kube(schema = "disabled")]
#[serde(rename_all = "camelCase")]
pub struct BuildTemplateSpec {
    pub strategy: StrategyRef,
    pub source: TemplateSource,
    pub output: TemplateOutput,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct StrategyRef {
    pub name: String,
    pub kind: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSource {
    pub url: String,
    pub revision: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clone_secret: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TemplateOutput {
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_secret: Option<String>,
}
