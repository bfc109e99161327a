//! `BuildRequest` custom resource
//!
//! The user-facing object: where the source lives, how to build it, where
//! to push the image, and whether to rebuild on every push.

use chrono::{DateTime, Utc};
use kube::{CustomResource, ResourceExt};
use serde::{Deserialize, Serialize};

use super::conditions::Condition;

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[kube(
    group = "buildwright.dev",
    version = "v1alpha1",
    kind = "BuildRequest",
    namespaced
)]
#[kube(status = "BuildRequestStatus", shortname = "breq")]
#[kube(schema = "disabled")]
#[kube(printcolumn = r#"{"name":"Image","type":"string","jsonPath":".status.latestImage"}"#)]
#[serde(rename_all = "camelCase")]
pub struct BuildRequestSpec {
    pub source: Source,
    #[serde(default)]
    pub build_file: BuildFileMode,
    pub output: Output,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rebuild: Option<Rebuild>,
    /// Required when `rebuild.mode` is `OnCommit`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_commit: Option<OnCommit>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub git: GitSource,
    /// Subdirectory of the repository to build from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_dir: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GitSource {
    pub url: String,
    /// Branch name; pushes to `refs/heads/{revision}` trigger on-commit builds
    pub revision: String,
    /// Name of the secret holding clone credentials
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clone_secret: Option<String>,
}

/// Whether the repository carries its own build file
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BuildFileMode {
    Present,
    #[default]
    Absent,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Output {
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_secret: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct Rebuild {
    #[serde(default)]
    pub mode: RebuildMode,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RebuildMode {
    #[default]
    Initial,
    OnCommit,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OnCommit {
    /// Secret used to authenticate push notifications for this request
    pub webhook_secret: SecretKeyRef,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct SecretKeyRef {
    pub name: String,
    pub key: String,
}

/// Observed state of a `BuildRequest`
///
/// Optional fields serialize as `null` rather than being skipped: status
/// writes are merge patches, and `null` is what clears a field.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BuildRequestStatus {
    #[serde(default)]
    pub observed_generation: Option<i64>,
    /// `{namespace}/{name}` of the owned build template
    #[serde(default)]
    pub build_ref: Option<String>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub latest_image: Option<String>,
    #[serde(default)]
    pub last_build_run_ref: Option<String>,
    /// Never decreases
    #[serde(default)]
    pub build_run_counter: i64,
    /// Build-relevant spec fields the last plain execution was created from
    #[serde(default)]
    pub last_build_spec: Option<BuildSnapshot>,
    #[serde(default)]
    pub on_commit: Option<OnCommitStatus>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BuildSnapshot {
    pub url: String,
    pub revision: String,
    pub image: String,
}

/// On-commit bookkeeping, present only when rebuilding on push
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OnCommitStatus {
    /// Most recent push seen, whether or not it was acted upon
    #[serde(default)]
    pub last_received: Option<PushRecord>,
    /// Accepted push waiting to fire
    #[serde(default)]
    pub pending: Option<PushRecord>,
    #[serde(default)]
    pub last_triggered_execution: Option<TriggeredExecution>,
    #[serde(default)]
    pub trigger_counter: i64,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PushRecord {
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub commit: String,
    pub received_at: DateTime<Utc>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TriggeredExecution {
    pub name: String,
    pub triggered_at: DateTime<Utc>,
}

impl BuildRequestSpec {
    pub fn rebuild_mode(&self) -> RebuildMode {
        self.rebuild.as_ref().map(|r| r.mode).unwrap_or_default()
    }

    /// The build-relevant fields of this spec
    pub fn snapshot(&self) -> BuildSnapshot {
        BuildSnapshot {
            url: self.source.git.url.clone(),
            revision: self.source.git.revision.clone(),
            image: self.output.image.clone(),
        }
    }

    /// The ref a push must carry to match this request
    pub fn watched_ref(&self) -> String {
        format!("refs/heads/{}", self.source.git.revision)
    }
}

impl BuildRequest {
    pub fn is_on_commit(&self) -> bool {
        self.spec.rebuild_mode() == RebuildMode::OnCommit
    }

    /// Deterministic name of the build template owned by this request
    pub fn template_name(&self) -> String {
        format!("{}-build", self.name_any())
    }

    pub fn status_or_default(&self) -> BuildRequestStatus {
        self.status.clone().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_deserialization() {
        let yaml = r#"
source:
  git:
    url: https://github.com/org/repo.git
    revision: main
buildFile: Present
output:
  image: registry.example.com/org/app
rebuild:
  mode: OnCommit
onCommit:
  webhookSecret:
    name: hook
    key: token
"#;
        let spec: BuildRequestSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.build_file, BuildFileMode::Present);
        assert_eq!(spec.rebuild_mode(), RebuildMode::OnCommit);
        assert_eq!(spec.watched_ref(), "refs/heads/main");
        assert_eq!(spec.on_commit.unwrap().webhook_secret.key, "token");
    }

    #[test]
    fn test_rebuild_mode_defaults_to_initial() {
        let spec = BuildRequestSpec::default();
        assert_eq!(spec.rebuild_mode(), RebuildMode::Initial);
    }

    #[test]
    fn test_template_name_is_derived_from_request_name() {
        let request = BuildRequest::new("app", BuildRequestSpec::default());
        assert_eq!(request.template_name(), "app-build");
    }

    #[test]
    fn test_cleared_pending_serializes_as_null() {
        let status = OnCommitStatus::default();
        let json = serde_json::to_value(&status).unwrap();
        assert!(json.get("pending").unwrap().is_null());
    }
}
