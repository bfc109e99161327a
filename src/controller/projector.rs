//! Projection of execution outcomes onto request status

use crate::models::conditions::BUILD_SUCCEEDED;
use crate::models::{Condition, ConditionStatus, ExecutionOutcome};

/// The request's `BuildSucceeded` condition for an execution outcome
pub fn project_build_condition(outcome: &ExecutionOutcome) -> Condition {
    match outcome {
        ExecutionOutcome::Pending => Condition::new(
            BUILD_SUCCEEDED,
            ConditionStatus::Unknown,
            "Pending",
            "build execution has not reported an outcome",
        ),
        ExecutionOutcome::Running { message } => Condition::new(
            BUILD_SUCCEEDED,
            ConditionStatus::Unknown,
            "Running",
            message.clone().unwrap_or_default(),
        ),
        ExecutionOutcome::Succeeded => Condition::new(
            BUILD_SUCCEEDED,
            ConditionStatus::True,
            "Succeeded",
            "build execution succeeded",
        ),
        ExecutionOutcome::Failed { message } => Condition::new(
            BUILD_SUCCEEDED,
            ConditionStatus::False,
            "Failed",
            message.clone().unwrap_or_default(),
        ),
    }
}

/// Resolve the pullable image reference for a build
///
/// A reported digest pins the spec image (`{image}@{digest}`). Without one,
/// an image that already names a tag or digest is used as is; a bare
/// repository cannot be pinned and resolves to nothing.
pub fn resolve_image(spec_image: &str, digest: Option<&str>) -> Option<String> {
    let image = spec_image.trim();
    if image.is_empty() {
        return None;
    }

    if let Some(digest) = digest.map(str::trim).filter(|d| !d.is_empty()) {
        let repository = image.split_once('@').map_or(image, |(repo, _)| repo);
        return Some(format!("{}@{}", repository, digest));
    }

    let last_segment = image.rsplit('/').next().unwrap_or(image);
    (image.contains('@') || last_segment.contains(':')).then(|| image.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_mapping() {
        let pending = project_build_condition(&ExecutionOutcome::Pending);
        assert_eq!((pending.status, pending.reason.as_str()), (ConditionStatus::Unknown, "Pending"));

        let running = project_build_condition(&ExecutionOutcome::Running {
            message: Some("step 2/5".to_string()),
        });
        assert_eq!(running.reason, "Running");
        assert_eq!(running.message, "step 2/5");

        let succeeded = project_build_condition(&ExecutionOutcome::Succeeded);
        assert_eq!(succeeded.status, ConditionStatus::True);

        let failed = project_build_condition(&ExecutionOutcome::Failed {
            message: Some("push denied".to_string()),
        });
        assert_eq!((failed.status, failed.reason.as_str()), (ConditionStatus::False, "Failed"));
        assert_eq!(failed.message, "push denied");
        assert_eq!(failed.r#type, BUILD_SUCCEEDED);
    }

    #[test]
    fn test_registry_port_is_not_a_tag() {
        assert_eq!(resolve_image("localhost:5000/app", None), None);
        assert_eq!(
            resolve_image("localhost:5000/app:dev", None).as_deref(),
            Some("localhost:5000/app:dev")
        );
    }

    #[test]
    fn test_digest_replaces_existing_digest() {
        assert_eq!(
            resolve_image("registry/x/app@sha256:old", Some("sha256:new")).as_deref(),
            Some("registry/x/app@sha256:new")
        );
    }

    #[test]
    fn test_empty_digest_is_ignored() {
        assert_eq!(resolve_image("registry/x/app", Some("")), None);
    }
}
