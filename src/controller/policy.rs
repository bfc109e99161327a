//! Build strategy resolution from the cluster policy

use crate::error::{BuildError, Result};
use crate::models::BuildRequestSpec;
use crate::store::Store;

/// Resolve the cluster build strategy for a request
///
/// Fails with `MissingPolicy` when no policy is configured, and with
/// `BuildStrategyNotFound` when the policy has no strategy for the
/// request's build-file mode or the named strategy does not exist.
pub async fn resolve_strategy<S: Store + ?Sized>(store: &S, spec: &BuildRequestSpec) -> Result<String> {
    let policy = store.get_policy().await?.ok_or(BuildError::MissingPolicy)?;

    let name = policy.strategy_for(spec.build_file).ok_or_else(|| {
        BuildError::BuildStrategyNotFound(format!(
            "no strategy configured for buildFile={:?}",
            spec.build_file
        ))
    })?;

    if store.get_strategy(name).await?.is_none() {
        return Err(BuildError::BuildStrategyNotFound(name.to_string()));
    }

    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BuildFileMode, BuildStrategies, ClusterBuildStrategy, ClusterPolicy};
    use crate::store::{MockStore, StoreError};

    fn policy() -> ClusterPolicy {
        ClusterPolicy {
            build_strategies: BuildStrategies {
                buildfile: Some("buildkit".to_string()),
                no_buildfile: None,
            },
        }
    }

    fn spec(mode: BuildFileMode) -> BuildRequestSpec {
        BuildRequestSpec {
            build_file: mode,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_missing_policy() {
        let mut store = MockStore::new();
        store.expect_get_policy().returning(|| Ok(None));
        store.expect_get_strategy().never();

        let err = resolve_strategy(&store, &spec(BuildFileMode::Present))
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::MissingPolicy));
    }

    #[tokio::test]
    async fn test_unmapped_mode() {
        let mut store = MockStore::new();
        store.expect_get_policy().returning(|| Ok(Some(policy())));
        store.expect_get_strategy().never();

        let err = resolve_strategy(&store, &spec(BuildFileMode::Absent))
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::BuildStrategyNotFound(_)));
    }

    #[tokio::test]
    async fn test_strategy_object_absent() {
        let mut store = MockStore::new();
        store.expect_get_policy().returning(|| Ok(Some(policy())));
        store
            .expect_get_strategy()
            .withf(|name| name.to_string() == "buildkit")
            .returning(|_| Ok(None));

        let err = resolve_strategy(&store, &spec(BuildFileMode::Present))
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::BuildStrategyNotFound(name) if name == "buildkit"));
    }

    #[tokio::test]
    async fn test_resolves_existing_strategy() {
        let mut store = MockStore::new();
        store.expect_get_policy().returning(|| Ok(Some(policy())));
        store.expect_get_strategy().returning(|name| {
            Ok(Some(ClusterBuildStrategy::new(name, Default::default())))
        });

        let name = resolve_strategy(&store, &spec(BuildFileMode::Present))
            .await
            .unwrap();
        assert_eq!(name, "buildkit");
    }

    #[tokio::test]
    async fn test_store_errors_propagate() {
        let mut store = MockStore::new();
        store
            .expect_get_policy()
            .returning(|| Err(StoreError::Backend("unreachable".to_string())));

        let err = resolve_strategy(&store, &spec(BuildFileMode::Present))
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::BuildReconcileFailed(_)));
    }
}
