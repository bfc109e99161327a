//! Source-control provider adapters
//!
//! Each provider knows how to recognize its push notifications from the
//! request headers, parse the body into a [`PushEvent`], and verify the
//! delivery against a caller-supplied secret. Providers are tried in a
//! fixed order; adding one means adding a [`PushProvider`] implementation
//! to [`ProviderRegistry::default`].

mod github;
mod gitlab;

pub use github::{GitHubProvider, sign as github_signature};
pub use gitlab::GitLabProvider;

use axum::http::HeaderMap;

/// A push notification normalized across providers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushEvent {
    pub repository_url: String,
    /// Full ref, e.g. `refs/heads/main`
    pub git_ref: String,
    pub commit: String,
}

impl PushEvent {
    /// Whether this push targets the given repository and ref
    pub fn matches(&self, repository_url: &str, git_ref: &str) -> bool {
        self.git_ref == git_ref
            && canonical_repo_url(&self.repository_url) == canonical_repo_url(repository_url)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("no provider recognizes this request")]
    UnknownProvider,

    #[error("{provider} event {event:?} is not a push")]
    UnsupportedEvent { provider: &'static str, event: String },

    #[error("invalid {provider} payload: {reason}")]
    InvalidPayload {
        provider: &'static str,
        reason: String,
    },
}

/// One source-control provider
pub trait PushProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the request headers identify this provider
    fn detect(&self, headers: &HeaderMap) -> bool;

    /// Parse the raw body into a push event, rejecting incomplete payloads
    fn parse(&self, headers: &HeaderMap, body: &[u8]) -> Result<PushEvent, ProviderError>;

    /// Verify the delivery against a shared secret
    fn authenticate(&self, headers: &HeaderMap, body: &[u8], secret: &[u8]) -> bool;
}

/// The ordered set of known providers
pub struct ProviderRegistry {
    providers: Vec<Box<dyn PushProvider>>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self {
            providers: vec![Box::new(GitHubProvider), Box::new(GitLabProvider)],
        }
    }
}

impl ProviderRegistry {
    pub fn new(providers: Vec<Box<dyn PushProvider>>) -> Self {
        Self { providers }
    }

    /// First provider whose detection signal is present
    pub fn detect(&self, headers: &HeaderMap) -> Result<&dyn PushProvider, ProviderError> {
        self.providers
            .iter()
            .find(|p| p.detect(headers))
            .map(|p| p.as_ref())
            .ok_or(ProviderError::UnknownProvider)
    }
}

/// Normalize a repository URL for comparison
///
/// Trims whitespace and drops a trailing `.git` and trailing slashes, so
/// `https://host/org/repo.git` and `https://host/org/repo/` compare equal.
pub fn canonical_repo_url(url: &str) -> &str {
    let url = url.trim().trim_end_matches('/');
    url.strip_suffix(".git").unwrap_or(url).trim_end_matches('/')
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Pull a non-empty string out of a JSON payload, trying each path in order
fn first_str<'a>(payload: &'a serde_json::Value, paths: &[&[&str]]) -> Option<&'a str> {
    paths.iter().find_map(|path| {
        path.iter()
            .try_fold(payload, |value, key| value.get(*key))
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_canonical_repo_url() {
        assert_eq!(
            canonical_repo_url("https://github.com/org/repo.git"),
            "https://github.com/org/repo"
        );
        assert_eq!(
            canonical_repo_url(" https://github.com/org/repo/ "),
            "https://github.com/org/repo"
        );
        assert_eq!(
            canonical_repo_url("https://github.com/org/repo.git/"),
            "https://github.com/org/repo"
        );
        assert_eq!(
            canonical_repo_url("git@github.com:org/repo.git"),
            "git@github.com:org/repo"
        );
    }

    #[test]
    fn test_push_event_matches_ref_and_url() {
        let event = PushEvent {
            repository_url: "https://github.com/org/repo.git".to_string(),
            git_ref: "refs/heads/main".to_string(),
            commit: "abc".to_string(),
        };
        assert!(event.matches("https://github.com/org/repo", "refs/heads/main"));
        assert!(!event.matches("https://github.com/org/repo", "refs/heads/dev"));
        assert!(!event.matches("https://github.com/org/other", "refs/heads/main"));
    }

    #[test]
    fn test_registry_tries_github_first() {
        let registry = ProviderRegistry::default();
        let mut headers = HeaderMap::new();
        headers.insert("x-github-event", HeaderValue::from_static("push"));
        headers.insert("x-gitlab-event", HeaderValue::from_static("Push Hook"));
        assert_eq!(registry.detect(&headers).unwrap().name(), "github");
    }

    #[test]
    fn test_registry_rejects_unknown_sender() {
        let registry = ProviderRegistry::default();
        assert!(matches!(
            registry.detect(&HeaderMap::new()),
            Err(ProviderError::UnknownProvider)
        ));
    }

    #[test]
    fn test_first_str_falls_back_through_paths() {
        let payload = serde_json::json!({"repository": {"html_url": "https://x/y", "clone_url": ""}});
        assert_eq!(
            first_str(&payload, &[&["repository", "clone_url"], &["repository", "html_url"]]),
            Some("https://x/y")
        );
    }
}
