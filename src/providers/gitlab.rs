//! GitLab push webhooks
//!
//! Detected by `X-Gitlab-Event`, authenticated by the shared token in
//! `X-Gitlab-Token`.

use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::{PushEvent, PushProvider, ProviderError, first_str, header};

type HmacSha256 = Hmac<Sha256>;

const EVENT_HEADER: &str = "x-gitlab-event";
const TOKEN_HEADER: &str = "x-gitlab-token";
const PUSH_EVENT: &str = "Push Hook";

pub struct GitLabProvider;

impl PushProvider for GitLabProvider {
    fn name(&self) -> &'static str {
        "gitlab"
    }

    fn detect(&self, headers: &HeaderMap) -> bool {
        headers.contains_key(EVENT_HEADER)
    }

    fn parse(&self, headers: &HeaderMap, body: &[u8]) -> Result<PushEvent, ProviderError> {
        let event = header(headers, EVENT_HEADER).unwrap_or_default();
        if event != PUSH_EVENT {
            return Err(ProviderError::UnsupportedEvent {
                provider: self.name(),
                event: event.to_string(),
            });
        }

        let invalid = |reason: &str| ProviderError::InvalidPayload {
            provider: "gitlab",
            reason: reason.to_string(),
        };
        let payload: serde_json::Value =
            serde_json::from_slice(body).map_err(|e| invalid(&e.to_string()))?;

        let repository_url = first_str(
            &payload,
            &[
                &["project", "git_http_url"],
                &["repository", "git_http_url"],
                &["project", "web_url"],
            ],
        )
        .ok_or_else(|| invalid("missing repository URL"))?;
        let git_ref = first_str(&payload, &[&["ref"]]).ok_or_else(|| invalid("missing ref"))?;
        let commit = first_str(&payload, &[&["checkout_sha"], &["after"]]).unwrap_or_default();

        Ok(PushEvent {
            repository_url: repository_url.to_string(),
            git_ref: git_ref.to_string(),
            commit: commit.to_string(),
        })
    }

    fn authenticate(&self, headers: &HeaderMap, _body: &[u8], secret: &[u8]) -> bool {
        match header(headers, TOKEN_HEADER) {
            Some(token) if !secret.is_empty() => token_matches(token.as_bytes(), secret),
            _ => false,
        }
    }
}

/// Compare the presented token with the secret in constant time
///
/// Both sides are keyed with the secret so `verify_slice` compares digests
/// of equal length whatever the token's length.
fn token_matches(token: &[u8], secret: &[u8]) -> bool {
    let (Ok(mut expected), Ok(mut presented)) = (
        HmacSha256::new_from_slice(secret),
        HmacSha256::new_from_slice(secret),
    ) else {
        return false;
    };
    expected.update(secret);
    presented.update(token);
    presented
        .verify_slice(&expected.finalize().into_bytes())
        .is_ok()
}
