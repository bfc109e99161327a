//! GitHub push webhooks
//!
//! Detected by `X-GitHub-Event`, authenticated by the HMAC-SHA256 signature
//! in `X-Hub-Signature-256`.

use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::{PushEvent, PushProvider, ProviderError, first_str, header};

type HmacSha256 = Hmac<Sha256>;

const EVENT_HEADER: &str = "x-github-event";
const SIGNATURE_HEADER: &str = "x-hub-signature-256";

pub struct GitHubProvider;

impl PushProvider for GitHubProvider {
    fn name(&self) -> &'static str {
        "github"
    }

    fn detect(&self, headers: &HeaderMap) -> bool {
        headers.contains_key(EVENT_HEADER)
    }

    fn parse(&self, headers: &HeaderMap, body: &[u8]) -> Result<PushEvent, ProviderError> {
        let event = header(headers, EVENT_HEADER).unwrap_or_default();
        if event != "push" {
            return Err(ProviderError::UnsupportedEvent {
                provider: self.name(),
                event: event.to_string(),
            });
        }

        let invalid = |reason: &str| ProviderError::InvalidPayload {
            provider: "github",
            reason: reason.to_string(),
        };
        let payload: serde_json::Value =
            serde_json::from_slice(body).map_err(|e| invalid(&e.to_string()))?;

        let repository_url = first_str(
            &payload,
            &[&["repository", "clone_url"], &["repository", "html_url"]],
        )
        .ok_or_else(|| invalid("missing repository URL"))?;
        let git_ref = first_str(&payload, &[&["ref"]]).ok_or_else(|| invalid("missing ref"))?;
        let commit = first_str(&payload, &[&["after"], &["head_commit", "id"]]).unwrap_or_default();

        Ok(PushEvent {
            repository_url: repository_url.to_string(),
            git_ref: git_ref.to_string(),
            commit: commit.to_string(),
        })
    }

    fn authenticate(&self, headers: &HeaderMap, body: &[u8], secret: &[u8]) -> bool {
        let Some(signature) = header(headers, SIGNATURE_HEADER) else {
            return false;
        };
        let Some(hex_digest) = signature.strip_prefix("sha256=") else {
            return false;
        };
        let Ok(expected) = hex::decode(hex_digest) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
            return false;
        };
        mac.update(body);
        mac.verify_slice(&expected).is_ok()
    }
}

/// Compute the `X-Hub-Signature-256` value GitHub would send for a body
pub fn sign(secret: &[u8], body: &[u8]) -> String {
    // HMAC accepts keys of any length
    let mut mac = HmacSha256::new_from_slice(secret).unwrap_or_else(|_| unreachable!());
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}
