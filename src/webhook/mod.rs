//! Push webhook HTTP endpoint
//!
//! Routes:
//! - `POST {path}` - ingest a provider push notification
//! - `GET /healthz` - liveness
//!
//! Responses for the push route:
//! - `202` the push was recorded, or matched no request at all
//! - `400` unrecognized provider, non-push event, bad payload or method
//! - `401` no matching request's secret authenticates the payload
//! - `500` the store failed while resolving secrets or recording the push

mod accept;

pub use accept::{Acceptance, accept_push};

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};

use crate::clock::Clock;
use crate::providers::{ProviderError, ProviderRegistry};
use crate::store::{RetryPolicy, Store, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("method not allowed on the webhook route")]
    Method,

    #[error("no matching build request authenticated the payload")]
    Unauthorized,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebhookError::Provider(_) | WebhookError::Method => StatusCode::BAD_REQUEST,
            WebhookError::Unauthorized => StatusCode::UNAUTHORIZED,
            WebhookError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

/// Shared state for webhook handlers
pub struct WebhookState<S> {
    pub store: S,
    pub clock: Arc<dyn Clock>,
    pub retry: RetryPolicy,
    pub providers: ProviderRegistry,
}

impl<S: Store> WebhookState<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>, retry: RetryPolicy) -> Self {
        Self {
            store,
            clock,
            retry,
            providers: ProviderRegistry::default(),
        }
    }
}

/// Build the webhook router with the push route mounted at `path`
pub fn router<S: Store + 'static>(state: Arc<WebhookState<S>>, path: &str) -> Router {
    Router::new()
        .route(path, post(push_handler::<S>).fallback(reject_method))
        .route("/healthz", get(healthz))
        .with_state(state)
}

async fn push_handler<S: Store + 'static>(
    State(state): State<Arc<WebhookState<S>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, WebhookError> {
    let acceptance = accept_push(&state, &headers, &body).await.inspect_err(|e| {
        tracing::warn!(error = %e, "Rejected push webhook");
    })?;
    tracing::debug!(?acceptance, "Push webhook handled");
    Ok(StatusCode::ACCEPTED)
}

async fn reject_method() -> WebhookError {
    WebhookError::Method
}

async fn healthz() -> &'static str {
    "ok"
}

/// Serve the webhook router until Ctrl-C
pub async fn serve(app: Router, listen_addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!(address = %listen_addr, "Webhook server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("Webhook server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Received Ctrl-C, shutting down webhook server");
}
