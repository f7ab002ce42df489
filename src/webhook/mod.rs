//! HTTP ingress for the resolver.
//!
//! Routes:
//!   POST /webhook/market      → change-event webhook (HMAC signed when a secret is set)
//!   POST /resolve/:market_id  → manual resolution trigger
//!   GET  /health              → liveness plus queue depth

pub mod handlers;
pub mod signature;
pub mod types;

use crate::clock::Clock;
use crate::queue::ResolutionQueue;
use axum::routing::{get, post};
use axum::Router;
use std::future::Future;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use types::{ChangeEvent, WebhookError};

/// Shared state for the ingress routes.
#[derive(Clone)]
pub struct WebhookState {
    pub queue: ResolutionQueue,
    /// Unset means signatures are not checked.
    pub secret: Option<String>,
    pub clock: Arc<dyn Clock>,
}

/// Build the Axum router.
pub fn build_router(state: WebhookState) -> Router {
    Router::new()
        .route("/webhook/market", post(handlers::market_webhook))
        .route("/resolve/:market_id", post(handlers::manual_resolve))
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `shutdown` resolves, then let in-flight requests finish.
pub async fn serve<F>(state: WebhookState, bind_addr: &str, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if state.secret.is_none() {
        tracing::warn!("webhook secret not set, signatures will not be verified");
    }
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(addr = bind_addr, "webhook server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
