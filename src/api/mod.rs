pub mod error;
pub mod metrics;
mod webhooks;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::AppState;

pub use webhooks::{WebhookResponse, WEBHOOK_ENDPOINT};

pub fn create_router(state: Arc<AppState>) -> Router {
    let webhook_routes = Router::new()
        .route("/github", post(webhooks::github_webhook))
        .route("/health", get(webhooks::webhook_health))
        .route("/info", get(webhooks::webhook_info));

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics::metrics_endpoint))
        .nest("/webhook", webhook_routes)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
