//! Web application router and middleware setup.

use crate::metrics::MetricStore;
use crate::web::handlers;
use axum::{routing::get, Router};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

/// Create the axum application serving `GET /metrics`.
pub fn create_app(store: Arc<MetricStore>) -> Router {
    Router::new()
        .route("/metrics", get(handlers::metrics))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(store)
}
