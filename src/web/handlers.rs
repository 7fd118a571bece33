//! HTTP handlers.

use crate::metrics::MetricStore;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::error;

/// Serialize every gauge in the text exposition format.
pub async fn metrics(State(store): State<Arc<MetricStore>>) -> Response {
    match store.render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, store.content_type())],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
