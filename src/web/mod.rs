//! HTTP scrape endpoint for the exporter.
//!
//! Serves the current gauge values at `GET /metrics` while draining the poll
//! loop's report stream in a background task.

pub mod config;
pub mod handlers;
pub mod router;

// Re-export commonly used items
pub use config::WebConfig;
pub use router::create_app;

use crate::error::{ExporterError, Result};
use crate::metrics::{data::PollReport, MetricStore};
use futures_util::stream::BoxStream;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tracing::{debug, error, info};

/// Start the web server and drive the poll loop.
///
/// Returns an error if the server fails or the poll loop stops.
pub async fn start_web_server(
    config: WebConfig,
    store: Arc<MetricStore>,
    mut reports: BoxStream<'static, PollReport>,
) -> Result<()> {
    let app = create_app(store);

    let addr = config
        .bind_address()
        .parse::<SocketAddr>()
        .map_err(|e| ExporterError::config_error(format!("Invalid bind address: {}", e)))?;

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ExporterError::web_server_error(format!("Failed to bind to address: {}", e)))?;

    info!("Serving metrics on http://{}/metrics", addr);

    let mut poll_task = tokio::spawn(drain_reports(reports));
    let server = async { axum::serve(listener, app).await };

    tokio::select! {
        served = server => {
            poll_task.abort();
            served.map_err(|e| ExporterError::web_server_error(format!("Server error: {}", e)))?;
        }
        polled = &mut poll_task => {
            let reason = match polled {
                Ok(cycles) => format!("poll loop ended after {} cycles", cycles),
                Err(e) => format!("poll loop failed: {}", e),
            };
            return Err(ExporterError::web_server_error(reason));
        }
    }

    Ok(())
}

/// Consume poll reports until the stream ends, returning the cycle count.
///
/// The poll loop never ends on its own, so reaching the end is logged as an
/// error.
pub async fn drain_reports(mut reports: BoxStream<'static, PollReport>) -> usize {
    let mut cycles = 0;
    while let Some(report) = reports.next().await {
        cycles += 1;
        debug!(
            "Poll cycle started at {}: {} updated, {} failed",
            report.started_at, report.succeeded, report.failed
        );
    }
    error!(
        "Poll loop stopped after {} cycles; metrics will no longer update",
        cycles
    );
    cycles
}
