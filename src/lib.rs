//! # Tuya Exporter
//!
//! Polls Tuya cloud-connected smart plugs and power strips for electrical
//! telemetry and republishes the latest readings as a Prometheus scrape
//! endpoint.
//!
//! ## Features
//!
//! - **Signed OpenAPI client**: HMAC-SHA256 request signing with automatic token refresh
//! - **Configurable registry**: devices and DP code scaling loaded once at startup
//! - **Last-write-wins gauges**: power, voltage, current and energy per device and channel
//! - **Library + Binary**: Use as a crate or standalone application
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tuya_exporter::{
//!     start_web_server, ExporterConfig, MetricStore, Poller, TuyaClient, TuyaCredentials,
//!     WebConfig,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let credentials = TuyaCredentials::new("https://openapi.tuyaeu.com", "id", "secret");
//!     let config = ExporterConfig::new(credentials);
//!
//!     let client = TuyaClient::new(config.credentials.clone(), None)?;
//!     client.connect().await?;
//!
//!     let store = Arc::new(MetricStore::new()?);
//!     let poller = Poller::new(client, config.registry, config.scaling, store.clone());
//!
//!     start_web_server(WebConfig::default(), store, poller.into_stream(config.poll_interval))
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod metrics;
pub mod tuya;
pub mod web;

// Re-export public API
pub use config::{ConfigFile, ExporterConfig};
pub use error::{ExporterError, Result};
pub use metrics::{
    collector::Poller,
    data::{
        Device, DeviceRegistry, GaugeKind, PollReport, ScalingRule, ScalingTable, StatusReading,
        DEFAULT_CHANNEL,
    },
    store::MetricStore,
    traits::StatusSource,
};
pub use tuya::{TuyaClient, TuyaCredentials};
pub use web::{create_app, start_web_server, WebConfig};

/// The default pause between poll cycles in seconds
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 15;

/// The default scrape endpoint port
pub const DEFAULT_WEB_PORT: u16 = 9109;
