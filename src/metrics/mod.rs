//! Device telemetry model, gauge storage and the poll loop.
//!
//! Readings fetched from a [`StatusSource`] are scaled through a
//! [`ScalingTable`](data::ScalingTable) and written into a shared
//! [`MetricStore`], which the scrape endpoint serializes on request.

pub mod collector;
pub mod data;
pub mod store;
pub mod traits;

// Re-export commonly used items
pub use collector::Poller;
pub use data::{DeviceRegistry, StatusReading};
pub use store::MetricStore;
pub use traits::StatusSource;
