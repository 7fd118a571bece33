//! Traits for device telemetry sources.

use crate::error::Result;
use crate::metrics::data::StatusReading;

/// Trait for fetching the current status of a device.
///
/// Implementations perform one read per call and keep no history. A failed
/// fetch is reported as an error; the caller decides whether to skip it.
pub trait StatusSource {
    /// Fetch the numeric data points currently reported by `device_id`.
    fn fetch_status(
        &self,
        device_id: &str,
    ) -> impl std::future::Future<Output = Result<StatusReading>> + Send;
}
