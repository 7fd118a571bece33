//! Wire types of the Tuya OpenAPI.

use crate::error::{ExporterError, Result};
use crate::metrics::data::StatusReading;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Response envelope shared by every OpenAPI resource.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub result: Option<T>,
    /// Error code, present when `success` is false
    pub code: Option<i64>,
    /// Error message, present when `success` is false
    pub msg: Option<String>,
    /// Server timestamp in milliseconds
    pub t: Option<i64>,
}

impl<T> ApiResponse<T> {
    /// Unwrap the envelope into its `result`, mapping rejections to errors.
    pub fn into_result(self) -> Result<T> {
        if !self.success {
            return Err(ExporterError::api_error(
                self.code.unwrap_or(-1),
                self.msg.unwrap_or_else(|| "request was not successful".to_string()),
            ));
        }
        self.result
            .ok_or_else(|| ExporterError::parse_error("response is missing 'result'"))
    }
}

/// Result of the token grant and refresh resources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenInfo {
    pub access_token: String,
    pub refresh_token: String,
    /// Lifetime of the access token in seconds
    pub expire_time: i64,
    #[serde(default)]
    pub uid: Option<String>,
}

/// A single data point of a device status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEntry {
    pub code: String,
    pub value: serde_json::Value,
}

/// Convert a status list into a reading, dropping non-numeric data points.
pub fn parse_status(entries: Vec<StatusEntry>) -> StatusReading {
    entries
        .into_iter()
        .filter_map(|entry| match entry.value.as_f64() {
            Some(value) => Some((entry.code, value)),
            None => {
                trace!("Skipping non-numeric data point {}", entry.code);
                None
            }
        })
        .collect()
}
