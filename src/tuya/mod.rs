//! Tuya OpenAPI access: request signing, session tokens and device status.

pub mod client;
pub mod model;
pub mod sign;

pub use client::{TuyaClient, TuyaCredentials};
pub use model::{parse_status, ApiResponse, StatusEntry, TokenInfo};
