//! Exporter configuration: credentials, device registry and scaling table.

use crate::error::{ExporterError, Result};
use crate::metrics::data::{DeviceRegistry, ScalingTable};
use crate::tuya::TuyaCredentials;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Contents of the optional JSON configuration file.
///
/// ```json
/// {
///   "devices": [{"key": "plug_1", "device_id": "bf12...", "name": "standalone_plug"}],
///   "scaling": [{"code": "cur_power", "kind": "power", "divisor": 10}]
/// }
/// ```
///
/// Omitted sections fall back to the built-in defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub devices: Option<DeviceRegistry>,
    #[serde(default)]
    pub scaling: Option<ScalingTable>,
}

impl ConfigFile {
    /// Read and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ExporterError::config_error(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&contents)
            .map_err(|e| ExporterError::config_error(format!("{}: {}", path.display(), e)))
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        Ok(serde_json::from_str(contents)?)
    }
}

/// Everything the poll loop needs, loaded once at startup.
#[derive(Debug, Clone)]
pub struct ExporterConfig {
    /// Tuya cloud project credentials
    pub credentials: TuyaCredentials,
    /// Devices polled each cycle
    pub registry: DeviceRegistry,
    /// DP code to gauge conversions
    pub scaling: ScalingTable,
    /// Pause between the end of one cycle and the start of the next
    pub poll_interval: Duration,
    /// Per-request timeout for vendor calls; `None` waits indefinitely
    pub request_timeout: Option<Duration>,
}

impl ExporterConfig {
    /// Create a configuration with the default registry and scaling table.
    pub fn new(credentials: TuyaCredentials) -> Self {
        Self {
            credentials,
            registry: DeviceRegistry::default(),
            scaling: ScalingTable::default(),
            poll_interval: Duration::from_secs(crate::DEFAULT_POLL_INTERVAL_SECS),
            request_timeout: None,
        }
    }

    /// Replace registry and scaling table with whatever the file provides.
    pub fn with_file(mut self, file: ConfigFile) -> Self {
        if let Some(registry) = file.devices {
            self.registry = registry;
        }
        if let Some(scaling) = file.scaling {
            self.scaling = scaling;
        }
        self
    }

    pub fn with_registry(mut self, registry: DeviceRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_scaling(mut self, scaling: ScalingTable) -> Self {
        self.scaling = scaling;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Reject settings the poll loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(ExporterError::config_error(
                "poll interval must be greater than zero",
            ));
        }
        if self.credentials.endpoint.is_empty() {
            return Err(ExporterError::config_error("Tuya endpoint is not set"));
        }
        Ok(())
    }
}
