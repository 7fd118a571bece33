//! Data structures for devices, readings and scaling rules.

use crate::error::{ExporterError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Channel label every reading is attributed to.
pub const DEFAULT_CHANNEL: &str = "main";

/// A registered smart power device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Local lookup key (e.g., "plug_1")
    pub key: String,
    /// Vendor device identifier
    pub device_id: String,
    /// Display name used as the `device` label
    pub name: String,
}

impl Device {
    pub fn new(
        key: impl Into<String>,
        device_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            device_id: device_id.into(),
            name: name.into(),
        }
    }
}

/// The fixed set of devices polled by the exporter.
///
/// Keys are unique and the registry is never empty. Iteration follows the
/// order the devices were loaded in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Device>", into = "Vec<Device>")]
pub struct DeviceRegistry {
    devices: Vec<Device>,
}

impl DeviceRegistry {
    /// Build a registry, rejecting empty lists and duplicate keys.
    pub fn new(devices: Vec<Device>) -> Result<Self> {
        if devices.is_empty() {
            return Err(ExporterError::config_error(
                "device registry must contain at least one device",
            ));
        }

        let mut seen = HashSet::new();
        for device in &devices {
            if device.device_id.is_empty() {
                return Err(ExporterError::config_error(format!(
                    "device '{}' has an empty device_id",
                    device.key
                )));
            }
            if !seen.insert(device.key.as_str()) {
                return Err(ExporterError::config_error(format!(
                    "duplicate device key '{}'",
                    device.key
                )));
            }
        }

        Ok(Self { devices })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter()
    }

    pub fn get(&self, key: &str) -> Option<&Device> {
        self.devices.iter().find(|device| device.key == key)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self {
            devices: vec![
                Device::new("plug_1", "DEVICE_ID_1", "standalone_plug"),
                Device::new("strip_1", "DEVICE_ID_2", "power_strip"),
            ],
        }
    }
}

impl TryFrom<Vec<Device>> for DeviceRegistry {
    type Error = ExporterError;

    fn try_from(devices: Vec<Device>) -> Result<Self> {
        Self::new(devices)
    }
}

impl From<DeviceRegistry> for Vec<Device> {
    fn from(registry: DeviceRegistry) -> Self {
        registry.devices
    }
}

/// Numeric data points reported by a device in a single status fetch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusReading {
    values: HashMap<String, f64>,
}

impl StatusReading {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, code: impl Into<String>, value: f64) {
        self.values.insert(code.into(), value);
    }

    /// Raw value of a DP code, if the device reported it.
    pub fn get(&self, code: &str) -> Option<f64> {
        self.values.get(code).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for StatusReading {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// The gauges exported for every device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GaugeKind {
    Power,
    Voltage,
    Current,
    Energy,
}

impl GaugeKind {
    pub const ALL: [GaugeKind; 4] = [
        GaugeKind::Power,
        GaugeKind::Voltage,
        GaugeKind::Current,
        GaugeKind::Energy,
    ];

    /// Exposition metric name.
    pub fn metric_name(self) -> &'static str {
        match self {
            GaugeKind::Power => "tuya_power_watts",
            GaugeKind::Voltage => "tuya_voltage_volts",
            GaugeKind::Current => "tuya_current_amps",
            GaugeKind::Energy => "tuya_energy_kwh_total",
        }
    }

    pub fn help(self) -> &'static str {
        match self {
            GaugeKind::Power => "Instantaneous power usage",
            GaugeKind::Voltage => "Voltage",
            GaugeKind::Current => "Current",
            GaugeKind::Energy => "Total energy consumption",
        }
    }
}

/// Maps one DP code onto a gauge with a fixed unit conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingRule {
    /// Vendor DP code (e.g., "cur_power")
    pub code: String,
    /// Gauge the scaled value is written to
    pub kind: GaugeKind,
    /// Raw value is divided by this to obtain the exported unit
    pub divisor: f64,
}

impl ScalingRule {
    pub fn new(code: impl Into<String>, kind: GaugeKind, divisor: f64) -> Self {
        Self {
            code: code.into(),
            kind,
            divisor,
        }
    }

    pub fn apply(&self, raw: f64) -> f64 {
        raw / self.divisor
    }
}

/// Ordered set of scaling rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ScalingRule>", into = "Vec<ScalingRule>")]
pub struct ScalingTable {
    rules: Vec<ScalingRule>,
}

impl ScalingTable {
    /// Build a table, rejecting zero or non-finite divisors.
    pub fn new(rules: Vec<ScalingRule>) -> Result<Self> {
        if let Some(rule) = rules
            .iter()
            .find(|rule| !rule.divisor.is_finite() || rule.divisor == 0.0)
        {
            return Err(ExporterError::config_error(format!(
                "invalid divisor {} for code '{}'",
                rule.divisor, rule.code
            )));
        }
        Ok(Self { rules })
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScalingRule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for ScalingTable {
    fn default() -> Self {
        // Tuya standard DP codes
        Self {
            rules: vec![
                ScalingRule::new("cur_power", GaugeKind::Power, 10.0), // W * 10
                ScalingRule::new("cur_voltage", GaugeKind::Voltage, 10.0), // V * 10
                ScalingRule::new("cur_current", GaugeKind::Current, 1000.0), // mA
                ScalingRule::new("add_ele", GaugeKind::Energy, 100.0), // kWh * 100
            ],
        }
    }
}

impl TryFrom<Vec<ScalingRule>> for ScalingTable {
    type Error = ExporterError;

    fn try_from(rules: Vec<ScalingRule>) -> Result<Self> {
        Self::new(rules)
    }
}

impl From<ScalingTable> for Vec<ScalingRule> {
    fn from(table: ScalingTable) -> Self {
        table.rules
    }
}

/// Outcome of one pass over the device registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollReport {
    /// When the cycle started
    pub started_at: chrono::DateTime<chrono::Utc>,
    /// Devices whose status was fetched and applied
    pub succeeded: usize,
    /// Devices whose fetch failed and were skipped
    pub failed: usize,
}

impl PollReport {
    pub fn new() -> Self {
        Self {
            started_at: chrono::Utc::now(),
            succeeded: 0,
            failed: 0,
        }
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }
}

impl Default for PollReport {
    fn default() -> Self {
        Self::new()
    }
}
