//! Gauge storage backed by a Prometheus registry.

use crate::error::Result;
use crate::metrics::data::{GaugeKind, ScalingTable, StatusReading};
use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};

/// Labels carried by every gauge, in declaration order.
const LABELS: [&str; 2] = ["device", "channel"];

/// The set of labeled gauges shared by the poll loop and the scrape endpoint.
///
/// Each value is an atomic inside the `prometheus` crate, so a single write
/// and a single read never tear. A scrape may still observe a device halfway
/// through an update.
#[derive(Clone)]
pub struct MetricStore {
    registry: Registry,
    power: GaugeVec,
    voltage: GaugeVec,
    current: GaugeVec,
    energy: GaugeVec,
}

impl MetricStore {
    /// Create a store with its own registry and the four device gauges.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let power = Self::register(&registry, GaugeKind::Power)?;
        let voltage = Self::register(&registry, GaugeKind::Voltage)?;
        let current = Self::register(&registry, GaugeKind::Current)?;
        let energy = Self::register(&registry, GaugeKind::Energy)?;

        Ok(Self {
            registry,
            power,
            voltage,
            current,
            energy,
        })
    }

    fn register(registry: &Registry, kind: GaugeKind) -> Result<GaugeVec> {
        let gauge = GaugeVec::new(Opts::new(kind.metric_name(), kind.help()), &LABELS)?;
        registry.register(Box::new(gauge.clone()))?;
        Ok(gauge)
    }

    fn gauge(&self, kind: GaugeKind) -> &GaugeVec {
        match kind {
            GaugeKind::Power => &self.power,
            GaugeKind::Voltage => &self.voltage,
            GaugeKind::Current => &self.current,
            GaugeKind::Energy => &self.energy,
        }
    }

    /// Set a single gauge value.
    pub fn set(&self, kind: GaugeKind, device: &str, channel: &str, value: f64) {
        self.gauge(kind).with_label_values(&[device, channel]).set(value);
    }

    /// Write every code of `reading` that has a scaling rule.
    ///
    /// Codes missing from the reading leave their gauge untouched. Returns the
    /// number of gauges written.
    pub fn apply_reading(
        &self,
        device: &str,
        channel: &str,
        reading: &StatusReading,
        scaling: &ScalingTable,
    ) -> usize {
        let mut written = 0;
        for rule in scaling.iter() {
            if let Some(raw) = reading.get(&rule.code) {
                self.set(rule.kind, device, channel, rule.apply(raw));
                written += 1;
            }
        }
        written
    }

    /// Current value of a gauge, or `None` if it was never set.
    pub fn value(&self, kind: GaugeKind, device: &str, channel: &str) -> Option<f64> {
        self.registry
            .gather()
            .iter()
            .filter(|family| family.get_name() == kind.metric_name())
            .flat_map(|family| family.get_metric().iter())
            .find(|metric| {
                let labels = metric.get_label();
                let has = |name: &str, value: &str| {
                    labels
                        .iter()
                        .any(|pair| pair.get_name() == name && pair.get_value() == value)
                };
                has("device", device) && has("channel", channel)
            })
            .map(|metric| metric.get_gauge().get_value())
    }

    /// Content type of [`MetricStore::render`] output.
    pub fn content_type(&self) -> String {
        TextEncoder::new().format_type().to_string()
    }

    /// Serialize all gauges in the text exposition format.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| crate::error::ExporterError::parse_error(e.to_string()))
    }
}
