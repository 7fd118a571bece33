//! The poll loop: fetch every device and write scaled gauges.

use crate::metrics::{
    data::{Device, DeviceRegistry, PollReport, ScalingTable, DEFAULT_CHANNEL},
    store::MetricStore,
    traits::StatusSource,
};
use futures_util::stream::{self, BoxStream};
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::{debug, warn};

/// Polls a [`StatusSource`] for every registered device.
pub struct Poller<S> {
    source: S,
    registry: DeviceRegistry,
    scaling: ScalingTable,
    store: Arc<MetricStore>,
}

impl<S: StatusSource> Poller<S> {
    pub fn new(
        source: S,
        registry: DeviceRegistry,
        scaling: ScalingTable,
        store: Arc<MetricStore>,
    ) -> Self {
        Self {
            source,
            registry,
            scaling,
            store,
        }
    }

    pub fn store(&self) -> &Arc<MetricStore> {
        &self.store
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Fetch one device and update its gauges.
    ///
    /// A failed fetch is logged and leaves every gauge of the device as it was.
    /// Returns whether the fetch succeeded.
    pub async fn poll_device(&self, device: &Device) -> bool {
        match self.source.fetch_status(&device.device_id).await {
            Ok(reading) => {
                let written = self.store.apply_reading(
                    &device.name,
                    DEFAULT_CHANNEL,
                    &reading,
                    &self.scaling,
                );
                debug!(
                    "Updated {} gauges for {} ({} codes reported)",
                    written,
                    device.key,
                    reading.len()
                );
                true
            }
            Err(err) => {
                warn!("Failed to fetch {}: {}", device.key, err);
                false
            }
        }
    }

    /// Run one pass over the registry, one device at a time.
    pub async fn poll_cycle(&self) -> PollReport {
        let mut report = PollReport::new();
        for device in self.registry.iter() {
            if self.poll_device(device).await {
                report.succeeded += 1;
            } else {
                report.failed += 1;
            }
        }
        report
    }
}

impl<S: StatusSource + Send + Sync + 'static> Poller<S> {
    /// Turn the poller into an endless stream of cycle reports.
    ///
    /// The first cycle runs immediately; each later cycle starts `interval`
    /// after the previous one finished.
    pub fn into_stream(self, interval: Duration) -> BoxStream<'static, PollReport> {
        let stream = stream::unfold((self, true), move |(poller, first)| async move {
            if !first {
                time::sleep(interval).await;
            }
            let report = poller.poll_cycle().await;
            Some((report, (poller, false)))
        });

        Box::pin(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ExporterError, Result};
    use crate::metrics::data::{GaugeKind, StatusReading};
    use futures_util::StreamExt;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    /// Replays queued results per device id; an empty queue is a failure.
    #[derive(Default)]
    struct ScriptedSource {
        queue: Mutex<HashMap<String, VecDeque<Result<StatusReading>>>>,
    }

    impl ScriptedSource {
        fn push(&self, device_id: &str, result: Result<StatusReading>) {
            self.queue
                .lock()
                .unwrap()
                .entry(device_id.to_string())
                .or_default()
                .push_back(result);
        }
    }

    impl StatusSource for ScriptedSource {
        async fn fetch_status(&self, device_id: &str) -> Result<StatusReading> {
            self.queue
                .lock()
                .unwrap()
                .get_mut(device_id)
                .and_then(|q| q.pop_front())
                .unwrap_or_else(|| Err(ExporterError::api_error(1106, "permission deny")))
        }
    }

    fn reading(power: f64) -> StatusReading {
        [
            ("cur_power", power),
            ("cur_voltage", 2300.0),
            ("cur_current", 500.0),
            ("add_ele", 150.0),
        ]
        .into_iter()
        .collect()
    }

    fn poller(source: ScriptedSource) -> Poller<ScriptedSource> {
        Poller::new(
            source,
            DeviceRegistry::default(),
            ScalingTable::default(),
            Arc::new(MetricStore::new().unwrap()),
        )
    }

    #[tokio::test]
    async fn test_failed_device_does_not_abort_cycle() {
        let source = ScriptedSource::default();
        source.push("DEVICE_ID_2", Ok(reading(100.0)));
        let poller = poller(source);

        let report = poller.poll_cycle().await;
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(
            poller.store().value(GaugeKind::Power, "power_strip", "main"),
            Some(10.0)
        );
        assert!(poller
            .store()
            .value(GaugeKind::Power, "standalone_plug", "main")
            .is_none());
    }

    #[tokio::test]
    async fn test_second_cycle_failure_keeps_gauges() {
        let source = ScriptedSource::default();
        source.push("DEVICE_ID_1", Ok(reading(1234.0)));
        source.push("DEVICE_ID_2", Ok(reading(40.0)));
        let poller = poller(source);

        poller.poll_cycle().await;
        let after_first = poller.store().render().unwrap();

        let report = poller.poll_cycle().await;
        assert_eq!(report.failed, 2);
        assert_eq!(poller.store().render().unwrap(), after_first);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_yields_one_report_per_cycle() {
        let source = ScriptedSource::default();
        source.push("DEVICE_ID_1", Ok(reading(10.0)));
        source.push("DEVICE_ID_1", Ok(reading(20.0)));
        let store = Arc::new(MetricStore::new().unwrap());
        let poller = Poller::new(
            source,
            DeviceRegistry::default(),
            ScalingTable::default(),
            store.clone(),
        );

        let mut stream = poller.into_stream(Duration::from_secs(15));
        let first = stream.next().await.unwrap();
        assert_eq!(first.total(), 2);
        assert_eq!(store.value(GaugeKind::Power, "standalone_plug", "main"), Some(1.0));

        let second = stream.next().await.unwrap();
        assert_eq!(second.succeeded, 1);
        assert_eq!(store.value(GaugeKind::Power, "standalone_plug", "main"), Some(2.0));
    }
}
