//! Sensor hub: starts and stops the configured sensors and decides which sensor
//! supplies each metric.

use crate::recording::types::MetricRecord;
use crate::sensors::latest::ValueReader;
use crate::sensors::proxy::SensorProxy;
use crate::sensors::supervisor::RunOutcome;
use crate::sensors::transport::Transport;
use crate::sensors::types::{ConnectionState, Metric, SensorError, SensorEvent};
use chrono::{DateTime, Utc};
use crossbeam::channel::{Receiver, Sender};
use tokio::task::JoinHandle;

/// Type-erased view of a [`SensorProxy`], so sensors on different transports can be
/// managed together.
pub trait ManagedSensor: Send {
    fn name(&self) -> &str;
    fn metrics(&self) -> &[Metric];
    fn start(&mut self) -> Result<(), SensorError>;
    fn stop(&self);
    fn reader(&self) -> ValueReader;
    fn state(&self) -> ConnectionState;
    fn take_task(&mut self) -> Option<JoinHandle<RunOutcome>>;
}

impl<T: Transport> ManagedSensor for SensorProxy<T> {
    fn name(&self) -> &str {
        SensorProxy::name(self)
    }

    fn metrics(&self) -> &[Metric] {
        SensorProxy::metrics(self)
    }

    fn start(&mut self) -> Result<(), SensorError> {
        SensorProxy::start(self)
    }

    fn stop(&self) {
        SensorProxy::stop(self)
    }

    fn reader(&self) -> ValueReader {
        SensorProxy::reader(self)
    }

    fn state(&self) -> ConnectionState {
        SensorProxy::state(self)
    }

    fn take_task(&mut self) -> Option<JoinHandle<RunOutcome>> {
        SensorProxy::take_task(self)
    }
}

/// The set of configured sensors.
pub struct SensorHub {
    sensors: Vec<Box<dyn ManagedSensor>>,
    event_tx: Sender<SensorEvent>,
    event_rx: Receiver<SensorEvent>,
}

impl SensorHub {
    pub fn new() -> Self {
        let (event_tx, event_rx) = crossbeam::channel::unbounded();
        Self {
            sensors: Vec::new(),
            event_tx,
            event_rx,
        }
    }

    /// Add a sensor. Later sensors win metrics they share with earlier ones.
    pub fn add<T: Transport>(&mut self, proxy: SensorProxy<T>) {
        self.sensors
            .push(Box::new(proxy.with_events(self.event_tx.clone())));
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    /// Receiver for state changes and failures of every sensor
    pub fn event_receiver(&self) -> Receiver<SensorEvent> {
        self.event_rx.clone()
    }

    /// Current state of each sensor, in configuration order
    pub fn states(&self) -> Vec<(String, ConnectionState)> {
        self.sensors
            .iter()
            .map(|s| (s.name().to_string(), s.state()))
            .collect()
    }

    /// Start every sensor. A sensor that fails to start does not prevent the others.
    pub fn start_all(&mut self) -> Vec<(String, SensorError)> {
        let mut failures = Vec::new();
        for sensor in &mut self.sensors {
            if let Err(e) = sensor.start() {
                tracing::warn!(sensor = %sensor.name(), error = %e, "Failed to start sensor");
                failures.push((sensor.name().to_string(), e));
            }
        }
        failures
    }

    /// Signal every sensor to stop without waiting
    pub fn stop_all(&self) {
        for sensor in &self.sensors {
            sensor.stop();
        }
    }

    /// Stop every sensor and wait for all supervisor tasks to end.
    pub async fn shutdown(&mut self) {
        self.stop_all();
        for sensor in &mut self.sensors {
            let Some(task) = sensor.take_task() else {
                continue;
            };
            match task.await {
                Ok(outcome) => {
                    tracing::debug!(sensor = %sensor.name(), ?outcome, "Supervisor finished")
                }
                Err(e) => {
                    tracing::error!(sensor = %sensor.name(), error = %e, "Supervisor task failed")
                }
            }
        }
        tracing::info!("All sensors stopped");
    }

    /// Resolve which sensor supplies each metric.
    pub fn view(&self) -> MetricView {
        let mut sources: Vec<(ValueReader, Vec<Metric>)> = Vec::new();

        for metric in Metric::ALL {
            let Some(sensor) = self
                .sensors
                .iter()
                .rev()
                .find(|s| s.metrics().contains(&metric))
            else {
                continue;
            };

            let reader = sensor.reader();
            match sources.iter_mut().find(|(r, _)| r.same_source(&reader)) {
                Some((_, metrics)) => metrics.push(metric),
                None => sources.push((reader, vec![metric])),
            }
        }

        MetricView { sources }
    }
}

impl Default for SensorHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only access to the winning sensor of each metric.
#[derive(Debug, Clone, Default)]
pub struct MetricView {
    sources: Vec<(ValueReader, Vec<Metric>)>,
}

impl MetricView {
    /// Whether some sensor supplies `metric`
    pub fn provides(&self, metric: Metric) -> bool {
        self.sources.iter().any(|(_, m)| m.contains(&metric))
    }

    pub fn get(&self, metric: Metric) -> Option<f64> {
        self.sources
            .iter()
            .find(|(_, m)| m.contains(&metric))
            .and_then(|(reader, _)| reader.get(metric))
    }

    /// Sample every metric, reading each sensor once so grouped values stay consistent.
    pub fn sample(&self, timestamp: DateTime<Utc>) -> MetricRecord {
        let mut record = MetricRecord::empty(timestamp);

        for (reader, metrics) in &self.sources {
            let snapshot = reader.snapshot();
            for metric in metrics {
                match metric {
                    Metric::HeartRate => record.heart_rate_bpm = snapshot.heart_rate_bpm,
                    Metric::Power => record.power_watts = snapshot.power_watts,
                    Metric::Cadence => record.cadence_rpm = snapshot.cadence_rpm,
                    Metric::Speed => record.speed_kmh = snapshot.speed_kmh,
                    Metric::Distance => record.distance_km = snapshot.distance_km,
                }
            }
        }

        record
    }
}
