//! Latest decoded value of each metric for one sensor.
//!
//! Written only by the sensor's streaming loop, read by any number of display or
//! recorder consumers through [`ValueReader`]. The whole snapshot sits behind a single
//! lock, so the speed/cadence/distance group is always read as one unit.

use crate::sensors::types::{Metric, SensorReading};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;

/// Point-in-time copy of a sensor's values. `None` means never received.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MetricSnapshot {
    pub heart_rate_bpm: Option<u16>,
    pub power_watts: Option<u16>,
    pub cadence_rpm: Option<f64>,
    pub speed_kmh: Option<f64>,
    pub distance_km: Option<f64>,
    /// When any value last changed
    pub updated_at: Option<Instant>,
}

impl MetricSnapshot {
    /// Value of `metric` in its display unit
    pub fn get(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::HeartRate => self.heart_rate_bpm.map(f64::from),
            Metric::Power => self.power_watts.map(f64::from),
            Metric::Cadence => self.cadence_rpm,
            Metric::Speed => self.speed_kmh,
            Metric::Distance => self.distance_km,
        }
    }
}

/// Per-sensor latest values.
#[derive(Debug, Default)]
pub struct LatestValues {
    inner: RwLock<MetricSnapshot>,
}

impl LatestValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, metric: Metric) -> Option<f64> {
        self.inner.read().get(metric)
    }

    pub fn snapshot(&self) -> MetricSnapshot {
        *self.inner.read()
    }

    /// Store a decoded reading. Zero heart rate or power is not a reading and is
    /// dropped, as is a speed/cadence update with every field suppressed. Suppressed
    /// speed/cadence fields keep their value and the distance delta is added to the
    /// running total. Returns whether anything was written.
    pub(crate) fn set(&self, reading: &SensorReading) -> bool {
        match *reading {
            SensorReading::HeartRate { bpm: 0 } | SensorReading::Power { watts: 0 } => false,
            SensorReading::HeartRate { bpm } => {
                let mut values = self.inner.write();
                values.heart_rate_bpm = Some(bpm);
                values.updated_at = Some(Instant::now());
                true
            }
            SensorReading::Power { watts } => {
                let mut values = self.inner.write();
                values.power_watts = Some(watts);
                values.updated_at = Some(Instant::now());
                true
            }
            SensorReading::CadenceSpeedDistance(update) if update.is_empty() => false,
            SensorReading::CadenceSpeedDistance(update) => {
                let mut values = self.inner.write();
                if let Some(speed) = update.speed_kmh {
                    values.speed_kmh = Some(speed);
                }
                if let Some(cadence) = update.cadence_rpm {
                    values.cadence_rpm = Some(cadence);
                }
                if let Some(delta) = update.distance_delta_km {
                    values.distance_km = Some(values.distance_km.unwrap_or(0.0) + delta);
                }
                values.updated_at = Some(Instant::now());
                true
            }
        }
    }
}

/// Read-only handle to a sensor's [`LatestValues`].
#[derive(Debug, Clone)]
pub struct ValueReader(Arc<LatestValues>);

impl ValueReader {
    pub(crate) fn new(values: Arc<LatestValues>) -> Self {
        Self(values)
    }

    pub fn get(&self, metric: Metric) -> Option<f64> {
        self.0.get(metric)
    }

    pub fn snapshot(&self) -> MetricSnapshot {
        self.0.snapshot()
    }

    /// Whether two readers observe the same sensor
    pub fn same_source(&self, other: &ValueReader) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
