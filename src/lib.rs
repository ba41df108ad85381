//! trainerlink - Cycling Sensor Telemetry
//!
//! Connects to heart-rate straps, power meters and speed/cadence sensors over Bluetooth LE
//! and ANT+, decodes their notifications into live metrics, and supervises each sensor's
//! connection with bounded retries. The latest value of every metric is available to the
//! terminal overlay and to the FIT session recorder.

pub mod recording;
pub mod sensors;
pub mod storage;
pub mod ui;

// Re-export commonly used types
pub use recording::{FitRecorder, MetricRecord, SessionRecorder};
pub use sensors::{
    ConnectionState, LatestValues, Metric, MetricView, SensorAddress, SensorError, SensorHub,
    SensorProxy, Transport, ValueReader,
};
pub use storage::config::AppConfig;
