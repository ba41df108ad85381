//! Sensor module for BLE and ANT+ device communication.

pub mod ant;
pub mod ble;
pub mod decoder;
pub mod hub;
pub mod latest;
pub mod proxy;
pub mod rollover;
pub mod supervisor;
pub mod transport;
pub mod types;

pub use ant::{AntDeviceType, AntRadio, AntTransport};
pub use ble::BleTransport;
pub use decoder::{DecodeAnomaly, PayloadDecoder, PayloadLayout};
pub use hub::{ManagedSensor, MetricView, SensorHub};
pub use latest::{LatestValues, MetricSnapshot, ValueReader};
pub use proxy::SensorProxy;
pub use supervisor::{ConnectionSupervisor, RunOutcome, SupervisorConfig};
pub use transport::Transport;
pub use types::{
    Channel, ConnectionState, Metric, Notification, SensorAddress, SensorError, SensorEvent,
    SensorReading,
};
