//! Sensor types and enums for BLE and ANT+ fitness sensors.
//!
//! Defines the metrics a sensor can provide, the notification channels that carry them,
//! the per-sensor connection state machine and the error type shared by all transports.

use crate::sensors::ant::{AntDeviceType, AntError};
use crate::sensors::decoder::CscUpdate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A physical quantity exposed by a sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Heart rate in BPM
    HeartRate,
    /// Instantaneous power in watts
    Power,
    /// Crank cadence in RPM
    Cadence,
    /// Wheel speed in km/h
    Speed,
    /// Cumulative distance in km
    Distance,
}

impl Metric {
    /// Every metric, in display order.
    pub const ALL: [Metric; 5] = [
        Metric::HeartRate,
        Metric::Power,
        Metric::Cadence,
        Metric::Speed,
        Metric::Distance,
    ];

    /// The notification channel that carries this metric.
    pub fn channel(&self) -> Channel {
        match self {
            Metric::HeartRate => Channel::HeartRate,
            Metric::Power => Channel::Power,
            Metric::Cadence | Metric::Speed | Metric::Distance => Channel::SpeedCadence,
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Metric::HeartRate => write!(f, "Heart Rate"),
            Metric::Power => write!(f, "Power"),
            Metric::Cadence => write!(f, "Cadence"),
            Metric::Speed => write!(f, "Speed"),
            Metric::Distance => write!(f, "Distance"),
        }
    }
}

/// A notification source on a sensor: a GATT characteristic or an ANT+ page family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Heart Rate Measurement
    HeartRate,
    /// Cycling Power Measurement
    Power,
    /// Cycling Speed and Cadence Measurement
    SpeedCadence,
}

impl Channel {
    /// Channels needed to serve `metrics`, deduplicated, in first-seen order.
    pub fn for_metrics(metrics: &[Metric]) -> Vec<Channel> {
        let mut channels = Vec::new();
        for metric in metrics {
            let channel = metric.channel();
            if !channels.contains(&channel) {
                channels.push(channel);
            }
        }
        channels
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::HeartRate => write!(f, "Heart Rate"),
            Channel::Power => write!(f, "Cycling Power"),
            Channel::SpeedCadence => write!(f, "Speed/Cadence"),
        }
    }
}

/// Where a sensor lives on its transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SensorAddress {
    /// BLE peripheral, matched by MAC address or platform identifier
    Ble { address: String },
    /// ANT+ device, matched by device number and profile
    AntPlus {
        device_id: u16,
        device_type: AntDeviceType,
    },
}

impl std::fmt::Display for SensorAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SensorAddress::Ble { address } => write!(f, "{}", address),
            SensorAddress::AntPlus {
                device_id,
                device_type,
            } => write!(f, "ANT+ {} #{}", device_type, device_id),
        }
    }
}

/// Connection state of a sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Not started yet
    #[default]
    Idle,
    /// Connection in progress
    Connecting,
    /// Subscribed and receiving notifications
    Streaming,
    /// Waiting before the next connection attempt
    Retrying,
    /// Run finished (stopped, retries exhausted, or fatal error)
    Stopped,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Idle => write!(f, "Idle"),
            ConnectionState::Connecting => write!(f, "Connecting..."),
            ConnectionState::Streaming => write!(f, "Streaming"),
            ConnectionState::Retrying => write!(f, "Retrying..."),
            ConnectionState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// A raw notification delivered by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Channel the payload arrived on
    pub channel: Channel,
    /// Raw payload bytes
    pub payload: Vec<u8>,
}

impl Notification {
    pub fn new(channel: Channel, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            channel,
            payload: payload.into(),
        }
    }
}

/// A decoded measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SensorReading {
    /// Heart rate in BPM
    HeartRate { bpm: u16 },
    /// Instantaneous power in watts
    Power { watts: u16 },
    /// Speed/cadence group from one notification, written to the store as one unit.
    /// The distance it carries is added to the running total.
    CadenceSpeedDistance(CscUpdate),
}

/// Events from the sensor system.
#[derive(Debug, Clone)]
pub enum SensorEvent {
    /// Sensor connection state changed
    ConnectionChanged {
        sensor: String,
        state: ConnectionState,
    },
    /// A run ended without being asked to stop
    Failed {
        sensor: String,
        attempts: u32,
        error: String,
    },
}

/// Errors that can occur in the sensor system.
#[derive(Debug, Error)]
pub enum SensorError {
    /// BLE adapter not found or unavailable
    #[error("Bluetooth adapter not found")]
    AdapterNotFound,

    /// Sensor not found with given address
    #[error("Sensor not found: {0}")]
    SensorNotFound(String),

    /// Connection to sensor failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Sensor disconnected unexpectedly
    #[error("Sensor disconnected: {0}")]
    Disconnected(String),

    /// Failed to subscribe to sensor notifications
    #[error("Failed to subscribe to notifications: {0}")]
    SubscriptionFailed(String),

    /// The sensor does not provide the requested channel
    #[error("{address} does not provide {channel}")]
    UnsupportedChannel {
        address: SensorAddress,
        channel: Channel,
    },

    /// Address does not belong to this transport
    #[error("Invalid address for this transport: {0}")]
    InvalidAddress(SensorAddress),

    /// The sensor is already running
    #[error("Sensor already running: {0}")]
    AlreadyRunning(String),

    /// Generic BLE error
    #[error("BLE error: {0}")]
    BleError(String),

    /// ANT+ radio error
    #[error("ANT+ error: {0}")]
    Ant(#[from] AntError),
}

impl SensorError {
    /// Whether another connection attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            SensorError::UnsupportedChannel { .. }
                | SensorError::InvalidAddress(_)
                | SensorError::AlreadyRunning(_)
        )
    }
}
