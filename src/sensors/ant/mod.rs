//! ANT+ Protocol Support
//!
//! ANT+ sensors broadcast 8-byte data pages on a radio channel opened for a specific
//! device number and device type. This module owns channel bookkeeping and turns the
//! pages into [`Notification`](crate::sensors::types::Notification)s; the USB stick
//! driver itself sits behind the [`AntRadio`] trait.

pub mod channels;
pub mod radio;
pub mod transport;

use crate::sensors::types::Channel;
use thiserror::Error;

pub use channels::{AntChannel, ChannelStatus, ChannelTable};
pub use radio::AntRadio;
pub use transport::{AntLink, AntTransport};

/// Power-only data page of the bicycle power profile
pub const POWER_ONLY_PAGE: u8 = 0x10;

/// ANT+ RF channel (2457 MHz)
pub const ANT_PLUS_RF_FREQUENCY: u8 = 57;

/// Errors that can occur during ANT+ operations
#[derive(Debug, Error)]
pub enum AntError {
    #[error("No ANT+ radio available")]
    NoRadio,

    #[error("Channel allocation failed: {0}")]
    ChannelAllocationFailed(String),

    #[error("Channel {0} not found")]
    ChannelNotFound(u8),
}

/// ANT+ device profiles supported by this implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AntDeviceType {
    /// Heart Rate Monitor (Device Type 120)
    HeartRate,
    /// Bicycle Power (Device Type 11)
    Power,
    /// Combined Bike Speed and Cadence (Device Type 121)
    SpeedCadence,
    /// Bike Speed only (Device Type 123)
    Speed,
    /// Bike Cadence only (Device Type 122)
    Cadence,
}

impl AntDeviceType {
    /// Get the ANT+ device type number
    pub fn device_type_number(&self) -> u8 {
        match self {
            AntDeviceType::HeartRate => 120,
            AntDeviceType::Power => 11,
            AntDeviceType::SpeedCadence => 121,
            AntDeviceType::Speed => 123,
            AntDeviceType::Cadence => 122,
        }
    }

    /// Channel period in 1/32768 s units, from the device profile.
    pub fn channel_period(&self) -> u16 {
        match self {
            AntDeviceType::HeartRate => 8070,    // ~4.06 Hz
            AntDeviceType::Power => 8182,        // ~4.00 Hz
            AntDeviceType::SpeedCadence => 8086, // ~4.05 Hz
            AntDeviceType::Speed => 8118,        // ~4.04 Hz
            AntDeviceType::Cadence => 8102,      // ~4.04 Hz
        }
    }

    /// The notification channel this profile's pages are delivered on.
    pub fn channel(&self) -> Channel {
        match self {
            AntDeviceType::HeartRate => Channel::HeartRate,
            AntDeviceType::Power => Channel::Power,
            AntDeviceType::SpeedCadence | AntDeviceType::Speed | AntDeviceType::Cadence => {
                Channel::SpeedCadence
            }
        }
    }
}

impl std::fmt::Display for AntDeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AntDeviceType::HeartRate => write!(f, "Heart Rate"),
            AntDeviceType::Power => write!(f, "Power"),
            AntDeviceType::SpeedCadence => write!(f, "Speed/Cadence"),
            AntDeviceType::Speed => write!(f, "Speed"),
            AntDeviceType::Cadence => write!(f, "Cadence"),
        }
    }
}
