//! ANT+ channel slots.
//!
//! Handles allocation of the radio's channel slots to sensors.

use super::{AntDeviceType, AntError, ANT_PLUS_RF_FREQUENCY};
use parking_lot::Mutex;

/// Number of channels on a standard ANT USB stick
pub const DEFAULT_CHANNEL_COUNT: u8 = 8;

/// Lifecycle of one radio channel slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelStatus {
    /// Channel is unassigned
    Unassigned,
    /// Configured for a device, not yet opened
    Assigned,
    /// Channel is searching for its device
    Searching,
    /// Receiving broadcast pages
    Open,
    /// Channel is closed
    Closed,
}

impl ChannelStatus {
    /// Whether the channel is searching or receiving
    pub fn is_active(&self) -> bool {
        matches!(self, ChannelStatus::Open | ChannelStatus::Searching)
    }
}

/// One channel slot and the device it is bound to
#[derive(Debug, Clone)]
pub struct AntChannel {
    /// Slot number on the radio
    pub number: u8,
    /// Current status
    pub status: ChannelStatus,
    /// Device profile bound to the slot
    pub device_type: Option<AntDeviceType>,
    /// Device number (0 for wildcard search)
    pub device_id: u16,
    /// Transmission type, 0 matches any
    pub transmission_type: u8,
    /// Message period in 1/32768 s units
    pub period: u16,
    /// RF channel, MHz above 2400
    pub rf_frequency: u8,
}

impl AntChannel {
    /// An unassigned slot
    pub fn new(number: u8) -> Self {
        Self {
            number,
            status: ChannelStatus::Unassigned,
            device_type: None,
            device_id: 0,
            transmission_type: 0,
            period: AntDeviceType::HeartRate.channel_period(),
            rf_frequency: ANT_PLUS_RF_FREQUENCY,
        }
    }

    /// Whether the slot can be allocated
    pub fn is_available(&self) -> bool {
        matches!(
            self.status,
            ChannelStatus::Unassigned | ChannelStatus::Closed
        )
    }
}

/// Channel slots of one radio.
pub struct ChannelTable {
    channels: Mutex<Vec<AntChannel>>,
}

impl ChannelTable {
    /// Create a table with `num_channels` unassigned slots
    pub fn new(num_channels: u8) -> Self {
        Self {
            channels: Mutex::new((0..num_channels).map(AntChannel::new).collect()),
        }
    }

    /// Assign the first free slot to a device and return its configuration.
    pub fn allocate(
        &self,
        device_type: AntDeviceType,
        device_id: u16,
    ) -> Result<AntChannel, AntError> {
        let mut channels = self.channels.lock();

        let channel = channels
            .iter_mut()
            .find(|c| c.is_available())
            .ok_or_else(|| {
                AntError::ChannelAllocationFailed("all channel slots in use".to_string())
            })?;

        channel.status = ChannelStatus::Assigned;
        channel.device_type = Some(device_type);
        channel.device_id = device_id;
        channel.transmission_type = 0;
        channel.period = device_type.channel_period();

        tracing::debug!(
            channel = channel.number,
            %device_type,
            device_id,
            "Allocated ANT+ channel"
        );

        Ok(channel.clone())
    }

    /// Update the status of a channel
    pub fn set_status(&self, number: u8, status: ChannelStatus) -> Result<(), AntError> {
        let mut channels = self.channels.lock();
        let channel = channels
            .iter_mut()
            .find(|c| c.number == number)
            .ok_or(AntError::ChannelNotFound(number))?;
        channel.status = status;
        Ok(())
    }

    /// Return a slot to the pool
    pub fn release(&self, number: u8) {
        let mut channels = self.channels.lock();
        if let Some(channel) = channels.iter_mut().find(|c| c.number == number) {
            channel.status = ChannelStatus::Closed;
            channel.device_type = None;
            channel.device_id = 0;
        }
    }

    /// Get channel status
    pub fn status(&self, number: u8) -> Option<ChannelStatus> {
        self.channels
            .lock()
            .iter()
            .find(|c| c.number == number)
            .map(|c| c.status.clone())
    }

    /// Get all channels
    pub fn channels(&self) -> Vec<AntChannel> {
        self.channels.lock().clone()
    }
}

impl Default for ChannelTable {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_COUNT)
    }
}
