//! ANT+ implementation of the sensor transport.

use super::{AntChannel, AntDeviceType, AntRadio, ChannelStatus, ChannelTable};
use crate::sensors::decoder::PayloadLayout;
use crate::sensors::transport::Transport;
use crate::sensors::types::{Channel, Notification, SensorAddress, SensorError};
use std::sync::Arc;

/// An open ANT+ channel bound to one device
#[derive(Debug, Clone)]
pub struct AntLink {
    channel: AntChannel,
    device_type: AntDeviceType,
    subscribed: bool,
}

impl AntLink {
    /// Radio channel number
    pub fn channel_number(&self) -> u8 {
        self.channel.number
    }

    pub fn device_type(&self) -> AntDeviceType {
        self.device_type
    }
}

/// Sensor transport over an ANT USB stick.
pub struct AntTransport<R: AntRadio> {
    radio: Arc<R>,
    channels: ChannelTable,
}

impl<R: AntRadio> AntTransport<R> {
    pub fn new(radio: Arc<R>) -> Self {
        Self {
            radio,
            channels: ChannelTable::default(),
        }
    }

    /// Create a transport for a radio with a non-standard channel count
    pub fn with_channel_count(radio: Arc<R>, num_channels: u8) -> Self {
        Self {
            radio,
            channels: ChannelTable::new(num_channels),
        }
    }

    pub fn channels(&self) -> &ChannelTable {
        &self.channels
    }
}

impl<R: AntRadio> Transport for AntTransport<R> {
    type Link = AntLink;

    fn layout(&self, link: &AntLink) -> PayloadLayout {
        PayloadLayout::AntPlus(link.device_type)
    }

    async fn connect(&self, address: &SensorAddress) -> Result<AntLink, SensorError> {
        let SensorAddress::AntPlus {
            device_id,
            device_type,
        } = address
        else {
            return Err(SensorError::InvalidAddress(address.clone()));
        };

        let channel = self.channels.allocate(*device_type, *device_id)?;

        if let Err(e) = self.radio.open_channel(&channel).await {
            self.channels.release(channel.number);
            return Err(SensorError::ConnectionFailed(e.to_string()));
        }
        self.channels
            .set_status(channel.number, ChannelStatus::Searching)?;

        tracing::info!(
            channel = channel.number,
            %device_type,
            device_type_number = device_type.device_type_number(),
            device_id,
            "Opened ANT+ channel"
        );

        Ok(AntLink {
            channel,
            device_type: *device_type,
            subscribed: false,
        })
    }

    async fn subscribe(&self, link: &mut AntLink, channel: Channel) -> Result<(), SensorError> {
        if link.device_type.channel() != channel {
            return Err(SensorError::UnsupportedChannel {
                address: SensorAddress::AntPlus {
                    device_id: link.channel.device_id,
                    device_type: link.device_type,
                },
                channel,
            });
        }
        link.subscribed = true;
        Ok(())
    }

    async fn next_notification(
        &self,
        link: &mut AntLink,
    ) -> Option<Result<Notification, SensorError>> {
        if !link.subscribed {
            return Some(Err(SensorError::SubscriptionFailed(format!(
                "channel {} has no subscription",
                link.channel.number
            ))));
        }

        match self.radio.next_page(link.channel.number).await? {
            Ok(page) => {
                if link.channel.status != ChannelStatus::Open {
                    link.channel.status = ChannelStatus::Open;
                    // Table bookkeeping only; the link keeps working if the slot is gone.
                    let _ = self
                        .channels
                        .set_status(link.channel.number, ChannelStatus::Open);
                }
                Some(Ok(Notification::new(link.device_type.channel(), page)))
            }
            Err(e) => Some(Err(SensorError::Ant(e))),
        }
    }

    fn is_alive(&self, link: &AntLink) -> impl std::future::Future<Output = bool> + Send {
        let alive = self.radio.channel_status(link.channel.number).is_active();
        async move { alive }
    }

    async fn close(&self, link: AntLink) {
        let number = link.channel.number;
        match self.radio.close_channel(number).await {
            Ok(()) => tracing::debug!(channel = number, "Closed ANT+ channel"),
            Err(e) => tracing::warn!(channel = number, error = %e, "Failed to close ANT+ channel"),
        }
        self.channels.release(number);
    }
}
