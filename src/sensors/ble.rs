//! Bluetooth LE implementation of the sensor transport (btleplug).

use crate::sensors::decoder::PayloadLayout;
use crate::sensors::transport::Transport;
use crate::sensors::types::{Channel, Notification, SensorAddress, SensorError};
use btleplug::api::{
    Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, ValueNotification,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::stream::{Stream, StreamExt};
use std::pin::Pin;
use std::time::Duration;
use uuid::Uuid;

/// Heart Rate Service UUID
pub const HEART_RATE_SERVICE_UUID: Uuid =
    Uuid::from_u128(0x0000_180d_0000_1000_8000_0080_5f9b_34fb);

/// Heart Rate Measurement characteristic UUID
pub const HEART_RATE_MEASUREMENT_UUID: Uuid =
    Uuid::from_u128(0x0000_2a37_0000_1000_8000_0080_5f9b_34fb);

/// Cycling Power Service UUID
pub const CYCLING_POWER_SERVICE_UUID: Uuid =
    Uuid::from_u128(0x0000_1818_0000_1000_8000_0080_5f9b_34fb);

/// Cycling Power Measurement characteristic UUID
pub const CYCLING_POWER_MEASUREMENT_UUID: Uuid =
    Uuid::from_u128(0x0000_2a63_0000_1000_8000_0080_5f9b_34fb);

/// Cycling Speed and Cadence Service UUID
pub const CSC_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_1816_0000_1000_8000_0080_5f9b_34fb);

/// CSC Measurement characteristic UUID
pub const CSC_MEASUREMENT_UUID: Uuid = Uuid::from_u128(0x0000_2a5b_0000_1000_8000_0080_5f9b_34fb);

/// Default time allowed to find a peripheral before a connect attempt fails
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

const DISCOVERY_POLL: Duration = Duration::from_millis(250);

type NotificationStream = Pin<Box<dyn Stream<Item = ValueNotification> + Send>>;

/// Measurement characteristic for a channel
pub fn characteristic_uuid(channel: Channel) -> Uuid {
    match channel {
        Channel::HeartRate => HEART_RATE_MEASUREMENT_UUID,
        Channel::Power => CYCLING_POWER_MEASUREMENT_UUID,
        Channel::SpeedCadence => CSC_MEASUREMENT_UUID,
    }
}

/// Channel carried by a measurement characteristic
pub fn channel_for_characteristic(uuid: Uuid) -> Option<Channel> {
    match uuid {
        HEART_RATE_MEASUREMENT_UUID => Some(Channel::HeartRate),
        CYCLING_POWER_MEASUREMENT_UUID => Some(Channel::Power),
        CSC_MEASUREMENT_UUID => Some(Channel::SpeedCadence),
        _ => None,
    }
}

/// Whether a peripheral id or address string refers to `address`
fn matches_address(candidate: &str, address: &str) -> bool {
    candidate.eq_ignore_ascii_case(address)
}

/// A connected BLE peripheral with its subscriptions.
pub struct BleLink {
    peripheral: Peripheral,
    address: String,
    subscriptions: Vec<Characteristic>,
    notifications: Option<NotificationStream>,
}

impl BleLink {
    pub fn address(&self) -> &str {
        &self.address
    }
}

/// Sensor transport over the first Bluetooth adapter.
pub struct BleTransport {
    adapter: Adapter,
    discovery_timeout: Duration,
}

impl BleTransport {
    /// Initialize the BLE adapter.
    pub async fn initialize() -> Result<Self, SensorError> {
        tracing::info!("Initializing BLE transport");

        let manager = Manager::new()
            .await
            .map_err(|e| SensorError::BleError(e.to_string()))?;

        let adapters = manager
            .adapters()
            .await
            .map_err(|e| SensorError::BleError(e.to_string()))?;

        let adapter = adapters
            .into_iter()
            .next()
            .ok_or(SensorError::AdapterNotFound)?;

        tracing::info!("BLE adapter initialized");

        Ok(Self {
            adapter,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
        })
    }

    pub fn with_discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    async fn find_known(&self, address: &str) -> Result<Option<Peripheral>, SensorError> {
        let peripherals = self
            .adapter
            .peripherals()
            .await
            .map_err(|e| SensorError::BleError(e.to_string()))?;

        for peripheral in peripherals {
            if matches_address(&peripheral.id().to_string(), address)
                || matches_address(&peripheral.address().to_string(), address)
            {
                return Ok(Some(peripheral));
            }
        }
        Ok(None)
    }

    /// Find the peripheral, scanning for sensor services until the discovery timeout.
    async fn find_peripheral(&self, address: &str) -> Result<Peripheral, SensorError> {
        if let Some(peripheral) = self.find_known(address).await? {
            return Ok(peripheral);
        }

        let scan_filter = ScanFilter {
            services: vec![
                HEART_RATE_SERVICE_UUID,
                CYCLING_POWER_SERVICE_UUID,
                CSC_SERVICE_UUID,
            ],
        };
        self.adapter
            .start_scan(scan_filter)
            .await
            .map_err(|e| SensorError::BleError(e.to_string()))?;

        tracing::debug!(address, "Scanning for peripheral");

        let deadline = tokio::time::Instant::now() + self.discovery_timeout;
        let found = loop {
            if let Some(peripheral) = self.find_known(address).await? {
                break Some(peripheral);
            }
            if tokio::time::Instant::now() >= deadline {
                break None;
            }
            tokio::time::sleep(DISCOVERY_POLL).await;
        };

        if let Err(e) = self.adapter.stop_scan().await {
            tracing::warn!(error = %e, "Failed to stop BLE scan");
        }

        found.ok_or_else(|| SensorError::SensorNotFound(address.to_string()))
    }
}

impl Transport for BleTransport {
    type Link = BleLink;

    fn layout(&self, _link: &BleLink) -> PayloadLayout {
        PayloadLayout::Gatt
    }

    async fn connect(&self, address: &SensorAddress) -> Result<BleLink, SensorError> {
        let SensorAddress::Ble { address } = address else {
            return Err(SensorError::InvalidAddress(address.clone()));
        };

        let peripheral = self.find_peripheral(address).await?;

        peripheral
            .connect()
            .await
            .map_err(|e| SensorError::ConnectionFailed(e.to_string()))?;

        let link = BleLink {
            peripheral,
            address: address.clone(),
            subscriptions: Vec::new(),
            notifications: None,
        };

        let discovered = link.peripheral.discover_services().await;
        if let Err(e) = discovered {
            self.close(link).await;
            return Err(SensorError::ConnectionFailed(e.to_string()));
        }

        tracing::info!(address = %link.address, "Connected to BLE peripheral");
        Ok(link)
    }

    async fn subscribe(&self, link: &mut BleLink, channel: Channel) -> Result<(), SensorError> {
        let uuid = characteristic_uuid(channel);
        let characteristic = link
            .peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or_else(|| SensorError::UnsupportedChannel {
                address: SensorAddress::Ble {
                    address: link.address.clone(),
                },
                channel,
            })?;

        // Open the stream before enabling notifications so none are missed.
        if link.notifications.is_none() {
            let stream = link
                .peripheral
                .notifications()
                .await
                .map_err(|e| SensorError::SubscriptionFailed(e.to_string()))?;
            link.notifications = Some(stream);
        }

        link.peripheral
            .subscribe(&characteristic)
            .await
            .map_err(|e| SensorError::SubscriptionFailed(e.to_string()))?;

        tracing::debug!(
            address = %link.address,
            characteristic = %uuid,
            "Subscribed to characteristic"
        );
        link.subscriptions.push(characteristic);
        Ok(())
    }

    async fn next_notification(
        &self,
        link: &mut BleLink,
    ) -> Option<Result<Notification, SensorError>> {
        let Some(stream) = link.notifications.as_mut() else {
            return Some(Err(SensorError::SubscriptionFailed(format!(
                "{} has no subscriptions",
                link.address
            ))));
        };

        loop {
            let notification = stream.next().await?;
            match channel_for_characteristic(notification.uuid) {
                Some(channel) => return Some(Ok(Notification::new(channel, notification.value))),
                None => {
                    tracing::trace!(characteristic = %notification.uuid, "Ignoring notification")
                }
            }
        }
    }

    fn is_alive(&self, link: &BleLink) -> impl std::future::Future<Output = bool> + Send {
        let peripheral = link.peripheral.clone();
        async move { peripheral.is_connected().await.unwrap_or(false) }
    }

    async fn close(&self, link: BleLink) {
        let BleLink {
            peripheral,
            address,
            subscriptions,
            notifications,
        } = link;
        drop(notifications);

        for characteristic in &subscriptions {
            if let Err(e) = peripheral.unsubscribe(characteristic).await {
                tracing::debug!(address = %address, error = %e, "Unsubscribe failed");
            }
        }

        if let Err(e) = peripheral.disconnect().await {
            tracing::warn!(address = %address, error = %e, "Disconnect failed");
        } else {
            tracing::info!(address = %address, "Disconnected from BLE peripheral");
        }
    }
}
