//! Transport abstraction shared by the BLE and ANT+ sensor links.

use crate::sensors::decoder::PayloadLayout;
use crate::sensors::types::{Channel, Notification, SensorAddress, SensorError};

/// A source of raw sensor notifications.
///
/// A transport opens one link per sensor connection. The supervisor drives the link
/// through connect, subscribe, a stream of notifications and close, and never holds
/// more than one live link per sensor.
pub trait Transport: Send + Sync + 'static {
    /// An open connection to one sensor
    type Link: Send + 'static;

    /// Byte layout of the notifications delivered on `link`
    fn layout(&self, link: &Self::Link) -> PayloadLayout;

    /// Open a link to the sensor at `address`
    fn connect(
        &self,
        address: &SensorAddress,
    ) -> impl std::future::Future<Output = Result<Self::Link, SensorError>> + Send;

    /// Enable notifications for `channel` on an open link
    fn subscribe(
        &self,
        link: &mut Self::Link,
        channel: Channel,
    ) -> impl std::future::Future<Output = Result<(), SensorError>> + Send;

    /// Wait for the next notification.
    ///
    /// `None` means the notification stream has ended and the link is gone.
    fn next_notification(
        &self,
        link: &mut Self::Link,
    ) -> impl std::future::Future<Output = Option<Result<Notification, SensorError>>> + Send;

    /// Whether the link is still connected
    fn is_alive(&self, link: &Self::Link) -> impl std::future::Future<Output = bool> + Send;

    /// Tear down the link. Errors are logged, never returned.
    fn close(&self, link: Self::Link) -> impl std::future::Future<Output = ()> + Send;
}
