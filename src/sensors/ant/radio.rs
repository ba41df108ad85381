//! ANT radio driver interface.

use super::{AntChannel, AntError, ChannelStatus};

/// A raw ANT+ broadcast data page
pub type DataPage = [u8; 8];

/// Driver for an ANT USB stick.
///
/// Implementations own the USB device, the network key and the channel commands. The
/// transport only needs to open a configured channel, read its broadcast pages and
/// close it again.
pub trait AntRadio: Send + Sync + 'static {
    /// Assign and open `channel` and start searching for its device
    fn open_channel(
        &self,
        channel: &AntChannel,
    ) -> impl std::future::Future<Output = Result<(), AntError>> + Send;

    /// Wait for the next broadcast page on an open channel.
    ///
    /// Returns `None` once the channel has been closed.
    fn next_page(
        &self,
        channel_number: u8,
    ) -> impl std::future::Future<Output = Option<Result<DataPage, AntError>>> + Send;

    /// Current radio-side status of a channel
    fn channel_status(&self, channel_number: u8) -> ChannelStatus;

    /// Close and unassign a channel
    fn close_channel(
        &self,
        channel_number: u8,
    ) -> impl std::future::Future<Output = Result<(), AntError>> + Send;
}
