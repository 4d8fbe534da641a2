//! Transport trait abstraction for pluggable wireless backends

use anyhow::Result;
use async_trait::async_trait;
use blue_echo_shared::{EchoRole, LinkConfig, PeerId};
use bytes::Bytes;

/// Result of a single read on a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// One received unit, opaque and unframed
    Data(Bytes),
    /// Nothing available yet; poll again
    WouldBlock,
    /// The peer went away
    Closed,
}

/// Result of waiting on an advertisement
#[derive(Debug)]
pub enum AcceptOutcome<C> {
    Connected(C),
    Timeout,
}

/// One active peer session
#[async_trait]
pub trait Connection: Send {
    /// Identifier of the remote end, for logging
    fn peer(&self) -> &PeerId;

    /// Read the next received unit
    async fn read(&mut self) -> Result<ReadOutcome>;

    /// Write a response to the peer
    async fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Whether the connection can still carry data
    fn is_open(&self) -> bool;

    /// Close the connection; a no-op once closed
    async fn close(&mut self) -> Result<()>;
}

/// Wireless transport able to advertise and hand out connections
#[async_trait]
pub trait Transport: Send {
    /// Handle keeping the device discoverable while alive
    type Advertisement: Send;

    /// The connection type this transport produces
    type Connection: Connection + 'static;

    /// Become discoverable; failure here is fatal for the supervisor
    async fn advertise(&mut self, config: &LinkConfig) -> Result<Self::Advertisement>;

    /// Wait for one peer to connect
    async fn accept(
        &mut self,
        advertisement: &mut Self::Advertisement,
    ) -> Result<AcceptOutcome<Self::Connection>>;

    /// Stop being discoverable
    async fn stop_advertising(&mut self, advertisement: Self::Advertisement) -> Result<()>;

    /// What the supervisor does with received data
    fn role(&self) -> EchoRole;

    /// Human-readable name for this transport
    fn name(&self) -> &'static str;
}
