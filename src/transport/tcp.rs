//! TCP simulation transport for developing without a radio
//!
//! "Advertising" binds a listener, accepting hands out one socket at a time.

use crate::transport::stream::StreamConnection;
use crate::transport::traits::{AcceptOutcome, Transport};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use blue_echo_shared::{EchoRole, LinkConfig, PeerId};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tracing::info;

/// Default listen address for the simulated link
pub const DEFAULT_TCP_ADDRESS: &str = "127.0.0.1:9000";

pub type TcpConnection = StreamConnection<TcpStream>;

/// Bound listener standing in for an advertisement
pub struct TcpAdvertisement {
    listener: TcpListener,
    read_timeout: Duration,
}

impl TcpAdvertisement {
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

/// TCP transport simulating a serial-style wireless link
pub struct TcpSimTransport {
    address: String,
    role: EchoRole,
}

impl TcpSimTransport {
    /// Create a new TCP transport listening on `address`
    pub fn new(address: impl Into<String>, role: EchoRole) -> Self {
        Self {
            address: address.into(),
            role,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

impl Default for TcpSimTransport {
    fn default() -> Self {
        Self::new(DEFAULT_TCP_ADDRESS, EchoRole::Echo)
    }
}

#[async_trait]
impl Transport for TcpSimTransport {
    type Advertisement = TcpAdvertisement;
    type Connection = TcpConnection;

    async fn advertise(&mut self, config: &LinkConfig) -> Result<Self::Advertisement> {
        let listener = TcpListener::bind(&self.address)
            .await
            .map_err(|e| anyhow!("TCP bind to {} failed: {}", self.address, e))?;

        info!(
            "[TCP] '{}' listening on {}",
            config.device_name,
            listener.local_addr()?
        );

        Ok(TcpAdvertisement {
            listener,
            read_timeout: config.read_timeout,
        })
    }

    async fn accept(
        &mut self,
        advertisement: &mut Self::Advertisement,
    ) -> Result<AcceptOutcome<Self::Connection>> {
        let (stream, addr) = advertisement.listener.accept().await?;
        stream.set_nodelay(true)?;

        Ok(AcceptOutcome::Connected(StreamConnection::new(
            stream,
            PeerId::from(&addr),
            advertisement.read_timeout,
        )))
    }

    async fn stop_advertising(&mut self, advertisement: Self::Advertisement) -> Result<()> {
        // Dropping the listener refuses further connections
        drop(advertisement);
        Ok(())
    }

    fn role(&self) -> EchoRole {
        self.role
    }

    fn name(&self) -> &'static str {
        "TCP"
    }
}
