//! RFCOMM transport implementing a Serial Port Profile slave

use crate::transport::adapter::{self, BluezSession};
use crate::transport::agent;
use crate::transport::stream::StreamConnection;
use crate::transport::traits::{AcceptOutcome, Transport};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use blue_echo_shared::{link, EchoRole, LinkConfig, PeerId};
use bluer::agent::AgentHandle;
use bluer::rfcomm::{Profile, ProfileHandle, Role, Stream as RfcommStream};
use bluer::Adapter;
use futures::StreamExt;
use std::time::Duration;
use tracing::{info, warn};

pub type SppConnection = StreamConnection<RfcommStream>;

/// Registered SPP profile; the device is discoverable while this is alive
pub struct SppAdvertisement {
    adapter: Adapter,
    profile: ProfileHandle,
    read_timeout: Duration,
}

/// Build the SPP server profile for a configuration
pub fn spp_profile(config: &LinkConfig, channel: u8) -> Profile {
    let service = config
        .service_uuids
        .first()
        .copied()
        .unwrap_or(link::SPP_UUID);

    Profile {
        uuid: adapter::uuid(service),
        name: Some(config.device_name.clone()),
        role: Some(Role::Server),
        channel: Some(channel.into()),
        require_authentication: Some(config.pairing.is_required()),
        require_authorization: Some(false),
        auto_connect: Some(false),
        ..Default::default()
    }
}

/// Classic Bluetooth SPP slave transport
pub struct SppTransport {
    bluez: BluezSession,
    channel: u8,
    /// Pairing agent, registered once and kept for the process lifetime
    agent: Option<AgentHandle>,
}

impl SppTransport {
    /// Create a new SPP transport on the given RFCOMM channel
    pub fn new(channel: u8) -> Self {
        Self {
            bluez: BluezSession::default(),
            channel,
            agent: None,
        }
    }
}

impl Default for SppTransport {
    fn default() -> Self {
        Self::new(link::SPP_CHANNEL)
    }
}

#[async_trait]
impl Transport for SppTransport {
    type Advertisement = SppAdvertisement;
    type Connection = SppConnection;

    async fn advertise(&mut self, config: &LinkConfig) -> Result<Self::Advertisement> {
        let session = self.bluez.get().await?;
        let adapter = adapter::open_adapter(&session, config).await?;

        if let Some(pin) = config.pairing.pin() {
            if self.agent.is_none() {
                self.agent = Some(agent::register_pin_agent(&session, pin).await?);
            }
        }

        let profile = session
            .register_profile(spp_profile(config, self.channel))
            .await
            .map_err(|e| anyhow!("SPP profile registration failed: {}", e))?;

        adapter::set_discoverable(&adapter, config, true).await?;

        info!(
            "[SPP] Bluetooth device '{}' initialized and open for connections on channel {}",
            config.device_name, self.channel
        );

        Ok(SppAdvertisement {
            adapter,
            profile,
            read_timeout: config.read_timeout,
        })
    }

    async fn accept(
        &mut self,
        advertisement: &mut Self::Advertisement,
    ) -> Result<AcceptOutcome<Self::Connection>> {
        let request = advertisement
            .profile
            .next()
            .await
            .ok_or_else(|| anyhow!("SPP profile was unregistered"))?;

        let address = request.device();
        let stream = request
            .accept()
            .map_err(|e| anyhow!("Accepting RFCOMM connection from {} failed: {}", address, e))?;

        Ok(AcceptOutcome::Connected(StreamConnection::new(
            stream,
            PeerId::from(&address),
            advertisement.read_timeout,
        )))
    }

    async fn stop_advertising(&mut self, advertisement: Self::Advertisement) -> Result<()> {
        let SppAdvertisement { adapter, profile, .. } = advertisement;

        if let Err(e) = adapter.set_discoverable(false).await {
            warn!("[SPP] Failed to leave discoverable mode: {}", e);
        }
        // Unregisters the profile; open RFCOMM streams are unaffected
        drop(profile);
        Ok(())
    }

    fn role(&self) -> EchoRole {
        EchoRole::Echo
    }

    fn name(&self) -> &'static str {
        "SPP"
    }
}
