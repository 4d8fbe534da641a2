//! BlueZ session and adapter setup shared by the Bluetooth transports

use anyhow::{anyhow, Result};
use blue_echo_shared::LinkConfig;
use bluer::{Adapter, Address, Session, Uuid};
use std::collections::HashSet;
use tracing::{debug, info};

/// Lazily opened BlueZ session
#[derive(Default)]
pub struct BluezSession {
    session: Option<Session>,
}

impl BluezSession {
    /// Get the session, connecting to bluetoothd on first use
    pub async fn get(&mut self) -> Result<Session> {
        if let Some(ref session) = self.session {
            return Ok(session.clone());
        }

        let session = Session::new()
            .await
            .map_err(|e| anyhow!("Cannot reach bluetoothd: {}", e))?;
        self.session = Some(session.clone());
        Ok(session)
    }
}

/// Get the default adapter, powered on and named after the device
pub async fn open_adapter(session: &Session, config: &LinkConfig) -> Result<Adapter> {
    let adapter = session
        .default_adapter()
        .await
        .map_err(|e| anyhow!("No Bluetooth adapter: {}", e))?;

    adapter.set_powered(true).await?;
    adapter.set_alias(config.device_name.clone()).await?;

    info!(
        "[BT] Adapter {} ({}) powered as '{}'",
        adapter.name(),
        adapter.address().await?,
        config.device_name
    );
    Ok(adapter)
}

/// Make the adapter visible to classic inquiry scans until told otherwise
pub async fn set_discoverable(adapter: &Adapter, config: &LinkConfig, on: bool) -> Result<()> {
    if on {
        adapter.set_pairable(config.pairing.is_required()).await?;
        adapter.set_discoverable_timeout(0).await?;
    }
    adapter.set_discoverable(on).await?;
    debug!("[BT] Adapter {} discoverable={}", adapter.name(), on);
    Ok(())
}

/// Addresses of all devices currently connected to the adapter
pub async fn connected_devices(adapter: &Adapter) -> Result<HashSet<Address>> {
    let mut connected = HashSet::new();
    for addr in adapter.device_addresses().await? {
        let device = adapter.device(addr)?;
        if device.is_connected().await.unwrap_or(false) {
            connected.insert(addr);
        }
    }
    Ok(connected)
}

/// Convert a configured service identifier into a BlueZ UUID
pub fn uuid(value: u128) -> Uuid {
    Uuid::from_u128(value)
}
