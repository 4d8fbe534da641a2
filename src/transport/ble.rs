//! BLE peripheral transport
//!
//! Serves one GATT service with a single writable characteristic and
//! advertises it. Characteristic writes arrive on bluer's callback task and
//! are forwarded over a channel to whichever connection is currently open.
//! BlueZ does not report LE connections to a peripheral directly, so a peer
//! is accepted once a device that was not connected at advertise time shows
//! up as connected.

use crate::transport::adapter::{self, BluezSession};
use crate::transport::traits::{AcceptOutcome, Connection, ReadOutcome, Transport};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use blue_echo_shared::{link, EchoRole, LinkConfig, PeerId};
use bluer::adv::{Advertisement, AdvertisementHandle, Type as AdvertisementType};
use bluer::gatt::local::{
    Application, ApplicationHandle, Characteristic, CharacteristicNotify,
    CharacteristicNotifyMethod, CharacteristicWrite, CharacteristicWriteMethod, Service,
};
use bluer::{Adapter, Address, Device};
use bytes::Bytes;
use futures::FutureExt;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{sleep, timeout};
use tracing::{debug, info};

/// One characteristic write as delivered by BlueZ
#[derive(Debug, Clone)]
pub struct GattWrite {
    pub from: Address,
    pub value: Vec<u8>,
}

type WriteReceiver = Arc<Mutex<mpsc::UnboundedReceiver<GattWrite>>>;

/// Build the echo GATT application, forwarding writes into `writes`
pub fn echo_application(writes: mpsc::UnboundedSender<GattWrite>) -> Application {
    Application {
        services: vec![Service {
            uuid: adapter::uuid(link::BLE_SERVICE_UUID),
            primary: true,
            characteristics: vec![Characteristic {
                uuid: adapter::uuid(link::BLE_CHARACTERISTIC_UUID),
                write: Some(CharacteristicWrite {
                    write: true,
                    write_without_response: true,
                    method: CharacteristicWriteMethod::Fun(Box::new(move |value, req| {
                        let writes = writes.clone();
                        async move {
                            let _ = writes.send(GattWrite {
                                from: req.device_address,
                                value,
                            });
                            Ok(())
                        }
                        .boxed()
                    })),
                    ..Default::default()
                }),
                notify: Some(CharacteristicNotify {
                    notify: true,
                    method: CharacteristicNotifyMethod::Fun(Box::new(|_notifier| {
                        async move {
                            // Receive-only: subscriptions are accepted but never fed
                            debug!("[BLE] Notification session started");
                        }
                        .boxed()
                    })),
                    ..Default::default()
                }),
                ..Default::default()
            }],
            ..Default::default()
        }],
        ..Default::default()
    }
}

/// Build the LE advertisement for a configuration
pub fn le_advertisement(config: &LinkConfig) -> Advertisement {
    let service_uuids = if config.service_uuids.is_empty() {
        vec![link::BLE_SERVICE_UUID]
    } else {
        config.service_uuids.clone()
    };

    Advertisement {
        advertisement_type: AdvertisementType::Peripheral,
        service_uuids: service_uuids.into_iter().map(adapter::uuid).collect(),
        local_name: Some(config.device_name.clone()),
        discoverable: Some(true),
        min_interval: config.advertise_interval,
        max_interval: config.advertise_interval,
        ..Default::default()
    }
}

/// Devices the next accept ignores: everything already connected except the
/// previous peer, which is taken back if its link never went down
fn ignored_devices(mut connected: HashSet<Address>, previous: Option<Address>) -> HashSet<Address> {
    if let Some(previous) = previous {
        if connected.remove(&previous) {
            info!("[BLE] Previous peer {} is still connected, accepting it again", previous);
        }
    }
    connected
}

/// Running LE advertisement
pub struct BleAdvertisement {
    adapter: Adapter,
    handle: AdvertisementHandle,
    /// Devices already connected when advertising started
    known: HashSet<Address>,
    poll_interval: Duration,
    read_timeout: Duration,
}

/// Connected BLE central
pub struct BleConnection {
    device: Device,
    address: Address,
    peer: PeerId,
    writes: WriteReceiver,
    read_timeout: Duration,
    open: bool,
}

impl BleConnection {
    /// Treat a silent read window as a disconnect check
    async fn check_link(&mut self) -> Result<ReadOutcome> {
        if self.device.is_connected().await? {
            Ok(ReadOutcome::WouldBlock)
        } else {
            self.open = false;
            Ok(ReadOutcome::Closed)
        }
    }
}

#[async_trait]
impl Connection for BleConnection {
    fn peer(&self) -> &PeerId {
        &self.peer
    }

    async fn read(&mut self) -> Result<ReadOutcome> {
        if !self.open {
            return Ok(ReadOutcome::Closed);
        }

        let received = {
            let mut writes = self.writes.lock().await;
            timeout(self.read_timeout, writes.recv()).await
        };

        match received {
            Ok(Some(write)) if write.from == self.address => {
                Ok(ReadOutcome::Data(Bytes::from(write.value)))
            }
            Ok(Some(write)) => {
                debug!("[BLE] Ignoring write from {} while serving {}", write.from, self.peer);
                Ok(ReadOutcome::WouldBlock)
            }
            Ok(None) => {
                // GATT application is gone
                self.open = false;
                Ok(ReadOutcome::Closed)
            }
            Err(_) => self.check_link().await,
        }
    }

    async fn write(&mut self, _data: &[u8]) -> Result<()> {
        Err(anyhow!("BLE peripheral link to {} is receive-only", self.peer))
    }

    fn is_open(&self) -> bool {
        self.open
    }

    async fn close(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;

        if self.device.is_connected().await.unwrap_or(false) {
            if let Err(e) = self.device.disconnect().await {
                debug!("[BLE] Disconnect of {} failed: {}", self.peer, e);
            }
        }
        Ok(())
    }
}

/// BLE peripheral transport
pub struct BleTransport {
    bluez: BluezSession,
    /// GATT application, served once and kept for the process lifetime
    application: Option<ApplicationHandle>,
    writes_tx: mpsc::UnboundedSender<GattWrite>,
    writes_rx: WriteReceiver,
    /// Peer of the most recent session
    last_peer: Option<Address>,
}

impl BleTransport {
    pub fn new() -> Self {
        let (writes_tx, writes_rx) = mpsc::unbounded_channel();
        Self {
            bluez: BluezSession::default(),
            application: None,
            writes_tx,
            writes_rx: Arc::new(Mutex::new(writes_rx)),
            last_peer: None,
        }
    }

    /// Drop writes left over from a previous session
    async fn drain_writes(&self) {
        let mut writes = self.writes_rx.lock().await;
        let mut dropped = 0usize;
        while writes.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!("[BLE] Dropped {} stale writes", dropped);
        }
    }
}

impl Default for BleTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for BleTransport {
    type Advertisement = BleAdvertisement;
    type Connection = BleConnection;

    async fn advertise(&mut self, config: &LinkConfig) -> Result<Self::Advertisement> {
        let session = self.bluez.get().await?;
        let adapter = adapter::open_adapter(&session, config).await?;

        if self.application.is_none() {
            let app = echo_application(self.writes_tx.clone());
            let handle = adapter
                .serve_gatt_application(app)
                .await
                .map_err(|e| anyhow!("GATT registration failed: {}", e))?;
            self.application = Some(handle);
            info!("[BLE] GATT service registered");
        }

        self.drain_writes().await;

        let known = ignored_devices(adapter::connected_devices(&adapter).await?, self.last_peer);
        let handle = adapter
            .advertise(le_advertisement(config))
            .await
            .map_err(|e| anyhow!("LE advertisement failed: {}", e))?;

        Ok(BleAdvertisement {
            adapter,
            handle,
            known,
            poll_interval: config.poll_interval.max(Duration::from_millis(50)),
            read_timeout: config.read_timeout,
        })
    }

    async fn accept(
        &mut self,
        advertisement: &mut Self::Advertisement,
    ) -> Result<AcceptOutcome<Self::Connection>> {
        loop {
            let connected = adapter::connected_devices(&advertisement.adapter).await?;

            if let Some(&address) = connected.difference(&advertisement.known).next() {
                let device = advertisement.adapter.device(address)?;
                self.last_peer = Some(address);
                return Ok(AcceptOutcome::Connected(BleConnection {
                    device,
                    address,
                    peer: PeerId::from(&address),
                    writes: self.writes_rx.clone(),
                    read_timeout: advertisement.read_timeout,
                    open: true,
                }));
            }

            // Devices that left may come back as new peers
            advertisement.known.retain(|addr| connected.contains(addr));
            sleep(advertisement.poll_interval).await;
        }
    }

    async fn stop_advertising(&mut self, advertisement: Self::Advertisement) -> Result<()> {
        // Dropping the handle unregisters the advertisement
        drop(advertisement.handle);
        Ok(())
    }

    fn role(&self) -> EchoRole {
        EchoRole::ReceiveOnly
    }

    fn name(&self) -> &'static str {
        "BLE"
    }
}
