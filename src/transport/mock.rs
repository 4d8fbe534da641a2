//! Scripted transport for exercising the supervisor without a radio

use crate::transport::traits::{AcceptOutcome, Connection, ReadOutcome, Transport};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use blue_echo_shared::{EchoRole, LinkConfig, PeerId};
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// One scripted read result
#[derive(Debug, Clone)]
pub enum MockRead {
    Data(Bytes),
    WouldBlock,
    Closed,
    Error(&'static str),
    /// Never completes
    Hang,
}

impl MockRead {
    pub fn data(bytes: &'static [u8]) -> Self {
        MockRead::Data(Bytes::from_static(bytes))
    }
}

/// One scripted accept result
#[derive(Debug, Clone)]
pub enum MockAccept {
    Peer(Vec<MockRead>),
    Timeout,
    Fail,
}

/// Counters shared between the transport, its connections and the test
#[derive(Debug, Default)]
pub struct MockStats {
    pub advertise_calls: AtomicUsize,
    pub stop_calls: AtomicUsize,
    pub connections_created: AtomicUsize,
    pub open_connections: AtomicUsize,
    pub max_open_connections: AtomicUsize,
    pub closes: AtomicUsize,
    pub writes: Mutex<Vec<Bytes>>,
}

impl MockStats {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub fn written(&self) -> Vec<Bytes> {
        self.writes.lock().unwrap().clone()
    }
}

pub struct MockTransport {
    role: EchoRole,
    fail_advertise: bool,
    accepts: VecDeque<MockAccept>,
    pub stats: Arc<MockStats>,
}

impl MockTransport {
    pub fn new(role: EchoRole, accepts: Vec<MockAccept>) -> Self {
        Self {
            role,
            fail_advertise: false,
            accepts: accepts.into(),
            stats: Arc::new(MockStats::default()),
        }
    }

    /// Transport whose advertise call always fails
    pub fn broken() -> Self {
        Self {
            fail_advertise: true,
            ..Self::new(EchoRole::Echo, Vec::new())
        }
    }
}

pub struct MockAdvertisement;

pub struct MockConnection {
    peer: PeerId,
    reads: VecDeque<MockRead>,
    stats: Arc<MockStats>,
    open: bool,
}

impl MockConnection {
    fn mark_closed(&mut self) {
        if self.open {
            self.open = false;
            self.stats.open_connections.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        self.mark_closed();
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn peer(&self) -> &PeerId {
        &self.peer
    }

    async fn read(&mut self) -> Result<ReadOutcome> {
        if !self.open {
            return Ok(ReadOutcome::Closed);
        }
        match self.reads.pop_front() {
            Some(MockRead::Data(data)) => Ok(ReadOutcome::Data(data)),
            Some(MockRead::WouldBlock) => Ok(ReadOutcome::WouldBlock),
            Some(MockRead::Error(reason)) => Err(anyhow!(reason)),
            Some(MockRead::Hang) => futures::future::pending().await,
            Some(MockRead::Closed) | None => {
                self.mark_closed();
                Ok(ReadOutcome::Closed)
            }
        }
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.stats
            .writes
            .lock()
            .unwrap()
            .push(Bytes::copy_from_slice(data));
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    async fn close(&mut self) -> Result<()> {
        if self.open {
            self.stats.closes.fetch_add(1, Ordering::SeqCst);
        }
        self.mark_closed();
        Ok(())
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Advertisement = MockAdvertisement;
    type Connection = MockConnection;

    async fn advertise(&mut self, _config: &LinkConfig) -> Result<Self::Advertisement> {
        self.stats.advertise_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_advertise {
            return Err(anyhow!("radio unavailable"));
        }
        Ok(MockAdvertisement)
    }

    async fn accept(
        &mut self,
        _advertisement: &mut Self::Advertisement,
    ) -> Result<AcceptOutcome<Self::Connection>> {
        match self.accepts.pop_front() {
            Some(MockAccept::Peer(reads)) => {
                let id = self.stats.connections_created.fetch_add(1, Ordering::SeqCst);
                let open = self.stats.open_connections.fetch_add(1, Ordering::SeqCst) + 1;
                self.stats
                    .max_open_connections
                    .fetch_max(open, Ordering::SeqCst);

                Ok(AcceptOutcome::Connected(MockConnection {
                    peer: PeerId::new(format!("mock-peer-{}", id)),
                    reads: reads.into(),
                    stats: self.stats.clone(),
                    open: true,
                }))
            }
            Some(MockAccept::Timeout) => Ok(AcceptOutcome::Timeout),
            Some(MockAccept::Fail) => Err(anyhow!("accept failed")),
            // Script exhausted: nobody else ever connects
            None => futures::future::pending().await,
        }
    }

    async fn stop_advertising(&mut self, _advertisement: Self::Advertisement) -> Result<()> {
        self.stats.stop_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn role(&self) -> EchoRole {
        self.role
    }

    fn name(&self) -> &'static str {
        "Mock"
    }
}
