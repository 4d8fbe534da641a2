//! Byte-stream connection shared by the RFCOMM and TCP transports
//!
//! Both transports hand out a socket implementing `AsyncRead + AsyncWrite`.
//! Reads are bounded by the configured read timeout so the supervisor can
//! poll: an expired wait is reported as `WouldBlock`, end-of-stream as
//! `Closed`.

use crate::transport::traits::{Connection, ReadOutcome};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use blue_echo_shared::PeerId;
use bytes::Bytes;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::debug;

/// Size of the per-connection read buffer
pub const READ_BUFFER_SIZE: usize = 1024;

/// Connection over any async byte stream
pub struct StreamConnection<S> {
    inner: S,
    peer: PeerId,
    read_buf: Vec<u8>,
    read_timeout: Duration,
    open: bool,
}

impl<S> StreamConnection<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin,
{
    pub fn new(stream: S, peer: PeerId, read_timeout: Duration) -> Self {
        Self {
            inner: stream,
            peer,
            read_buf: vec![0u8; READ_BUFFER_SIZE],
            read_timeout,
            open: true,
        }
    }
}

#[async_trait]
impl<S> Connection for StreamConnection<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin,
{
    fn peer(&self) -> &PeerId {
        &self.peer
    }

    async fn read(&mut self) -> Result<ReadOutcome> {
        if !self.open {
            return Ok(ReadOutcome::Closed);
        }

        match timeout(self.read_timeout, self.inner.read(&mut self.read_buf)).await {
            Ok(Ok(0)) => {
                self.open = false;
                Ok(ReadOutcome::Closed)
            }
            Ok(Ok(n)) => Ok(ReadOutcome::Data(Bytes::copy_from_slice(&self.read_buf[..n]))),
            Ok(Err(e)) => {
                self.open = false;
                Err(anyhow!("Read error from {}: {}", self.peer, e))
            }
            // Nothing arrived within the read timeout
            Err(_) => Ok(ReadOutcome::WouldBlock),
        }
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        if !self.open {
            return Err(anyhow!("Connection to {} is closed", self.peer));
        }

        if let Err(e) = self.inner.write_all(data).await {
            self.open = false;
            return Err(anyhow!("Write error to {}: {}", self.peer, e));
        }
        self.inner.flush().await?;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    async fn close(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;

        if let Err(e) = self.inner.shutdown().await {
            // The peer may already have torn the link down
            debug!("Shutdown of {} failed: {}", self.peer, e);
        }
        Ok(())
    }
}
