//! Echo codec
//!
//! Every non-empty chunk returned by a read is one received unit; no framing
//! is imposed on the byte stream. On the echo path received bytes are decoded
//! as UTF-8 and each complete piece of text is answered with:
//!
//! ```text
//! "Echo: " ++ <received text>
//! ```
//!
//! A character split across two reads is held back until its remaining bytes
//! arrive, so the concatenated echoes always reproduce the received text.

use bytes::{BufMut, Bytes, BytesMut};
use std::borrow::Cow;

use crate::{error::LinkError, link::ECHO_PREFIX};

/// What a transport does with received data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoRole {
    /// Log the payload, never write back
    ReceiveOnly,
    /// Log the payload and answer with an echo
    Echo,
}

impl std::fmt::Display for EchoRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EchoRole::ReceiveOnly => write!(f, "receive-only"),
            EchoRole::Echo => write!(f, "echo"),
        }
    }
}

/// Decode a received unit as text
pub fn decode_text(payload: &[u8]) -> Result<&str, LinkError> {
    Ok(std::str::from_utf8(payload)?)
}

/// Take the longest complete UTF-8 prefix out of `pending`
///
/// An incomplete sequence at the end stays in `pending` for the next read and
/// `Ok(None)` is returned when nothing complete is buffered yet. If `pending`
/// holds bytes that can never decode, it is cleared and the error returned.
pub fn take_text(pending: &mut BytesMut) -> Result<Option<Bytes>, LinkError> {
    let complete = match std::str::from_utf8(&pending[..]) {
        Ok(text) => text.len(),
        Err(e) if e.error_len().is_none() => e.valid_up_to(),
        Err(e) => {
            pending.clear();
            return Err(e.into());
        }
    };

    if complete == 0 {
        return Ok(None);
    }
    Ok(Some(pending.split_to(complete).freeze()))
}

/// Build the echo response for a received unit
///
/// Fails with [`LinkError::Decode`] if the payload is not valid UTF-8.
pub fn encode_echo(payload: &[u8]) -> Result<Bytes, LinkError> {
    let text = decode_text(payload)?;

    let mut buf = BytesMut::with_capacity(ECHO_PREFIX.len() + text.len());
    buf.put_slice(ECHO_PREFIX.as_bytes());
    buf.put_slice(text.as_bytes());

    Ok(buf.freeze())
}

/// Render a payload for log output, replacing invalid sequences
pub fn display_text(payload: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(payload)
}
