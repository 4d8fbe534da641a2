//! Error taxonomy for the link supervisor
//!
//! Only [`LinkError::TransportInit`] and [`LinkError::InvalidConfig`] ever
//! escape the supervisor. The remaining variants describe per-session
//! failures that end (or are logged within) a single connection.
//! A clean disconnect is not an error at all.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LinkError {
    #[error("Transport init failed: {0}")]
    TransportInit(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Link I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Payload is not valid UTF-8: {0}")]
    Decode(#[from] std::str::Utf8Error),
}

impl LinkError {
    /// Whether this error must stop the supervisor instead of ending a session
    pub fn is_fatal(&self) -> bool {
        matches!(self, LinkError::TransportInit(_) | LinkError::InvalidConfig(_))
    }

    /// Build a session-level I/O error from anything displayable
    pub fn io(reason: impl std::fmt::Display) -> Self {
        LinkError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            reason.to_string(),
        ))
    }
}
