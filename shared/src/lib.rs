//! blue-echo Shared Link Types
//!
//! This crate provides the transport-independent pieces of the echo service:
//! link configuration, the error taxonomy, the supervisor lifecycle state
//! machine and the echo codec.

pub mod codec;
pub mod config;
pub mod error;
pub mod state_machine;

use std::fmt;

// Re-export commonly used types at crate root
pub use codec::EchoRole;
pub use config::{LinkConfig, Pairing};
pub use error::LinkError;
pub use state_machine::{
    LifecycleEvent, LifecycleStateMachine, ReadKind, ServeState, SupervisorState, TransitionResult,
};

/// Timing and identifier constants for the link
pub mod link {
    use std::time::Duration;

    /// Idle delay between polls when a read reports no data
    pub const POLL_INTERVAL_MS: u64 = 5;

    /// Upper bound on a single blocking read wait
    pub const READ_TIMEOUT_MS: u64 = 250;

    /// LE advertising interval used by the peripheral preset
    pub const BLE_ADVERTISE_INTERVAL_MS: u64 = 250;

    /// Prefix written before every echoed payload
    pub const ECHO_PREFIX: &str = "Echo: ";

    /// GATT service exposed by the BLE peripheral
    pub const BLE_SERVICE_UUID: u128 = 0x12345678_1234_5678_1234_56789abcdef0;

    /// Writable characteristic inside [`BLE_SERVICE_UUID`]
    pub const BLE_CHARACTERISTIC_UUID: u128 = 0x12345678_1234_5678_1234_56789abcdef1;

    /// Serial Port Profile service class
    pub const SPP_UUID: u128 = 0x00001101_0000_1000_8000_00805f9b34fb;

    /// RFCOMM channel the SPP profile is registered on
    pub const SPP_CHANNEL: u8 = 1;

    pub fn poll_interval() -> Duration {
        Duration::from_millis(POLL_INTERVAL_MS)
    }

    pub fn read_timeout() -> Duration {
        Duration::from_millis(READ_TIMEOUT_MS)
    }
}

/// Opaque identifier of the remote end of a connection, used for logging
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<T: fmt::Display> From<&T> for PeerId {
    fn from(value: &T) -> Self {
        Self(value.to_string())
    }
}
