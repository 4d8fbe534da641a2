pub mod adapter;
pub mod agent;
pub mod ble;
#[cfg(test)]
pub mod mock;
pub mod rfcomm;
pub mod stream;
pub mod tcp;
pub mod traits;

pub use ble::BleTransport;
pub use rfcomm::SppTransport;
pub use tcp::TcpSimTransport;
pub use traits::Transport;

use anyhow::anyhow;
use std::str::FromStr;

/// Which transport the binary drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportMode {
    /// BLE peripheral, receive-only
    Ble,
    /// Classic Bluetooth SPP slave with echo
    Spp,
    /// Loopback TCP stand-in for SPP (for development)
    #[default]
    TcpSimulation,
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportMode::Ble => write!(f, "ble"),
            TransportMode::Spp => write!(f, "spp"),
            TransportMode::TcpSimulation => write!(f, "tcp"),
        }
    }
}

impl FromStr for TransportMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ble" => Ok(TransportMode::Ble),
            "spp" | "classic" => Ok(TransportMode::Spp),
            "tcp" | "sim" => Ok(TransportMode::TcpSimulation),
            other => Err(anyhow!("Unknown transport '{}', expected ble, spp or tcp", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_modes() {
        assert_eq!("ble".parse::<TransportMode>().unwrap(), TransportMode::Ble);
        assert_eq!("SPP".parse::<TransportMode>().unwrap(), TransportMode::Spp);
        assert_eq!("tcp".parse::<TransportMode>().unwrap(), TransportMode::TcpSimulation);
        assert!("wifi".parse::<TransportMode>().is_err());
    }

    #[test]
    fn test_default_mode_round_trips() {
        let mode = TransportMode::default();
        assert_eq!(mode, TransportMode::TcpSimulation);
        assert_eq!(mode.to_string().parse::<TransportMode>().unwrap(), mode);
    }
}
