//! Link configuration handed to a transport when it starts advertising

use crate::{error::LinkError, link};
use std::time::Duration;

/// Pairing credential for transports that support pairing
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Pairing {
    /// Accept connections without pairing
    #[default]
    None,
    /// Answer pairing requests with this PIN
    Pin(String),
}

impl Pairing {
    pub fn is_required(&self) -> bool {
        matches!(self, Pairing::Pin(_))
    }

    pub fn pin(&self) -> Option<&str> {
        match self {
            Pairing::None => None,
            Pairing::Pin(pin) => Some(pin),
        }
    }
}

/// Configuration for one supervisor run
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Human-readable device name (adapter alias / LE local name)
    pub device_name: String,
    /// Pairing credential
    pub pairing: Pairing,
    /// How long one advertise attempt waits for a peer; zero waits forever
    pub advertise_timeout: Duration,
    /// LE advertising interval, if the transport supports one
    pub advertise_interval: Option<Duration>,
    /// Service identifiers included in the advertisement
    pub service_uuids: Vec<u128>,
    /// Idle delay between polls after a read returned no data
    pub poll_interval: Duration,
    /// Upper bound on a single read wait
    pub read_timeout: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            device_name: "blue-echo".into(),
            pairing: Pairing::None,
            advertise_timeout: Duration::ZERO,
            advertise_interval: None,
            service_uuids: Vec::new(),
            poll_interval: link::poll_interval(),
            read_timeout: link::read_timeout(),
        }
    }
}

impl LinkConfig {
    /// BLE peripheral exposing the echo GATT service, no pairing
    pub fn ble_peripheral() -> Self {
        Self {
            device_name: "MyBLEPeripheral".into(),
            advertise_interval: Some(Duration::from_millis(link::BLE_ADVERTISE_INTERVAL_MS)),
            service_uuids: vec![link::BLE_SERVICE_UUID],
            ..Default::default()
        }
    }

    /// Classic SPP slave with the default "0000" PIN
    pub fn spp_slave() -> Self {
        Self {
            device_name: "SLV-1".into(),
            pairing: Pairing::Pin("0000".into()),
            service_uuids: vec![link::SPP_UUID],
            ..Default::default()
        }
    }

    /// Whether accept should wait without a deadline
    pub fn waits_indefinitely(&self) -> bool {
        self.advertise_timeout.is_zero()
    }

    /// Check the constraints every transport relies on
    pub fn validate(&self) -> Result<(), LinkError> {
        if self.device_name.trim().is_empty() {
            return Err(LinkError::InvalidConfig("device name must not be empty".into()));
        }
        if let Pairing::Pin(pin) = &self.pairing {
            if pin.is_empty() {
                return Err(LinkError::InvalidConfig(
                    "pairing PIN must not be empty, use Pairing::None instead".into(),
                ));
            }
        }
        if self.read_timeout.is_zero() {
            return Err(LinkError::InvalidConfig("read timeout must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LinkConfig::default();
        assert!(config.waits_indefinitely());
        assert_eq!(config.pairing, Pairing::None);
        assert_eq!(config.poll_interval, Duration::from_millis(link::POLL_INTERVAL_MS));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_presets() {
        let ble = LinkConfig::ble_peripheral();
        assert_eq!(ble.device_name, "MyBLEPeripheral");
        assert!(!ble.pairing.is_required());
        assert_eq!(ble.service_uuids, vec![link::BLE_SERVICE_UUID]);
        assert_eq!(ble.advertise_interval, Some(Duration::from_millis(250)));

        let spp = LinkConfig::spp_slave();
        assert_eq!(spp.device_name, "SLV-1");
        assert_eq!(spp.pairing.pin(), Some("0000"));
        assert!(spp.validate().is_ok());
    }

    #[test]
    fn test_empty_name_rejected() {
        let config = LinkConfig {
            device_name: "  ".into(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(LinkError::InvalidConfig(_))));
    }

    #[test]
    fn test_empty_pin_rejected() {
        let config = LinkConfig {
            pairing: Pairing::Pin(String::new()),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(LinkError::InvalidConfig(_))));
    }

    #[test]
    fn test_finite_timeout() {
        let config = LinkConfig {
            advertise_timeout: Duration::from_secs(30),
            ..Default::default()
        };
        assert!(!config.waits_indefinitely());
    }
}
