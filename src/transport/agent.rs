//! Pairing agent answering PIN and passkey requests with a fixed credential

use anyhow::{anyhow, Result};
use bluer::agent::{Agent, AgentHandle, ReqError};
use bluer::Session;
use tracing::info;

/// Register a default agent that answers pairing with `pin`
pub async fn register_pin_agent(session: &Session, pin: &str) -> Result<AgentHandle> {
    let passkey = passkey_from_pin(pin);

    let pin_for_code = pin.to_string();
    let agent = Agent {
        request_default: true,
        request_pin_code: Some(Box::new(move |req| {
            let pin = pin_for_code.clone();
            Box::pin(async move {
                info!("[BT] PIN code requested by {}", req.device);
                Ok::<_, ReqError>(pin)
            })
        })),
        request_passkey: Some(Box::new(move |req| {
            Box::pin(async move {
                info!("[BT] Passkey requested by {}", req.device);
                passkey.ok_or(ReqError::Rejected)
            })
        })),
        request_confirmation: Some(Box::new(|req| {
            Box::pin(async move {
                info!(
                    "[BT] Confirming passkey {:06} for {}",
                    req.passkey, req.device
                );
                Ok::<_, ReqError>(())
            })
        })),
        ..Default::default()
    };

    session
        .register_agent(agent)
        .await
        .map_err(|e| anyhow!("Pairing agent registration failed: {}", e))
}

/// Numeric passkey for a PIN, if the PIN is all digits and fits in six
fn passkey_from_pin(pin: &str) -> Option<u32> {
    if pin.is_empty() || pin.len() > 6 || !pin.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    pin.parse().ok()
}
