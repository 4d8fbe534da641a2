mod supervisor;
mod transport;

use anyhow::Result;
use blue_echo_shared::{LinkConfig, LinkError};
use supervisor::{shutdown_channel, ShutdownHandle, ShutdownSignal, Supervisor, SupervisorEvent};
use tokio::sync::mpsc;
use transport::{BleTransport, SppTransport, TcpSimTransport, Transport, TransportMode};

use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let mode = match std::env::args().nth(1) {
        Some(arg) => arg.parse::<TransportMode>()?,
        None => TransportMode::default(),
    };
    info!("blue-echo starting ({} transport)", mode);

    let (shutdown, signal) = shutdown_channel();
    tokio::spawn(handle_ctrl_c(shutdown));

    let result = match mode {
        TransportMode::Ble => {
            supervise(BleTransport::new(), LinkConfig::ble_peripheral(), signal).await
        }
        TransportMode::Spp => {
            supervise(SppTransport::default(), LinkConfig::spp_slave(), signal).await
        }
        TransportMode::TcpSimulation => {
            let transport = TcpSimTransport::default();
            info!("  Simulating SPP on {}", transport.address());
            let config = LinkConfig {
                pairing: Default::default(),
                ..LinkConfig::spp_slave()
            };
            supervise(transport, config, signal).await
        }
    };

    match result {
        Ok(()) => {
            info!("Bluetooth shut down.");
            Ok(())
        }
        Err(e) => {
            error!("Supervisor stopped: {}", e);
            Err(e.into())
        }
    }
}

/// Run a supervisor over `transport`, tracing its events at debug level
async fn supervise<T>(
    transport: T,
    config: LinkConfig,
    signal: ShutdownSignal,
) -> Result<(), LinkError>
where
    T: Transport,
{
    if !tracing::enabled!(tracing::Level::DEBUG) {
        return supervisor::run(transport, config, signal).await;
    }

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    tokio::spawn(log_events(event_rx));

    let mut sup = Supervisor::new(transport, config, signal).with_events(event_tx);
    let result = sup.run().await;
    info!(
        "Supervisor finished in state {} after {} session(s)",
        sup.state(),
        sup.sessions_served()
    );
    result
}

/// First Ctrl-C stops the supervisor gracefully, a second one exits at once
async fn handle_ctrl_c(shutdown: ShutdownHandle) {
    loop {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            return;
        }

        if shutdown.is_requested() {
            warn!("Interrupted again, exiting without waiting for Bluetooth");
            std::process::exit(130);
        }
        info!("Program interrupted. Closing Bluetooth.");
        shutdown.shutdown();
    }
}

async fn log_events(mut events: mpsc::UnboundedReceiver<SupervisorEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            SupervisorEvent::StateChanged { from, to } => debug!("State: {} -> {}", from, to),
            SupervisorEvent::Connected { peer } => debug!("Session opened with {}", peer),
            SupervisorEvent::Received { peer, data } => {
                debug!("{} bytes from {}", data.len(), peer)
            }
            SupervisorEvent::Echoed { peer, len } => debug!("{} bytes echoed to {}", len, peer),
            SupervisorEvent::DecodeFailed { peer, reason } => {
                debug!("Undecodable data from {}: {}", peer, reason)
            }
            SupervisorEvent::Disconnected { peer, reason } => match reason {
                Some(reason) => debug!("Session with {} failed: {}", peer, reason),
                None => debug!("Session with {} closed", peer),
            },
        }
    }
}

