//! Connection supervisor driving the advertise/serve cycle

use super::serve::{serve_connection, SessionEnd};
use super::shutdown::ShutdownSignal;
use crate::transport::traits::{AcceptOutcome, Connection, Transport};
use blue_echo_shared::{
    state_machine::TransitionResult, LifecycleEvent, LifecycleStateMachine, LinkConfig,
    LinkError, PeerId, SupervisorState,
};
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Events emitted by the supervisor
#[derive(Debug, Clone)]
pub enum SupervisorEvent {
    /// Lifecycle state changed
    StateChanged {
        from: SupervisorState,
        to: SupervisorState,
    },
    /// A peer was accepted
    Connected { peer: PeerId },
    /// A unit was received from the peer
    Received { peer: PeerId, data: Bytes },
    /// An echo was written back
    Echoed { peer: PeerId, len: usize },
    /// A unit could not be decoded for echoing
    DecodeFailed { peer: PeerId, reason: String },
    /// The session ended; `reason` is set for link errors
    Disconnected {
        peer: PeerId,
        reason: Option<String>,
    },
}

/// Optional event output; sending never blocks or fails the supervisor
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<SupervisorEvent>>,
}

impl EventSink {
    pub fn new(tx: mpsc::UnboundedSender<SupervisorEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn emit(&self, event: SupervisorEvent) {
        if let Some(ref tx) = self.tx {
            let _ = tx.send(event);
        }
    }
}

/// How an advertise attempt ended
enum Attempt<C> {
    Peer(C),
    Expired,
    Shutdown,
}

/// Owns one transport and at most one connection at a time
pub struct Supervisor<T: Transport> {
    transport: T,
    config: LinkConfig,
    fsm: LifecycleStateMachine,
    shutdown: ShutdownSignal,
    events: EventSink,
}

impl<T: Transport> Supervisor<T> {
    /// Create a supervisor in Idle state
    pub fn new(transport: T, config: LinkConfig, shutdown: ShutdownSignal) -> Self {
        Self {
            transport,
            config,
            fsm: LifecycleStateMachine::new(),
            shutdown,
            events: EventSink::default(),
        }
    }

    /// Publish lifecycle and data events on `tx`
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<SupervisorEvent>) -> Self {
        self.events = EventSink::new(tx);
        self
    }

    /// Get current lifecycle state
    pub fn state(&self) -> SupervisorState {
        self.fsm.state()
    }

    /// Number of connections accepted so far
    pub fn sessions_served(&self) -> u64 {
        self.fsm.sessions_served()
    }

    /// Run the advertise -> serve cycle until shutdown
    ///
    /// Returns `Ok(())` after a requested shutdown. Returns an error only for
    /// invalid configuration or a failed advertise call; neither is retried.
    pub async fn run(&mut self) -> Result<(), LinkError> {
        self.config.validate()?;

        info!(
            "[SUPERVISOR] Starting {} transport ({}) as '{}'",
            self.transport.name(),
            self.transport.role(),
            self.config.device_name
        );

        loop {
            if self.shutdown.is_requested() {
                self.stop();
                return Ok(());
            }

            self.transition(LifecycleEvent::AdvertiseStarted);
            info!("Advertising...");

            let mut advertisement = match self.transport.advertise(&self.config).await {
                Ok(advertisement) => advertisement,
                Err(e) => {
                    self.transition(LifecycleEvent::AdvertiseFailed);
                    error!("[SUPERVISOR] Failed to bring up {}: {:#}", self.transport.name(), e);
                    return Err(LinkError::TransportInit(format!("{:#}", e)));
                }
            };

            let attempt = accept_peer(
                &mut self.transport,
                &mut advertisement,
                &self.config,
                &mut self.shutdown,
            )
            .await;

            if let Err(e) = self.transport.stop_advertising(advertisement).await {
                warn!("[SUPERVISOR] Failed to stop advertising: {:#}", e);
            }

            match attempt {
                Attempt::Peer(conn) => {
                    let shutting_down = self.serve(conn).await?;
                    if shutting_down {
                        self.stop();
                        return Ok(());
                    }
                }
                Attempt::Expired => {
                    self.transition(LifecycleEvent::AttemptExpired);
                }
                Attempt::Shutdown => {
                    self.stop();
                    return Ok(());
                }
            }
        }
    }

    /// Serve one accepted connection; returns true if shutdown interrupted it
    async fn serve(&mut self, mut conn: T::Connection) -> Result<bool, LinkError> {
        self.transition(LifecycleEvent::PeerConnected);
        let peer = conn.peer().clone();
        info!("Connected to {}", peer);
        self.events.emit(SupervisorEvent::Connected { peer: peer.clone() });

        let end = serve_connection(
            &mut conn,
            self.transport.role(),
            &self.config,
            &mut self.shutdown,
            &self.events,
        )
        .await;

        if conn.is_open() {
            if let Err(e) = conn.close().await {
                warn!("[SUPERVISOR] Failed to close connection to {}: {:#}", peer, e);
            }
        }
        drop(conn);

        let reason = match end {
            SessionEnd::Closed => {
                info!("Client disconnected.");
                None
            }
            SessionEnd::Failed(e) if e.is_fatal() => {
                error!("[SUPERVISOR] Session with {} hit a fatal error: {}", peer, e);
                self.events.emit(SupervisorEvent::Disconnected {
                    peer,
                    reason: Some(e.to_string()),
                });
                return Err(e);
            }
            SessionEnd::Failed(ref e) => {
                warn!("[SUPERVISOR] Link to {} lost: {}", peer, e);
                Some(e.to_string())
            }
            SessionEnd::Shutdown => {
                info!("[SUPERVISOR] Closed connection to {} for shutdown", peer);
                None
            }
        };
        self.events.emit(SupervisorEvent::Disconnected { peer, reason });

        if matches!(end, SessionEnd::Shutdown) {
            return Ok(true);
        }
        self.transition(LifecycleEvent::SessionEnded);
        Ok(false)
    }

    fn stop(&mut self) {
        self.transition(LifecycleEvent::ShutdownRequested);
        info!(
            "[SUPERVISOR] Stopped after {} session(s)",
            self.fsm.sessions_served()
        );
    }

    fn transition(&mut self, event: LifecycleEvent) {
        let from = self.fsm.state();
        match self.fsm.process_event(event) {
            TransitionResult::Success(to) if from != to => {
                debug!("[SUPERVISOR] {} -> {}", from, to);
                self.events.emit(SupervisorEvent::StateChanged { from, to });
            }
            TransitionResult::Success(_) => {}
            TransitionResult::Invalid { from, event } => {
                warn!("[SUPERVISOR] Ignoring {:?} in state {}", event, from);
            }
        }
    }
}

/// Wait for one peer, bounded by the advertise timeout and the shutdown signal
async fn accept_peer<T: Transport>(
    transport: &mut T,
    advertisement: &mut T::Advertisement,
    config: &LinkConfig,
    shutdown: &mut ShutdownSignal,
) -> Attempt<T::Connection> {
    let accept = async {
        if config.waits_indefinitely() {
            transport.accept(advertisement).await
        } else {
            timeout(config.advertise_timeout, transport.accept(advertisement))
                .await
                .unwrap_or(Ok(AcceptOutcome::Timeout))
        }
    };

    tokio::select! {
        biased;
        _ = shutdown.requested() => Attempt::Shutdown,
        result = accept => match result {
            Ok(AcceptOutcome::Connected(conn)) => Attempt::Peer(conn),
            Ok(AcceptOutcome::Timeout) => {
                info!("[SUPERVISOR] No peer connected, advertising again");
                Attempt::Expired
            }
            Err(e) => {
                warn!("[SUPERVISOR] Accept failed: {:#}", e);
                Attempt::Expired
            }
        },
    }
}

/// Run a supervisor over `transport` until shutdown or a fatal error
pub async fn run<T: Transport>(
    transport: T,
    config: LinkConfig,
    shutdown: ShutdownSignal,
) -> Result<(), LinkError> {
    Supervisor::new(transport, config, shutdown).run().await
}
