//! Serve loop pumping one connection until it ends

use super::manager::{EventSink, SupervisorEvent};
use super::shutdown::ShutdownSignal;
use crate::transport::traits::{Connection, ReadOutcome};
use blue_echo_shared::{codec, EchoRole, LinkConfig, LinkError, ReadKind, ServeState};
use bytes::{Bytes, BytesMut};
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Why a serve loop ended
#[derive(Debug)]
pub enum SessionEnd {
    /// Peer disconnected
    Closed,
    /// Read or write failed mid-session
    Failed(LinkError),
    /// Shutdown was requested
    Shutdown,
}

/// Pump one connection until it closes, fails, or shutdown is requested
pub async fn serve_connection<C: Connection>(
    conn: &mut C,
    role: EchoRole,
    config: &LinkConfig,
    shutdown: &mut ShutdownSignal,
    events: &EventSink,
) -> SessionEnd {
    let mut state = ServeState::Reading;
    let mut end = SessionEnd::Closed;
    // Undecoded tail of a character split across reads
    let mut pending = BytesMut::new();

    while !state.is_terminal() {
        if !conn.is_open() {
            state = state.after_read(ReadKind::Closed);
            break;
        }

        let outcome = tokio::select! {
            biased;
            _ = shutdown.requested() => return SessionEnd::Shutdown,
            outcome = conn.read() => outcome,
        };

        match outcome {
            Ok(ReadOutcome::Data(data)) if !data.is_empty() => {
                state = state.after_read(ReadKind::Data);
                match respond(conn, role, data, &mut pending, events).await {
                    Ok(()) => state = state.after_response(),
                    Err(e) => {
                        state = state.after_read(ReadKind::Failed);
                        end = SessionEnd::Failed(e);
                    }
                }
            }
            Ok(ReadOutcome::Data(_)) | Ok(ReadOutcome::WouldBlock) => {
                state = state.after_read(ReadKind::Empty);
                tokio::select! {
                    biased;
                    _ = shutdown.requested() => return SessionEnd::Shutdown,
                    _ = sleep(config.poll_interval) => {}
                }
            }
            Ok(ReadOutcome::Closed) => {
                state = state.after_read(ReadKind::Closed);
            }
            Err(e) => {
                state = state.after_read(ReadKind::Failed);
                end = SessionEnd::Failed(LinkError::io(format!("{:#}", e)));
            }
        }
    }

    if !pending.is_empty() {
        debug!(
            "[SERVE] Dropping {} bytes of an unfinished character from {}",
            pending.len(),
            conn.peer()
        );
    }
    debug!("[SERVE] {} -> {:?} ({:?})", conn.peer(), state, end);
    end
}

/// Log a received unit and, on the echo path, answer the text it completes
async fn respond<C: Connection>(
    conn: &mut C,
    role: EchoRole,
    data: Bytes,
    pending: &mut BytesMut,
    events: &EventSink,
) -> Result<(), LinkError> {
    let peer = conn.peer().clone();
    info!("Received data: {}", codec::display_text(&data));
    events.emit(SupervisorEvent::Received {
        peer: peer.clone(),
        data: data.clone(),
    });

    if role == EchoRole::ReceiveOnly {
        return Ok(());
    }

    pending.extend_from_slice(&data);
    let text = match codec::take_text(pending) {
        Ok(Some(text)) => text,
        Ok(None) => return Ok(()),
        Err(e) => {
            warn!("[SERVE] {} from {}, not echoed", e, peer);
            events.emit(SupervisorEvent::DecodeFailed {
                peer,
                reason: e.to_string(),
            });
            return Ok(());
        }
    };

    let reply = codec::encode_echo(&text)?;
    conn.write(&reply)
        .await
        .map_err(|e| LinkError::io(format!("{:#}", e)))?;

    info!("Serial Output: {}", codec::display_text(&text));
    events.emit(SupervisorEvent::Echoed {
        peer,
        len: reply.len(),
    });
    Ok(())
}
