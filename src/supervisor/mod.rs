//! Connection supervision for a single wireless link
//!
//! This module handles:
//! - The advertise -> accept -> serve -> re-advertise cycle
//! - Echoing or logging received data per transport role
//! - Containing per-session errors so only init failures escape
//! - Cooperative shutdown from any state

mod manager;
mod serve;
mod shutdown;

pub use manager::{run, Supervisor, SupervisorEvent};
pub use shutdown::{shutdown_channel, ShutdownHandle, ShutdownSignal};
