//! Supervisor Lifecycle State Machine
//!
//! Defines the valid transitions of the connection supervisor and the
//! per-connection serve loop.

/// Lifecycle state of the connection supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// No advertisement, no connection
    Idle,
    /// Discoverable, waiting for a peer
    Advertising,
    /// Exactly one connection is open
    Connected,
    /// Shutdown requested; terminal
    ShuttingDown,
}

impl std::fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SupervisorState::Idle => write!(f, "Idle"),
            SupervisorState::Advertising => write!(f, "Advertising"),
            SupervisorState::Connected => write!(f, "Connected"),
            SupervisorState::ShuttingDown => write!(f, "ShuttingDown"),
        }
    }
}

/// Events that can trigger lifecycle transitions
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    /// Advertise call is about to be made
    AdvertiseStarted,
    /// Advertise call failed (fatal)
    AdvertiseFailed,
    /// A peer was accepted
    PeerConnected,
    /// Accept timed out or failed without a connection
    AttemptExpired,
    /// The serve loop exited (disconnect or link error)
    SessionEnded,
    /// External shutdown signal
    ShutdownRequested,
}

/// Result of a state transition attempt
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionResult {
    /// Transition was valid and state changed (or stayed)
    Success(SupervisorState),
    /// Transition was invalid from current state
    Invalid { from: SupervisorState, event: LifecycleEvent },
}

/// The lifecycle state machine driven by the supervisor
#[derive(Debug)]
pub struct LifecycleStateMachine {
    current_state: SupervisorState,
    sessions_served: u64,
}

impl Default for LifecycleStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleStateMachine {
    /// Create a new state machine in Idle state
    pub fn new() -> Self {
        Self {
            current_state: SupervisorState::Idle,
            sessions_served: 0,
        }
    }

    /// Get current state
    pub fn state(&self) -> SupervisorState {
        self.current_state
    }

    /// Number of connections accepted so far
    pub fn sessions_served(&self) -> u64 {
        self.sessions_served
    }

    /// Process an event and return the transition result
    pub fn process_event(&mut self, event: LifecycleEvent) -> TransitionResult {
        // Shutdown wins from every state, including itself
        if event == LifecycleEvent::ShutdownRequested {
            self.current_state = SupervisorState::ShuttingDown;
            return TransitionResult::Success(self.current_state);
        }

        match self.get_next_state(&event) {
            Some(state) => {
                if event == LifecycleEvent::PeerConnected {
                    self.sessions_served += 1;
                }
                self.current_state = state;
                TransitionResult::Success(state)
            }
            None => TransitionResult::Invalid {
                from: self.current_state,
                event,
            },
        }
    }

    fn get_next_state(&self, event: &LifecycleEvent) -> Option<SupervisorState> {
        use LifecycleEvent::*;
        use SupervisorState::*;

        match (self.current_state, event) {
            (Idle, AdvertiseStarted) => Some(Advertising),

            (Advertising, PeerConnected) => Some(Connected),
            (Advertising, AttemptExpired) => Some(Idle),
            (Advertising, AdvertiseFailed) => Some(Idle),

            (Connected, SessionEnded) => Some(Idle),

            // ShuttingDown is terminal
            _ => None,
        }
    }
}

/// State of the serve loop for one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeState {
    Reading,
    Echoing,
    Terminated,
}

/// What a single read produced, as seen by the serve loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadKind {
    Empty,
    Data,
    Closed,
    Failed,
}

impl ServeState {
    /// Next state after a read returned
    pub fn after_read(self, kind: ReadKind) -> ServeState {
        match (self, kind) {
            (ServeState::Terminated, _) => ServeState::Terminated,
            (_, ReadKind::Closed | ReadKind::Failed) => ServeState::Terminated,
            (ServeState::Reading, ReadKind::Data) => ServeState::Echoing,
            (ServeState::Reading, ReadKind::Empty) => ServeState::Reading,
            (ServeState::Echoing, _) => ServeState::Reading,
        }
    }

    /// Next state once the response to a received unit has been handled
    pub fn after_response(self) -> ServeState {
        match self {
            ServeState::Echoing => ServeState::Reading,
            other => other,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == ServeState::Terminated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let fsm = LifecycleStateMachine::new();
        assert_eq!(fsm.state(), SupervisorState::Idle);
        assert_eq!(fsm.sessions_served(), 0);
    }

    #[test]
    fn test_connection_cycle() {
        let mut fsm = LifecycleStateMachine::new();

        let result = fsm.process_event(LifecycleEvent::AdvertiseStarted);
        assert_eq!(result, TransitionResult::Success(SupervisorState::Advertising));

        let result = fsm.process_event(LifecycleEvent::PeerConnected);
        assert_eq!(result, TransitionResult::Success(SupervisorState::Connected));

        let result = fsm.process_event(LifecycleEvent::SessionEnded);
        assert_eq!(result, TransitionResult::Success(SupervisorState::Idle));

        // Straight back to advertising
        let result = fsm.process_event(LifecycleEvent::AdvertiseStarted);
        assert_eq!(result, TransitionResult::Success(SupervisorState::Advertising));
        assert_eq!(fsm.sessions_served(), 1);
    }

    #[test]
    fn test_attempt_expired_returns_to_idle() {
        let mut fsm = LifecycleStateMachine::new();
        fsm.process_event(LifecycleEvent::AdvertiseStarted);

        let result = fsm.process_event(LifecycleEvent::AttemptExpired);
        assert_eq!(result, TransitionResult::Success(SupervisorState::Idle));
    }

    #[test]
    fn test_cannot_connect_without_advertising() {
        let mut fsm = LifecycleStateMachine::new();

        let result = fsm.process_event(LifecycleEvent::PeerConnected);
        assert!(matches!(result, TransitionResult::Invalid { .. }));
        assert_eq!(fsm.state(), SupervisorState::Idle);
    }

    #[test]
    fn test_no_second_connection() {
        let mut fsm = LifecycleStateMachine::new();
        fsm.process_event(LifecycleEvent::AdvertiseStarted);
        fsm.process_event(LifecycleEvent::PeerConnected);

        let result = fsm.process_event(LifecycleEvent::PeerConnected);
        assert!(matches!(result, TransitionResult::Invalid { .. }));
        assert_eq!(fsm.sessions_served(), 1);
    }

    #[test]
    fn test_shutdown_from_any_state() {
        for steps in 0..3 {
            let mut fsm = LifecycleStateMachine::new();
            let events = [LifecycleEvent::AdvertiseStarted, LifecycleEvent::PeerConnected];
            for event in events.iter().take(steps) {
                fsm.process_event(event.clone());
            }

            let result = fsm.process_event(LifecycleEvent::ShutdownRequested);
            assert_eq!(result, TransitionResult::Success(SupervisorState::ShuttingDown));

            // Idempotent
            let result = fsm.process_event(LifecycleEvent::ShutdownRequested);
            assert_eq!(result, TransitionResult::Success(SupervisorState::ShuttingDown));
        }
    }

    #[test]
    fn test_shutting_down_is_terminal() {
        let mut fsm = LifecycleStateMachine::new();
        fsm.process_event(LifecycleEvent::ShutdownRequested);

        let result = fsm.process_event(LifecycleEvent::AdvertiseStarted);
        assert!(matches!(result, TransitionResult::Invalid { .. }));
        assert_eq!(fsm.state(), SupervisorState::ShuttingDown);
    }

    #[test]
    fn test_serve_loop_transitions() {
        let state = ServeState::Reading;
        assert_eq!(state.after_read(ReadKind::Empty), ServeState::Reading);
        assert_eq!(state.after_read(ReadKind::Data), ServeState::Echoing);
        assert_eq!(ServeState::Echoing.after_response(), ServeState::Reading);
        assert_eq!(state.after_read(ReadKind::Closed), ServeState::Terminated);
        assert_eq!(state.after_read(ReadKind::Failed), ServeState::Terminated);
        assert!(ServeState::Terminated.after_read(ReadKind::Data).is_terminal());
    }
}
