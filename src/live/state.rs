//! Manager, loop and connection state machines.

/// Coarse state visible to callers of the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ManagerState {
    /// Not running; never started or stopped by the caller.
    #[default]
    Idle,
    /// The reconnect loop is running.
    Listening,
    /// The loop gave up after exhausting its reconnect attempts. A new
    /// `start` is required.
    Stopped,
}

impl ManagerState {
    /// Whether the loop is running.
    pub fn is_listening(&self) -> bool {
        matches!(self, ManagerState::Listening)
    }
}

/// Phase of the reconnect loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopPhase {
    /// No worker running.
    #[default]
    Idle,
    /// Opening a session.
    Connecting,
    /// Polling the open session for liveness.
    Monitoring,
    /// Tearing down and waiting before the next connect.
    Reconnecting,
    /// Final cleanup before the worker exits.
    Stopping,
}

impl LoopPhase {
    /// Check if transition to target phase is valid.
    ///
    /// Valid transitions:
    /// - Idle -> Connecting
    /// - Connecting -> Monitoring | Reconnecting | Stopping
    /// - Monitoring -> Reconnecting | Stopping
    /// - Reconnecting -> Connecting | Stopping
    /// - Stopping -> Idle
    pub fn can_transition_to(&self, target: LoopPhase) -> bool {
        use LoopPhase::*;
        matches!(
            (*self, target),
            (Idle, Connecting)
                | (Connecting, Monitoring)
                | (Connecting, Reconnecting)
                | (Connecting, Stopping)
                | (Monitoring, Reconnecting)
                | (Monitoring, Stopping)
                | (Reconnecting, Connecting)
                | (Reconnecting, Stopping)
                | (Stopping, Idle)
        )
    }
}

/// Connection state of a single live session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No connection.
    #[default]
    Disconnected,
    /// Connect in flight.
    Connecting,
    /// Connected, audio stream not yet started.
    Connected,
    /// Audio stream running.
    Active,
    /// Teardown in progress.
    Closing,
}

impl ConnectionState {
    /// Check if transition to target state is valid.
    pub fn can_transition_to(&self, target: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (*self, target),
            (Disconnected, Connecting)
                | (Connecting, Connected)
                | (Connecting, Disconnected)
                | (Connected, Active)
                | (Connected, Closing)
                | (Active, Closing)
                | (Closing, Disconnected)
        )
    }

    /// Whether the audio stream needs stopping on teardown.
    pub fn is_streaming(&self) -> bool {
        matches!(self, ConnectionState::Active)
    }
}
