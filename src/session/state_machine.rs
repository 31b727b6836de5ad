//! Pure connection state transitions
//!
//! Mirrors the transport's lifecycle events onto the five externally visible
//! connection states. No I/O happens here; the session worker feeds events in
//! and publishes whatever state comes out.

use serde::Serialize;
use tracing::{error, info, warn};

/// Externally observable connection state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Error,
}

/// Events that drive connection state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// `connect()` or a forced `reconnect()` was issued
    ConnectRequested,
    /// Broker acknowledged the connection
    TransportConnected,
    /// An established connection dropped
    TransportLost,
    /// Transport began another connection attempt
    TransportReconnecting,
    /// Transport reported a failure
    TransportError,
    /// Transport closed without error
    TransportClosed,
}

/// Pure connection-state transitions with no I/O
pub struct StateMachine;

impl StateMachine {
    /// Determine next state after a connection event (pure function)
    pub fn next_state(current: ConnectionState, event: ConnectionEvent) -> ConnectionState {
        use ConnectionEvent as E;
        use ConnectionState as S;

        match (current, event) {
            (_, E::ConnectRequested) => S::Connecting,
            (_, E::TransportConnected) => S::Connected,
            (S::Connected, E::TransportLost) => S::Reconnecting,
            // A loss outside `connected` means the attempt in flight failed
            (state, E::TransportLost) => state,
            (_, E::TransportReconnecting) => S::Reconnecting,
            (_, E::TransportError) => S::Error,
            (_, E::TransportClosed) => S::Disconnected,
        }
    }

    /// Check if the state counts as an established session
    pub fn is_connected(state: ConnectionState) -> bool {
        matches!(state, ConnectionState::Connected)
    }

    /// Log connection state transition
    pub fn log_state_transition(from: ConnectionState, to: ConnectionState) {
        if from == to {
            return;
        }
        match (from, to) {
            (ConnectionState::Connecting, ConnectionState::Connected) => {
                info!("MQTT connection established");
            }
            (ConnectionState::Reconnecting, ConnectionState::Connected)
            | (ConnectionState::Error, ConnectionState::Connected) => {
                info!("Reconnection successful");
            }
            (ConnectionState::Connected, ConnectionState::Reconnecting) => {
                warn!("MQTT connection lost, reconnecting");
            }
            (_, ConnectionState::Error) => {
                error!("MQTT connection failed ({:?} -> Error)", from);
            }
            _ => {
                info!("MQTT connection state: {:?} -> {:?}", from, to);
            }
        }
    }
}
