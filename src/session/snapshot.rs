//! Session snapshot and its copy-on-write reducer
//!
//! Every change to externally visible state goes through
//! [`SessionSnapshot::apply`], which returns a fresh snapshot. Changes that
//! belong together (a connect clearing the previous error, a reading updating
//! both the latest value and the trailing window) happen in one application.

use super::state_machine::{ConnectionEvent, ConnectionState, StateMachine};
use super::window::TrailingWindow;
use crate::error::SessionError;
use crate::protocol::Reading;
use serde::Serialize;

/// The single externally observable state of a session
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub connection_state: ConnectionState,
    pub latest_reading: Option<Reading>,
    pub last_error: Option<SessionError>,
    pub history: TrailingWindow,
}

/// A single state-changing event, already interpreted by the session worker
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    /// Configuration validation failed before any connection attempt
    ConfigRejected(SessionError),
    /// A connection attempt was started by the session
    ConnectRequested,
    /// Broker acknowledged the connection and the subscribe request was issued.
    /// `subscribe_error` is set when issuing the request failed.
    Connected { subscribe_error: Option<SessionError> },
    /// Established connection dropped; transport is retrying
    ConnectionLost,
    /// Transport started another attempt
    Reconnecting,
    /// Transport reported a failure
    TransportFailed(SessionError),
    /// Transport closed without error
    Closed,
    /// Broker rejected the subscription
    SubscribeRejected(SessionError),
    /// A message decoded successfully
    ReadingDecoded(Reading),
    /// A message could not be decoded
    DecodeFailed(SessionError),
}

impl SessionSnapshot {
    /// Snapshot at the start of a session: empty window, nothing received yet
    pub fn initial() -> Self {
        Self::default()
    }

    /// Produce the snapshot that results from `update` (pure function)
    pub fn apply(&self, update: SessionUpdate) -> SessionSnapshot {
        let mut next = self.clone();
        match update {
            SessionUpdate::ConfigRejected(error) => {
                next.connection_state = ConnectionState::Disconnected;
                next.last_error = Some(error);
            }
            SessionUpdate::ConnectRequested => {
                next.connection_state = self.transition(ConnectionEvent::ConnectRequested);
            }
            SessionUpdate::Connected { subscribe_error } => {
                next.connection_state = self.transition(ConnectionEvent::TransportConnected);
                next.last_error = subscribe_error;
            }
            SessionUpdate::ConnectionLost => {
                next.connection_state = self.transition(ConnectionEvent::TransportLost);
            }
            SessionUpdate::Reconnecting => {
                next.connection_state = self.transition(ConnectionEvent::TransportReconnecting);
            }
            SessionUpdate::TransportFailed(error) => {
                next.connection_state = self.transition(ConnectionEvent::TransportError);
                next.last_error = Some(error);
            }
            SessionUpdate::Closed => {
                next.connection_state = self.transition(ConnectionEvent::TransportClosed);
            }
            SessionUpdate::SubscribeRejected(error) | SessionUpdate::DecodeFailed(error) => {
                next.last_error = Some(error);
            }
            SessionUpdate::ReadingDecoded(reading) => {
                next.history = self.history.push(reading.value);
                next.latest_reading = Some(reading);
                next.last_error = None;
            }
        }
        next
    }

    fn transition(&self, event: ConnectionEvent) -> ConnectionState {
        StateMachine::next_state(self.connection_state, event)
    }

    pub fn is_connected(&self) -> bool {
        StateMachine::is_connected(self.connection_state)
    }

    /// Message of the last error, if any
    pub fn last_error_message(&self) -> Option<&str> {
        self.last_error.as_ref().map(|error| error.message.as_str())
    }
}
