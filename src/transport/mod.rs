//! Transport layer for the sensor feed
//!
//! This module provides the transport abstraction the session manager drives,
//! and the MQTT implementation. A transport is opened by a [`TransportFactory`],
//! owns its own retry loop, and reports everything that happens on the link
//! through a [`TransportEvents`] sink.

use crate::config::MqttSection;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

pub mod mqtt;

/// Transport trait for the broker link
///
/// This trait provides an abstraction over the broker connection to enable
/// dependency injection and testing.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Issue a subscribe request for `topic` at the at-most-once delivery level
    async fn subscribe(&self, topic: &str) -> Result<(), TransportError>;

    /// Check if the underlying link is currently connected
    fn is_connected(&self) -> bool;

    /// Ask the transport to attempt a connection now instead of waiting out its retry delay
    fn reconnect(&self);

    /// Close the link immediately, discarding in-flight work. No events are emitted afterwards.
    async fn close(&mut self);
}

/// Creates transports. The session manager calls [`TransportFactory::open`] once per session.
pub trait TransportFactory: Send + Sync {
    type Transport: Transport + 'static;

    fn open(
        &self,
        options: &TransportOptions,
        events: TransportEvents,
    ) -> Result<Self::Transport, TransportError>;
}

/// Everything a transport reports back to the session
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Broker acknowledged the connection
    Connected,
    /// A new connection attempt started after a failure or loss
    Reconnecting,
    /// An established connection dropped
    Lost(String),
    /// Connect failure, timeout, or protocol error
    Error(String),
    /// Link closed without error (broker-initiated disconnect)
    Closed,
    /// Broker rejected a subscription
    SubscribeRejected(String),
    /// Inbound publish
    Message { topic: String, payload: Vec<u8> },
}

/// Sink through which a transport delivers its events
#[derive(Clone)]
pub struct TransportEvents {
    emit: Arc<dyn Fn(TransportEvent) -> bool + Send + Sync>,
}

impl TransportEvents {
    /// Wrap a callback. The callback returns `false` once the receiver is gone.
    pub fn new<F>(emit: F) -> Self
    where
        F: Fn(TransportEvent) -> bool + Send + Sync + 'static,
    {
        Self {
            emit: Arc::new(emit),
        }
    }

    /// Sink backed by an unbounded channel
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(move |event| tx.send(event).is_ok()), rx)
    }

    /// Deliver an event. Returns `false` when nobody is listening anymore.
    pub fn emit(&self, event: TransportEvent) -> bool {
        (self.emit)(event)
    }
}

impl fmt::Debug for TransportEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportEvents").finish_non_exhaustive()
    }
}

/// Fixed-interval retry schedule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay between a failure and the next connection attempt
    pub reconnect_period: Duration,
    /// Upper bound for one attempt to receive its CONNACK
    pub connect_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            reconnect_period: Duration::from_millis(5000),
            connect_timeout: Duration::from_millis(30_000),
        }
    }
}

/// Username/password passed through to the broker
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Connection parameters handed to a [`TransportFactory`]
#[derive(Debug, Clone, PartialEq)]
pub struct TransportOptions {
    pub broker_url: String,
    pub client_id_prefix: String,
    pub keep_alive: Duration,
    /// Clean (non-persistent) session; always requested by the session manager
    pub clean_session: bool,
    pub credentials: Option<Credentials>,
    pub retry: RetryPolicy,
}

impl TransportOptions {
    /// Build options from the `[mqtt]` section, resolving credential environment variables
    pub fn from_section(section: &MqttSection) -> Self {
        Self {
            broker_url: section.broker_url.trim().to_string(),
            client_id_prefix: section.client_id_prefix.clone(),
            keep_alive: Duration::from_secs(section.keep_alive_secs),
            clean_session: true,
            credentials: section
                .credentials_from_env()
                .map(|(username, password)| Credentials { username, password }),
            retry: RetryPolicy {
                reconnect_period: Duration::from_millis(section.reconnect_period_ms),
                connect_timeout: Duration::from_millis(section.connect_timeout_ms),
            },
        }
    }
}

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Subscription failed: {0}")]
    SubscriptionFailed(String),
    #[error("Transport closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_default() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.reconnect_period, Duration::from_millis(5000));
        assert_eq!(policy.connect_timeout, Duration::from_millis(30_000));
    }

    #[test]
    fn test_options_from_section() {
        let section = MqttSection {
            broker_url: " mqtt://localhost:1883 ".to_string(),
            topic: "sensors/temp".to_string(),
            reconnect_period_ms: 1000,
            connect_timeout_ms: 2000,
            ..Default::default()
        };

        let options = TransportOptions::from_section(&section);

        assert_eq!(options.broker_url, "mqtt://localhost:1883");
        assert!(options.clean_session);
        assert_eq!(options.keep_alive, Duration::from_secs(60));
        assert_eq!(options.retry.reconnect_period, Duration::from_millis(1000));
        assert_eq!(options.retry.connect_timeout, Duration::from_millis(2000));
        assert!(options.credentials.is_none());
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let credentials = Credentials {
            username: "sensor".to_string(),
            password: "hunter2".to_string(),
        };
        let debug = format!("{credentials:?}");
        assert!(debug.contains("sensor"));
        assert!(!debug.contains("hunter2"));
    }

    #[tokio::test]
    async fn test_channel_sink_delivers_until_dropped() {
        let (events, mut rx) = TransportEvents::channel();

        assert!(events.emit(TransportEvent::Connected));
        assert_eq!(rx.recv().await, Some(TransportEvent::Connected));

        drop(rx);
        assert!(!events.emit(TransportEvent::Closed));
    }
}
