//! Mock transport for testing
//!
//! [`MockTransportFactory`] hands out [`MockTransport`]s that share state with
//! the factory, so a test can drive transport events and inspect what the
//! session asked the transport to do.

use crate::transport::{
    Transport, TransportError, TransportEvent, TransportEvents, TransportFactory, TransportOptions,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct MockState {
    open_calls: AtomicUsize,
    reconnect_calls: AtomicUsize,
    fail_open: AtomicBool,
    fail_subscribe: AtomicBool,
    connected: AtomicBool,
    closed: AtomicBool,
    subscriptions: Mutex<Vec<String>>,
    last_options: Mutex<Option<TransportOptions>>,
    events: Mutex<Option<TransportEvents>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mock factory; clones share the same state
#[derive(Debug, Clone, Default)]
pub struct MockTransportFactory {
    state: Arc<MockState>,
}

impl MockTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory whose `open` fails like an unparseable broker URL would
    pub fn with_open_failure() -> Self {
        let factory = Self::new();
        factory.state.fail_open.store(true, Ordering::SeqCst);
        factory
    }

    /// Make subscribe requests fail
    pub fn set_fail_subscribe(&self, fail: bool) {
        self.state.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    pub fn open_calls(&self) -> usize {
        self.state.open_calls.load(Ordering::SeqCst)
    }

    pub fn reconnect_calls(&self) -> usize {
        self.state.reconnect_calls.load(Ordering::SeqCst)
    }

    pub fn subscriptions(&self) -> Vec<String> {
        lock(&self.state.subscriptions).clone()
    }

    pub fn last_options(&self) -> Option<TransportOptions> {
        lock(&self.state.last_options).clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    /// Set what `Transport::is_connected` reports without emitting anything
    pub fn set_connected(&self, connected: bool) {
        self.state.connected.store(connected, Ordering::SeqCst);
    }

    /// Deliver a raw transport event. Returns false if no open transport is listening.
    pub fn emit(&self, event: TransportEvent) -> bool {
        let events = lock(&self.state.events).clone();
        match events {
            Some(events) => events.emit(event),
            None => false,
        }
    }

    /// Simulate a broker CONNACK
    pub fn connect(&self) -> bool {
        self.set_connected(true);
        self.emit(TransportEvent::Connected)
    }

    /// Simulate an established link dropping
    pub fn drop_connection(&self, reason: &str) -> bool {
        self.set_connected(false);
        self.emit(TransportEvent::Lost(reason.to_string()))
    }

    /// Simulate a failed connection attempt
    pub fn fail(&self, reason: &str) -> bool {
        self.set_connected(false);
        self.emit(TransportEvent::Error(reason.to_string()))
    }

    /// Simulate an inbound publish
    pub fn deliver(&self, topic: &str, payload: &[u8]) -> bool {
        self.emit(TransportEvent::Message {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        })
    }
}

impl TransportFactory for MockTransportFactory {
    type Transport = MockTransport;

    fn open(
        &self,
        options: &TransportOptions,
        events: TransportEvents,
    ) -> Result<MockTransport, TransportError> {
        self.state.open_calls.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_open.load(Ordering::SeqCst) {
            return Err(TransportError::InvalidBrokerUrl(options.broker_url.clone()));
        }

        *lock(&self.state.last_options) = Some(options.clone());
        *lock(&self.state.events) = Some(events);
        self.state.closed.store(false, Ordering::SeqCst);

        Ok(MockTransport {
            state: self.state.clone(),
        })
    }
}

/// Transport handed out by [`MockTransportFactory`]
#[derive(Debug)]
pub struct MockTransport {
    state: Arc<MockState>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn subscribe(&self, topic: &str) -> Result<(), TransportError> {
        if self.state.fail_subscribe.load(Ordering::SeqCst) {
            return Err(TransportError::SubscriptionFailed(format!(
                "{topic}: Not authorized"
            )));
        }
        lock(&self.state.subscriptions).push(topic.to_string());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::SeqCst)
    }

    fn reconnect(&self) {
        self.state.reconnect_calls.fetch_add(1, Ordering::SeqCst);
    }

    async fn close(&mut self) {
        // Dropping the sink guarantees nothing is delivered after close
        lock(&self.state.events).take();
        self.state.connected.store(false, Ordering::SeqCst);
        self.state.closed.store(true, Ordering::SeqCst);
    }
}
