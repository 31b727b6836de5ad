//! Session manager: owns one transport session and drives the snapshot
//!
//! Transport callbacks, lifecycle signals and reconnect requests are all
//! serialized onto one unbounded queue. A single worker task drains it, so
//! snapshot mutation never races. Shutdown seals the store first; anything
//! still queued at that point is discarded.

use super::snapshot::{SessionSnapshot, SessionUpdate};
use super::store::StateStore;
use crate::config::{validate_broker_settings, MqttSection};
use crate::error::{MonitorError, MonitorResult, SessionError};
use crate::lifecycle::{
    LifecycleBridge, LifecycleSignal, LifecycleSource, LifecycleSubscription,
};
use crate::protocol::{decode_reading, topic_matches_filter};
use crate::{lifecycle_span, session_span};
use crate::transport::{
    Transport, TransportEvent, TransportEvents, TransportFactory, TransportOptions,
};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

/// Everything the worker reacts to
#[derive(Debug, Clone, PartialEq)]
enum SessionEvent {
    Transport(TransportEvent),
    Lifecycle(LifecycleSignal),
    ReconnectRequested,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Running,
    Terminated,
}

/// Owns one broker session and publishes its snapshot
pub struct SessionManager {
    section: MqttSection,
    store: Arc<StateStore>,
    events_tx: Option<mpsc::UnboundedSender<SessionEvent>>,
    worker: Option<JoinHandle<()>>,
    phase: Phase,
}

impl SessionManager {
    pub fn new(section: MqttSection) -> Self {
        Self {
            section,
            store: Arc::new(StateStore::new(SessionSnapshot::initial())),
            events_tx: None,
            worker: None,
            phase: Phase::Idle,
        }
    }

    /// Receiver notified on every snapshot change
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.store.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.store.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.phase == Phase::Running
    }

    /// Validate settings, open the transport and start the worker.
    ///
    /// Must be called inside a tokio runtime. A config failure leaves the
    /// manager idle so `start` may be retried with corrected settings.
    pub fn start<F: TransportFactory>(
        &mut self,
        factory: &F,
        lifecycle: Arc<dyn LifecycleSource>,
    ) -> MonitorResult<()> {
        match self.phase {
            Phase::Running => return Err(MonitorError::AlreadyStarted),
            Phase::Terminated => return Err(MonitorError::Terminated),
            Phase::Idle => {}
        }

        if let Err(e) = validate_broker_settings(&self.section.broker_url, &self.section.topic) {
            warn!("Refusing to start session: {}", e);
            self.store.apply(SessionUpdate::ConfigRejected(SessionError::config(&e)));
            return Err(e.into());
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let options = TransportOptions::from_section(&self.section);
        let topic = self.section.topic.trim().to_string();

        self.store.apply(SessionUpdate::ConnectRequested);

        let sink = events_tx.clone();
        let transport_events =
            TransportEvents::new(move |event| sink.send(SessionEvent::Transport(event)).is_ok());
        let transport = match factory.open(&options, transport_events) {
            Ok(transport) => transport,
            Err(e) => {
                error!("Failed to open transport: {}", e);
                let error = SessionError::transport(e.to_string());
                self.store.apply(SessionUpdate::TransportFailed(error));
                return Err(e.into());
            }
        };

        // Attach before reading `current()` so no transition falls in between
        let lifecycle_tx = events_tx.clone();
        let subscription = LifecycleSubscription::attach(
            lifecycle.clone(),
            Arc::new(move |signal| {
                let _ = lifecycle_tx.send(SessionEvent::Lifecycle(signal));
            }),
        );
        let bridge = LifecycleBridge::new(lifecycle.current());

        let worker = SessionWorker {
            transport,
            topic: topic.clone(),
            store: self.store.clone(),
            bridge,
            subscription,
        };
        let span = session_span!(topic = %topic);
        self.worker = Some(tokio::spawn(worker.run(events_rx).instrument(span)));
        self.events_tx = Some(events_tx);
        self.phase = Phase::Running;

        info!("Sensor session started for topic {}", topic);
        Ok(())
    }

    /// Force a connection attempt if the transport is not connected. No-op otherwise.
    pub fn reconnect(&self) {
        if let Some(tx) = &self.events_tx {
            let _ = tx.send(SessionEvent::ReconnectRequested);
        }
    }

    /// Close the transport and stop the worker.
    ///
    /// The snapshot is finalized as disconnected and sealed before this
    /// returns its future; no later transition is ever published.
    pub async fn shutdown(&mut self) {
        if self.phase == Phase::Terminated {
            return;
        }

        self.store.apply(SessionUpdate::Closed);
        self.store.seal();
        self.phase = Phase::Terminated;

        if let Some(tx) = self.events_tx.take() {
            let _ = tx.send(SessionEvent::Shutdown);
        }
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                error!("Session worker ended abnormally: {}", e);
            }
        }
        info!("Sensor session shut down");
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.store.seal();
        if let Some(tx) = self.events_tx.take() {
            let _ = tx.send(SessionEvent::Shutdown);
        }
    }
}

struct SessionWorker<T: Transport> {
    transport: T,
    topic: String,
    store: Arc<StateStore>,
    bridge: LifecycleBridge,
    subscription: LifecycleSubscription,
}

impl<T: Transport> SessionWorker<T> {
    async fn run(mut self, mut events: mpsc::UnboundedReceiver<SessionEvent>) {
        debug!("Session worker started");

        while let Some(event) = events.recv().await {
            if self.store.is_sealed() || event == SessionEvent::Shutdown {
                break;
            }
            self.handle(event).await;
        }

        self.transport.close().await;
        self.subscription.detach();
        debug!("Session worker stopped");
    }

    async fn handle(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Transport(event) => self.handle_transport(event).await,
            SessionEvent::Lifecycle(signal) => {
                lifecycle_span!(signal = %signal).in_scope(|| {
                    if self.bridge.on_signal(signal) {
                        info!("Host returned to foreground");
                        self.force_reconnect();
                    }
                });
            }
            SessionEvent::ReconnectRequested => self.force_reconnect(),
            SessionEvent::Shutdown => {}
        }
    }

    async fn handle_transport(&mut self, event: TransportEvent) {
        let update = match event {
            TransportEvent::Connected => {
                let subscribe_error = match self.transport.subscribe(&self.topic).await {
                    Ok(()) => None,
                    Err(e) => {
                        warn!("Subscribe request failed: {}", e);
                        Some(SessionError::subscribe(e.to_string()))
                    }
                };
                SessionUpdate::Connected { subscribe_error }
            }
            TransportEvent::Reconnecting => SessionUpdate::Reconnecting,
            TransportEvent::Lost(reason) => {
                warn!("Connection lost: {}", reason);
                SessionUpdate::ConnectionLost
            }
            TransportEvent::Error(reason) => {
                error!("Transport error: {}", reason);
                SessionUpdate::TransportFailed(SessionError::transport(reason))
            }
            TransportEvent::Closed => SessionUpdate::Closed,
            TransportEvent::SubscribeRejected(reason) => {
                warn!("Subscription rejected: {}", reason);
                SessionUpdate::SubscribeRejected(SessionError::subscribe(reason))
            }
            TransportEvent::Message { topic, payload } => {
                if !topic_matches_filter(&self.topic, &topic) {
                    debug!("Ignoring message on unrelated topic {}", topic);
                    return;
                }
                match decode_reading(&payload, Utc::now()) {
                    Ok(reading) => SessionUpdate::ReadingDecoded(reading),
                    Err(e) => {
                        warn!("Failed to decode reading on {}: {:?}", topic, e);
                        SessionUpdate::DecodeFailed(SessionError::decode(&e))
                    }
                }
            }
        };

        self.store.apply(update);
    }

    fn force_reconnect(&self) {
        if self.transport.is_connected() {
            debug!("Reconnect skipped: transport already connected");
            return;
        }
        info!("Forcing reconnect");
        self.transport.reconnect();
        self.store.apply(SessionUpdate::ConnectRequested);
    }
}
