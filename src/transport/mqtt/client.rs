//! Impure I/O for the MQTT transport
//!
//! [`MqttTransport`] owns one rumqttc client and a spawned connection driver.
//! The driver polls the event loop, reports every lifecycle change through
//! [`TransportEvents`], and runs an explicit fixed-interval retry loop: after a
//! failure it waits out the reconnect period, then opens a brand-new
//! connection with a fresh client id.
//!
//! Forced reconnects are counted in a `watch` generation. A request
//! abandons a pending attempt or cuts the retry wait short. Requests made
//! before a CONNACK are discarded by it.

use super::connection::{configure_mqtt_options, configure_network_options};
use super::message_handler::{EventRoute, MessageHandler};
use crate::mqtt_span;
use crate::transport::{
    Transport, TransportError, TransportEvent, TransportEvents, TransportFactory, TransportOptions,
};
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

/// Request channel capacity between the client handle and its event loop
const REQUEST_CHANNEL_CAPACITY: usize = 10;

/// Factory producing [`MqttTransport`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct MqttTransportFactory;

impl TransportFactory for MqttTransportFactory {
    type Transport = MqttTransport;

    fn open(
        &self,
        options: &TransportOptions,
        events: TransportEvents,
    ) -> Result<MqttTransport, TransportError> {
        MqttTransport::open(options.clone(), events)
    }
}

/// MQTT transport backed by rumqttc
pub struct MqttTransport {
    client: Arc<Mutex<AsyncClient>>,
    connected: Arc<AtomicBool>,
    reconnect_tx: watch::Sender<u64>,
    shutdown_tx: watch::Sender<bool>,
    driver: Option<JoinHandle<()>>,
}

impl MqttTransport {
    /// Create the client and spawn its connection driver. Must run inside a tokio runtime.
    pub fn open(
        options: TransportOptions,
        events: TransportEvents,
    ) -> Result<Self, TransportError> {
        let (client, event_loop) = create_connection(&options)?;
        let client = Arc::new(Mutex::new(client));
        let connected = Arc::new(AtomicBool::new(false));
        let (reconnect_tx, reconnect_rx) = watch::channel(0u64);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let span = mqtt_span!(broker = %options.broker_url);
        let driver = ConnectionDriver {
            options,
            events,
            client: client.clone(),
            connected: connected.clone(),
            reconnect_rx,
            shutdown_rx,
        };
        let handle = tokio::spawn(driver.run(event_loop).instrument(span));

        Ok(Self {
            client,
            connected,
            reconnect_tx,
            shutdown_tx,
            driver: Some(handle),
        })
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn subscribe(&self, topic: &str) -> Result<(), TransportError> {
        info!("Subscribing to sensor topic: {}", topic);
        let client = self.client.lock().await;
        client
            .subscribe(topic, MessageHandler::subscription_qos())
            .await
            .map_err(|e| TransportError::SubscriptionFailed(format!("{topic}: {e}")))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn reconnect(&self) {
        self.reconnect_tx.send_modify(|generation| *generation += 1);
    }

    async fn close(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.driver.take() {
            handle.abort();
            let _ = handle.await;
        }
        self.connected.store(false, Ordering::SeqCst);
        info!("MQTT transport closed");
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.driver.take() {
            handle.abort();
        }
    }
}

/// Create a client/event loop pair for one connection attempt
fn create_connection(
    options: &TransportOptions,
) -> Result<(AsyncClient, EventLoop), TransportError> {
    let mqtt_options = configure_mqtt_options(options)?;
    debug!(client_id = %mqtt_options.client_id(), "Creating MQTT connection");
    let (client, mut event_loop) = AsyncClient::new(mqtt_options, REQUEST_CHANNEL_CAPACITY);
    event_loop.set_network_options(configure_network_options(options.retry.connect_timeout));
    Ok((client, event_loop))
}

/// Outcome of waiting on the event loop once
#[derive(Debug)]
enum Polled {
    Event(Event),
    Failed(String),
    ReconnectRequested,
    Shutdown,
}

/// What the driver does after handling one poll result
#[derive(Debug, PartialEq, Eq)]
enum Step {
    Continue,
    /// Wait out the reconnect period first
    Retry,
    /// Open a new connection right away
    Reconnect,
    Stop,
}

struct ConnectionDriver {
    options: TransportOptions,
    events: TransportEvents,
    client: Arc<Mutex<AsyncClient>>,
    connected: Arc<AtomicBool>,
    reconnect_rx: watch::Receiver<u64>,
    shutdown_rx: watch::Receiver<bool>,
}

impl ConnectionDriver {
    async fn run(mut self, mut event_loop: EventLoop) {
        info!("Starting MQTT connection driver");

        loop {
            let step = match self.next(&mut event_loop).await {
                Polled::Shutdown => Step::Stop,
                Polled::Event(event) => self.handle_event(event),
                Polled::Failed(reason) => self.handle_failure(reason),
                Polled::ReconnectRequested => {
                    info!("Reconnect requested, abandoning pending attempt");
                    Step::Reconnect
                }
            };

            match step {
                Step::Continue => continue,
                Step::Stop => break,
                Step::Retry => {
                    if !self.wait_for_retry().await {
                        break;
                    }
                }
                Step::Reconnect => {}
            }

            match create_connection(&self.options) {
                Ok((client, next_loop)) => {
                    *self.client.lock().await = client;
                    event_loop = next_loop;
                }
                Err(e) => error!("Failed to create new connection: {}", e),
            }
            if !self.events.emit(TransportEvent::Reconnecting) {
                break;
            }
        }

        self.connected.store(false, Ordering::SeqCst);
        info!("MQTT connection driver stopped");
    }

    /// Poll the event loop once.
    ///
    /// Until the CONNACK arrives the attempt is bounded by the connect
    /// timeout and can be abandoned by a reconnect request.
    async fn next(&mut self, event_loop: &mut EventLoop) -> Polled {
        if self.connected.load(Ordering::SeqCst) {
            return tokio::select! {
                biased;
                _ = self.shutdown_rx.changed() => Polled::Shutdown,
                polled = event_loop.poll() => match polled {
                    Ok(event) => Polled::Event(event),
                    Err(e) => Polled::Failed(e.to_string()),
                },
            };
        }

        let connect_timeout = self.options.retry.connect_timeout;
        tokio::select! {
            biased;
            _ = self.shutdown_rx.changed() => Polled::Shutdown,
            requested = self.reconnect_rx.changed() => match requested {
                Ok(()) => Polled::ReconnectRequested,
                Err(_) => Polled::Shutdown,
            },
            polled = tokio::time::timeout(connect_timeout, event_loop.poll()) => match polled {
                Ok(Ok(event)) => Polled::Event(event),
                Ok(Err(e)) => Polled::Failed(e.to_string()),
                Err(_) => Polled::Failed(format!(
                    "Connection attempt timed out after {}ms",
                    connect_timeout.as_millis()
                )),
            },
        }
    }

    fn handle_event(&mut self, event: Event) -> Step {
        let delivered = match MessageHandler::route_mqtt_event(&event) {
            EventRoute::ConnectionAcknowledged => {
                // Requests aimed at the attempt that just succeeded are stale
                self.reconnect_rx.borrow_and_update();
                self.connected.store(true, Ordering::SeqCst);
                self.events.emit(TransportEvent::Connected)
            }
            EventRoute::MessageReceived { topic, payload } => {
                debug!("Received MQTT message on topic: {}", topic);
                self.events.emit(TransportEvent::Message { topic, payload })
            }
            EventRoute::SubscriptionConfirmed { packet_id } => {
                debug!("Subscription confirmed (packet {})", packet_id);
                true
            }
            EventRoute::SubscriptionRejected { packet_id } => {
                warn!("Broker rejected subscription (packet {})", packet_id);
                self.events.emit(TransportEvent::SubscribeRejected(
                    "Subscription rejected by broker".to_string(),
                ))
            }
            EventRoute::Disconnected => {
                self.connected.store(false, Ordering::SeqCst);
                info!("MQTT broker closed the connection");
                return if self.events.emit(TransportEvent::Closed) {
                    Step::Retry
                } else {
                    Step::Stop
                };
            }
            EventRoute::InfrastructureEvent(event) => {
                debug!("MQTT event: {}", event);
                true
            }
            EventRoute::OutgoingEvent => true,
        };

        if delivered {
            Step::Continue
        } else {
            Step::Stop
        }
    }

    fn handle_failure(&self, reason: String) -> Step {
        let event = if self.connected.swap(false, Ordering::SeqCst) {
            warn!("MQTT connection lost: {}", reason);
            TransportEvent::Lost(reason)
        } else {
            error!("MQTT connection attempt failed: {}", reason);
            TransportEvent::Error(reason)
        };

        if self.events.emit(event) {
            Step::Retry
        } else {
            Step::Stop
        }
    }

    /// Wait out the reconnect period. Returns false if shutdown was requested.
    async fn wait_for_retry(&mut self) -> bool {
        let delay = self.options.retry.reconnect_period;
        info!("Reconnecting in {}ms", delay.as_millis());

        tokio::select! {
            biased;
            _ = self.shutdown_rx.changed() => false,
            requested = self.reconnect_rx.changed() => {
                info!("Reconnect requested, skipping remaining delay");
                requested.is_ok()
            }
            _ = tokio::time::sleep(delay) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::RetryPolicy;
    use std::time::{Duration, Instant};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    /// CONNACK with session-present cleared and return code 0
    const CONNACK_ACCEPTED: [u8; 4] = [0x20, 0x02, 0x00, 0x00];

    fn unreachable_options() -> TransportOptions {
        TransportOptions {
            // Port 1 on localhost refuses connections immediately
            broker_url: "mqtt://127.0.0.1:1".to_string(),
            client_id_prefix: "sensor-monitor-test".to_string(),
            keep_alive: Duration::from_secs(60),
            clean_session: true,
            credentials: None,
            retry: RetryPolicy {
                reconnect_period: Duration::from_millis(50),
                connect_timeout: Duration::from_millis(500),
            },
        }
    }

    fn local_options(port: u16, reconnect_period: Duration, connect_timeout: Duration) -> TransportOptions {
        TransportOptions {
            broker_url: format!("mqtt://127.0.0.1:{port}"),
            retry: RetryPolicy {
                reconnect_period,
                connect_timeout,
            },
            ..unreachable_options()
        }
    }

    /// Broker that accepts TCP connections and never answers
    async fn spawn_silent_broker() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        port
    }

    /// Broker that accepts each CONNECT after `delay`, then drops the link after `delay` more
    async fn spawn_flaky_broker(delay: Duration) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = [0u8; 256];
                    let _ = socket.read(&mut buf).await;
                    tokio::time::sleep(delay).await;
                    let _ = socket.write_all(&CONNACK_ACCEPTED).await;
                    tokio::time::sleep(delay).await;
                });
            }
        });
        port
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<TransportEvent>) -> TransportEvent {
        tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("driver should report an event")
            .expect("driver should still be running")
    }

    #[tokio::test]
    async fn test_open_rejects_invalid_url() {
        let (events, _rx) = TransportEvents::channel();
        let mut options = unreachable_options();
        options.broker_url = "invalid-url".to_string();

        let result = MqttTransport::open(options, events);

        assert!(matches!(result, Err(TransportError::InvalidBrokerUrl(_))));
    }

    #[tokio::test]
    async fn test_refused_connection_reports_error_then_retries() {
        let (events, mut rx) = TransportEvents::channel();
        let mut transport = MqttTransport::open(unreachable_options(), events).unwrap();

        let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("driver should report the failure");
        assert!(matches!(first, Some(TransportEvent::Error(_))));
        assert!(!transport.is_connected());

        let second = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("driver should retry after the reconnect period");
        assert_eq!(second, Some(TransportEvent::Reconnecting));

        transport.close().await;
    }

    #[tokio::test]
    async fn test_close_stops_event_delivery() {
        let (events, mut rx) = TransportEvents::channel();
        let mut transport = MqttTransport::open(unreachable_options(), events).unwrap();

        transport.close().await;

        // Driver dropped its sink, so the channel drains and closes
        while let Some(_event) = rx.recv().await {}
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_silent_broker_fails_after_connect_timeout() {
        // Arrange: bound above rumqttc's own 5s default
        let port = spawn_silent_broker().await;
        let connect_timeout = Duration::from_millis(6500);
        let options = local_options(port, Duration::from_secs(60), connect_timeout);
        let (events, mut rx) = TransportEvents::channel();
        let started = Instant::now();

        // Act
        let mut transport = MqttTransport::open(options, events).unwrap();
        let first = next_event(&mut rx).await;

        // Assert
        match first {
            TransportEvent::Error(reason) => {
                assert!(reason.contains("timed out after 6500ms"), "unexpected reason: {reason}");
            }
            other => panic!("expected connect failure, got {other:?}"),
        }
        assert!(started.elapsed() >= Duration::from_millis(6000));
        assert!(!transport.is_connected());

        transport.close().await;
    }

    #[tokio::test]
    async fn test_reconnect_mid_attempt_keeps_retry_period_after_loss() {
        // Arrange
        let port = spawn_flaky_broker(Duration::from_millis(300)).await;
        let reconnect_period = Duration::from_millis(1000);
        let options = local_options(port, reconnect_period, Duration::from_secs(5));
        let (events, mut rx) = TransportEvents::channel();
        let mut transport = MqttTransport::open(options, events).unwrap();

        // Act: request a reconnect while the first CONNACK is still pending
        tokio::time::sleep(Duration::from_millis(50)).await;
        transport.reconnect();

        // Assert: the pending attempt is abandoned right away
        assert_eq!(next_event(&mut rx).await, TransportEvent::Reconnecting);
        assert_eq!(next_event(&mut rx).await, TransportEvent::Connected);
        assert!(transport.is_connected());

        let lost = next_event(&mut rx).await;
        assert!(matches!(lost, TransportEvent::Lost(_)), "got {lost:?}");
        let lost_at = Instant::now();

        // The request was consumed, so the full retry period still applies
        assert_eq!(next_event(&mut rx).await, TransportEvent::Reconnecting);
        assert!(lost_at.elapsed() >= Duration::from_millis(800));

        transport.close().await;
    }

    #[tokio::test]
    async fn test_reconnect_during_retry_wait_skips_delay() {
        // Arrange
        let (events, mut rx) = TransportEvents::channel();
        let mut options = unreachable_options();
        options.retry.reconnect_period = Duration::from_secs(30);
        let mut transport = MqttTransport::open(options, events).unwrap();
        assert!(matches!(next_event(&mut rx).await, TransportEvent::Error(_)));

        // Act
        let requested_at = Instant::now();
        transport.reconnect();

        // Assert
        assert_eq!(next_event(&mut rx).await, TransportEvent::Reconnecting);
        assert!(requested_at.elapsed() < Duration::from_secs(5));

        transport.close().await;
    }
}
