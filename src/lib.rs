//! Sensor Monitor
//!
//! Subscribes to a live sensor topic on an MQTT broker, tracks connection
//! health through a small state machine, and keeps a trailing window of the
//! most recent readings for trend display.
//!
//! # Overview
//!
//! - [`config`] - TOML configuration and the broker settings validator
//! - [`session`] - state machine, trailing window, observable snapshot store
//!   and the session manager
//! - [`protocol`] - reading decoder and topic matching
//! - [`lifecycle`] - host foreground/background signals
//! - [`transport`] - transport abstraction and the rumqttc implementation
//! - [`history`] - client for persisted readings
//! - [`observability`] - logging and HTTP status endpoints
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use sensor_monitor::config::MqttSection;
//! use sensor_monitor::lifecycle::HostLifecycle;
//! use sensor_monitor::session::SessionManager;
//! use sensor_monitor::transport::mqtt::MqttTransportFactory;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let mut session = SessionManager::new(MqttSection {
//!     broker_url: "mqtt://localhost:1883".to_string(),
//!     topic: "sensors/temperature".to_string(),
//!     ..Default::default()
//! });
//!
//! let mut snapshots = session.subscribe();
//! session.start(&MqttTransportFactory, Arc::new(HostLifecycle::default()))?;
//!
//! while snapshots.changed().await.is_ok() {
//!     let snapshot = snapshots.borrow_and_update().clone();
//!     println!("{:?} {:?}", snapshot.connection_state, snapshot.history.trend_points());
//! }
//! # Ok::<(), sensor_monitor::MonitorError>(())
//! # });
//! ```

pub mod config;
pub mod error;
pub mod history;
pub mod lifecycle;
pub mod observability;
pub mod protocol;
pub mod session;
pub mod testing;
pub mod transport;

pub use config::{validate_broker_settings, ConfigError, MonitorConfig, MqttSection};
pub use error::{ErrorKind, MonitorError, MonitorResult, SessionError};
pub use lifecycle::{HostLifecycle, LifecycleBridge, LifecycleSignal, LifecycleSource};
pub use protocol::{decode_reading, DecodeError, Reading, ReadingSource};
pub use session::{ConnectionState, SessionManager, SessionSnapshot, TrailingWindow};
pub use transport::mqtt::MqttTransportFactory;
