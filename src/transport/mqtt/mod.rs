//! MQTT transport built on rumqttc
//!
//! # Architecture
//!
//! - [`connection`] - Pure option building and broker URL parsing
//! - [`message_handler`] - Pure event routing
//! - [`client`] - Impure I/O: the client handle and its retry driver
//!
//! # Usage
//!
//! ```rust,no_run
//! use sensor_monitor::config::MqttSection;
//! use sensor_monitor::transport::mqtt::MqttTransportFactory;
//! use sensor_monitor::transport::{TransportEvents, TransportFactory, TransportOptions};
//!
//! # tokio_test::block_on(async {
//! let section = MqttSection {
//!     broker_url: "mqtt://localhost:1883".to_string(),
//!     topic: "sensors/temperature".to_string(),
//!     ..Default::default()
//! };
//!
//! let (events, mut rx) = TransportEvents::channel();
//! let transport = MqttTransportFactory.open(&TransportOptions::from_section(&section), events)?;
//! while let Some(event) = rx.recv().await {
//!     println!("{event:?}");
//! }
//! # drop(transport);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod client;
pub mod connection;
pub mod message_handler;

pub use client::{MqttTransport, MqttTransportFactory};
pub use connection::{configure_mqtt_options, generate_client_id, parse_broker_url, BrokerAddress};
pub use message_handler::{EventRoute, MessageHandler};
