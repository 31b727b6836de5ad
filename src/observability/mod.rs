//! Observability: structured logging and HTTP status endpoints

pub mod logging;
pub mod status;

pub use logging::{init_default_logging, init_logging, parse_level, LogFormat};
pub use status::{routes, HealthReport, StatusServer};

// Span macros for structured logging
pub use logging::{lifecycle_span, mqtt_span, session_span};
