//! Error types for the sensor monitor
//!
//! Errors raised inside the session never cross the core boundary. They are
//! folded into a [`SessionError`] (kind + message) and stored in the snapshot.
//! [`MonitorError`] is only returned by bootstrap operations such as
//! `SessionManager::start`.

use crate::config::ConfigError;
use crate::history::HistoryError;
use crate::protocol::DecodeError;
use crate::transport::TransportError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Classification of an error surfaced through the snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing broker URL or topic; no connection attempted
    Config,
    /// Connect/reconnect failure reported by the broker link
    Transport,
    /// Subscribe request rejected after a successful connect
    Subscribe,
    /// Malformed inbound payload
    Decode,
}

/// Error as seen by consumers of the snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionError {
    pub kind: ErrorKind,
    pub message: String,
}

impl SessionError {
    pub fn new<S: Into<String>>(kind: ErrorKind, message: S) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn config(error: &ConfigError) -> Self {
        Self::new(ErrorKind::Config, error.to_string())
    }

    pub fn transport<S: AsRef<str>>(message: S) -> Self {
        Self::new(ErrorKind::Transport, sanitize_error_message(message.as_ref()))
    }

    pub fn subscribe<S: AsRef<str>>(message: S) -> Self {
        Self::new(ErrorKind::Subscribe, sanitize_error_message(message.as_ref()))
    }

    pub fn decode(error: &DecodeError) -> Self {
        Self::new(ErrorKind::Decode, error.to_string())
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Errors returned by bootstrap operations
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("History error: {0}")]
    History(#[from] HistoryError),

    #[error("Session already started")]
    AlreadyStarted,

    #[error("Session has been shut down")]
    Terminated,
}

/// Result type for monitor operations
pub type MonitorResult<T> = Result<T, MonitorError>;

const MAX_MESSAGE_LEN: usize = 500;

static SECRET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(password|passwd|token|key|secret)[=:]\s*\S+").expect("static regex")
});

static URL_USERINFO_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"://[^/\s:@]+:[^/\s@]+@").expect("static regex"));

/// Redact credentials and cap the length of messages shown to consumers
pub fn sanitize_error_message(message: &str) -> String {
    let mut sanitized = SECRET_PATTERN
        .replace_all(message, "${1}=***")
        .to_string();

    sanitized = URL_USERINFO_PATTERN
        .replace_all(&sanitized, "://***@")
        .to_string();

    if sanitized.len() > MAX_MESSAGE_LEN {
        let truncate_suffix = "...[truncated]";
        let mut cut = MAX_MESSAGE_LEN - truncate_suffix.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized = format!("{}{}", &sanitized[..cut], truncate_suffix);
    }

    sanitized
}
