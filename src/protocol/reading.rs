//! Live sensor readings and the inbound payload decoder
//!
//! Wire contract: a JSON object with an optional numeric `value` and an
//! optional `observedAt` timestamp string. `temperature` and `timestamp` are
//! accepted as aliases for sensors that publish the older field names.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Origin of a reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingSource {
    Live,
}

/// One decoded sensor reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    /// `None` when the payload carried no value
    pub value: Option<f64>,
    /// Sensor-supplied timestamp, or the receive time when absent
    pub observed_at: String,
    pub source: ReadingSource,
}

/// Decoding failures. Every variant renders the same user-facing message.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Invalid data format received")]
    Malformed(#[source] serde_json::Error),
    #[error("Invalid data format received")]
    NotAnObject,
}

#[derive(Debug, Deserialize)]
struct ReadingPayload {
    #[serde(default, alias = "temperature")]
    value: Option<f64>,
    #[serde(default, rename = "observedAt", alias = "timestamp")]
    observed_at: Option<String>,
}

/// Decode a raw message payload into a [`Reading`].
///
/// `received_at` fills `observed_at` when the payload has none.
pub fn decode_reading(payload: &[u8], received_at: DateTime<Utc>) -> Result<Reading, DecodeError> {
    let document: Value = serde_json::from_slice(payload).map_err(DecodeError::Malformed)?;
    if !document.is_object() {
        return Err(DecodeError::NotAnObject);
    }

    let parsed: ReadingPayload =
        serde_json::from_value(document).map_err(DecodeError::Malformed)?;

    Ok(Reading {
        value: parsed.value,
        observed_at: parsed
            .observed_at
            .unwrap_or_else(|| received_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
        source: ReadingSource::Live,
    })
}
