//! Outbound message construction
//!
//! Timestamps are always rendered in UTC+9 regardless of the host's local
//! timezone. The offset is fixed, not looked up from a tz database.

use crate::sensor::SensorReading;
use bytes::Bytes;
use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};

/// Offset applied to every timestamp (UTC+9)
pub const PAYLOAD_UTC_OFFSET_SECS: i32 = 9 * 3600;

/// `2024-01-01 00:00:00.500+0900`
const VERBOSE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f%z";

/// Source of wall-clock time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The host clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Message published once per cycle.
///
/// Field order is part of the wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub id: String,
    /// Milliseconds since the Unix epoch, as a decimal string
    pub timestamp: String,
    pub verbose_timestamp: String,
    pub temperature: f64,
    pub humidity: f64,
    pub lux: i64,
}

impl Payload {
    /// Compact JSON bytes for the transport
    pub fn to_json(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }

    /// Indented JSON for debug logging
    pub fn to_pretty_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Turns sensor readings into payloads for one device
#[derive(Debug, Clone)]
pub struct PayloadBuilder {
    device_id: String,
    offset: FixedOffset,
}

impl PayloadBuilder {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            offset: payload_offset(),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Build the payload for `reading` taken at `now`.
    ///
    /// Reading values pass through unchecked, except `lux` which is truncated
    /// toward zero.
    pub fn build(&self, reading: &SensorReading, now: DateTime<Utc>) -> Payload {
        let local = now.with_timezone(&self.offset);

        Payload {
            id: self.device_id.clone(),
            timestamp: local.timestamp_millis().to_string(),
            verbose_timestamp: local.format(VERBOSE_TIMESTAMP_FORMAT).to_string(),
            temperature: reading.temperature,
            humidity: reading.humidity,
            lux: reading.lux.trunc() as i64,
        }
    }
}

fn payload_offset() -> FixedOffset {
    // constant is within +/-24h, the fallback is unreachable
    FixedOffset::east_opt(PAYLOAD_UTC_OFFSET_SECS).unwrap_or(Utc.fix())
}
