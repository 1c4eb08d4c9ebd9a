//! Core domain types used across ESPCam services

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier reported by a camera unit in the `X-ESP-ID` header.
///
/// Identifiers are compared case-insensitively, so the inner value is always
/// stored trimmed and lowercased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Fallback used when a device does not identify itself.
    pub const UNKNOWN: &'static str = "unknown";

    pub fn new(id: impl AsRef<str>) -> Self {
        Self(id.as_ref().trim().to_lowercase())
    }

    /// Parse an optional header value, falling back to [`DeviceId::UNKNOWN`].
    pub fn from_header(value: Option<&str>) -> Self {
        match value.map(str::trim).filter(|v| !v.is_empty()) {
            Some(v) => Self::new(v),
            None => Self::new(Self::UNKNOWN),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Wall-clock time as epoch milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Wall-clock time as epoch seconds.
pub fn now_secs() -> i64 {
    Utc::now().timestamp()
}
