//! Timestamp utilities

use chrono::{DateTime, TimeZone, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Convert a filesystem modification time to a UTC timestamp
///
/// Falls back to the UNIX epoch when the platform reports a time before it.
pub fn from_system_time(t: std::time::SystemTime) -> DateTime<Utc> {
    match t.duration_since(std::time::UNIX_EPOCH) {
        Ok(d) => Utc
            .timestamp_opt(d.as_secs() as i64, d.subsec_nanos())
            .single()
            .unwrap_or_else(Utc::now),
        Err(_) => Utc.timestamp_opt(0, 0).single().unwrap_or_else(Utc::now),
    }
}
