//! Timestamp conversion at the storage boundary.
//!
//! Times are stored as Unix milliseconds (INTEGER) so the exit statement can
//! compute dwell with exact integer arithmetic; `chrono` types appear only
//! on either side of this module.

use chrono::{DateTime, TimeZone, Utc};

use crate::error::StoreError;

pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> Result<DateTime<Utc>, StoreError> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp out of range: {ms}")))
}

pub(crate) fn from_millis_opt(ms: Option<i64>) -> Result<Option<DateTime<Utc>>, StoreError> {
    ms.map(from_millis).transpose()
}
