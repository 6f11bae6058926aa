use crate::services::metadata::FileRecord;
use chrono::{DateTime, Duration, Utc};

/// Expiry is classified on every read; nothing is ever written to mark a
/// record as expired.
pub fn is_expired_at(record: &FileRecord, now: DateTime<Utc>) -> bool {
    record.expires_at.is_some_and(|expires| expires < now)
}

pub fn is_expired(record: &FileRecord) -> bool {
    is_expired_at(record, Utc::now())
}

pub fn expires_at_from_hours(now: DateTime<Utc>, hours: Option<i64>) -> Option<DateTime<Utc>> {
    hours
        .and_then(Duration::try_hours)
        .and_then(|ttl| now.checked_add_signed(ttl))
}

/// Whole seconds from `now` until `expires_at`, at least one.
pub fn ttl_seconds(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<u64> {
    expires_at.map(|at| (at - now).num_seconds().max(1) as u64)
}
