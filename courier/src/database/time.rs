//! Timestamp helpers for the database layer.
//!
//! We store timestamps as `INTEGER` Unix epoch seconds (UTC) in SQLite.

use chrono::{DateTime, TimeZone, Utc};

/// Current time as Unix epoch seconds (UTC).
#[inline]
pub fn now_secs() -> i64 {
    Utc::now().timestamp()
}

/// Convert Unix epoch seconds to `DateTime<Utc>`.
///
/// Values outside chrono's supported range fall back to the Unix epoch.
#[inline]
pub fn secs_to_datetime(secs: i64) -> DateTime<Utc> {
    match Utc.timestamp_opt(secs, 0) {
        chrono::LocalResult::Single(dt) => dt,
        chrono::LocalResult::Ambiguous(dt, _) => dt,
        chrono::LocalResult::None => DateTime::<Utc>::UNIX_EPOCH,
    }
}
