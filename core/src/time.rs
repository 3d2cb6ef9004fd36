//! Timestamp helpers shared by the store and engine crates.

use chrono::Utc;

#[must_use]
pub fn now_unix_ms() -> i64 {
    Utc::now().timestamp_millis()
}
