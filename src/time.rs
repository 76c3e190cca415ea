//! Wall-clock helpers shared across stores that stamp rows in seconds since
//! epoch (§3 `updated_at`, `created_at`, `deleted_at`; §4.7 `timestamp`).

use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch, saturating to `0` if the clock is somehow
/// set before it.
#[must_use]
pub fn now_secs() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}
