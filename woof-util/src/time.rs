//! Monotonic time helper shared by capture, the detection tick, and the
//! evidence recorder, so "now" is computed the same way everywhere.

use std::time::{SystemTime, UNIX_EPOCH};

/// Microseconds since an arbitrary but monotonic-per-process epoch.
///
/// We use `SystemTime` rather than `Instant` because this crate's
/// timestamps are persisted to disk (evidence index, fingerprint rows) and
/// need to survive a process restart.
pub fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64
}

pub fn now_utc() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now()
}
