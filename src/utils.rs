//! # Utility Functions
//!
//! Small, widely used helpers: human-readable formatting for log lines
//! and monitor snapshots, and timestamp/nonce generation for the
//! handshake and ping machinery. Adapted from the teacher's `utils.rs`
//! formatter style (`format_bytes`/`format_duration` in spirit), scoped
//! down from a benchmark-report formatter to what the connection engine
//! itself needs for logging.

use std::time::{SystemTime, UNIX_EPOCH};

/// Format a byte count as a human-readable string (`1536` -> `"1.5 KiB"`).
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[unit])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// Format a bytes/second rate the same way, with a `/s` suffix.
pub fn format_rate(bytes_per_sec: f64) -> String {
    format!("{}/s", format_bytes(bytes_per_sec.round() as u64))
}

/// Current time as milliseconds since the Unix epoch, used for ping RTT
/// measurement and handshake parameter exchange timestamps.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Generate a fresh, process-unique nonce for PING signals.
pub fn fresh_nonce() -> i64 {
    use std::sync::atomic::{AtomicI64, Ordering};
    static COUNTER: AtomicI64 = AtomicI64::new(1);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}
