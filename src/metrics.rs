//! # Connection Monitor
//!
//! Live counters exposed by every connection (design document §4.4
//! "Monitor & counters"): exchanged volume, last send/receive
//! timestamps, parcels scheduled, a moving-average send load, file
//! transfer counts, last ping RTT, effective tempo, and the
//! transmitting/idle flags. Adapted from the teacher's `metrics.rs`
//! accumulator pattern (`MetricsCollector`), repurposed from one-shot
//! benchmark statistics to a live, continuously-updated snapshot.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Which side of a connection a `Monitor` is reporting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Client,
    Server,
}

/// Rolling window used to compute the send-side load moving average
/// (also consulted by tempo pacing, design document §4.4).
struct Window {
    samples: VecDeque<(Instant, u64)>,
    span: Duration,
}

impl Window {
    fn new(span: Duration) -> Self {
        Window {
            samples: VecDeque::new(),
            span,
        }
    }

    fn record(&mut self, now: Instant, bytes: u64) {
        self.samples.push_back((now, bytes));
        self.trim(now);
    }

    fn trim(&mut self, now: Instant) {
        while let Some((t, _)) = self.samples.front() {
            if now.duration_since(*t) > self.span {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    fn bytes_per_second(&mut self, now: Instant) -> f64 {
        self.trim(now);
        let total: u64 = self.samples.iter().map(|(_, n)| *n).sum();
        let elapsed = self
            .samples
            .front()
            .map(|(t, _)| now.duration_since(*t).as_secs_f64())
            .unwrap_or(0.0)
            .max(0.050);
        total as f64 / elapsed
    }

    fn bytes_in_window(&mut self, now: Instant) -> u64 {
        self.trim(now);
        self.samples.iter().map(|(_, n)| *n).sum()
    }
}

struct Inner {
    category: Category,
    established_at: chrono::DateTime<chrono::Utc>,
    exchanged_volume: u64,
    last_send: Option<Instant>,
    last_receive: Option<Instant>,
    parcels_scheduled: u64,
    files_incoming: u32,
    files_outgoing: u32,
    files_received_lifetime: u64,
    last_ping_ms: Option<u64>,
    effective_tempo: i64,
    transmitting: bool,
    idle: bool,
    send_window: Window,
}

/// Thread-safe counter bundle; cheap to clone (an `Arc` internally via
/// `parking_lot::Mutex` owned by the connection).
pub struct Monitor {
    inner: Mutex<Inner>,
}

/// Point-in-time snapshot of every counter, for `Connection::monitor()`.
#[derive(Debug, Clone)]
pub struct MonitorSnapshot {
    pub category: Category,
    /// Wall-clock time the connection was constructed, for log lines and
    /// diagnostics that need to correlate against external timestamps
    /// (unlike the rest of this struct, which is built from monotonic
    /// `Instant`s).
    pub established_at: chrono::DateTime<chrono::Utc>,
    pub exchanged_volume: u64,
    pub seconds_since_last_send: Option<f64>,
    pub seconds_since_last_receive: Option<f64>,
    pub parcels_scheduled: u64,
    pub send_load_bytes_per_sec: f64,
    pub files_incoming: u32,
    pub files_outgoing: u32,
    pub files_received_lifetime: u64,
    pub last_ping_ms: Option<u64>,
    pub effective_tempo: i64,
    pub transmitting: bool,
    pub idle: bool,
}

impl Monitor {
    pub fn new(category: Category) -> Self {
        Monitor {
            inner: Mutex::new(Inner {
                category,
                established_at: chrono::Utc::now(),
                exchanged_volume: 0,
                last_send: None,
                last_receive: None,
                parcels_scheduled: 0,
                files_incoming: 0,
                files_outgoing: 0,
                files_received_lifetime: 0,
                last_ping_ms: None,
                effective_tempo: -1,
                transmitting: false,
                idle: false,
                send_window: Window::new(Duration::from_millis(400)),
            }),
        }
    }

    pub fn record_sent(&self, bytes: u64) {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        inner.exchanged_volume += bytes;
        inner.last_send = Some(now);
        inner.send_window.record(now, bytes);
    }

    pub fn record_received(&self, bytes: u64) {
        let mut inner = self.inner.lock();
        inner.exchanged_volume += bytes;
        inner.last_receive = Some(Instant::now());
    }

    pub fn set_parcels_scheduled(&self, n: u64) {
        self.inner.lock().parcels_scheduled = n;
    }

    pub fn file_started(&self, outgoing: bool) {
        let mut inner = self.inner.lock();
        if outgoing {
            inner.files_outgoing += 1;
        } else {
            inner.files_incoming += 1;
        }
    }

    pub fn file_finished(&self, outgoing: bool, received: bool) {
        let mut inner = self.inner.lock();
        if outgoing {
            inner.files_outgoing = inner.files_outgoing.saturating_sub(1);
        } else {
            inner.files_incoming = inner.files_incoming.saturating_sub(1);
            if received {
                inner.files_received_lifetime += 1;
            }
        }
    }

    pub fn set_last_ping_ms(&self, ms: u64) {
        self.inner.lock().last_ping_ms = Some(ms);
    }

    pub fn set_effective_tempo(&self, tempo: i64) {
        self.inner.lock().effective_tempo = tempo;
    }

    pub fn set_transmitting(&self, transmitting: bool) {
        self.inner.lock().transmitting = transmitting;
    }

    pub fn set_idle(&self, idle: bool) {
        self.inner.lock().idle = idle;
    }

    /// Bytes sent within the trailing pacing window, used by tempo
    /// pacing (design document §4.4).
    pub fn bytes_sent_in_window(&self) -> (u64, Duration) {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        let bytes = inner.send_window.bytes_in_window(now);
        let span = inner.send_window.span;
        (bytes, span)
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        let send_load = inner.send_window.bytes_per_second(now);
        MonitorSnapshot {
            category: inner.category,
            established_at: inner.established_at,
            exchanged_volume: inner.exchanged_volume,
            seconds_since_last_send: inner.last_send.map(|t| now.duration_since(t).as_secs_f64()),
            seconds_since_last_receive: inner
                .last_receive
                .map(|t| now.duration_since(t).as_secs_f64()),
            parcels_scheduled: inner.parcels_scheduled,
            send_load_bytes_per_sec: send_load,
            files_incoming: inner.files_incoming,
            files_outgoing: inner.files_outgoing,
            files_received_lifetime: inner.files_received_lifetime,
            last_ping_ms: inner.last_ping_ms,
            effective_tempo: inner.effective_tempo,
            transmitting: inner.transmitting,
            idle: inner.idle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_exchanged_volume_and_file_counts() {
        let m = Monitor::new(Category::Client);
        m.record_sent(100);
        m.record_received(50);
        m.file_started(true);
        m.file_finished(true, false);
        m.file_started(false);
        m.file_finished(false, true);
        let snap = m.snapshot();
        assert_eq!(snap.exchanged_volume, 150);
        assert_eq!(snap.files_outgoing, 0);
        assert_eq!(snap.files_incoming, 0);
        assert_eq!(snap.files_received_lifetime, 1);
    }
}
