//! Idle detection and keepalive (design document §4.4 "Idle, keepalive,
//! ping"): a single background task per connection, ticking at a
//! resolution fine enough to honour both `alive_period` and
//! `idle_check_period` without spawning a task per timer.

use std::sync::Arc;
use std::time::Duration;

use crate::connection::Connection;
use crate::events::Event;
use crate::signal::Signal;

const TICK: Duration = Duration::from_millis(100);

pub async fn run_idle_task(conn: Arc<Connection>) {
    let mut last_exchange_check = conn.monitor.snapshot().exchanged_volume;
    let mut was_idle = false;
    let mut since_idle_check = Duration::ZERO;

    let mut interval = tokio::time::interval(TICK);
    loop {
        interval.tick().await;
        if conn.terminate.load(std::sync::atomic::Ordering::SeqCst) {
            break;
        }

        let config = conn.config();
        let snapshot = conn.monitor.snapshot();

        if !config.alive_period.is_zero() {
            if snapshot.seconds_since_last_send.unwrap_or(f64::MAX) * 1000.0 >= config.alive_period.as_millis() as f64
            {
                conn.send_signal_unbound(Signal::Alive).await;
            }
        }

        since_idle_check += TICK;
        if since_idle_check >= config.idle_check_period {
            since_idle_check = Duration::ZERO;
            let exchanged_now = snapshot.exchanged_volume;
            let delta = exchanged_now.saturating_sub(last_exchange_check);
            last_exchange_check = exchanged_now;
            let is_idle = delta < config.idle_threshold;
            if is_idle != was_idle {
                was_idle = is_idle;
                conn.monitor.set_idle(is_idle);
                conn.emit(Event::IdleChanged {
                    idle: is_idle,
                    exchange: delta,
                });
            }
        }
    }
}
