//! Tempo arbitration (design document §4.4 "tempo arbitration").
//!
//! Each side tracks its own last-proposed value and the peer's
//! last-announced value, each timestamped. The effective tempo for a
//! non-fixed endpoint is whichever of the two is more recent; a fixed
//! endpoint always reports its own value and reasserts it (rather than
//! adopting) whenever the peer proposes something else, which is what
//! makes a fixed endpoint's tempo win even against later peer proposals.

use std::time::Instant;

pub struct TempoState {
    fixed: bool,
    local_value: i64,
    local_set_at: Instant,
    remote_value: i64,
    remote_set_at: Instant,
}

impl TempoState {
    pub fn new(initial: i64, fixed: bool) -> Self {
        let now = Instant::now();
        TempoState {
            fixed,
            local_value: initial,
            local_set_at: now,
            remote_value: -1,
            remote_set_at: now,
        }
    }

    /// Record a local `set_tempo` call. Returns the new effective value.
    pub fn propose_local(&mut self, value: i64) -> i64 {
        self.local_value = value;
        self.local_set_at = Instant::now();
        self.effective()
    }

    /// Record a TEMPO signal received from the peer. Returns `Some(v)`
    /// when this endpoint should reassert its own value back to the peer
    /// (because it is fixed and the peer proposed something else),
    /// `None` otherwise.
    pub fn receive_remote(&mut self, value: i64) -> Option<i64> {
        if self.fixed {
            if value != self.local_value {
                return Some(self.local_value);
            }
            return None;
        }
        self.remote_value = value;
        self.remote_set_at = Instant::now();
        None
    }

    pub fn effective(&self) -> i64 {
        if self.fixed {
            return self.local_value;
        }
        if self.remote_set_at > self.local_set_at {
            self.remote_value
        } else {
            self.local_value
        }
    }

    pub fn set_fixed(&mut self, fixed: bool) {
        self.fixed = fixed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn most_recent_proposal_wins_when_neither_fixed() {
        let mut a = TempoState::new(-1, false);
        a.propose_local(20000);
        assert_eq!(a.effective(), 20000);
        std::thread::sleep(std::time::Duration::from_millis(2));
        a.receive_remote(50000);
        assert_eq!(a.effective(), 50000);
    }

    #[test]
    fn fixed_endpoint_ignores_peer_and_reasserts() {
        let mut server = TempoState::new(10000, true);
        let reassert = server.receive_remote(100000);
        assert_eq!(reassert, Some(10000));
        assert_eq!(server.effective(), 10000);
    }
}
