use std::time::Duration;

use tracing::debug;

/// Reference poll period.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(3000);

/// Handle returned by [`Poller::start`]; stopping with a stale handle is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelToken(u64);

/// Issued for every fetch. A response is applied only if its ticket is still
/// accepted when it comes back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickTicket {
    pub seq: u64,
    generation: u64,
}

/// Fixed-cadence poll gate.
///
/// The timer itself lives in the runtime; this decides whether a tick may
/// fetch and whether a completed fetch may be applied. Sequences increase
/// monotonically across restarts so a response from an earlier run can never
/// match.
#[derive(Debug)]
pub struct Poller {
    interval: Duration,
    running: bool,
    generation: u64,
    next_seq: u64,
    last_applied: u64,
    input_focused: bool,
}

impl Poller {
    /// Create a stopped poller ticking every `interval`.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            running: false,
            generation: 0,
            next_seq: 1,
            last_applied: 0,
            input_focused: false,
        }
    }

    /// Period the runtime's timer should use.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Begin a poll run. Calling it while running returns the current run's
    /// token without starting a new one.
    pub fn start(&mut self) -> CancelToken {
        if !self.running {
            self.generation += 1;
            self.running = true;
            debug!(generation = self.generation, "Poller started");
        }
        CancelToken(self.generation)
    }

    /// Idempotent. After this returns no ticket is issued and every
    /// outstanding one is refused by [`Poller::accept`].
    pub fn stop(&mut self, token: CancelToken) {
        if self.running && token.0 == self.generation {
            self.running = false;
            self.generation += 1;
            debug!("Poller stopped");
        }
    }

    /// Skip scheduled ticks while the operator is typing.
    pub fn set_input_focused(&mut self, focused: bool) {
        self.input_focused = focused;
    }

    pub fn input_focused(&self) -> bool {
        self.input_focused
    }

    /// Scheduled tick. `None` means skip this tick (nothing is queued).
    pub fn begin_tick(&mut self) -> Option<TickTicket> {
        if self.input_focused {
            debug!("Tick skipped: input focused");
            return None;
        }
        self.force_tick()
    }

    /// Tick that bypasses the input-focus gate, used after a dispatch.
    pub fn force_tick(&mut self) -> Option<TickTicket> {
        if !self.running {
            return None;
        }
        let ticket = TickTicket {
            seq: self.next_seq,
            generation: self.generation,
        };
        self.next_seq += 1;
        Some(ticket)
    }

    /// Whether a completed fetch may be applied. Accepting marks it as the
    /// latest applied, so any older ticket is refused afterwards.
    pub fn accept(&mut self, ticket: TickTicket) -> bool {
        if !self.running || ticket.generation != self.generation {
            debug!(seq = ticket.seq, "Discarding response from stopped poll run");
            return false;
        }
        if ticket.seq <= self.last_applied {
            debug!(
                seq = ticket.seq,
                last_applied = self.last_applied,
                "Discarding stale poll response"
            );
            return false;
        }
        self.last_applied = ticket.seq;
        true
    }
}

impl Default for Poller {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_ticks_before_start() {
        let mut poller = Poller::default();
        assert_eq!(poller.interval(), Duration::from_millis(3000));
        assert!(poller.begin_tick().is_none());
        assert!(poller.force_tick().is_none());
    }

    #[test]
    fn test_stale_response_is_discarded() {
        let mut poller = Poller::default();
        poller.start();
        let older = poller.begin_tick().unwrap();
        let newer = poller.begin_tick().unwrap();
        assert!(newer.seq > older.seq);
        assert!(poller.accept(newer));
        assert!(!poller.accept(older));
        assert!(!poller.accept(newer), "a ticket applies at most once");
    }

    #[test]
    fn test_in_order_responses_all_apply() {
        let mut poller = Poller::default();
        poller.start();
        let a = poller.begin_tick().unwrap();
        let b = poller.begin_tick().unwrap();
        assert!(poller.accept(a));
        assert!(poller.accept(b));
    }

    #[test]
    fn test_stop_is_idempotent_and_rejects_in_flight() {
        let mut poller = Poller::default();
        let token = poller.start();
        let in_flight = poller.begin_tick().unwrap();
        poller.stop(token);
        poller.stop(token);
        assert!(!poller.is_running());
        assert!(poller.begin_tick().is_none());
        assert!(!poller.accept(in_flight));
    }

    #[test]
    fn test_restart_does_not_revive_old_tickets() {
        let mut poller = Poller::default();
        let first = poller.start();
        let old = poller.begin_tick().unwrap();
        poller.stop(first);
        let second = poller.start();
        assert_ne!(first, second);
        assert!(!poller.accept(old));

        // A stale handle from the first run cannot stop the second.
        poller.stop(first);
        assert!(poller.is_running());
        let fresh = poller.begin_tick().unwrap();
        assert!(fresh.seq > old.seq);
        assert!(poller.accept(fresh));
    }

    #[test]
    fn test_input_focus_skips_scheduled_but_not_forced_ticks() {
        let mut poller = Poller::default();
        poller.start();
        poller.set_input_focused(true);
        assert!(poller.begin_tick().is_none());
        let forced = poller.force_tick().unwrap();
        assert!(poller.accept(forced));
        poller.set_input_focused(false);
        assert!(poller.begin_tick().is_some());
    }
}
