//! A small circuit breaker for outbound API calls.
//!
//! After a run of consecutive transport failures the breaker opens and
//! requests fail fast until the cool-down elapses; the next attempt after
//! that probes the server again.

use std::sync::Mutex;
use std::time::{Duration, Instant};

const FAILURE_THRESHOLD: u32 = 3;
const OPEN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_failures: u32,
    open_until: Option<Instant>,
}

#[derive(Debug, Default)]
pub(crate) struct Breaker {
    state: Mutex<BreakerState>,
}

impl Breaker {
    /// `true` when the call may proceed.
    pub fn allow(&self) -> bool {
        let mut state = self.state.lock().expect("breaker lock poisoned");

        match state.open_until {
            Some(until) if Instant::now() < until => false,
            Some(_) => {
                // Cool-down elapsed: half-open, let one attempt probe.
                state.open_until = None;
                true
            }
            None => true,
        }
    }

    pub fn record_success(&self) {
        let mut state = self.state.lock().expect("breaker lock poisoned");
        state.consecutive_failures = 0;
        state.open_until = None;
    }

    pub fn record_failure(&self) {
        let mut state = self.state.lock().expect("breaker lock poisoned");
        state.consecutive_failures += 1;
        if state.consecutive_failures >= FAILURE_THRESHOLD {
            state.open_until = Some(Instant::now() + OPEN_TIMEOUT);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold_failures() {
        let breaker = Breaker::default();
        assert!(breaker.allow());

        for _ in 0..FAILURE_THRESHOLD {
            breaker.record_failure();
        }
        assert!(!breaker.allow());
    }

    #[test]
    fn success_resets_failure_run() {
        let breaker = Breaker::default();
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        assert!(breaker.allow());
    }
}
