//! Circuit breaker for remote bar providers.
//!
//! A 403 from the provider opens the breaker at once; repeated 429s or
//! server errors open it after `failure_threshold` consecutive failures.
//! While open, every request is refused until the cooldown has elapsed.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed { failures: u32 },
    Open { since: Instant },
}

#[derive(Debug)]
pub struct CircuitBreaker {
    state: Mutex<State>,
    cooldown: Duration,
    failure_threshold: u32,
}

impl CircuitBreaker {
    pub fn new(cooldown: Duration, failure_threshold: u32) -> Self {
        Self {
            state: Mutex::new(State::Closed { failures: 0 }),
            cooldown,
            failure_threshold: failure_threshold.max(1),
        }
    }

    /// 15-minute cooldown, opens after 3 consecutive failures.
    pub fn for_provider() -> Self {
        Self::new(Duration::from_secs(15 * 60), 3)
    }

    /// True when a request may be sent. An expired cooldown closes the breaker.
    pub fn allows_request(&self) -> bool {
        let mut state = self.lock();
        match *state {
            State::Closed { .. } => true,
            State::Open { since } if since.elapsed() >= self.cooldown => {
                *state = State::Closed { failures: 0 };
                true
            }
            State::Open { .. } => false,
        }
    }

    pub fn record_success(&self) {
        let mut state = self.lock();
        if let State::Closed { failures } = &mut *state {
            *failures = 0;
        }
    }

    pub fn record_failure(&self) {
        let mut state = self.lock();
        if let State::Closed { failures } = *state {
            let failures = failures + 1;
            *state = if failures >= self.failure_threshold {
                State::Open {
                    since: Instant::now(),
                }
            } else {
                State::Closed { failures }
            };
        }
    }

    /// Open immediately (the provider refused us outright).
    pub fn open(&self) {
        *self.lock() = State::Open {
            since: Instant::now(),
        };
    }

    /// Time left before requests are allowed again; zero while closed.
    pub fn remaining_cooldown(&self) -> Duration {
        match *self.lock() {
            State::Closed { .. } => Duration::ZERO,
            State::Open { since } => self.cooldown.saturating_sub(since.elapsed()),
        }
    }

    // A panic while holding the lock cannot leave `State` half-written.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_until_threshold_is_reached() {
        let breaker = CircuitBreaker::new(Duration::from_secs(60), 3);
        assert!(breaker.allows_request());
        breaker.record_failure();
        breaker.record_failure();
        assert!(breaker.allows_request());
        breaker.record_failure();
        assert!(!breaker.allows_request());
        assert!(breaker.remaining_cooldown() > Duration::ZERO);
    }

    #[test]
    fn success_clears_the_failure_count() {
        let breaker = CircuitBreaker::new(Duration::from_secs(60), 2);
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        assert!(breaker.allows_request());
    }

    #[test]
    fn open_refuses_until_cooldown_expires() {
        let breaker = CircuitBreaker::new(Duration::from_millis(10), 3);
        breaker.open();
        assert!(!breaker.allows_request());
        std::thread::sleep(Duration::from_millis(20));
        assert!(breaker.allows_request());
        assert_eq!(breaker.remaining_cooldown(), Duration::ZERO);
    }
}
