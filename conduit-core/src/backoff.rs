//! Exponential backoff with jitter, used by `RetryingRegistration` and RPC
//! client retry loops. A standalone, reusable sequence rather than a
//! one-off computed inline in the registration loop.

use rand::Rng;
use std::time::Duration;

/// A capped, jittered exponential backoff sequence. Call `next_delay()` to
/// advance and `reset()` after a success.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial: Duration,
    max: Duration,
    multiplier: f64,
    jitter: f64,
    current: Duration,
}

impl ExponentialBackoff {
    pub fn new(initial: Duration, max: Duration, multiplier: f64, jitter: f64) -> Self {
        Self {
            initial,
            max,
            multiplier,
            jitter: jitter.clamp(0.0, 1.0),
            current: initial,
        }
    }

    /// Returns the delay to wait, then advances internal state for the next
    /// call. Jitter is applied multiplicatively so repeated callers racing
    /// the same retry don't thunder in lockstep.
    pub fn next_delay(&mut self) -> Duration {
        let base = self.current;
        let next = self.current.mul_f64(self.multiplier);
        self.current = next.min(self.max);

        if self.jitter == 0.0 {
            return base;
        }
        let mut rng = rand::thread_rng();
        let factor = 1.0 - self.jitter + rng.gen_range(0.0..=2.0 * self.jitter);
        base.mul_f64(factor.max(0.0))
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

impl Default for ExponentialBackoff {
    /// Matches the poll-backoff shape of 10ms initial, factor 2,
    /// capped at 2s, with modest jitter to avoid synchronized retries.
    fn default() -> Self {
        Self::new(Duration::from_millis(10), Duration::from_millis(2000), 2.0, 0.1)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn delays_grow_and_cap() {
        let mut b = ExponentialBackoff::new(Duration::from_millis(10), Duration::from_millis(100), 2.0, 0.0);
        assert_eq!(b.next_delay(), Duration::from_millis(10));
        assert_eq!(b.next_delay(), Duration::from_millis(20));
        assert_eq!(b.next_delay(), Duration::from_millis(40));
        assert_eq!(b.next_delay(), Duration::from_millis(80));
        assert_eq!(b.next_delay(), Duration::from_millis(100));
        assert_eq!(b.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn reset_returns_to_initial() {
        let mut b = ExponentialBackoff::new(Duration::from_millis(10), Duration::from_millis(100), 2.0, 0.0);
        b.next_delay();
        b.next_delay();
        b.reset();
        assert_eq!(b.next_delay(), Duration::from_millis(10));
    }

    #[test]
    fn jitter_stays_non_negative_and_bounded() {
        let mut b = ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(10), 1.0, 0.5);
        for _ in 0..50 {
            let d = b.next_delay();
            assert!(d >= Duration::from_millis(50));
            assert!(d <= Duration::from_millis(150));
        }
    }
}
