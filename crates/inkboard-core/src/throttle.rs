//! Leading-edge rate limiter for continuous gestures.

use std::time::{Duration, Instant};

/// Default window: 50ms, roughly 20 writes per second
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(50);

/// Lets at most one event through per window.
///
/// The first event of a window passes; the rest are dropped, not queued.
/// Callers that must not lose the final state write it separately.
#[derive(Debug, Clone)]
pub struct Throttle {
    interval: Duration,
    last: Option<Instant>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self { interval, last: None }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns true (and opens a new window) if `now` is past the current window
    pub fn ready(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }

    /// Forget the current window so the next event passes
    pub fn reset(&mut self) {
        self.last = None;
    }
}

impl Default for Throttle {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_event_per_window() {
        let start = Instant::now();
        let mut t = Throttle::new(Duration::from_millis(50));
        assert!(t.ready(start));
        assert!(!t.ready(start + Duration::from_millis(10)));
        assert!(!t.ready(start + Duration::from_millis(49)));
        assert!(t.ready(start + Duration::from_millis(50)));
        assert!(!t.ready(start + Duration::from_millis(60)));
    }

    #[test]
    fn reset_opens_window() {
        let start = Instant::now();
        let mut t = Throttle::default();
        assert!(t.ready(start));
        t.reset();
        assert!(t.ready(start));
    }
}
