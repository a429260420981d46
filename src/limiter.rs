//! Windowed admission gate for the submission loops.
//!
//! The limiter admits up to `rate` operations per window, then denies until
//! the window rolls over. Bursts of up to `rate` are allowed at the start of
//! each window; there is no smoothing within a window.

use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct RateWindow {
    rate: u32,
    cycle: Duration,
    begin: Instant,
    count: u32,
}

/// Runtime-adjustable rate limiter shared between a session's rate-update
/// listener (writer) and its submission loop (reader).
///
/// A rate of `0` denies every acquisition and is how "stop" is implemented.
#[derive(Debug)]
pub struct RateLimiter {
    window: Mutex<RateWindow>,
}

impl RateLimiter {
    /// Create a limiter that denies everything until [`configure`] is called.
    ///
    /// [`configure`]: RateLimiter::configure
    pub fn new() -> Self {
        Self {
            window: Mutex::new(RateWindow {
                rate: 0,
                cycle: Duration::from_secs(1),
                begin: Instant::now(),
                count: 0,
            }),
        }
    }

    /// Replace the rate and window, resetting the counter and window start.
    ///
    /// Safe to call concurrently with [`try_acquire`]; both observe a
    /// consistent rate/window/count tuple.
    ///
    /// [`try_acquire`]: RateLimiter::try_acquire
    pub fn configure(&self, rate: u32, cycle: Duration) {
        let mut w = self.window.lock().expect("limiter mutex poisoned");
        w.rate = rate;
        w.cycle = cycle;
        w.begin = Instant::now();
        w.count = 0;
    }

    /// Returns whether one more operation may proceed in the current window.
    pub fn try_acquire(&self) -> bool {
        let mut w = self.window.lock().expect("limiter mutex poisoned");
        if w.rate == 0 {
            return false;
        }
        if w.count == w.rate {
            let now = Instant::now();
            if now.duration_since(w.begin) >= w.cycle {
                w.begin = now;
                w.count = 1;
                true
            } else {
                false
            }
        } else {
            w.count += 1;
            true
        }
    }

    /// The currently configured rate.
    pub fn rate(&self) -> u32 {
        self.window.lock().expect("limiter mutex poisoned").rate
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_rate_denies_everything() {
        let limiter = RateLimiter::new();
        assert!(!limiter.try_acquire());

        limiter.configure(5, Duration::from_secs(1));
        assert!(limiter.try_acquire());

        limiter.configure(0, Duration::from_secs(1));
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn admits_exactly_rate_per_window() {
        let limiter = RateLimiter::new();
        limiter.configure(3, Duration::from_millis(50));

        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
        assert!(!limiter.try_acquire());

        std::thread::sleep(Duration::from_millis(60));

        // Window rolled over: another full batch is admitted.
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn configure_resets_window_and_count() {
        let limiter = RateLimiter::new();
        limiter.configure(1, Duration::from_secs(10));
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());

        // Reconfiguring mid-window starts a fresh window.
        limiter.configure(2, Duration::from_secs(10));
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
        assert_eq!(limiter.rate(), 2);
    }
}
