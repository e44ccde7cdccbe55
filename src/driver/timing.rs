//! Bounded polling against a monotonic clock
//!
//! The reflectance array times its discharge by busy-polling the lines; the
//! range finder stamps its echo edges. This module holds the clock abstraction
//! they share and the polling loop that guarantees a busy-wait gives up once its
//! deadline has passed.

use embassy_time::{Duration, Instant};

/// Monotonic time source
pub trait Clock {
    /// Current instant, never going backwards
    fn now(&self) -> Instant;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

/// Embassy time driver clock, used on the target
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A poll ran into its deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PollTimeout {
    /// Time spent polling before giving up
    pub elapsed: Duration,
}

/// Polls `sample` until it yields a value or `timeout` has elapsed since `start`.
///
/// `sample` receives the time elapsed so far. It is always called at least
/// once, and before the deadline is checked, so a value that appears exactly at
/// the deadline still resolves.
pub fn poll_until<C, T, F>(clock: &C, start: Instant, timeout: Duration, mut sample: F) -> Result<T, PollTimeout>
where
    C: Clock + ?Sized,
    F: FnMut(Duration) -> Option<T>,
{
    loop {
        let elapsed = clock.now().saturating_duration_since(start);
        if let Some(value) = sample(elapsed) {
            return Ok(value);
        }
        if elapsed >= timeout {
            return Err(PollTimeout { elapsed });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::mock::MockClock;

    #[test]
    fn resolves_as_soon_as_sample_succeeds() {
        let clock = MockClock::new(10);
        let start = clock.now();

        let result = poll_until(&clock, start, Duration::from_micros(1_000), |elapsed| {
            (elapsed >= Duration::from_micros(50)).then_some(elapsed)
        });

        assert_eq!(result, Ok(Duration::from_micros(50)));
    }

    #[test]
    fn gives_up_at_deadline() {
        let clock = MockClock::new(7);
        let start = clock.now();
        let timeout = Duration::from_micros(3_000);

        let result: Result<(), _> = poll_until(&clock, start, timeout, |_| None);

        let err = result.unwrap_err();
        assert!(err.elapsed >= timeout);
        assert!(err.elapsed < timeout + Duration::from_micros(7));
    }

    #[test]
    fn samples_once_even_with_zero_timeout() {
        let clock = MockClock::new(1);
        let start = clock.now();
        let mut calls = 0;

        let result: Result<(), _> = poll_until(&clock, start, Duration::from_ticks(0), |_| {
            calls += 1;
            None
        });

        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
