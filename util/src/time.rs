//! General time utility functions

use chrono;
use std::time::{Duration, Instant};

/// Number of nanoseconds in a second
pub const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Convert a duration into a number of seconds, or `None` if overflow
pub fn duration_to_seconds(duration: chrono::Duration) -> Option<f64> {
    duration.num_nanoseconds()
        .map(|ns| ns as f64 / NANOS_PER_SECOND as f64)
}

/// A wall-clock gate which opens at most once per period.
///
/// Periodic work in the main loop (telemetry, recovery attempts) is gated on "time since the last
/// emission is at least the period" rather than on a number of cycles, so that loop jitter does
/// not change the rate.
#[derive(Debug, Clone)]
pub struct Cadence {
    period: Duration,
    last: Option<Instant>,
}

impl Cadence {
    /// Create a new cadence. The first call to `ready` always opens the gate.
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            last: None,
        }
    }

    /// Create a new cadence from a period in seconds.
    pub fn from_secs_f64(period_s: f64) -> Self {
        Self::new(Duration::from_secs_f64(period_s))
    }

    /// The period of this cadence.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Returns `true` and marks `now` as the last emission if at least one period has passed.
    pub fn ready(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.period => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }

    /// Restart the period from `now` without an emission.
    pub fn restart(&mut self, now: Instant) {
        self.last = Some(now);
    }

    /// Time since the gate last opened, `None` if it never has.
    pub fn since_last(&self, now: Instant) -> Option<Duration> {
        self.last.map(|l| now.saturating_duration_since(l))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_cadence_gates_on_elapsed_time() {
        let t0 = Instant::now();
        let mut c = Cadence::from_secs_f64(1.0);

        assert!(c.ready(t0));
        assert!(!c.ready(t0 + Duration::from_millis(999)));
        assert!(c.ready(t0 + Duration::from_millis(1000)));

        // Jitter does not accumulate, the period restarts from the emission
        assert!(!c.ready(t0 + Duration::from_millis(1500)));
        assert!(c.ready(t0 + Duration::from_millis(2300)));
    }

    #[test]
    fn test_cadence_restart() {
        let t0 = Instant::now();
        let mut c = Cadence::from_secs_f64(0.5);

        c.restart(t0);
        assert!(!c.ready(t0 + Duration::from_millis(100)));
        assert!(c.ready(t0 + Duration::from_millis(500)));
        assert_eq!(
            c.since_last(t0 + Duration::from_millis(700)),
            Some(Duration::from_millis(200))
        );
    }

    #[test]
    fn test_duration_to_seconds() {
        assert_eq!(duration_to_seconds(chrono::Duration::milliseconds(1500)), Some(1.5));
    }
}
