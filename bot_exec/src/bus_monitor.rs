//! # Bus Health Monitor
//!
//! Counts the outcome of every transfer on the hardware bus and declares an alert once too many
//! transfers in a row have failed. The monitor does no I/O itself, it's told about each transfer
//! by [`crate::hw::transport::MonitoredBus`].
//!
//! An alert stays raised until [`BusMonitor::reset`] is called, which the supervisor does after a
//! successful recovery. The lifetime error count survives resets, it's the figure reported to
//! the drive station.

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Default number of sequential failures which may occur before an alert is raised. The alert is
/// raised on the failure after this one.
pub const DEFAULT_ALERT_THRESHOLD: u64 = 10;

// ------------------------------------------------------------------------------------------------
// TYPES
// ------------------------------------------------------------------------------------------------

/// Function called when an alert is raised, given the lifetime error count.
pub type AlertCallback = Box<dyn FnMut(u64) + Send>;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct BusMonitor {
    threshold: u64,

    sequential_errors: u64,

    total_errors: u64,

    total_successes: u64,

    alert: bool,

    alert_cb: Option<AlertCallback>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl BusMonitor {
    /// Create a new monitor which alerts once more than `threshold` sequential failures occur.
    pub fn new(threshold: u64) -> Self {
        Self {
            threshold,
            sequential_errors: 0,
            total_errors: 0,
            total_successes: 0,
            alert: false,
            alert_cb: None,
        }
    }

    /// Set the function to call when an alert is raised.
    pub fn set_alert_callback(&mut self, cb: AlertCallback) {
        self.alert_cb = Some(cb);
    }

    /// Record a successful transfer.
    pub fn on_success(&mut self) {
        self.total_successes += 1;
        self.sequential_errors = 0;
    }

    /// Record a failed transfer, raising the alert if the threshold is exceeded.
    ///
    /// The callback is invoked only on the failure which raises the alert, not on the ones that
    /// follow it.
    pub fn on_fail(&mut self) {
        self.total_errors += 1;
        self.sequential_errors += 1;

        if self.sequential_errors > self.threshold && !self.alert {
            self.alert = true;

            if let Some(ref mut cb) = self.alert_cb {
                cb(self.total_errors);
            }
        }
    }

    /// Clear the alert and the sequential failure count.
    pub fn reset(&mut self) {
        self.sequential_errors = 0;
        self.alert = false;
    }

    pub fn in_alert(&self) -> bool {
        self.alert
    }

    /// Number of failed transfers over the lifetime of the monitor.
    pub fn total_errors(&self) -> u64 {
        self.total_errors
    }

    pub fn total_successes(&self) -> u64 {
        self.total_successes
    }

    pub fn sequential_errors(&self) -> u64 {
        self.sequential_errors
    }
}

impl Default for BusMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_ALERT_THRESHOLD)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::{Arc, atomic::{AtomicU64, Ordering}};

    #[test]
    fn test_alert_after_threshold() {
        let mut mon = BusMonitor::default();

        for _ in 0..10 {
            mon.on_fail();
        }
        assert!(!mon.in_alert());

        mon.on_fail();
        assert!(mon.in_alert());

        // Successes don't clear the alert, only a reset does
        mon.on_success();
        assert!(mon.in_alert());
        assert_eq!(mon.sequential_errors(), 0);

        mon.reset();
        assert!(!mon.in_alert());
        assert_eq!(mon.total_errors(), 11);
    }

    #[test]
    fn test_success_breaks_sequence() {
        let mut mon = BusMonitor::new(3);

        for _ in 0..20 {
            mon.on_fail();
            mon.on_fail();
            mon.on_fail();
            mon.on_success();
        }

        assert!(!mon.in_alert());
        assert_eq!(mon.total_errors(), 60);
        assert_eq!(mon.total_successes(), 20);
    }

    #[test]
    fn test_callback_once_per_episode() {
        let calls = Arc::new(AtomicU64::new(0));
        let last_total = Arc::new(AtomicU64::new(0));

        let mut mon = BusMonitor::new(2);
        let (c, t) = (calls.clone(), last_total.clone());
        mon.set_alert_callback(Box::new(move |total| {
            c.fetch_add(1, Ordering::Relaxed);
            t.store(total, Ordering::Relaxed);
        }));

        for _ in 0..10 {
            mon.on_fail();
        }
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert_eq!(last_total.load(Ordering::Relaxed), 3);

        mon.reset();
        for _ in 0..3 {
            mon.on_fail();
        }
        assert_eq!(calls.load(Ordering::Relaxed), 2);
        assert_eq!(last_total.load(Ordering::Relaxed), 13);
    }
}
