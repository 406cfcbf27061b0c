//! # Ping monitor
//!
//! Measures the round trip latency of the operator link. One probe is in flight at a time: a new
//! one is sent once per period, unless the last is still waiting for its echo. A probe that
//! isn't echoed within the timeout is counted as lost and abandoned.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::time::{Duration, Instant};

use log::debug;

use comms_if::tm::{format_latency, PingToken};
use util::time::Cadence;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct PingMonitor {
    cadence: Cadence,

    timeout: Duration,

    next_token: PingToken,

    /// Probe waiting for an echo, and when it was sent
    outstanding: Option<(PingToken, Instant)>,

    last_latency: Option<Duration>,

    pub num_sent: u64,

    pub num_received: u64,

    pub num_timed_out: u64,

    /// Echoes which didn't match the outstanding probe
    pub num_unmatched: u64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl PingMonitor {
    pub fn new(period: Duration, timeout: Duration) -> Self {
        Self {
            cadence: Cadence::new(period),
            timeout,
            next_token: PingToken::default(),
            outstanding: None,
            last_latency: None,
            num_sent: 0,
            num_received: 0,
            num_timed_out: 0,
            num_unmatched: 0,
        }
    }

    /// Abandon a timed out probe, then return the token of a new probe to send if one is due.
    pub fn poll(&mut self, now: Instant) -> Option<PingToken> {
        if let Some((token, sent)) = self.outstanding {
            if now.saturating_duration_since(sent) > self.timeout {
                debug!("Ping {} timed out", token);
                self.num_timed_out += 1;
                self.outstanding = None;
            }
        }

        if self.outstanding.is_some() || !self.cadence.ready(now) {
            return None
        }

        let token = self.next_token;
        self.next_token = token.next();
        self.outstanding = Some((token, now));
        self.num_sent += 1;

        Some(token)
    }

    /// Handle an echo from the drive station, returning the latency if it matches the probe.
    pub fn on_echo(&mut self, payload: &str, now: Instant) -> Option<Duration> {
        let echoed = PingToken::parse(payload);

        match self.outstanding {
            Some((token, sent)) if echoed == Some(token) => {
                let latency = now.saturating_duration_since(sent);

                self.outstanding = None;
                self.last_latency = Some(latency);
                self.num_received += 1;

                Some(latency)
            },
            _ => {
                self.num_unmatched += 1;
                None
            }
        }
    }

    pub fn last_latency(&self) -> Option<Duration> {
        self.last_latency
    }

    /// Last latency formatted for display, or `-` if nothing has been measured yet.
    pub fn latency_str(&self) -> String {
        match self.last_latency {
            Some(l) => format_latency(l),
            None => String::from("-")
        }
    }

    pub fn is_outstanding(&self) -> bool {
        self.outstanding.is_some()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn monitor() -> PingMonitor {
        PingMonitor::new(Duration::from_secs(1), Duration::from_secs(5))
    }

    #[test]
    fn test_echo_latency() {
        let mut t = Instant::now();
        let mut ping = monitor();

        // Run through probes 0 to 6, each echoed straight away
        for i in 0..7 {
            let token = ping.poll(t).unwrap();
            assert_eq!(token.value(), i);
            assert!(ping.on_echo(&token.to_string(), t).is_some());
            t += Duration::from_secs(1);
        }

        let token = ping.poll(t).unwrap();
        assert_eq!(token.to_string(), "000007");

        let latency = ping.on_echo("000007", t + Duration::from_millis(42)).unwrap();
        assert_eq!(format_latency(latency), "42 ms");
        assert_eq!(ping.latency_str(), "42 ms");
        assert_eq!(ping.num_received, 8);
    }

    #[test]
    fn test_one_probe_in_flight() {
        let t0 = Instant::now();
        let mut ping = monitor();

        assert!(ping.poll(t0).is_some());
        assert!(ping.poll(t0 + Duration::from_secs(2)).is_none());
        assert!(ping.poll(t0 + Duration::from_secs(4)).is_none());
        assert_eq!(ping.num_sent, 1);

        // A stale or garbled echo doesn't clear the probe
        assert!(ping.on_echo("000009", t0).is_none());
        assert!(ping.on_echo("abc", t0).is_none());
        assert_eq!(ping.num_unmatched, 2);
        assert!(ping.is_outstanding());
    }

    #[test]
    fn test_timeout_allows_new_probe() {
        let t0 = Instant::now();
        let mut ping = monitor();

        assert_eq!(ping.poll(t0).unwrap().value(), 0);

        let token = ping.poll(t0 + Duration::from_millis(5100)).unwrap();
        assert_eq!(token.value(), 1);
        assert_eq!(ping.num_timed_out, 1);

        // The late echo of the abandoned probe doesn't count
        assert!(ping.on_echo("000000", t0 + Duration::from_millis(5200)).is_none());
        assert_eq!(ping.latency_str(), "-");
    }
}
