//! # Telemetry Channel
//!
//! The bot's side of the operator link. Inbound messages are drained without blocking each cycle
//! and decoded into the last good value caches: the [`OperatorLink`] for mode commands and the
//! [`ControlInputs`] for joysticks. Outbound, the channel publishes the status line, the register
//! dump and the latency probes.
//!
//! Decode failures never reach the caller as errors, they are counted and logged at debug level.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

pub mod inputs;
pub mod ping;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::time::{Duration, Instant};

use log::{debug, warn};

use comms_if::{
    codec::DecodeError,
    net::Link,
    tc::ModeCmd,
    tm::{self, BotStatus},
    topics::{self, InboundTopic}
};
use util::time::Cadence;

pub use inputs::{ControlInputs, JoystickState};
pub use ping::PingMonitor;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Maximum number of inbound messages handled in one cycle, the rest wait for the next.
const MAX_INBOUND_PER_CYCLE: usize = 256;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Last well formed mode command and when it arrived.
#[derive(Debug, Clone, Default)]
pub struct OperatorLink {
    last_cmd: Option<ModeCmd>,

    received_at: Option<Instant>,
}

/// Message counters, shown in the terminal report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkCounts {
    pub received: u64,

    pub sent: u64,

    pub decode_errors: u64,

    pub link_errors: u64,

    pub unknown_topics: u64,
}

/// Timing of the channel's periodic work.
#[derive(Debug, Clone, Copy)]
pub struct TelemetryTiming {
    pub status_period: Duration,

    pub term_report_period: Duration,

    pub ping_period: Duration,

    pub ping_timeout: Duration,
}

pub struct TelemetryChannel {
    link: Box<dyn Link>,

    operator: OperatorLink,

    inputs: ControlInputs,

    ping: PingMonitor,

    status_cadence: Cadence,

    term_cadence: Cadence,

    counts: LinkCounts,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl OperatorLink {
    pub fn last_cmd(&self) -> Option<&ModeCmd> {
        self.last_cmd.as_ref()
    }

    /// When the last well formed mode command arrived, `None` if none ever has.
    pub fn received_at(&self) -> Option<Instant> {
        self.received_at
    }

    fn update(&mut self, cmd: ModeCmd, now: Instant) {
        self.last_cmd = Some(cmd);
        self.received_at = Some(now);
    }
}

impl TelemetryChannel {
    pub fn new(link: Box<dyn Link>, timing: TelemetryTiming) -> Self {
        Self {
            link,
            operator: OperatorLink::default(),
            inputs: ControlInputs::default(),
            ping: PingMonitor::new(timing.ping_period, timing.ping_timeout),
            status_cadence: Cadence::new(timing.status_period),
            term_cadence: Cadence::new(timing.term_report_period),
            counts: LinkCounts::default(),
        }
    }

    /// Drain the pending inbound messages.
    ///
    /// Joystick reports, ping echoes and ping requests are handled here. Mode commands are
    /// returned in arrival order, decoded or not, for the mode arbitrator to act on.
    pub fn poll_inbound(&mut self, now: Instant) -> Vec<Result<ModeCmd, DecodeError>> {
        let mut mode_cmds = Vec::new();

        for _ in 0..MAX_INBOUND_PER_CYCLE {
            let (topic, payload) = match self.link.receive() {
                Ok(Some(msg)) => msg,
                Ok(None) => break,
                Err(e) => {
                    self.counts.link_errors += 1;
                    warn!("Could not receive from the operator link: {}", e);
                    break
                }
            };

            self.counts.received += 1;

            match InboundTopic::parse(&topic) {
                Some(InboundTopic::Mode) => {
                    let res = ModeCmd::from_wire(&payload);

                    match res {
                        Ok(ref cmd) => self.operator.update(cmd.clone(), now),
                        Err(ref e) => self.decode_failed(&topic, &payload, e)
                    }

                    mode_cmds.push(res);
                },
                Some(InboundTopic::Joystick(idx, report)) => {
                    if let Err(e) = self.inputs.apply(idx, report, &payload) {
                        self.decode_failed(&topic, &payload, &e);
                    }
                },
                Some(InboundTopic::PingEcho) => {
                    self.ping.on_echo(&payload, now);
                },
                Some(InboundTopic::PingRequest) => {
                    self.publish(topics::PING_REPLY, &payload);
                },
                None => {
                    self.counts.unknown_topics += 1;
                    debug!("Ignoring message on unknown topic \"{}\"", topic);
                }
            }
        }

        mode_cmds
    }

    /// Send a latency probe if one is due.
    pub fn poll_ping(&mut self, now: Instant) {
        if let Some(token) = self.ping.poll(now) {
            self.publish(topics::PING_PROBE, &token.to_string());
        }
    }

    /// Whether the status message is due, marking it as sent if so.
    pub fn status_due(&mut self, now: Instant) -> bool {
        self.status_cadence.ready(now)
    }

    /// Whether the terminal report is due, marking it as printed if so.
    pub fn term_report_due(&mut self, now: Instant) -> bool {
        self.term_cadence.ready(now)
    }

    pub fn send_status(&mut self, status: &BotStatus) {
        self.publish(topics::STATUS, &status.to_wire());
    }

    pub fn send_register_dump(&mut self, regs: &[u8]) {
        self.publish(topics::ARDUINO, &tm::encode_register_dump(regs));
    }

    pub fn operator(&self) -> &OperatorLink {
        &self.operator
    }

    pub fn inputs(&self) -> &ControlInputs {
        &self.inputs
    }

    pub fn ping(&self) -> &PingMonitor {
        &self.ping
    }

    pub fn counts(&self) -> LinkCounts {
        self.counts
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    fn publish(&mut self, topic: &str, payload: &str) {
        match self.link.publish(topic, payload) {
            Ok(()) => self.counts.sent += 1,
            Err(e) => {
                self.counts.link_errors += 1;
                warn!("Could not publish on {}: {}", topic, e);
            }
        }
    }

    fn decode_failed(&mut self, topic: &str, payload: &str, e: &DecodeError) {
        self.counts.decode_errors += 1;
        debug!("Could not decode \"{}\" on {}: {}", payload, topic, e);
    }
}

impl Default for TelemetryTiming {
    fn default() -> Self {
        Self {
            status_period: Duration::from_secs(1),
            term_report_period: Duration::from_secs(3),
            ping_period: Duration::from_secs(1),
            ping_timeout: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use comms_if::{net::MemLink, tc::BotMode, tm::CodeStatus};

    fn channel() -> (TelemetryChannel, MemLink) {
        let (robot, console) = MemLink::pair();
        (TelemetryChannel::new(Box::new(robot), TelemetryTiming::default()), console)
    }

    #[test]
    fn test_inbound_decode() {
        let (mut tm, mut console) = channel();
        let t0 = Instant::now();

        console.publish(topics::MODE, "TELEOP 4 60.0").unwrap();
        console.publish(topics::MODE, "TELEOP notanumber 1.0").unwrap();
        console.publish("wbot/joystick0/axes", "0.0 0.5 0.0 0.0 0.0 0.0").unwrap();
        console.publish("wbot/joystick0/pov", "0").unwrap();
        console.publish("wbot/lights", "on").unwrap();

        let cmds = tm.poll_inbound(t0);
        assert_eq!(cmds.len(), 2);
        assert_eq!(cmds[0].as_ref().map(|c| c.mode), Ok(BotMode::Teleop));
        assert!(cmds[1].is_err());

        // Only the well formed command refreshes the link
        assert_eq!(tm.operator().received_at(), Some(t0));
        assert_eq!(tm.operator().last_cmd().map(|c| c.ds_loop_count), Some(4));

        assert_eq!(tm.inputs().joystick(0).unwrap().axes.get(1), 0.5);

        let counts = tm.counts();
        assert_eq!(counts.received, 5);
        assert_eq!(counts.decode_errors, 2);
        assert_eq!(counts.unknown_topics, 1);
    }

    #[test]
    fn test_ping_request_echoed_verbatim() {
        let (mut tm, mut console) = channel();

        console.publish(topics::PING_REQUEST, "ds 1234 hello").unwrap();
        tm.poll_inbound(Instant::now());

        assert_eq!(
            console.drain(),
            vec![(topics::PING_REPLY.to_string(), "ds 1234 hello".to_string())]
        );
    }

    #[test]
    fn test_ping_round_trip() {
        let (mut tm, mut console) = channel();
        let t0 = Instant::now();

        tm.poll_ping(t0);
        let sent = console.drain();
        assert_eq!(sent, vec![(topics::PING_PROBE.to_string(), "000000".to_string())]);

        console.publish(topics::PING_ECHO, &sent[0].1).unwrap();
        tm.poll_inbound(t0 + Duration::from_millis(42));
        assert_eq!(tm.ping().latency_str(), "42 ms");
    }

    #[test]
    fn test_status_and_dump() {
        let (mut tm, mut console) = channel();
        let t0 = Instant::now();

        assert!(tm.status_due(t0));
        assert!(!tm.status_due(t0 + Duration::from_millis(500)));
        assert!(tm.status_due(t0 + Duration::from_secs(1)));

        tm.send_status(&BotStatus {
            status: CodeStatus::CodeErr,
            ds_loop_count: 12,
            hw_okay: true,
            bat_m_v: 12.4,
            bat_l_v: 7.9,
            i2c_err_count: 3,
            recover_count: 1,
            version: None,
        });
        tm.send_register_dump(&[101, 7, 0]);

        let sent = console.drain();
        assert_eq!(sent[0], (topics::STATUS.to_string(), "code_err 12 True 12.4 7.9 3 1".to_string()));
        assert_eq!(sent[1], (topics::ARDUINO.to_string(), "101 007 000".to_string()));
        assert_eq!(tm.counts().sent, 2);
    }
}
