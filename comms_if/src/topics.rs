//! # Topics
//!
//! Every message on the operator link is a `(topic, payload)` pair. This module names the topics
//! and classifies inbound ones.

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Mode command from the drive station.
pub const MODE: &str = "wbot/mode";

/// Latency probe sent by the robot.
pub const PING_PROBE: &str = "wbot/ping/probe";

/// Echo of the robot's latency probe, sent back by the drive station.
pub const PING_ECHO: &str = "wbot/ping/echo";

/// Latency probe started by the drive station.
pub const PING_REQUEST: &str = "wbot/ping/request";

/// The robot's verbatim reply to a `PING_REQUEST`.
pub const PING_REPLY: &str = "wbot/ping/reply";

/// Robot status line.
pub const STATUS: &str = "wbot/status";

/// Raw Arduino register dump.
pub const ARDUINO: &str = "wbot/arduino";

/// Number of joysticks the drive station can report.
pub const NUM_JOYSTICKS: usize = 2;

const JOYSTICK_PREFIX: &str = "wbot/joystick";

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// The three reports each joystick produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoystickReport {
    Buttons,
    Axes,
    Pov,
}

/// Classification of a topic received by the robot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundTopic {
    Mode,
    Joystick(usize, JoystickReport),
    PingEcho,
    PingRequest,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl JoystickReport {
    fn as_str(&self) -> &'static str {
        match self {
            JoystickReport::Buttons => "buttons",
            JoystickReport::Axes => "axes",
            JoystickReport::Pov => "pov",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        match s {
            "buttons" => Some(JoystickReport::Buttons),
            "axes" => Some(JoystickReport::Axes),
            "pov" => Some(JoystickReport::Pov),
            _ => None
        }
    }
}

impl InboundTopic {
    /// Classify a received topic, or `None` if the robot doesn't consume it.
    pub fn parse(topic: &str) -> Option<Self> {
        match topic {
            MODE => return Some(InboundTopic::Mode),
            PING_ECHO => return Some(InboundTopic::PingEcho),
            PING_REQUEST => return Some(InboundTopic::PingRequest),
            _ => ()
        }

        // Joystick topics look like `wbot/joystick<N>/<report>`
        let rest = topic.strip_prefix(JOYSTICK_PREFIX)?;
        let (idx, report) = rest.split_once('/')?;
        let idx: usize = idx.parse().ok()?;

        if idx >= NUM_JOYSTICKS {
            return None
        }

        Some(InboundTopic::Joystick(idx, JoystickReport::from_str(report)?))
    }
}

/// Get the topic name for the given joystick report.
pub fn joystick_topic(idx: usize, report: JoystickReport) -> String {
    format!("{}{}/{}", JOYSTICK_PREFIX, idx, report.as_str())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_inbound() {
        assert_eq!(InboundTopic::parse(MODE), Some(InboundTopic::Mode));
        assert_eq!(InboundTopic::parse(PING_ECHO), Some(InboundTopic::PingEcho));
        assert_eq!(
            InboundTopic::parse("wbot/joystick1/axes"),
            Some(InboundTopic::Joystick(1, JoystickReport::Axes))
        );

        // Outbound topics and unknown joysticks are not consumed by the robot
        assert_eq!(InboundTopic::parse(STATUS), None);
        assert_eq!(InboundTopic::parse("wbot/joystick2/axes"), None);
        assert_eq!(InboundTopic::parse("wbot/joystick0/hat"), None);
    }

    #[test]
    fn test_joystick_topic_parses_back() {
        let t = joystick_topic(0, JoystickReport::Pov);
        assert_eq!(t, "wbot/joystick0/pov");
        assert_eq!(
            InboundTopic::parse(&t),
            Some(InboundTopic::Joystick(0, JoystickReport::Pov))
        );
    }
}
