//! # Telecommand module
//!
//! Commands sent by the drive station to the robot: the mode command and the joystick reports.
//! Each type decodes from (and encodes to) its space-delimited wire payload.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use serde::{Serialize, Deserialize};

// Internal
use crate::codec::{self, DecodeError};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Number of buttons in a joystick report.
pub const NUM_BUTTONS: usize = 12;

/// Number of axes in a joystick report.
pub const NUM_AXES: usize = 6;

/// Number of directional pad axes in a joystick report.
pub const NUM_POV: usize = 2;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Operating mode of the robot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BotMode {
    /// All actuators off. Initial mode, and the mode forced by every failsafe.
    Stop,

    /// Autonomous period of a match.
    Auto,

    /// Driver controlled period of a match.
    Teleop,
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A mode command: `<STOP|AUTO|TELEOP> <loopCount> <timeRemaining> [auxCmd]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ModeCmd {
    /// Mode demanded by the drive station
    pub mode: BotMode,

    /// The drive station's own loop counter, echoed back in the status line
    pub ds_loop_count: i64,

    /// Seconds remaining in the current period, according to the drive station's match clock
    pub time_remaining_s: f64,

    /// Optional auxiliary command token, passed through to the user logic
    pub aux_cmd: Option<String>,
}

/// Joystick buttons report, 12 `T`/`F` tokens.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Buttons(pub [bool; NUM_BUTTONS]);

/// Joystick axes report, 6 floats each in `[-1.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Axes(pub [f64; NUM_AXES]);

/// Joystick directional pad report, 2 ints each in `{-1, 0, 1}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pov(pub [i8; NUM_POV]);

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl BotMode {
    /// Parse a mode from its wire token.
    pub fn from_token(token: &str) -> Result<Self, DecodeError> {
        match token {
            "STOP" => Ok(BotMode::Stop),
            "AUTO" => Ok(BotMode::Auto),
            "TELEOP" => Ok(BotMode::Teleop),
            _ => Err(DecodeError::UnknownMode(token.to_string()))
        }
    }

    /// The wire token for this mode.
    pub fn as_token(&self) -> &'static str {
        match self {
            BotMode::Stop => "STOP",
            BotMode::Auto => "AUTO",
            BotMode::Teleop => "TELEOP",
        }
    }
}

impl Default for BotMode {
    fn default() -> Self {
        BotMode::Stop
    }
}

impl std::fmt::Display for BotMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_token())
    }
}

impl ModeCmd {
    /// Decode a mode command payload.
    pub fn from_wire(payload: &str) -> Result<Self, DecodeError> {
        let tokens = codec::tokens_between(payload, 3, 4)?;

        Ok(Self {
            mode: BotMode::from_token(tokens[0])?,
            ds_loop_count: codec::parse_int(tokens[1])?,
            time_remaining_s: codec::parse_float(tokens[2])?,
            aux_cmd: tokens.get(3).map(|s| s.to_string()),
        })
    }

    /// Encode as a wire payload.
    pub fn to_wire(&self) -> String {
        let mut s = format!(
            "{} {} {:.1}",
            self.mode,
            self.ds_loop_count,
            self.time_remaining_s
        );

        if let Some(ref aux) = self.aux_cmd {
            s.push(' ');
            s.push_str(aux);
        }

        s
    }
}

impl Buttons {
    /// Decode a buttons payload.
    pub fn from_wire(payload: &str) -> Result<Self, DecodeError> {
        let tokens = codec::tokens_exact(payload, NUM_BUTTONS)?;

        let mut buttons = [false; NUM_BUTTONS];
        for (b, t) in buttons.iter_mut().zip(tokens) {
            *b = codec::parse_flag(t)?;
        }

        Ok(Self(buttons))
    }

    /// Encode as a wire payload.
    pub fn to_wire(&self) -> String {
        self.0.iter()
            .map(|&b| codec::flag_str(b))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Get the state of a button, `false` for out of range indexes.
    pub fn get(&self, idx: usize) -> bool {
        self.0.get(idx).copied().unwrap_or(false)
    }
}

impl Axes {
    /// Decode an axes payload. Values outside `[-1.0, 1.0]` are rejected.
    pub fn from_wire(payload: &str) -> Result<Self, DecodeError> {
        let tokens = codec::tokens_exact(payload, NUM_AXES)?;

        let mut axes = [0f64; NUM_AXES];
        for (a, t) in axes.iter_mut().zip(tokens) {
            let v = codec::parse_float(t)?;
            if v < -1.0 || v > 1.0 {
                return Err(DecodeError::OutOfRange(t.to_string()))
            }
            *a = v;
        }

        Ok(Self(axes))
    }

    /// Encode as a wire payload.
    pub fn to_wire(&self) -> String {
        self.0.iter()
            .map(|a| format!("{:.3}", a))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Get the value of an axis, `0.0` for out of range indexes.
    pub fn get(&self, idx: usize) -> f64 {
        self.0.get(idx).copied().unwrap_or(0.0)
    }
}

impl Pov {
    /// Decode a POV payload. Values outside `{-1, 0, 1}` are rejected.
    pub fn from_wire(payload: &str) -> Result<Self, DecodeError> {
        let tokens = codec::tokens_exact(payload, NUM_POV)?;

        let mut pov = [0i8; NUM_POV];
        for (p, t) in pov.iter_mut().zip(tokens) {
            let v: i8 = codec::parse_int(t)?;
            if !(-1..=1).contains(&v) {
                return Err(DecodeError::OutOfRange(t.to_string()))
            }
            *p = v;
        }

        Ok(Self(pov))
    }

    /// Encode as a wire payload.
    pub fn to_wire(&self) -> String {
        format!("{} {}", self.0[0], self.0[1])
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_mode_cmd_decode() {
        let cmd = ModeCmd::from_wire("TELEOP 120 87.5").unwrap();
        assert_eq!(cmd.mode, BotMode::Teleop);
        assert_eq!(cmd.ds_loop_count, 120);
        assert_eq!(cmd.time_remaining_s, 87.5);
        assert_eq!(cmd.aux_cmd, None);

        let cmd = ModeCmd::from_wire("AUTO 3 -1.0 X1").unwrap();
        assert_eq!(cmd.mode, BotMode::Auto);
        assert_eq!(cmd.time_remaining_s, -1.0);
        assert_eq!(cmd.aux_cmd.as_deref(), Some("X1"));
    }

    #[test]
    fn test_mode_cmd_malformed() {
        assert_eq!(
            ModeCmd::from_wire("FOO 1 2"),
            Err(DecodeError::UnknownMode("FOO".into()))
        );
        assert_eq!(
            ModeCmd::from_wire("TELEOP notanumber 1.0"),
            Err(DecodeError::NotANumber("notanumber".into()))
        );
        assert!(matches!(
            ModeCmd::from_wire("STOP 1"),
            Err(DecodeError::WrongArity { .. })
        ));
        assert!(matches!(
            ModeCmd::from_wire("STOP 1 2.0 a b"),
            Err(DecodeError::WrongArity { .. })
        ));
        // Mode tokens are case sensitive
        assert!(ModeCmd::from_wire("teleop 1 2.0").is_err());
    }

    #[test]
    fn test_mode_cmd_to_wire() {
        let cmd = ModeCmd {
            mode: BotMode::Auto,
            ds_loop_count: 42,
            time_remaining_s: 12.0,
            aux_cmd: Some("GO".into())
        };
        assert_eq!(cmd.to_wire(), "AUTO 42 12.0 GO");
        assert_eq!(ModeCmd::from_wire(&cmd.to_wire()), Ok(cmd));
    }

    #[test]
    fn test_buttons() {
        let b = Buttons::from_wire("T F F T F F F F F F F T").unwrap();
        assert!(b.get(0));
        assert!(b.get(3));
        assert!(!b.get(1));
        assert!(b.get(11));
        assert!(!b.get(12));

        assert!(Buttons::from_wire("T F").is_err());
        assert!(Buttons::from_wire("T F F T F F F F F F F yes").is_err());
    }

    #[test]
    fn test_axes() {
        let a = Axes::from_wire("0.0 -0.5 1.0 -1.0 0.25 0").unwrap();
        assert_eq!(a.get(1), -0.5);
        assert_eq!(a.get(2), 1.0);

        assert_eq!(
            Axes::from_wire("0.0 -0.5 1.5 -1.0 0.25 0"),
            Err(DecodeError::OutOfRange("1.5".into()))
        );
        assert!(Axes::from_wire("0.0 -0.5 x -1.0 0.25 0").is_err());
    }

    #[test]
    fn test_pov() {
        assert_eq!(Pov::from_wire("-1 1"), Ok(Pov([-1, 1])));
        assert_eq!(Pov::from_wire("2 0"), Err(DecodeError::OutOfRange("2".into())));
        assert!(Pov::from_wire("0").is_err());
    }
}
