//! # Telemetry module
//!
//! Messages sent by the robot to the drive station: the status line, the raw register dump and
//! the latency probe token.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::time::Duration;

use serde::{Serialize, Deserialize};

use crate::codec::{self, DecodeError};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Probe tokens wrap back to zero when they reach this value.
const PING_TOKEN_MODULUS: u32 = 1_000_000;

/// Number of digits in a probe token.
const PING_TOKEN_DIGITS: usize = 6;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Health of the user logic, first token of the status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodeStatus {
    /// Logic is loaded and has not faulted
    Okay,

    /// Logic is absent, or has faulted
    CodeErr,
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Status line published once per status period.
///
/// Wire form: `<okay|code_err> <dsLoopCount> <True|False> <batM> <batL> <i2cErr> <recover> [version]`
#[derive(Debug, Clone, PartialEq)]
pub struct BotStatus {
    pub status: CodeStatus,

    /// Last loop count received from the drive station in a mode command
    pub ds_loop_count: i64,

    /// Whether the hardware bus is currently considered healthy
    pub hw_okay: bool,

    /// Main (motor) battery voltage
    pub bat_m_v: f64,

    /// Logic battery voltage
    pub bat_l_v: f64,

    /// Lifetime count of bus transfer failures
    pub i2c_err_count: u64,

    /// Number of successful bus recoveries
    pub recover_count: u64,

    /// Microcontroller signature, if it has been read
    pub version: Option<String>,
}

/// Latency probe token, a 6 digit zero padded counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PingToken(u32);

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CodeStatus {
    pub fn as_token(&self) -> &'static str {
        match self {
            CodeStatus::Okay => "okay",
            CodeStatus::CodeErr => "code_err",
        }
    }

    pub fn from_token(token: &str) -> Result<Self, DecodeError> {
        match token {
            "okay" => Ok(CodeStatus::Okay),
            "code_err" => Ok(CodeStatus::CodeErr),
            _ => Err(DecodeError::OutOfRange(token.to_string()))
        }
    }
}

impl BotStatus {
    /// Encode as a wire payload.
    pub fn to_wire(&self) -> String {
        let mut s = format!(
            "{} {} {} {:.1} {:.1} {} {}",
            self.status.as_token(),
            self.ds_loop_count,
            codec::bool_str(self.hw_okay),
            self.bat_m_v,
            self.bat_l_v,
            self.i2c_err_count,
            self.recover_count
        );

        if let Some(ref v) = self.version {
            s.push(' ');
            s.push_str(v);
        }

        s
    }

    /// Decode a wire payload, used by the drive station side.
    pub fn from_wire(payload: &str) -> Result<Self, DecodeError> {
        let tokens = codec::tokens_between(payload, 7, 8)?;

        Ok(Self {
            status: CodeStatus::from_token(tokens[0])?,
            ds_loop_count: codec::parse_int(tokens[1])?,
            hw_okay: codec::parse_bool(tokens[2])?,
            bat_m_v: codec::parse_float(tokens[3])?,
            bat_l_v: codec::parse_float(tokens[4])?,
            i2c_err_count: codec::parse_int(tokens[5])?,
            recover_count: codec::parse_int(tokens[6])?,
            version: tokens.get(7).map(|s| s.to_string()),
        })
    }
}

impl PingToken {
    pub fn new(value: u32) -> Self {
        Self(value % PING_TOKEN_MODULUS)
    }

    /// The token following this one, wrapping after 999999.
    pub fn next(&self) -> Self {
        Self((self.0 + 1) % PING_TOKEN_MODULUS)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    /// Parse a token, which must be exactly 6 ASCII digits.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();

        if s.len() != PING_TOKEN_DIGITS || !s.bytes().all(|b| b.is_ascii_digit()) {
            return None
        }

        s.parse().ok().map(Self)
    }
}

impl std::fmt::Display for PingToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:06}", self.0)
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Format a round trip latency for display on the drive station.
///
/// Below one second the latency is shown in whole milliseconds, up to 99 s in tenths of a second,
/// beyond that only as `>99 secs`.
pub fn format_latency(latency: Duration) -> String {
    let ms = latency.as_millis();

    if ms < 1000 {
        format!("{} ms", ms)
    }
    else if latency.as_secs_f64() <= 99.0 {
        format!("{:.1} secs", latency.as_secs_f64())
    }
    else {
        String::from(">99 secs")
    }
}

/// Encode raw register bytes as space separated, 3 digit zero padded decimals.
pub fn encode_register_dump(regs: &[u8]) -> String {
    regs.iter()
        .map(|r| format!("{:03}", r))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Decode a register dump into bytes. The number of registers is checked by the caller.
pub fn decode_register_dump(payload: &str) -> Result<Vec<u8>, DecodeError> {
    payload.split_whitespace()
        .map(|t| codec::parse_int::<u8>(t))
        .collect()
}
