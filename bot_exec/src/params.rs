//! # Bot Executable Parameters
//!
//! Parameters for the bot executable, loaded from `bot_exec.toml`. Every field has a default so a
//! parameter file only needs to list the values it changes.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Deserialize;
use thiserror::Error;

use comms_if::net::NetParams;

use crate::{
    bus_monitor::DEFAULT_ALERT_THRESHOLD,
    hw::{arduino, pca9685::{self, MotorCurve}, HardwareConfig},
    mode_arb::MalformedPolicy
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BotExecParams {
    /// Target period of one cycle of the main loop
    pub cycle_period_s: f64,

    /// Time without a valid mode command after which the bot is stopped
    pub failsafe_timeout_s: f64,

    /// What to do with a mode command which can't be decoded
    pub malformed_mode_cmd: MalformedPolicy,

    /// Period of the status and register dump messages
    pub status_period_s: f64,

    /// Period of the report printed to the terminal
    pub term_report_period_s: f64,

    /// Minimum time between ping probes
    pub ping_period_s: f64,

    /// Time after which an unanswered ping probe is abandoned
    pub ping_timeout_s: f64,

    /// Minimum time between attempts to recover unhealthy hardware
    pub recovery_period_s: f64,

    /// Number of failed recovery attempts in a row after which the Arduino is reset. 0 disables
    /// resets.
    pub hard_reset_after_failed_recoveries: u32,

    /// Number of sequential bus failures allowed before the bus is declared unhealthy
    pub bus_alert_threshold: u64,

    /// Name of the user logic to run, see `logic::from_name`
    pub logic: Option<String>,

    /// Maximum level of messages to log, one of `info`, `debug` or `trace`
    pub log_level: String,

    pub hw: HwParams,

    pub net: NetParams,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HwParams {
    /// Use the simulated hardware rather than the real bus
    pub simulate: bool,

    /// Number of the I2C bus (`/dev/i2c-N`)
    pub i2c_bus: u8,

    /// Timeout of a single I2C transfer
    pub i2c_timeout_ms: u32,

    pub arduino_addr: u8,

    pub pca9685_addr: u8,

    /// BCM numbers of the two GPIO pins wired to the Arduino's reset lines
    pub reset_pins: [u8; 2],

    /// Pulse width for a servo rotation of -1
    pub servo_min_us: f64,

    /// Pulse width for a servo rotation of +1
    pub servo_max_us: f64,

    pub motor: MotorCurve,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq)]
pub enum ParamsError {
    #[error("{0} must be positive, found {1}")]
    NonPositivePeriod(&'static str, f64),

    #[error("The Arduino and the PWM driver cannot share bus address 0x{0:02x}")]
    SharedAddress(u8),

    #[error("The bus alert threshold must be at least 1")]
    ZeroAlertThreshold,

    #[error("Invalid servo pulse width range {0} us to {1} us")]
    InvalidServoRange(f64, f64),

    #[error("Invalid motor curve {0:?}")]
    InvalidMotorCurve(MotorCurve),

    #[error("The two reset pins must be different")]
    SharedResetPin,

    #[error("Unknown log level \"{0}\"")]
    UnknownLogLevel(String),

    #[error("Invalid network endpoints")]
    InvalidEndpoints,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for BotExecParams {
    fn default() -> Self {
        Self {
            cycle_period_s: 0.02,
            failsafe_timeout_s: 2.5,
            malformed_mode_cmd: MalformedPolicy::default(),
            status_period_s: 1.0,
            term_report_period_s: 3.0,
            ping_period_s: 1.0,
            ping_timeout_s: 5.0,
            recovery_period_s: 0.5,
            hard_reset_after_failed_recoveries: 4,
            bus_alert_threshold: DEFAULT_ALERT_THRESHOLD,
            logic: None,
            log_level: String::from("debug"),
            hw: HwParams::default(),
            net: NetParams::default(),
        }
    }
}

impl BotExecParams {
    /// Determines if the parameters are valid.
    pub fn are_valid(&self) -> Result<(), ParamsError> {
        let periods = [
            ("cycle_period_s", self.cycle_period_s),
            ("failsafe_timeout_s", self.failsafe_timeout_s),
            ("status_period_s", self.status_period_s),
            ("term_report_period_s", self.term_report_period_s),
            ("ping_period_s", self.ping_period_s),
            ("ping_timeout_s", self.ping_timeout_s),
            ("recovery_period_s", self.recovery_period_s),
        ];

        // `!(p > 0.0)` also catches NaN
        for &(name, p) in periods.iter() {
            if !(p > 0.0) || !p.is_finite() {
                return Err(ParamsError::NonPositivePeriod(name, p))
            }
        }

        if self.bus_alert_threshold == 0 {
            return Err(ParamsError::ZeroAlertThreshold)
        }

        if util::logger::level_from_str(&self.log_level).is_none() {
            return Err(ParamsError::UnknownLogLevel(self.log_level.clone()))
        }

        if !self.net.are_valid() {
            return Err(ParamsError::InvalidEndpoints)
        }

        self.hw.are_valid()
    }
}

impl Default for HwParams {
    fn default() -> Self {
        Self {
            simulate: false,
            i2c_bus: 1,
            i2c_timeout_ms: 20,
            arduino_addr: arduino::DEFAULT_ADDR,
            pca9685_addr: pca9685::DEFAULT_ADDR,
            reset_pins: [4, 17],
            servo_min_us: 800.0,
            servo_max_us: 2200.0,
            motor: MotorCurve::default(),
        }
    }
}

impl HwParams {
    pub fn are_valid(&self) -> Result<(), ParamsError> {
        if self.arduino_addr == self.pca9685_addr {
            return Err(ParamsError::SharedAddress(self.arduino_addr))
        }

        if self.reset_pins[0] == self.reset_pins[1] {
            return Err(ParamsError::SharedResetPin)
        }

        if !(self.servo_min_us > 0.0 && self.servo_min_us < self.servo_max_us) {
            return Err(ParamsError::InvalidServoRange(self.servo_min_us, self.servo_max_us))
        }

        if !self.motor.is_valid() {
            return Err(ParamsError::InvalidMotorCurve(self.motor))
        }

        Ok(())
    }

    /// The device configuration used to build the hardware facade.
    pub fn hardware_config(&self) -> HardwareConfig {
        HardwareConfig {
            arduino_addr: self.arduino_addr,
            pca9685_addr: self.pca9685_addr,
            servo_range_us: (self.servo_min_us, self.servo_max_us),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let params = BotExecParams::default();
        assert_eq!(params.are_valid(), Ok(()));
        assert_eq!(params.malformed_mode_cmd, MalformedPolicy::Stop);
        assert_eq!(params.hw.arduino_addr, 0x08);
        assert_eq!(params.hw.pca9685_addr, 0x4c);
    }

    #[test]
    fn test_partial_file() {
        let params: BotExecParams = util::params::from_str(r#"
            failsafe_timeout_s = 1.0
            malformed_mode_cmd = "ignore"
            logic = "servo_demo"

            [hw]
            simulate = true

            [hw.motor]
            max_us = 2000.0
        "#).unwrap();

        assert_eq!(params.failsafe_timeout_s, 1.0);
        assert_eq!(params.malformed_mode_cmd, MalformedPolicy::Ignore);
        assert_eq!(params.logic.as_deref(), Some("servo_demo"));
        assert!(params.hw.simulate);
        assert_eq!(params.hw.motor.max_us, 2000.0);
        assert_eq!(params.hw.motor.off_us, 1500.0);
        assert_eq!(params.cycle_period_s, 0.02);
        assert_eq!(params.are_valid(), Ok(()));
    }

    #[test]
    fn test_invalid_params() {
        let mut params = BotExecParams::default();
        params.status_period_s = 0.0;
        assert!(matches!(params.are_valid(), Err(ParamsError::NonPositivePeriod("status_period_s", _))));

        let mut params = BotExecParams::default();
        params.hw.pca9685_addr = params.hw.arduino_addr;
        assert_eq!(params.are_valid(), Err(ParamsError::SharedAddress(0x08)));

        let mut params = BotExecParams::default();
        params.bus_alert_threshold = 0;
        assert_eq!(params.are_valid(), Err(ParamsError::ZeroAlertThreshold));

        let mut params = BotExecParams::default();
        params.log_level = String::from("loud");
        assert!(matches!(params.are_valid(), Err(ParamsError::UnknownLogLevel(_))));

        assert!(util::params::from_str::<BotExecParams>("malformed_mode_cmd = \"panic\"").is_err());
    }
}
