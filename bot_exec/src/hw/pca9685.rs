//! # PCA9685 PWM driver
//!
//! Wraps the `pwm-pca9685` driver for the 16 channel servo/PWM board. Only the features the robot
//! uses are exposed: a fixed 50 Hz output frequency, pulse widths set in microseconds, and turning
//! every output off.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{thread, time::Duration};

use pwm_pca9685::{Address, Channel, Pca9685};
use serde::Deserialize;

use super::{HwError, transport::{BusError, SharedBus}};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Default bus address of the board.
pub const DEFAULT_ADDR: u8 = 0x4c;

pub const NUM_CHANNELS: u8 = 16;

/// Output frequency used for servos and motor controllers.
pub const PWM_FREQ_HZ: f64 = 50.0;

/// Frequency of the internal oscillator.
const OSC_FREQ_HZ: f64 = 25_000_000.0;

/// Resolution of the PWM counter.
const COUNTER_STEPS: f64 = 4096.0;

/// Time the oscillator needs to start after leaving sleep.
const OSC_STARTUP: Duration = Duration::from_micros(500);

const CHANNELS: [Channel; NUM_CHANNELS as usize] = [
    Channel::C0, Channel::C1, Channel::C2, Channel::C3,
    Channel::C4, Channel::C5, Channel::C6, Channel::C7,
    Channel::C8, Channel::C9, Channel::C10, Channel::C11,
    Channel::C12, Channel::C13, Channel::C14, Channel::C15,
];

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct PwmDriver {
    dev: Pca9685<SharedBus>,

    initialised: bool,

    usec_per_tick: f64,

    /// Pulse widths for servo rotations of -1 and +1
    servo_range_us: (f64, f64),
}

/// Pulse width curve of a continuous rotation motor controller.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct MotorCurve {
    /// Pulse width at which the motor is stopped
    pub off_us: f64,

    /// Pulse width for full speed forwards
    pub max_us: f64,

    /// Pulse width for full speed in reverse
    pub min_us: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl From<pwm_pca9685::Error<BusError>> for HwError {
    fn from(e: pwm_pca9685::Error<BusError>) -> Self {
        match e {
            pwm_pca9685::Error::I2C(e) => HwError::Bus(e),
            _ => HwError::InvalidValue
        }
    }
}

impl PwmDriver {
    /// Create the driver. The board isn't touched until [`PwmDriver::init`] is called.
    pub fn new(bus: SharedBus, addr: u8, servo_range_us: (f64, f64)) -> Result<Self, HwError> {
        let dev = Pca9685::new(bus, Address::from(addr))
            .map_err(|_| HwError::UnknownChannel(format!("PCA9685 address 0x{:02x}", addr)))?;

        Ok(Self {
            dev,
            initialised: false,
            usec_per_tick: 1e6 / (PWM_FREQ_HZ * COUNTER_STEPS),
            servo_range_us,
        })
    }

    /// Set the output frequency and wake the oscillator.
    ///
    /// Can be called again to recover a board which has lost its configuration.
    pub fn init(&mut self) -> Result<(), HwError> {
        self.initialised = false;

        let prescale = prescale_for(PWM_FREQ_HZ);
        self.dev.set_prescale(prescale)?;
        self.dev.enable()?;
        thread::sleep(OSC_STARTUP);

        self.usec_per_tick = 1e6 * (prescale as f64 + 1.0) / OSC_FREQ_HZ;
        self.initialised = true;
        Ok(())
    }

    pub fn is_initialised(&self) -> bool {
        self.initialised
    }

    /// Set the pulse width of a channel in microseconds. A width of 0 turns the output off.
    pub fn set_pulse_width_us(&mut self, chan: u8, width_us: f64) -> Result<(), HwError> {
        if !self.initialised {
            return Err(HwError::NotInitialised)
        }

        let channel = CHANNELS.get(chan as usize)
            .copied()
            .ok_or_else(|| HwError::UnknownChannel(format!("PCA9685 channel {}", chan)))?;

        let ticks = match width_us.is_nan() {
            true => 0,
            false => (width_us / self.usec_per_tick)
                .round()
                .max(0.0)
                .min(COUNTER_STEPS - 1.0) as u16
        };

        match ticks {
            0 => self.dev.set_channel_full_off(channel)?,
            t => self.dev.set_channel_on_off(channel, 0, t)?
        }

        Ok(())
    }

    /// Set a servo's rotation between -1 and +1, mapped linearly onto the servo pulse width range.
    pub fn set_servo(&mut self, chan: u8, rotation: f64) -> Result<(), HwError> {
        let width_us = self.servo_pulse_width_us(rotation);
        self.set_pulse_width_us(chan, width_us)
    }

    /// Turn every output off. Carries on past failed channels, returning the first error.
    pub fn kill_all(&mut self) -> Result<(), HwError> {
        let mut result = Ok(());

        for chan in 0..NUM_CHANNELS {
            if let Err(e) = self.set_pulse_width_us(chan, 0.0) {
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }

        result
    }

    /// Pulse width for the given servo rotation, clamped to the servo range.
    pub fn servo_pulse_width_us(&self, rotation: f64) -> f64 {
        let (min, max) = self.servo_range_us;
        let rotation = if rotation.is_nan() { 0.0 } else { rotation };

        util::maths::clamp(
            &util::maths::lin_map((-1.0, 1.0), (min, max), rotation),
            &min,
            &max
        )
    }
}

impl MotorCurve {
    /// Pulse width for a speed between -1 (full reverse) and +1 (full forward).
    pub fn pulse_width_us(&self, speed: f64) -> f64 {
        let speed = if speed.is_nan() { 0.0 } else { speed.max(-1.0).min(1.0) };

        match speed > 0.0 {
            true => self.off_us + speed * (self.max_us - self.off_us),
            false => self.off_us + speed * (self.off_us - self.min_us)
        }
    }

    pub fn is_valid(&self) -> bool {
        self.min_us > 0.0 && self.min_us < self.off_us && self.off_us < self.max_us
    }
}

impl Default for MotorCurve {
    fn default() -> Self {
        Self {
            off_us: 1500.0,
            max_us: 2150.0,
            min_us: 900.0,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Prescaler value giving the requested output frequency.
pub fn prescale_for(hz: f64) -> u8 {
    let prescale = (OSC_FREQ_HZ / (COUNTER_STEPS * hz)).round() - 1.0;

    if prescale.is_nan() {
        return 255
    }

    prescale.max(3.0).min(255.0) as u8
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{bus_monitor::BusMonitor, hw::{sim::SimBus, transport::MonitoredBus}};

    const MODE1: u8 = 0x00;
    const MODE1_SLEEP: u8 = 1 << 4;
    const PRESCALE: u8 = 0xFE;

    fn sim() -> (SimBus, SharedBus, PwmDriver) {
        let sim = SimBus::new(0x08, DEFAULT_ADDR);
        let bus = SharedBus::new(MonitoredBus::new(Box::new(sim.clone()), BusMonitor::default()));
        let pwm = PwmDriver::new(bus.clone(), DEFAULT_ADDR, (800.0, 2200.0)).unwrap();
        (sim, bus, pwm)
    }

    #[test]
    fn test_prescale() {
        assert_eq!(prescale_for(50.0), 121);
        assert_eq!(prescale_for(1e6), 3);
        assert_eq!(prescale_for(1.0), 255);
    }

    #[test]
    fn test_init() {
        let (sim, bus, mut pwm) = sim();

        assert!(matches!(pwm.set_servo(0, 0.0), Err(HwError::NotInitialised)));

        pwm.init().unwrap();
        assert!(pwm.is_initialised());
        assert_eq!(sim.pca_register(PRESCALE), 121);
        assert_eq!(sim.pca_register(MODE1) & MODE1_SLEEP, 0);
        assert_eq!(bus.monitor().total_errors(), 0);

        sim.set_failing(true);
        assert!(matches!(pwm.init(), Err(HwError::Bus(_))));
        assert!(!pwm.is_initialised());
        assert!(bus.monitor().total_errors() > 0);
    }

    #[test]
    fn test_servo_pulse_width() {
        let (sim, _bus, mut pwm) = sim();
        pwm.init().unwrap();

        assert_eq!(pwm.servo_pulse_width_us(0.0), 1500.0);
        assert_eq!(pwm.servo_pulse_width_us(-1.0), 800.0);
        assert_eq!(pwm.servo_pulse_width_us(3.0), 2200.0);

        pwm.set_servo(15, 0.0).unwrap();

        // 1500 us at 50 Hz with a prescale of 121 is 307 ticks
        assert_eq!(sim.pulse_width_ticks(15), 307);

        pwm.kill_all().unwrap();
        assert_eq!(sim.pulse_width_ticks(15), 0);

        assert!(matches!(
            pwm.set_pulse_width_us(16, 1500.0),
            Err(HwError::UnknownChannel(_))
        ));
    }

    #[test]
    fn test_motor_curve() {
        let curve = MotorCurve::default();
        assert!(curve.is_valid());
        assert_eq!(curve.pulse_width_us(0.0), 1500.0);
        assert_eq!(curve.pulse_width_us(1.0), 2150.0);
        assert_eq!(curve.pulse_width_us(-1.0), 900.0);
        assert_eq!(curve.pulse_width_us(-5.0), 900.0);
        assert_eq!(curve.pulse_width_us(0.5), 1825.0);
    }
}
