//! # Bot context
//!
//! The handle user logic is given on every callback. It exposes the drive station's inputs and
//! the bot's actuators and sensors, and nothing else of the supervisor.
//!
//! While the hardware is unhealthy every actuator call does nothing and returns `Ok(())`, and
//! sensor reads return [`HwError::Unavailable`], so that logic can't add traffic to a failing bus.
//!
//! Actuator commands lost to a bus failure also return `Ok(())`. The failure has already been
//! counted by the bus monitor, and the logic will send the command again next cycle. Only
//! caller errors, such as an unknown channel, reach the logic. Sensor reads return every error,
//! since there is no value to give back.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::debug;

use crate::{
    hw::{arduino::{Battery, PinRef, RegRef}, pca9685::MotorCurve, Hardware, HwError},
    telemetry::{ControlInputs, JoystickState}
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct BotCtx<'a> {
    hw: &'a mut Hardware,

    hw_okay: bool,

    inputs: &'a ControlInputs,

    time_remaining_s: f64,

    aux_cmd: Option<&'a str>,

    motor: MotorCurve,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<'a> BotCtx<'a> {
    pub fn new(
        hw: &'a mut Hardware,
        hw_okay: bool,
        inputs: &'a ControlInputs,
        time_remaining_s: f64,
        aux_cmd: Option<&'a str>,
        motor: MotorCurve
    ) -> Self {
        Self {
            hw,
            hw_okay,
            inputs,
            time_remaining_s,
            aux_cmd,
            motor,
        }
    }

    // ---- INPUTS ----

    pub fn joystick(&self, idx: usize) -> Option<&JoystickState> {
        self.inputs.joystick(idx)
    }

    /// Axis value of a joystick, 0 for unknown joysticks or axes.
    pub fn axis(&self, joystick: usize, axis: usize) -> f64 {
        self.joystick(joystick).map(|j| j.axes.get(axis)).unwrap_or(0.0)
    }

    /// Whether a button is pressed, false for unknown joysticks or buttons.
    pub fn button(&self, joystick: usize, button: usize) -> bool {
        self.joystick(joystick).map(|j| j.buttons.get(button)).unwrap_or(false)
    }

    /// Seconds left in the current period of the match.
    pub fn time_remaining_s(&self) -> f64 {
        self.time_remaining_s
    }

    pub fn aux_cmd(&self) -> Option<&str> {
        self.aux_cmd
    }

    pub fn hw_okay(&self) -> bool {
        self.hw_okay
    }

    // ---- ACTUATORS ----

    /// Set a servo on the PWM driver to a rotation between -1 and +1.
    pub fn set_servo(&mut self, chan: u8, rotation: f64) -> Result<(), HwError> {
        self.actuate(|hw| hw.set_servo(chan, rotation))
    }

    pub fn set_pulse_width_us(&mut self, chan: u8, width_us: f64) -> Result<(), HwError> {
        self.actuate(|hw| hw.set_pulse_width_us(chan, width_us))
    }

    /// Drive a motor controller on the PWM driver at a speed between -1 and +1.
    pub fn set_motor_speed(&mut self, chan: u8, speed: f64) -> Result<(), HwError> {
        let width_us = self.motor.pulse_width_us(speed);
        self.set_pulse_width_us(chan, width_us)
    }

    /// Set one of the Arduino's PWM outputs, between 0 and 1.
    pub fn set_pwm<'r, R: Into<RegRef<'r>>>(&mut self, chan: R, value: f64) -> Result<(), HwError> {
        let chan = chan.into();
        self.actuate(|hw| hw.set_arduino_pwm(chan, value))
    }

    /// Turn every output off.
    pub fn kill_all(&mut self) -> Result<(), HwError> {
        self.actuate(|hw| hw.all_stop())
    }

    // ---- SENSORS ----

    pub fn analog<'r, R: Into<RegRef<'r>>>(&mut self, chan: R) -> Result<f64, HwError> {
        self.check_hw()?;
        self.hw.analog(chan.into())
    }

    pub fn digital<'r, P: Into<PinRef<'r>>>(&mut self, pin: P) -> Result<bool, HwError> {
        self.check_hw()?;
        self.hw.digital(pin.into())
    }

    pub fn battery_voltage(&mut self, battery: Battery) -> Result<f64, HwError> {
        self.check_hw()?;
        self.hw.battery_voltage(battery)
    }

    /// Read back one of the Arduino's PWM outputs, between 0 and 1.
    pub fn get_pwm<'r, R: Into<RegRef<'r>>>(&mut self, chan: R) -> Result<f64, HwError> {
        self.check_hw()?;
        self.hw.get_arduino_pwm(chan.into())
    }

    fn actuate<F>(&mut self, f: F) -> Result<(), HwError>
    where
        F: FnOnce(&mut Hardware) -> Result<(), HwError>
    {
        if !self.hw_okay {
            return Ok(())
        }

        match f(&mut *self.hw) {
            Err(HwError::Bus(e)) => {
                debug!("Actuator command lost: {}", e);
                Ok(())
            },
            res => res
        }
    }

    fn check_hw(&self) -> Result<(), HwError> {
        match self.hw_okay {
            true => Ok(()),
            false => Err(HwError::Unavailable)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use comms_if::{eqpt::arduino as reg, topics::JoystickReport};
    use crate::{bus_monitor::BusMonitor, hw::{self, HardwareConfig}};

    #[test]
    fn test_actuators_suppressed_when_unhealthy() {
        let (mut hw, sim) = hw::simulated(BusMonitor::default(), HardwareConfig::default()).unwrap();
        assert!(hw.init());
        let inputs = ControlInputs::default();

        let before = sim.transfers();
        let mut ctx = BotCtx::new(&mut hw, false, &inputs, 10.0, None, MotorCurve::default());

        assert_eq!(ctx.set_servo(15, 1.0), Ok(()));
        assert_eq!(ctx.set_motor_speed(0, 1.0), Ok(()));
        assert_eq!(ctx.set_pwm("PWM9", 1.0), Ok(()));
        assert_eq!(ctx.kill_all(), Ok(()));
        assert_eq!(ctx.analog("A1"), Err(HwError::Unavailable));
        assert_eq!(sim.transfers(), before);
    }

    #[test]
    fn test_actuators_and_inputs() {
        let (mut hw, sim) = hw::simulated(BusMonitor::default(), HardwareConfig::default()).unwrap();
        assert!(hw.init());
        let mut inputs = ControlInputs::default();
        inputs.apply(0, JoystickReport::Axes, "0.0 -1.0 0.0 0.0 0.0 0.0").unwrap();

        let mut ctx = BotCtx::new(&mut hw, true, &inputs, 10.0, Some("x"), MotorCurve::default());

        assert_eq!(ctx.axis(0, 1), -1.0);
        assert_eq!(ctx.axis(1, 1), 0.0);
        assert_eq!(ctx.axis(5, 1), 0.0);
        assert!(!ctx.button(0, 3));
        assert_eq!(ctx.aux_cmd(), Some("x"));

        // 1500 us off pulse is 307 ticks
        ctx.set_motor_speed(2, 0.0).unwrap();
        ctx.set_pwm(reg::PWM10, 1.0).unwrap();
        assert!(ctx.digital("D9").is_err());
        assert!((ctx.battery_voltage(Battery::Logic).unwrap() - 7.9).abs() < 1e-9);

        assert_eq!(sim.pulse_width_ticks(2), 307);
        assert_eq!(sim.register(reg::PWM10), 255);
        assert_eq!(ctx.get_pwm("PWM10").unwrap(), 1.0);
    }

    #[test]
    fn test_lost_actuator_command_is_not_a_logic_error() {
        let (mut hw, sim) = hw::simulated(BusMonitor::default(), HardwareConfig::default()).unwrap();
        assert!(hw.init());
        let inputs = ControlInputs::default();
        let errors = hw.monitor().total_errors();

        {
            let mut ctx = BotCtx::new(&mut hw, true, &inputs, 10.0, None, MotorCurve::default());

            sim.fail_next(1);
            assert_eq!(ctx.set_servo(15, 0.0), Ok(()));
            sim.fail_next(1);
            assert_eq!(ctx.set_pwm("PWM9", 0.5), Ok(()));

            // Caller errors still get through, and sensor reads report the bus failure
            assert!(matches!(ctx.set_servo(16, 0.0), Err(HwError::UnknownChannel(_))));
            assert!(matches!(ctx.set_pwm("A1", 0.5), Err(HwError::UnknownChannel(_))));
            sim.fail_next(1);
            assert!(matches!(ctx.analog("A1"), Err(HwError::Bus(_))));
        }

        assert_eq!(hw.monitor().total_errors(), errors + 3);
        assert!(!hw.monitor().in_alert());
    }
}
