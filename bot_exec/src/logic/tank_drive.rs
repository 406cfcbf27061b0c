//! # Tank drive
//!
//! Two continuous rotation motors, one per side, each driven by a stick of the first joystick.
//! The bot stays still in auto.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use crate::{bot_ctx::BotCtx, sandbox::UserLogic};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

pub const NAME: &str = "tank_drive";

const LEFT_MOTOR_CHAN: u8 = 0;
const RIGHT_MOTOR_CHAN: u8 = 1;

const JOYSTICK: usize = 0;

/// Left stick Y axis
const LEFT_AXIS: usize = 1;

/// Right stick Y axis
const RIGHT_AXIS: usize = 3;

/// Stick deflections smaller than this are treated as centred
const DEADBAND: f64 = 0.05;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Default)]
pub struct TankDrive {
    /// Last (left, right) speeds demanded
    speeds: (f64, f64),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl TankDrive {
    fn drive(&mut self, ctx: &mut BotCtx, left: f64, right: f64) -> color_eyre::Result<()> {
        self.speeds = (left, right);
        ctx.set_motor_speed(LEFT_MOTOR_CHAN, left)?;
        ctx.set_motor_speed(RIGHT_MOTOR_CHAN, right)?;
        Ok(())
    }
}

impl UserLogic for TankDrive {
    fn name(&self) -> &str {
        NAME
    }

    fn initialize(&mut self, ctx: &mut BotCtx) -> color_eyre::Result<()> {
        self.drive(ctx, 0.0, 0.0)
    }

    fn stop(&mut self, ctx: &mut BotCtx, loop_count: u64) -> color_eyre::Result<()> {
        if loop_count == 0 {
            self.drive(ctx, 0.0, 0.0)?;
        }
        Ok(())
    }

    fn auto(&mut self, ctx: &mut BotCtx, loop_count: u64) -> color_eyre::Result<()> {
        if loop_count == 0 {
            self.drive(ctx, 0.0, 0.0)?;
        }
        Ok(())
    }

    fn teleop(&mut self, ctx: &mut BotCtx, _loop_count: u64) -> color_eyre::Result<()> {
        // Pushing a stick forward gives a negative axis value
        let left = deadband(-ctx.axis(JOYSTICK, LEFT_AXIS));
        let right = deadband(-ctx.axis(JOYSTICK, RIGHT_AXIS));

        self.drive(ctx, left, right)
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn deadband(v: f64) -> f64 {
    match v.abs() < DEADBAND {
        true => 0.0,
        false => v
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use comms_if::topics::JoystickReport;
    use crate::{
        bus_monitor::BusMonitor,
        hw::{self, HardwareConfig, pca9685::MotorCurve},
        telemetry::ControlInputs
    };

    #[test]
    fn test_teleop_motor_pulses() {
        let (mut hw, sim) = hw::simulated(BusMonitor::default(), HardwareConfig::default()).unwrap();
        assert!(hw.init());
        let mut inputs = ControlInputs::default();
        inputs.apply(0, JoystickReport::Axes, "0.0 -1.0 0.0 0.02 0.0 0.0").unwrap();

        let mut logic = TankDrive::default();
        let mut ctx = BotCtx::new(&mut hw, true, &inputs, 0.0, None, MotorCurve::default());

        logic.teleop(&mut ctx, 0).unwrap();
        assert_eq!(logic.speeds, (1.0, 0.0));

        // 2150 us and 1500 us at 50 Hz
        assert_eq!(sim.pulse_width_ticks(LEFT_MOTOR_CHAN), 441);
        assert_eq!(sim.pulse_width_ticks(RIGHT_MOTOR_CHAN), 307);

        logic.stop(&mut ctx, 0).unwrap();
        assert_eq!(logic.speeds, (0.0, 0.0));
        assert_eq!(sim.pulse_width_ticks(LEFT_MOTOR_CHAN), 307);
    }
}
