//! # Servo demo
//!
//! Drives the servo on channel 15 of the PWM driver from the Y axis of the first joystick. In
//! auto the servo sweeps slowly from end to end.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use crate::{bot_ctx::BotCtx, sandbox::UserLogic};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

pub const NAME: &str = "servo_demo";

const SERVO_CHAN: u8 = 15;

const JOYSTICK: usize = 0;

/// Left stick Y axis
const Y_AXIS: usize = 1;

/// Cycles for the auto sweep to go from one end to the other
const SWEEP_CYCLES: u64 = 100;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Default)]
pub struct ServoDemo {
    /// Last rotation sent to the servo
    rotation: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl UserLogic for ServoDemo {
    fn name(&self) -> &str {
        NAME
    }

    fn initialize(&mut self, ctx: &mut BotCtx) -> color_eyre::Result<()> {
        ctx.kill_all()?;
        Ok(())
    }

    fn stop(&mut self, ctx: &mut BotCtx, loop_count: u64) -> color_eyre::Result<()> {
        if loop_count == 0 {
            ctx.kill_all()?;
        }
        Ok(())
    }

    fn auto(&mut self, ctx: &mut BotCtx, loop_count: u64) -> color_eyre::Result<()> {
        self.rotation = sweep(loop_count);
        ctx.set_servo(SERVO_CHAN, self.rotation)?;
        Ok(())
    }

    fn teleop(&mut self, ctx: &mut BotCtx, _loop_count: u64) -> color_eyre::Result<()> {
        self.rotation = ctx.axis(JOYSTICK, Y_AXIS);
        ctx.set_servo(SERVO_CHAN, self.rotation)?;
        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Triangle wave between -1 and +1, starting from -1.
fn sweep(loop_count: u64) -> f64 {
    let phase = loop_count % (2 * SWEEP_CYCLES);
    let frac = phase as f64 / SWEEP_CYCLES as f64;

    match phase < SWEEP_CYCLES {
        true => -1.0 + 2.0 * frac,
        false => 3.0 - 2.0 * frac
    }
}
