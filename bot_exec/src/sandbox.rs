//! # User logic sandbox
//!
//! User logic is the part of the software that changes from match to match, so it's the part
//! most likely to be wrong. The sandbox runs it so that a fault can't take the supervisor down
//! with it: an error returned from a callback, or a panic inside one, marks the logic as faulted
//! and it is never called again for the rest of the run.
//!
//! A fault in [`UserLogic::stop`] also asks the supervisor to turn every output off, since the
//! logic was the thing meant to do that.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::panic::{self, AssertUnwindSafe};

use log::{error, info};

use comms_if::{tc::BotMode, tm::CodeStatus};

use crate::{bot_ctx::BotCtx, mode_arb::Dispatch};

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Logic run by the bot in each mode.
///
/// Callbacks are made from the supervisor's cycle and must return promptly. They must never
/// block, sleep or wait on the network, anything slow belongs spread across several cycles using
/// the loop count.
pub trait UserLogic: Send {
    /// Name shown in the logs.
    fn name(&self) -> &str;

    /// Called once, before any other callback.
    fn initialize(&mut self, ctx: &mut BotCtx) -> color_eyre::Result<()>;

    /// Called every cycle in [`BotMode::Stop`]. `loop_count` is 0 on the first cycle in the mode.
    fn stop(&mut self, ctx: &mut BotCtx, loop_count: u64) -> color_eyre::Result<()>;

    /// Called every cycle in [`BotMode::Auto`].
    fn auto(&mut self, ctx: &mut BotCtx, loop_count: u64) -> color_eyre::Result<()>;

    /// Called every cycle in [`BotMode::Teleop`].
    fn teleop(&mut self, ctx: &mut BotCtx, loop_count: u64) -> color_eyre::Result<()>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct Sandbox {
    logic: Option<Box<dyn UserLogic>>,

    initialised: bool,

    fault: Option<Fault>,
}

/// Record of the fault which disabled the logic.
#[derive(Debug, Clone, PartialEq)]
pub struct Fault {
    /// Callback the fault happened in
    pub callback: &'static str,

    pub msg: String,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Result of asking the sandbox to run a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The callback ran and succeeded
    Ran,

    /// Nothing ran, there is no logic or it faulted earlier
    Skipped,

    /// The callback faulted just now
    Faulted {
        all_stop_required: bool
    },
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Sandbox {
    pub fn new(logic: Option<Box<dyn UserLogic>>) -> Self {
        match logic {
            Some(ref l) => info!("User logic \"{}\" loaded", l.name()),
            None => error!("No user logic loaded, the bot will only stop")
        }

        Self {
            logic,
            initialised: false,
            fault: None,
        }
    }

    /// Run the logic's `initialize` callback. Only the first call does anything.
    pub fn initialize(&mut self, ctx: &mut BotCtx) -> Outcome {
        if self.initialised {
            return Outcome::Skipped
        }
        self.initialised = true;

        self.call("initialize", |logic| logic.initialize(ctx))
    }

    /// Run the callback for the dispatched mode.
    pub fn run(&mut self, dispatch: &Dispatch, ctx: &mut BotCtx) -> Outcome {
        let n = dispatch.loop_count;

        match dispatch.mode {
            BotMode::Stop => self.call("stop", |logic| logic.stop(ctx, n)),
            BotMode::Auto => self.call("auto", |logic| logic.auto(ctx, n)),
            BotMode::Teleop => self.call("teleop", |logic| logic.teleop(ctx, n)),
        }
    }

    /// Whether logic is loaded and hasn't faulted.
    pub fn is_healthy(&self) -> bool {
        self.logic.is_some() && self.fault.is_none()
    }

    pub fn code_status(&self) -> CodeStatus {
        match self.is_healthy() {
            true => CodeStatus::Okay,
            false => CodeStatus::CodeErr
        }
    }

    pub fn fault(&self) -> Option<&Fault> {
        self.fault.as_ref()
    }

    pub fn logic_name(&self) -> Option<&str> {
        self.logic.as_ref().map(|l| l.name())
    }

    fn call<F>(&mut self, callback: &'static str, f: F) -> Outcome
    where
        F: FnOnce(&mut dyn UserLogic) -> color_eyre::Result<()>
    {
        if self.fault.is_some() {
            return Outcome::Skipped
        }

        let logic = match self.logic {
            Some(ref mut l) => l.as_mut(),
            None => return Outcome::Skipped
        };

        let msg = match panic::catch_unwind(AssertUnwindSafe(|| f(logic))) {
            Ok(Ok(())) => return Outcome::Ran,
            Ok(Err(e)) => format!("{:#}", e),
            Err(payload) => match payload.downcast_ref::<&str>() {
                Some(s) => format!("panicked: {}", s),
                None => match payload.downcast_ref::<String>() {
                    Some(s) => format!("panicked: {}", s),
                    None => String::from("panicked")
                }
            }
        };

        error!(
            "User logic \"{}\" faulted in {}, it will not be run again: {}",
            self.logic_name().unwrap_or("?"),
            callback,
            msg
        );

        self.fault = Some(Fault { callback, msg });

        Outcome::Faulted {
            all_stop_required: callback == "stop"
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
    use color_eyre::eyre::eyre;
    use crate::{
        bus_monitor::BusMonitor,
        hw::{self, HardwareConfig, pca9685::MotorCurve},
        logic,
        telemetry::ControlInputs
    };

    /// Logic which counts its calls and fails on chosen ones.
    struct Faulty {
        calls: Arc<AtomicUsize>,
        fail_in: BotMode,
        panic: bool,
    }

    impl UserLogic for Faulty {
        fn name(&self) -> &str {
            "faulty"
        }

        fn initialize(&mut self, _ctx: &mut BotCtx) -> color_eyre::Result<()> {
            Ok(())
        }

        fn stop(&mut self, _ctx: &mut BotCtx, _n: u64) -> color_eyre::Result<()> {
            self.called(BotMode::Stop)
        }

        fn auto(&mut self, _ctx: &mut BotCtx, _n: u64) -> color_eyre::Result<()> {
            self.called(BotMode::Auto)
        }

        fn teleop(&mut self, _ctx: &mut BotCtx, _n: u64) -> color_eyre::Result<()> {
            self.called(BotMode::Teleop)
        }
    }

    impl Faulty {
        fn called(&mut self, mode: BotMode) -> color_eyre::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            match (mode == self.fail_in, self.panic) {
                (false, _) => Ok(()),
                (true, false) => Err(eyre!("failed in {}", mode)),
                (true, true) => panic!("panicked in {}", mode)
            }
        }
    }

    fn dispatch(mode: BotMode) -> Dispatch {
        Dispatch { mode, loop_count: 0, time_remaining_s: 0.0, just_switched: true }
    }

    fn run_sandbox(fail_in: BotMode, panic: bool, modes: &[BotMode]) -> (Sandbox, Vec<Outcome>, usize) {
        let (mut hw, _sim) = hw::simulated(BusMonitor::default(), HardwareConfig::default()).unwrap();
        let inputs = ControlInputs::default();
        let calls = Arc::new(AtomicUsize::new(0));

        let mut sandbox = Sandbox::new(Some(Box::new(Faulty { calls: calls.clone(), fail_in, panic })));
        let mut outcomes = Vec::new();

        for &m in modes {
            let mut ctx = BotCtx::new(&mut hw, true, &inputs, 0.0, None, MotorCurve::default());
            outcomes.push(sandbox.run(&dispatch(m), &mut ctx));
        }

        (sandbox, outcomes, calls.load(Ordering::SeqCst))
    }

    #[test]
    fn test_error_in_stop_requires_all_stop() {
        let (sandbox, outcomes, calls) = run_sandbox(
            BotMode::Stop,
            false,
            &[BotMode::Stop, BotMode::Stop, BotMode::Teleop]
        );

        assert_eq!(outcomes, vec![
            Outcome::Faulted { all_stop_required: true },
            Outcome::Skipped,
            Outcome::Skipped
        ]);
        assert_eq!(calls, 1);
        assert_eq!(sandbox.fault().unwrap().callback, "stop");
        assert_eq!(sandbox.code_status(), CodeStatus::CodeErr);
    }

    #[test]
    fn test_panic_contained() {
        let (sandbox, outcomes, calls) = run_sandbox(
            BotMode::Teleop,
            true,
            &[BotMode::Stop, BotMode::Teleop, BotMode::Stop]
        );

        assert_eq!(outcomes, vec![
            Outcome::Ran,
            Outcome::Faulted { all_stop_required: false },
            Outcome::Skipped
        ]);
        assert_eq!(calls, 2);
        assert!(sandbox.fault().unwrap().msg.contains("panicked in TELEOP"));
    }

    #[test]
    fn test_no_logic() {
        let (mut hw, _sim) = hw::simulated(BusMonitor::default(), HardwareConfig::default()).unwrap();
        let inputs = ControlInputs::default();
        let mut ctx = BotCtx::new(&mut hw, true, &inputs, 0.0, None, MotorCurve::default());

        let mut sandbox = Sandbox::new(None);
        assert_eq!(sandbox.initialize(&mut ctx), Outcome::Skipped);
        assert_eq!(sandbox.run(&dispatch(BotMode::Auto), &mut ctx), Outcome::Skipped);
        assert_eq!(sandbox.code_status(), CodeStatus::CodeErr);
    }

    #[test]
    fn test_bus_glitch_in_teleop_keeps_logic_enabled() {
        let (mut hw, sim) = hw::simulated(BusMonitor::default(), HardwareConfig::default()).unwrap();
        assert!(hw.init());
        let inputs = ControlInputs::default();
        let errors = hw.monitor().total_errors();

        let mut sandbox = Sandbox::new(logic::from_name("servo_demo"));
        let teleop = Dispatch { mode: BotMode::Teleop, loop_count: 0, time_remaining_s: 100.0, just_switched: true };

        // One transfer fails in the middle of the servo command
        sim.fail_next(1);
        let mut ctx = BotCtx::new(&mut hw, true, &inputs, 100.0, None, MotorCurve::default());
        assert_eq!(sandbox.run(&teleop, &mut ctx), Outcome::Ran);
        assert!(sandbox.is_healthy());

        // The next cycle still runs the logic and this time the command lands
        let next = Dispatch { loop_count: 1, just_switched: false, ..teleop };
        let mut ctx = BotCtx::new(&mut hw, true, &inputs, 100.0, None, MotorCurve::default());
        assert_eq!(sandbox.run(&next, &mut ctx), Outcome::Ran);

        assert!(sandbox.fault().is_none());
        assert_eq!(sandbox.code_status(), CodeStatus::Okay);
        assert_eq!(hw.monitor().total_errors(), errors + 1);
        assert_eq!(sim.pulse_width_ticks(15), 307);
    }
}
