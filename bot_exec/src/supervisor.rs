//! # Supervisor
//!
//! Owns every part of the bot and runs one cycle of the main loop at a time:
//!
//! 1. Check the bus is healthy, or try to recover it
//! 2. Drain the operator link into the input caches
//! 3. Send a ping probe if one is due
//! 4. Report the status to the drive station, and to the terminal, when due
//! 5. Advance the mode and run the user logic for it
//!
//! Nothing that goes wrong during a cycle is returned to the caller. Errors are logged, counted
//! and handled by the policy that owns them.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use comms_if::{codec, net::Link, tc::BotMode, tm::BotStatus};
use util::time::Cadence;

use crate::{
    bot_ctx::BotCtx,
    hw::Hardware,
    mode_arb::{Dispatch, ModeArbiter},
    params::BotExecParams,
    sandbox::{Outcome, Sandbox, UserLogic},
    telemetry::{TelemetryChannel, TelemetryTiming}
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct Supervisor {
    params: BotExecParams,

    hw: Hardware,

    /// Whether the hardware is believed to be working, actuator commands are dropped if not
    hw_okay: bool,

    /// Number of times the hardware has been recovered
    recover_count: u64,

    /// Failed recovery attempts since the last success or hardware reset
    failed_recoveries: u32,

    recovery_cadence: Cadence,

    arb: ModeArbiter,

    sandbox: Sandbox,

    telemetry: TelemetryChannel,

    num_cycles: u64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Supervisor {
    /// Create the supervisor and bring up the hardware and user logic.
    pub fn new(
        params: BotExecParams,
        hw: Hardware,
        link: Box<dyn Link>,
        logic: Option<Box<dyn UserLogic>>
    ) -> Self {
        let timing = TelemetryTiming {
            status_period: Duration::from_secs_f64(params.status_period_s),
            term_report_period: Duration::from_secs_f64(params.term_report_period_s),
            ping_period: Duration::from_secs_f64(params.ping_period_s),
            ping_timeout: Duration::from_secs_f64(params.ping_timeout_s),
        };

        let mut sup = Self {
            hw,
            hw_okay: false,
            recover_count: 0,
            failed_recoveries: 0,
            recovery_cadence: Cadence::from_secs_f64(params.recovery_period_s),
            arb: ModeArbiter::new(
                params.malformed_mode_cmd,
                Duration::from_secs_f64(params.failsafe_timeout_s)
            ),
            sandbox: Sandbox::new(logic),
            telemetry: TelemetryChannel::new(link, timing),
            num_cycles: 0,
            params,
        };

        sup.hw_okay = sup.hw.init();
        match sup.hw_okay {
            true => info!("Hardware initialised"),
            false => error!("Hardware failed to initialise, will keep trying")
        }

        let mut ctx = BotCtx::new(
            &mut sup.hw,
            sup.hw_okay,
            sup.telemetry.inputs(),
            0.0,
            None,
            sup.params.hw.motor
        );
        if let Outcome::Faulted { .. } = sup.sandbox.initialize(&mut ctx) {
            warn!("User logic failed to initialise");
        }

        sup
    }

    /// Run one cycle of the main loop.
    pub fn cycle(&mut self, now: Instant) {
        self.check_bus(now);

        for cmd in self.telemetry.poll_inbound(now) {
            self.arb.on_mode_cmd(cmd.as_ref());
        }

        self.telemetry.poll_ping(now);

        self.report_to_ds(now);
        self.report_to_term(now);

        self.control_bot(now);

        self.num_cycles += 1;
    }

    /// Turn every output off before exiting.
    pub fn shutdown(&mut self) {
        match self.hw.all_stop() {
            Ok(()) => info!("All outputs stopped"),
            Err(e) => error!("Could not stop all outputs: {}", e)
        }

        info!(
            "Ran {} cycles, {} bus errors, {} recoveries",
            self.num_cycles,
            self.hw.monitor().total_errors(),
            self.recover_count
        );
    }

    pub fn hw_okay(&self) -> bool {
        self.hw_okay
    }

    pub fn recover_count(&self) -> u64 {
        self.recover_count
    }

    pub fn hardware(&self) -> &Hardware {
        &self.hw
    }

    pub fn arbiter(&self) -> &ModeArbiter {
        &self.arb
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    pub fn telemetry(&self) -> &TelemetryChannel {
        &self.telemetry
    }

    /// Build the status line sent to the drive station.
    ///
    /// Batteries read zero while the hardware is unhealthy, the last snapshot is stale by then.
    pub fn status(&self) -> BotStatus {
        let snapshot = self.hw.snapshot().filter(|_| self.hw_okay);

        BotStatus {
            status: self.sandbox.code_status(),
            ds_loop_count: self.arb.ds_loop_count(),
            hw_okay: self.hw_okay,
            bat_m_v: snapshot.map(|s| s.bat_m_v).unwrap_or(0.0),
            bat_l_v: snapshot.map(|s| s.bat_l_v).unwrap_or(0.0),
            i2c_err_count: self.hw.monitor().total_errors(),
            recover_count: self.recover_count,
            version: snapshot.map(|s| s.version()),
        }
    }

    // ---- BUS HEALTH ----

    fn check_bus(&mut self, now: Instant) {
        if self.hw_okay {
            if self.hw.monitor().in_alert() {
                error!("I2C bus failure, actuators disabled");
                self.lose_hw(now);
            }
            else if !self.hw.test_health() {
                error!("Arduino health test failed, actuators disabled");
                self.lose_hw(now);
            }
            return
        }

        if self.recovery_cadence.ready(now) {
            self.try_recover();
        }
    }

    fn lose_hw(&mut self, now: Instant) {
        self.hw_okay = false;
        self.failed_recoveries = 0;
        self.recovery_cadence.restart(now);
    }

    fn try_recover(&mut self) {
        let reset_after = self.params.hard_reset_after_failed_recoveries;

        if reset_after > 0 && self.failed_recoveries >= reset_after {
            warn!("{} recovery attempts failed, resetting the Arduino", self.failed_recoveries);
            self.failed_recoveries = 0;

            match self.hw.reset_hardware() {
                Ok(()) => info!("Arduino reset"),
                Err(e) => warn!("Arduino reset failed: {}", e)
            }
        }

        if self.hw.test_health() && self.hw.init_pwm_driver().is_ok() {
            info!("Hardware recovered");
            self.hw.monitor_mut().reset();
            self.hw_okay = true;
            self.recover_count += 1;
            self.failed_recoveries = 0;
        }
        else {
            self.failed_recoveries += 1;
            debug!("Hardware recovery attempt {} failed", self.failed_recoveries);
        }
    }

    // ---- REPORTING ----

    fn report_to_ds(&mut self, now: Instant) {
        if !self.telemetry.status_due(now) {
            return
        }

        let mut dump = None;
        if self.hw_okay {
            match self.hw.refresh_snapshot() {
                Ok(_) => dump = self.hw.raw_registers().copied(),
                Err(e) => debug!("Could not read the Arduino registers: {}", e)
            }
        }

        let status = self.status();
        self.telemetry.send_status(&status);

        if let Some(regs) = dump {
            self.telemetry.send_register_dump(&regs);
        }
    }

    fn report_to_term(&mut self, now: Instant) {
        if !self.telemetry.term_report_due(now) {
            return
        }

        let status = self.status();
        let counts = self.telemetry.counts();
        let js = self.telemetry.inputs().joystick(0).copied().unwrap_or_default();

        let buttons = js.buttons.0.iter()
            .map(|&b| codec::flag_str(b))
            .collect::<Vec<_>>()
            .join(" ");

        info!(
            "\n    Mode: {}   Time to go: {:6.1} s   Logic: {} ({})\
             \n    Hardware okay: {}   I2C errors: {}   Recoveries: {}\
             \n    Main battery: {:6.1} V   Logic battery: {:6.1} V\
             \n    Link connected: {}   Ping: {}\
             \n    Messages received: {}   sent: {}   decode errors: {}   link errors: {}   unknown: {}\
             \n    Axes: {:?}   POV: {:?}\
             \n    Buttons: {}\
             \n    Mode msg errors: {}   Timeouts: {}",
            self.arb.mode(),
            self.arb.time_remaining_s(),
            self.sandbox.logic_name().unwrap_or("none"),
            status.status.as_token(),
            self.hw_okay,
            status.i2c_err_count,
            self.recover_count,
            status.bat_m_v,
            status.bat_l_v,
            self.telemetry.is_connected(),
            self.telemetry.ping().latency_str(),
            counts.received,
            counts.sent,
            counts.decode_errors,
            counts.link_errors,
            counts.unknown_topics,
            js.axes.0,
            js.pov.0,
            buttons,
            self.arb.msg_err_count(),
            self.arb.timeout_count()
        );
    }

    // ---- CONTROL ----

    fn control_bot(&mut self, now: Instant) {
        let dispatch = self.arb.step(now, self.telemetry.operator().received_at());

        if dispatch.mode == BotMode::Stop && dispatch.just_switched {
            self.all_stop();
        }

        if let Outcome::Faulted { all_stop_required: true } = self.run_logic(&dispatch) {
            self.all_stop();
        }
    }

    fn run_logic(&mut self, dispatch: &Dispatch) -> Outcome {
        let mut ctx = BotCtx::new(
            &mut self.hw,
            self.hw_okay,
            self.telemetry.inputs(),
            dispatch.time_remaining_s,
            self.arb.aux_cmd(),
            self.params.hw.motor
        );

        self.sandbox.run(dispatch, &mut ctx)
    }

    /// Turn every output off, even if the hardware is unhealthy.
    fn all_stop(&mut self) {
        if let Err(e) = self.hw.all_stop() {
            warn!("All stop incomplete: {}", e);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
    use color_eyre::eyre::eyre;
    use comms_if::{
        eqpt::arduino::{self as reg, HardwareSnapshot},
        net::MemLink,
        tm::{self, CodeStatus},
        topics
    };
    use crate::{bus_monitor::BusMonitor, hw::{self, sim::SimBus}, logic};

    /// Step between simulated cycles.
    const DT: Duration = Duration::from_millis(20);

    struct Bench {
        sup: Supervisor,
        sim: SimBus,
        console: MemLink,
        t: Instant,
    }

    impl Bench {
        fn new(logic: Option<Box<dyn UserLogic>>) -> Self {
            Self::with_sim_logic(|_| logic)
        }

        /// Build the bench with logic which can reach into the simulated bus.
        fn with_sim_logic<F>(make_logic: F) -> Self
        where
            F: FnOnce(&SimBus) -> Option<Box<dyn UserLogic>>
        {
            let params = BotExecParams::default();
            let (hw, sim) = hw::simulated(
                BusMonitor::new(params.bus_alert_threshold),
                params.hw.hardware_config()
            ).unwrap();
            let logic = make_logic(&sim);
            let (robot, console) = MemLink::pair();

            Self {
                sup: Supervisor::new(params, hw, Box::new(robot), logic),
                sim,
                console,
                t: Instant::now(),
            }
        }

        fn send(&mut self, topic: &str, payload: &str) {
            self.console.publish(topic, payload).unwrap();
        }

        fn run_for(&mut self, dur: Duration) {
            let end = self.t + dur;
            while self.t < end {
                self.sup.cycle(self.t);
                self.t += DT;
            }
        }

        fn sent_on(&mut self, topic: &str) -> Vec<String> {
            self.console.drain()
                .into_iter()
                .filter(|(t, _)| t == topic)
                .map(|(_, p)| p)
                .collect()
        }
    }

    /// Logic whose `stop` fails the first time it runs.
    struct FailingStop {
        stop_calls: Arc<AtomicUsize>,
    }

    impl UserLogic for FailingStop {
        fn name(&self) -> &str {
            "failing_stop"
        }

        fn initialize(&mut self, _ctx: &mut BotCtx) -> color_eyre::Result<()> {
            Ok(())
        }

        fn stop(&mut self, ctx: &mut BotCtx, _n: u64) -> color_eyre::Result<()> {
            self.stop_calls.fetch_add(1, Ordering::SeqCst);
            ctx.set_pwm("PWM9", 1.0)?;
            Err(eyre!("motor jammed"))
        }

        fn auto(&mut self, _ctx: &mut BotCtx, _n: u64) -> color_eyre::Result<()> {
            Ok(())
        }

        fn teleop(&mut self, _ctx: &mut BotCtx, _n: u64) -> color_eyre::Result<()> {
            Ok(())
        }
    }

    /// Logic which centres a servo every teleop cycle, with one transfer failing on the second.
    struct GlitchedServo {
        sim: SimBus,
        teleop_calls: Arc<AtomicUsize>,
    }

    impl UserLogic for GlitchedServo {
        fn name(&self) -> &str {
            "glitched_servo"
        }

        fn initialize(&mut self, _ctx: &mut BotCtx) -> color_eyre::Result<()> {
            Ok(())
        }

        fn stop(&mut self, _ctx: &mut BotCtx, _n: u64) -> color_eyre::Result<()> {
            Ok(())
        }

        fn auto(&mut self, _ctx: &mut BotCtx, _n: u64) -> color_eyre::Result<()> {
            Ok(())
        }

        fn teleop(&mut self, ctx: &mut BotCtx, _n: u64) -> color_eyre::Result<()> {
            if self.teleop_calls.fetch_add(1, Ordering::SeqCst) == 1 {
                self.sim.fail_next(1);
            }
            ctx.set_servo(15, 0.0)?;
            Ok(())
        }
    }

    #[test]
    fn test_link_loss_stops_bot() {
        let mut bench = Bench::new(logic::from_name("servo_demo"));

        bench.send(topics::MODE, "TELEOP 1 120.0");
        bench.run_for(DT);
        assert_eq!(bench.sup.arbiter().mode(), BotMode::Teleop);

        bench.run_for(Duration::from_millis(2600));
        assert_eq!(bench.sup.arbiter().mode(), BotMode::Stop);
        assert_eq!(bench.sup.arbiter().timeout_count(), 1);

        bench.run_for(Duration::from_secs(2));
        assert_eq!(bench.sup.arbiter().timeout_count(), 1);
    }

    #[test]
    fn test_malformed_mode_cmd_stops_bot() {
        let mut bench = Bench::new(logic::from_name("idle"));

        bench.send(topics::MODE, "TELEOP 1 120.0");
        bench.run_for(DT);

        bench.send(topics::MODE, "FOO 1 2");
        bench.run_for(DT);
        assert_eq!(bench.sup.arbiter().mode(), BotMode::Stop);
        assert_eq!(bench.sup.arbiter().msg_err_count(), 1);
        assert_eq!(bench.sup.telemetry().counts().decode_errors, 1);
    }

    #[test]
    fn test_status_report() {
        let mut bench = Bench::new(None);

        bench.send(topics::MODE, "AUTO 41 15.0");
        bench.run_for(DT);

        let status = bench.sent_on(topics::STATUS);
        assert_eq!(status.len(), 1);
        let status = BotStatus::from_wire(&status[0]).unwrap();
        assert_eq!(status.status, CodeStatus::CodeErr);
        assert!(status.hw_okay);
        assert!((status.bat_m_v - 12.4).abs() < 1e-9);
        assert_eq!(status.version.as_deref(), Some("e"));

        // Register dump goes out with the status, the next one a second later
        bench.run_for(Duration::from_millis(900));
        assert!(bench.sent_on(topics::STATUS).is_empty());

        bench.sim.set_register(reg::A6, 51);
        bench.run_for(Duration::from_millis(200));
        let dump = bench.sent_on(topics::ARDUINO);
        assert_eq!(dump.len(), 1);

        let regs = tm::decode_register_dump(&dump[0]).unwrap();
        let snapshot = HardwareSnapshot::from_registers(&regs).unwrap();
        assert!((snapshot.analog[3] - 0.2).abs() < 1.0 / 255.0);
    }

    #[test]
    fn test_bus_failure_and_recovery() {
        let mut bench = Bench::new(logic::from_name("servo_demo"));
        assert!(bench.sup.hw_okay());

        bench.run_for(DT);
        assert!(bench.sup.status().bat_m_v > 12.0);

        bench.sim.set_failing(true);
        bench.run_for(DT);
        assert!(!bench.sup.hw_okay());
        let status = bench.sup.status();
        assert!(!status.hw_okay);
        assert_eq!((status.bat_m_v, status.bat_l_v), (0.0, 0.0));
        assert_eq!(status.version, None);

        // Actuator commands are dropped while unhealthy
        bench.send(topics::MODE, "TELEOP 1 120.0");
        bench.run_for(Duration::from_millis(400));
        assert_eq!(bench.sim.pulse_width_ticks(15), 0);

        bench.sim.set_failing(false);
        bench.run_for(Duration::from_millis(600));
        assert!(bench.sup.hw_okay());
        assert_eq!(bench.sup.recover_count(), 1);
        assert!(!bench.sup.hardware().monitor().in_alert());

        // The servo is centred again now the hardware is back
        bench.send(topics::MODE, "TELEOP 2 119.0");
        bench.run_for(DT);
        assert_eq!(bench.sim.pulse_width_ticks(15), 307);
    }

    #[test]
    fn test_bus_glitch_in_teleop_keeps_logic_enabled() {
        let teleop_calls = Arc::new(AtomicUsize::new(0));
        let calls = teleop_calls.clone();
        let mut bench = Bench::with_sim_logic(move |sim| {
            let logic: Box<dyn UserLogic> = Box::new(GlitchedServo { sim: sim.clone(), teleop_calls: calls });
            Some(logic)
        });
        let errors = bench.sup.hardware().monitor().total_errors();

        bench.send(topics::MODE, "TELEOP 1 120.0");
        bench.run_for(DT * 2);
        assert_eq!(teleop_calls.load(Ordering::SeqCst), 2);
        assert_eq!(bench.sup.hardware().monitor().total_errors(), errors + 1);

        // Next cycle the logic is still enabled and the bus still healthy
        bench.run_for(DT);
        assert_eq!(teleop_calls.load(Ordering::SeqCst), 3);
        assert!(bench.sup.sandbox().is_healthy());
        assert!(bench.sup.hw_okay());
        assert_eq!(bench.sup.status().status, CodeStatus::Okay);
        assert_eq!(bench.sup.hardware().monitor().total_errors(), errors + 1);
        assert_eq!(bench.sim.pulse_width_ticks(15), 307);
    }

    #[test]
    fn test_locked_bus_needs_hard_reset() {
        let mut bench = Bench::new(logic::from_name("idle"));

        bench.sim.lock_bus();
        bench.run_for(Duration::from_millis(2000));
        assert!(!bench.sup.hw_okay());

        // Four failed recoveries, then a reset on the fifth attempt unlocks the bus
        bench.run_for(Duration::from_millis(1000));
        assert!(bench.sup.hw_okay());
        assert_eq!(bench.sup.recover_count(), 1);
    }

    #[test]
    fn test_faulting_stop_triggers_all_stop_once() {
        let stop_calls = Arc::new(AtomicUsize::new(0));
        let mut bench = Bench::new(Some(Box::new(FailingStop { stop_calls: stop_calls.clone() })));

        bench.run_for(DT);
        assert_eq!(stop_calls.load(Ordering::SeqCst), 1);
        assert_eq!(bench.sim.register(reg::PWM9), 0);
        assert_eq!(bench.sup.sandbox().fault().map(|f| f.callback), Some("stop"));

        // Later cycles neither call the logic again nor repeat the all stop
        bench.sim.set_register(reg::PWM9, 100);
        bench.run_for(Duration::from_millis(200));
        assert_eq!(stop_calls.load(Ordering::SeqCst), 1);
        assert_eq!(bench.sim.register(reg::PWM9), 100);
        assert_eq!(bench.sup.status().status, CodeStatus::CodeErr);
    }
}
