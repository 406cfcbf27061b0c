//! Main bot-side executable entry point.
//!
//! # Architecture
//!
//! The executable initialises the hardware, the operator link and the user logic, then hands
//! them to the [`Supervisor`], which is cycled at a fixed period until the process is asked to
//! stop (SIGINT or SIGTERM). Every output is turned off before exiting.
//!
//! # Usage
//!
//! ```text
//! bot_exec [--logic NAME] [--simulate] [PARAMS_FILE]
//! ```
//!
//! `PARAMS_FILE` is relative to `$WBOT_SW_ROOT/params` and defaults to `bot_exec.toml`.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use std::{
    sync::{Arc, atomic::{AtomicBool, Ordering}},
    thread,
    time::{Duration, Instant}
};

use color_eyre::{Report, eyre::{WrapErr, eyre}};
use log::{debug, error, info, warn};
use structopt::StructOpt;

// Internal
use bot_lib::{
    bus_monitor::BusMonitor,
    hw::{self, Hardware},
    logic,
    params::{BotExecParams, HwParams},
    supervisor::Supervisor
};
use comms_if::net::{zmq, LinkRole, ZmqLink};
use util::{
    host,
    logger::{logger_init, level_from_str},
    session::Session
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "bot_exec", about = "Water Bot supervisor")]
struct Opt {
    /// Parameter file, relative to $WBOT_SW_ROOT/params
    #[structopt(default_value = "bot_exec.toml")]
    params_file: String,

    /// User logic to run, overrides the one named in the parameter file
    #[structopt(short, long)]
    logic: Option<String>,

    /// Use the simulated hardware, even on the robot
    #[structopt(long)]
    simulate: bool,
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new(
        "bot_exec",
        "sessions"
    ).wrap_err("Failed to create the session")?;

    let opt = Opt::from_args();

    // Parameters are needed before the logger to know the log level
    let mut params: BotExecParams = util::params::load(&opt.params_file)
        .wrap_err_with(|| format!("Could not load the parameters from {}", opt.params_file))?;

    if opt.logic.is_some() {
        params.logic = opt.logic.clone();
    }
    params.hw.simulate |= opt.simulate;

    let log_level = level_from_str(&params.log_level)
        .ok_or_else(|| eyre!("Unknown log level \"{}\"", params.log_level))?;

    // Initialise logger
    logger_init(log_level, &session)
        .wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Water Bot Executable\n");
    info!(
        "Running on: {:#?}",
        host::get_uname().wrap_err("Failed to get host information")?
    );
    info!("Session directory: {:?}\n", session.session_root);

    params.are_valid().wrap_err("Invalid parameters")?;
    info!("Exec parameters loaded from {}", opt.params_file);
    debug!("{:#?}", params);

    // ---- SIGNAL HANDLING ----

    let stop_requested = Arc::new(AtomicBool::new(false));
    {
        let stop_requested = stop_requested.clone();
        ctrlc::set_handler(move || stop_requested.store(true, Ordering::SeqCst))
            .wrap_err("Failed to set the signal handler")?;
    }

    // ---- INITIALISE HARDWARE ----

    info!("Initialising hardware...");

    let mut monitor = BusMonitor::new(params.bus_alert_threshold);
    monitor.set_alert_callback(Box::new(|total_errors| {
        error!("I2C bus alert raised, {} errors so far", total_errors)
    }));

    let hw = open_hardware(&params.hw, monitor)
        .wrap_err("Failed to open the hardware")?;

    // ---- INITIALISE NETWORK ----

    info!("Initialising network");

    let zmq_ctx = zmq::Context::new();
    let link = ZmqLink::new(&zmq_ctx, LinkRole::Robot, &params.net)
        .wrap_err("Failed to initialise the operator link")?;

    info!(
        "Operator link up, telemetry on {}, commands on {}",
        params.net.tm_endpoint,
        params.net.tc_endpoint
    );

    // ---- INITIALISE USER LOGIC ----

    let user_logic = match params.logic {
        Some(ref name) => {
            let l = logic::from_name(name);
            if l.is_none() {
                error!(
                    "Unknown user logic \"{}\", expected one of {:?}",
                    name,
                    logic::NAMES
                );
            }
            l
        },
        None => None
    };

    let cycle_period = Duration::from_secs_f64(params.cycle_period_s);
    let mut supervisor = Supervisor::new(params, hw, Box::new(link), user_logic);

    // ---- MAIN LOOP ----

    info!("Begining main loop\n");

    let mut num_cycle_overruns: u64 = 0;

    while !stop_requested.load(Ordering::SeqCst) {

        // Get cycle start time
        let cycle_start_instant = Instant::now();

        supervisor.cycle(cycle_start_instant);

        // ---- CYCLE MANAGEMENT ----

        let cycle_dur = Instant::now() - cycle_start_instant;

        // Get sleep duration
        match cycle_period.checked_sub(cycle_dur) {
            Some(d) => thread::sleep(d),
            None => {
                warn!(
                    "Cycle overran by {:.06} s",
                    cycle_dur.as_secs_f64() - cycle_period.as_secs_f64()
                );
                num_cycle_overruns += 1;
            }
        }
    }

    // ---- SHUTDOWN ----

    info!("Stop requested, shutting down");
    supervisor.shutdown();
    info!("{} cycle overruns", num_cycle_overruns);

    info!("End of execution");

    Ok(())
}

/// Open the I2C bus and the reset lines of the Raspberry Pi.
#[cfg(target_arch = "arm")]
fn open_hardware(params: &HwParams, monitor: BusMonitor) -> Result<Hardware, Report> {
    use bot_lib::hw::transport::{HalBus, PinPair};
    use rppal::{gpio::Gpio, i2c::I2c};

    if params.simulate {
        warn!("Using simulated hardware");
        let (hw, _) = hw::simulated(monitor, params.hardware_config())
            .wrap_err("Could not create the simulated hardware")?;
        return Ok(hw)
    }

    let mut i2c = I2c::with_bus(params.i2c_bus)
        .wrap_err_with(|| format!("Could not open I2C bus {}", params.i2c_bus))?;
    i2c.set_timeout(params.i2c_timeout_ms)
        .wrap_err("Could not set the I2C timeout")?;

    let gpio = Gpio::new().wrap_err("Could not access the GPIO")?;
    let d0 = gpio.get(params.reset_pins[0])
        .wrap_err("Could not get the first reset pin")?
        .into_output();
    let d1 = gpio.get(params.reset_pins[1])
        .wrap_err("Could not get the second reset pin")?
        .into_output();

    let reset_line = PinPair::new(d0, d1)
        .wrap_err("Could not release the reset lines")?;

    info!("I2C bus {} opened", params.i2c_bus);

    Hardware::new(
        Box::new(HalBus::new(i2c)),
        Box::new(reset_line),
        monitor,
        params.hardware_config()
    ).wrap_err("Could not set up the devices on the bus")
}

/// Off the Raspberry Pi there is no bus to open, so the simulated hardware is always used.
#[cfg(not(target_arch = "arm"))]
fn open_hardware(params: &HwParams, monitor: BusMonitor) -> Result<Hardware, Report> {
    if !params.simulate {
        warn!("Not running on a Raspberry Pi, using simulated hardware");
    }

    let (hw, _) = hw::simulated(monitor, params.hardware_config())
        .wrap_err("Could not create the simulated hardware")?;

    Ok(hw)
}
