//! Bench test stand-in for the drive station.
//!
//! Connects to a robot, streams mode commands and neutral joystick reports, echoes the robot's
//! latency probes, and prints the status lines that come back.

use std::time::{Duration, Instant};

use structopt::StructOpt;

use comms_if::{
    eqpt::arduino::HardwareSnapshot,
    net::{zmq, Link, LinkRole, NetParams, ZmqLink},
    tc::{Axes, BotMode, Buttons, ModeCmd, Pov},
    tm::BotStatus,
    topics::{self, InboundTopic, JoystickReport}
};

#[derive(Debug, StructOpt)]
#[structopt(name = "fake_ds", about = "Minimal drive station for bench testing the robot")]
struct Opt {
    /// Endpoint of the robot's telemetry publisher
    #[structopt(long, default_value = "tcp://localhost:5801")]
    tm: String,

    /// Endpoint of the robot's command subscriber
    #[structopt(long, default_value = "tcp://localhost:5800")]
    tc: String,

    /// Mode to command: STOP, AUTO or TELEOP
    #[structopt(short, long, default_value = "TELEOP", parse(try_from_str = BotMode::from_token))]
    mode: BotMode,

    /// Length of the period in seconds, counted down in the time remaining field
    #[structopt(short, long, default_value = "150")]
    time: f64,

    /// Rate at which mode commands are sent
    #[structopt(long, default_value = "10")]
    rate_hz: f64,

    /// Stop sending commands after this many seconds, so the failsafe can be observed
    #[structopt(long)]
    silence_after: Option<f64>,

    /// Print the decoded register dump as well as the status
    #[structopt(short, long)]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let opt = Opt::from_args();

    if !(opt.rate_hz > 0.0) {
        return Err("rate_hz must be positive".into())
    }

    let ctx = zmq::Context::new();
    let params = NetParams {
        tm_endpoint: opt.tm.clone(),
        tc_endpoint: opt.tc.clone(),
    };
    let mut link = ZmqLink::new(&ctx, LinkRole::Console, &params)?;

    println!("Drive station connecting to {} / {}, commanding {}", opt.tm, opt.tc, opt.mode);

    let period = Duration::from_secs_f64(1.0 / opt.rate_hz);
    let start = Instant::now();
    let mut loop_count: i64 = 0;

    loop {
        let cycle_start = Instant::now();
        let elapsed_s = start.elapsed().as_secs_f64();

        let silent = opt.silence_after.map(|s| elapsed_s > s).unwrap_or(false);

        if !silent {
            let cmd = ModeCmd {
                mode: opt.mode,
                ds_loop_count: loop_count,
                time_remaining_s: (opt.time - elapsed_s).max(0.0),
                aux_cmd: None
            };
            link.publish(topics::MODE, &cmd.to_wire())?;

            link.publish(
                &topics::joystick_topic(0, JoystickReport::Buttons),
                &Buttons::default().to_wire()
            )?;
            link.publish(
                &topics::joystick_topic(0, JoystickReport::Axes),
                &Axes::default().to_wire()
            )?;
            link.publish(
                &topics::joystick_topic(0, JoystickReport::Pov),
                &Pov::default().to_wire()
            )?;
        }

        while let Some((topic, payload)) = link.receive()? {
            match topic.as_str() {
                topics::PING_PROBE => {
                    if !silent {
                        link.publish(topics::PING_ECHO, &payload)?;
                    }
                },
                topics::STATUS => match BotStatus::from_wire(&payload) {
                    Ok(s) => println!(
                        "[{:7.1}] {:?} loop={} hw={} bat={:.1}/{:.1} i2c_err={} recover={}",
                        elapsed_s,
                        s.status,
                        s.ds_loop_count,
                        s.hw_okay,
                        s.bat_m_v,
                        s.bat_l_v,
                        s.i2c_err_count,
                        s.recover_count
                    ),
                    Err(e) => println!("Bad status {:?}: {}", payload, e)
                },
                topics::ARDUINO if opt.verbose => match HardwareSnapshot::from_wire(&payload) {
                    Ok(snap) => println!("          {:?}", snap),
                    Err(e) => println!("Bad register dump {:?}: {}", payload, e)
                },
                t => {
                    if InboundTopic::parse(t).is_some() {
                        println!("Unexpected command topic {} from the robot", t);
                    }
                }
            }
        }

        loop_count += 1;

        if let Some(rest) = period.checked_sub(cycle_start.elapsed()) {
            std::thread::sleep(rest);
        }
    }
}
