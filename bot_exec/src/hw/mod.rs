//! # Hardware access
//!
//! The [`Hardware`] facade owns the robot's I2C bus, the two devices on it (the Arduino and the
//! PCA9685 PWM driver) and the Arduino's reset lines. Every transfer is reported to the
//! [`BusMonitor`], which the supervisor watches to decide when the bus needs recovering.
//!
//! Nothing here decides policy. Operations return their result and leave it to the caller to
//! decide what a failure means.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

pub mod arduino;
pub mod pca9685;
pub mod sim;
pub mod transport;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{thread, time::Duration};

use log::{debug, warn};

use comms_if::eqpt::arduino::{HardwareSnapshot, NUM_REGS};

use crate::bus_monitor::BusMonitor;
use arduino::{Arduino, Battery, PinRef, RegRef};
use pca9685::PwmDriver;
use transport::{BusError, MonitorGuard, MonitoredBus, RegisterBus, ResetLine, SharedBus};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Time the reset lines are held low, long enough for the Arduino to notice.
const RESET_HOLD: Duration = Duration::from_millis(35);

/// Time allowed for the Arduino to boot after a reset.
const RESET_BOOT: Duration = Duration::from_millis(25);

/// Largest timestamp the Arduino can report if it really has just reset.
const MAX_POST_RESET_TIMESTAMP_MS: u32 = 1000;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct Hardware {
    /// Bus shared by the Arduino and the PWM driver
    bus: SharedBus,

    reset_line: Box<dyn ResetLine + Send>,

    arduino: Arduino,

    pwm: PwmDriver,

    /// Last complete register file read from the Arduino
    raw_regs: Option<[u8; NUM_REGS]>,

    snapshot: Option<HardwareSnapshot>,
}

/// Addresses and servo calibration of the devices on the bus.
#[derive(Debug, Clone, Copy)]
pub struct HardwareConfig {
    pub arduino_addr: u8,

    pub pca9685_addr: u8,

    pub servo_range_us: (f64, f64),
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HwError {
    #[error(transparent)]
    Bus(#[from] BusError),

    #[error("Unknown or invalid channel {0:?}")]
    UnknownChannel(String),

    #[error("The PWM driver has not been initialised")]
    NotInitialised,

    #[error("Value rejected by the PWM driver")]
    InvalidValue,

    #[error("Malformed register file: {0}")]
    BadRegisters(String),

    #[error("The hardware is unhealthy")]
    Unavailable,
}

/// Reasons a hardware reset was not confirmed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResetError {
    #[error("Unable to drive the reset lines: {0}")]
    ResetLine(BusError),

    #[error("Unable to get timestamp after reset")]
    TimestampUnreadable,

    #[error("Health test fails after reset")]
    HealthTestFailed,

    #[error("Timestamp ({0}) too large for reset to have occurred")]
    TimestampTooLarge(u32),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            arduino_addr: arduino::DEFAULT_ADDR,
            pca9685_addr: pca9685::DEFAULT_ADDR,
            servo_range_us: (800.0, 2200.0),
        }
    }
}

impl Hardware {
    /// Create the facade. No bus traffic happens until [`Hardware::init`] is called.
    pub fn new(
        bus: Box<dyn RegisterBus + Send>,
        reset_line: Box<dyn ResetLine + Send>,
        monitor: BusMonitor,
        config: HardwareConfig
    ) -> Result<Self, HwError> {
        let bus = SharedBus::new(MonitoredBus::new(bus, monitor));
        let pwm = PwmDriver::new(bus.clone(), config.pca9685_addr, config.servo_range_us)?;

        Ok(Self {
            bus,
            reset_line,
            arduino: Arduino::new(config.arduino_addr),
            pwm,
            raw_regs: None,
            snapshot: None,
        })
    }

    /// Bring the hardware up: initialise the PWM driver, turn every output off, and check the
    /// bus. Returns whether the hardware is usable.
    pub fn init(&mut self) -> bool {
        if let Err(e) = self.init_pwm_driver() {
            warn!("Could not initialise the PWM driver: {}", e);
        }

        if let Err(e) = self.all_stop() {
            warn!("Could not stop all outputs: {}", e);
        }

        self.test_health() && self.pwm.is_initialised()
    }

    /// Write a random value to the Arduino's test register and read it back.
    pub fn test_health(&mut self) -> bool {
        self.arduino.test_health(&mut self.bus.lock())
    }

    /// Reset the Arduino through its reset lines and check the reset really happened.
    ///
    /// Takes around 60 ms.
    pub fn reset_hardware(&mut self) -> Result<(), ResetError> {
        self.reset_line.assert_reset().map_err(ResetError::ResetLine)?;
        thread::sleep(RESET_HOLD);
        self.reset_line.release_reset().map_err(ResetError::ResetLine)?;
        thread::sleep(RESET_BOOT);

        let time_ms = self.arduino.timestamp(&mut self.bus.lock())
            .map_err(|_| ResetError::TimestampUnreadable)?;

        if !self.test_health() {
            return Err(ResetError::HealthTestFailed)
        }

        if time_ms > MAX_POST_RESET_TIMESTAMP_MS {
            return Err(ResetError::TimestampTooLarge(time_ms))
        }

        debug!("Arduino reset, timestamp now {} ms", time_ms);
        Ok(())
    }

    pub fn init_pwm_driver(&mut self) -> Result<(), HwError> {
        self.pwm.init()
    }

    pub fn pwm_driver_initialised(&self) -> bool {
        self.pwm.is_initialised()
    }

    /// Read the Arduino's whole register file.
    ///
    /// The stored snapshot is only replaced if every register was read, a failure leaves the
    /// previous one in place.
    pub fn refresh_snapshot(&mut self) -> Result<HardwareSnapshot, HwError> {
        let regs = self.arduino.read_all(&mut self.bus.lock())?;

        let snapshot = HardwareSnapshot::from_registers(&regs)
            .map_err(|e| HwError::BadRegisters(e.to_string()))?;

        self.raw_regs = Some(regs);
        self.snapshot = Some(snapshot);
        Ok(snapshot)
    }

    pub fn snapshot(&self) -> Option<&HardwareSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn raw_registers(&self) -> Option<&[u8; NUM_REGS]> {
        self.raw_regs.as_ref()
    }

    /// Turn off every actuator output, the PWM driver's channels and the Arduino's PWM outputs.
    ///
    /// Both devices are tried whatever happens to the other, the first error is returned.
    pub fn all_stop(&mut self) -> Result<(), HwError> {
        let pwm_res = match self.pwm.is_initialised() {
            true => self.pwm.kill_all(),
            false => Ok(())
        };

        let ard_res = self.set_arduino_pwm(RegRef::Name("ALL"), 0.0);

        pwm_res.and(ard_res)
    }

    // ---- BUS MONITOR ----

    pub fn monitor(&self) -> MonitorGuard<'_> {
        self.bus.monitor()
    }

    pub fn monitor_mut(&mut self) -> MonitorGuard<'_> {
        self.bus.monitor()
    }

    // ---- PWM DRIVER ----

    pub fn set_servo(&mut self, chan: u8, rotation: f64) -> Result<(), HwError> {
        self.pwm.set_servo(chan, rotation)
    }

    pub fn set_pulse_width_us(&mut self, chan: u8, width_us: f64) -> Result<(), HwError> {
        self.pwm.set_pulse_width_us(chan, width_us)
    }

    // ---- ARDUINO ----

    pub fn read_reg(&mut self, adr: u8) -> Result<u8, HwError> {
        self.arduino.read_reg(&mut self.bus.lock(), adr)
    }

    pub fn write_reg(&mut self, adr: u8, val: u8) -> Result<(), HwError> {
        self.arduino.write_reg(&mut self.bus.lock(), adr, val)
    }

    pub fn version(&mut self) -> Result<u8, HwError> {
        self.arduino.version(&mut self.bus.lock())
    }

    pub fn timestamp(&mut self) -> Result<u32, HwError> {
        self.arduino.timestamp(&mut self.bus.lock())
    }

    pub fn battery_voltage(&mut self, battery: Battery) -> Result<f64, HwError> {
        self.arduino.battery_voltage(&mut self.bus.lock(), battery)
    }

    pub fn analog(&mut self, chan: RegRef) -> Result<f64, HwError> {
        self.arduino.analog(&mut self.bus.lock(), chan)
    }

    pub fn digital(&mut self, pin: PinRef) -> Result<bool, HwError> {
        self.arduino.digital(&mut self.bus.lock(), pin)
    }

    pub fn pi_bits(&mut self) -> Result<u8, HwError> {
        self.arduino.pi_bits(&mut self.bus.lock())
    }

    pub fn clear_change_bits(&mut self) -> Result<(), HwError> {
        self.arduino.clear_change_bits(&mut self.bus.lock())
    }

    pub fn set_arduino_pwm(&mut self, chan: RegRef, value: f64) -> Result<(), HwError> {
        self.arduino.set_pwm(&mut self.bus.lock(), chan, value)
    }

    pub fn get_arduino_pwm(&mut self, chan: RegRef) -> Result<f64, HwError> {
        self.arduino.get_pwm(&mut self.bus.lock(), chan)
    }
}

/// Create a [`Hardware`] backed by the simulator, returning the simulator handle as well.
pub fn simulated(
    monitor: BusMonitor,
    config: HardwareConfig
) -> Result<(Hardware, sim::SimBus), HwError> {
    let bus = sim::SimBus::new(config.arduino_addr, config.pca9685_addr);
    let reset_line = sim::SimResetLine::new(bus.clone());

    let hw = Hardware::new(Box::new(bus.clone()), Box::new(reset_line), monitor, config)?;

    Ok((hw, bus))
}

#[cfg(test)]
mod test {
    use super::*;
    use comms_if::eqpt::arduino as reg;

    #[test]
    fn test_init_and_all_stop() {
        let (mut hw, sim) = simulated(BusMonitor::default(), HardwareConfig::default()).unwrap();
        sim.set_register(reg::PWM9, 100);

        assert!(hw.init());
        assert!(hw.pwm_driver_initialised());
        assert_eq!(sim.register(reg::PWM9), 0);

        hw.set_servo(15, 1.0).unwrap();
        assert!(sim.pulse_width_ticks(15) > 0);
        hw.set_arduino_pwm("PWM11".into(), 1.0).unwrap();

        hw.all_stop().unwrap();
        assert_eq!(sim.pulse_width_ticks(15), 0);
        assert_eq!(sim.register(reg::PWM11), 0);
    }

    #[test]
    fn test_pwm_driver_shares_bus_monitor() {
        let (mut hw, sim) = simulated(BusMonitor::default(), HardwareConfig::default()).unwrap();
        assert!(hw.init());
        let errors = hw.monitor().total_errors();

        sim.fail_next(1);
        assert!(matches!(hw.set_servo(3, 0.0), Err(HwError::Bus(_))));
        assert_eq!(hw.monitor().total_errors(), errors + 1);
        assert_eq!(hw.monitor().sequential_errors(), 1);

        hw.set_servo(3, 0.0).unwrap();
        assert_eq!(sim.pulse_width_ticks(3), 307);
        assert_eq!(hw.monitor().sequential_errors(), 0);
    }

    #[test]
    fn test_bus_error_reported_once() {
        let err = HwError::from(BusError::WriteFailed { dev: 0x40, reg: 6, msg: String::from("nak") });
        let report = color_eyre::eyre::Report::new(err);

        assert_eq!(format!("{:#}", report), "Could not write register 6 of device 0x40: nak");
    }

    #[test]
    fn test_init_fails_on_dead_bus() {
        let (mut hw, sim) = simulated(BusMonitor::default(), HardwareConfig::default()).unwrap();
        sim.set_failing(true);

        assert!(!hw.init());
        assert!(hw.monitor().total_errors() > 0);
    }

    #[test]
    fn test_snapshot_all_or_nothing() {
        let (mut hw, sim) = simulated(BusMonitor::default(), HardwareConfig::default()).unwrap();

        let bat = hw.refresh_snapshot().unwrap().bat_m_v;
        assert!((bat - 12.4).abs() < 1e-9);

        // A failure part way through the read leaves the old snapshot alone
        sim.set_register(reg::BAT_M, 100);
        sim.fail_next(1);
        assert!(hw.refresh_snapshot().is_err());
        assert!((hw.snapshot().unwrap().bat_m_v - 12.4).abs() < 1e-9);

        assert!((hw.refresh_snapshot().unwrap().bat_m_v - 10.0).abs() < 1e-9);
        assert_eq!(hw.raw_registers().unwrap()[reg::BAT_M as usize], 100);
    }

    #[test]
    fn test_reset_hardware() {
        let (mut hw, sim) = simulated(BusMonitor::default(), HardwareConfig::default()).unwrap();

        sim.lock_bus();
        assert!(!hw.test_health());

        assert_eq!(hw.reset_hardware(), Ok(()));
        assert!(hw.test_health());

        // A board that keeps failing its health test after reset is reported
        sim.corrupt_test_register(true);
        assert_eq!(hw.reset_hardware(), Err(ResetError::HealthTestFailed));
    }
}
