//! # Arduino driver
//!
//! Register level access to the Arduino that sits on the robot's I2C bus. The Arduino owns the
//! battery monitors, the analog and digital inputs and three PWM outputs.
//!
//! The driver doesn't own the bus, which is shared with the PWM driver, so every operation is
//! given the [`MonitoredBus`] to use.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{thread, time::Duration};

use comms_if::eqpt::arduino::{self as reg, NUM_REGS};

use super::{HwError, transport::MonitoredBus};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Default bus address of the Arduino.
pub const DEFAULT_ADDR: u8 = 0x08;

/// Settling time between the health test write and read back.
const HEALTH_TEST_DELAY: Duration = Duration::from_micros(250);

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Reference to a register, either by address or by name (e.g. `"A6"`, `"PWM10"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegRef<'a> {
    Adr(u8),
    Name(&'a str),
}

/// Reference to a digital input, either by pin number (3 to 8) or name (`"D3"` to `"D8"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinRef<'a> {
    Num(u8),
    Name(&'a str),
}

/// The robot's batteries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Battery {
    /// Motor battery
    Main,

    /// Logic battery
    Logic,
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct Arduino {
    addr: u8
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<'a> RegRef<'a> {
    fn resolve(&self) -> Result<u8, HwError> {
        match *self {
            RegRef::Adr(a) => Ok(a),
            RegRef::Name(n) => reg::name2adr(n)
                .ok_or_else(|| HwError::UnknownChannel(n.to_string()))
        }
    }

    fn describe(&self) -> String {
        match *self {
            RegRef::Adr(a) => format!("{}", a),
            RegRef::Name(n) => n.to_string()
        }
    }

    /// Whether this refers to every PWM channel at once, `"ALL"` (any case) or address 0.
    fn is_all(&self) -> bool {
        match *self {
            RegRef::Adr(a) => a == 0,
            RegRef::Name(n) => n.eq_ignore_ascii_case("all")
        }
    }
}

impl From<u8> for RegRef<'_> {
    fn from(adr: u8) -> Self {
        RegRef::Adr(adr)
    }
}

impl<'a> From<&'a str> for RegRef<'a> {
    fn from(name: &'a str) -> Self {
        RegRef::Name(name)
    }
}

impl<'a> PinRef<'a> {
    /// Get the bit of the `SI` register holding this pin.
    fn bit(&self) -> Result<u8, HwError> {
        let num = match *self {
            PinRef::Num(n) => Some(n),
            PinRef::Name(name) => name.strip_prefix('D').and_then(|n| n.parse().ok())
        };

        match num {
            Some(n) if reg::DIGITAL_PINS.contains(&n) => Ok(n - reg::DIGITAL_PINS[0]),
            _ => Err(HwError::UnknownChannel(match *self {
                PinRef::Num(n) => format!("D{}", n),
                PinRef::Name(name) => name.to_string()
            }))
        }
    }
}

impl From<u8> for PinRef<'_> {
    fn from(num: u8) -> Self {
        PinRef::Num(num)
    }
}

impl<'a> From<&'a str> for PinRef<'a> {
    fn from(name: &'a str) -> Self {
        PinRef::Name(name)
    }
}

impl Arduino {
    pub fn new(addr: u8) -> Self {
        Self { addr }
    }

    pub fn read_reg(&self, bus: &mut MonitoredBus, adr: u8) -> Result<u8, HwError> {
        Ok(bus.read_reg(self.addr, adr)?)
    }

    pub fn write_reg(&self, bus: &mut MonitoredBus, adr: u8, val: u8) -> Result<(), HwError> {
        Ok(bus.write_reg(self.addr, adr, val)?)
    }

    /// Check the bus and the Arduino are working by writing a random value to the spare test
    /// register and reading it back.
    ///
    /// Failed transfers are reported to the bus monitor as usual, but never cause an error here.
    pub fn test_health(&self, bus: &mut MonitoredBus) -> bool {
        let v: u8 = rand::random();

        if self.write_reg(bus, reg::TEST_REG, v).is_err() {
            return false
        }

        thread::sleep(HEALTH_TEST_DELAY);

        match self.read_reg(bus, reg::TEST_REG) {
            Ok(got) => got == v,
            Err(_) => false
        }
    }

    /// Signature (version) byte of the Arduino firmware.
    pub fn version(&self, bus: &mut MonitoredBus) -> Result<u8, HwError> {
        self.read_reg(bus, reg::SIGV)
    }

    /// Milliseconds since the Arduino was powered up or reset.
    pub fn timestamp(&self, bus: &mut MonitoredBus) -> Result<u32, HwError> {
        let mut bytes = [0u8; 4];

        for (b, adr) in bytes.iter_mut().zip(reg::DTME1..=reg::DTME4) {
            *b = self.read_reg(bus, adr)?;
        }

        Ok(u32::from_le_bytes(bytes))
    }

    pub fn battery_voltage(&self, bus: &mut MonitoredBus, battery: Battery) -> Result<f64, HwError> {
        let adr = match battery {
            Battery::Main => reg::BAT_M,
            Battery::Logic => reg::BAT_L
        };

        Ok(self.read_reg(bus, adr)? as f64 / 10.0)
    }

    /// Read an analog channel, scaled to `[0.0, 1.0]`.
    pub fn analog(&self, bus: &mut MonitoredBus, chan: RegRef) -> Result<f64, HwError> {
        let adr = chan.resolve()?;

        if !reg::ANALOG_CHANS.contains(&adr) {
            return Err(HwError::UnknownChannel(chan.describe()))
        }

        Ok(self.read_reg(bus, adr)? as f64 / 255.0)
    }

    pub fn digital(&self, bus: &mut MonitoredBus, pin: PinRef) -> Result<bool, HwError> {
        let bit = pin.bit()?;

        Ok(self.read_reg(bus, reg::SI)? & (1 << bit) != 0)
    }

    /// Auxiliary bits driven by the Raspberry Pi, in the low two bits of the result.
    pub fn pi_bits(&self, bus: &mut MonitoredBus) -> Result<u8, HwError> {
        Ok((self.read_reg(bus, reg::SI)? >> 6) & 0x03)
    }

    pub fn clear_change_bits(&self, bus: &mut MonitoredBus) -> Result<(), HwError> {
        self.write_reg(bus, reg::SCC, 0)
    }

    /// Set a PWM output, `value` is clamped to `[0.0, 1.0]`.
    ///
    /// `RegRef::Name("ALL")` or `RegRef::Adr(0)` sets every PWM output.
    pub fn set_pwm(&self, bus: &mut MonitoredBus, chan: RegRef, value: f64) -> Result<(), HwError> {
        let byte = util::maths::norm_to_byte(value);

        if chan.is_all() {
            for &adr in reg::PWM_CHANS.iter() {
                self.write_reg(bus, adr, byte)?;
            }
            return Ok(())
        }

        let adr = self.pwm_adr(chan)?;
        self.write_reg(bus, adr, byte)
    }

    /// Read back a PWM output, scaled to `[0.0, 1.0]`.
    pub fn get_pwm(&self, bus: &mut MonitoredBus, chan: RegRef) -> Result<f64, HwError> {
        let adr = self.pwm_adr(chan)?;
        Ok(util::maths::byte_to_norm(self.read_reg(bus, adr)?))
    }

    /// Read the whole register file. Stops at the first failed read.
    pub fn read_all(&self, bus: &mut MonitoredBus) -> Result<[u8; NUM_REGS], HwError> {
        let mut regs = [0u8; NUM_REGS];

        for (adr, r) in regs.iter_mut().enumerate() {
            *r = self.read_reg(bus, adr as u8)?;
        }

        Ok(regs)
    }

    fn pwm_adr(&self, chan: RegRef) -> Result<u8, HwError> {
        let adr = chan.resolve()?;

        match reg::PWM_CHANS.contains(&adr) {
            true => Ok(adr),
            false => Err(HwError::UnknownChannel(chan.describe()))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{bus_monitor::BusMonitor, hw::sim::SimBus};

    fn sim() -> (SimBus, MonitoredBus, Arduino) {
        let sim = SimBus::new(DEFAULT_ADDR, 0x4c);
        let bus = MonitoredBus::new(Box::new(sim.clone()), BusMonitor::default());
        (sim, bus, Arduino::new(DEFAULT_ADDR))
    }

    #[test]
    fn test_health_check() {
        let (sim, mut bus, ard) = sim();

        assert!(ard.test_health(&mut bus));

        sim.set_failing(true);
        assert!(!ard.test_health(&mut bus));
        assert_eq!(bus.monitor().total_errors(), 1);
    }

    #[test]
    fn test_channel_lookup() {
        let (sim, mut bus, ard) = sim();
        sim.set_register(reg::A6, 51);
        sim.set_register(reg::SI, 0b0100_0100);

        assert!((ard.analog(&mut bus, "A6".into()).unwrap() - 0.2).abs() < 1e-9);
        assert_eq!(
            ard.analog(&mut bus, reg::A6.into()).unwrap(),
            ard.analog(&mut bus, "A6".into()).unwrap()
        );
        assert!(ard.digital(&mut bus, "D5".into()).unwrap());
        assert!(!ard.digital(&mut bus, 3.into()).unwrap());
        assert_eq!(ard.pi_bits(&mut bus).unwrap(), 1);

        // Caller errors don't touch the bus
        let before = bus.monitor().total_successes();
        assert!(matches!(ard.analog(&mut bus, "A4".into()), Err(HwError::UnknownChannel(_))));
        assert!(matches!(ard.analog(&mut bus, reg::PWM9.into()), Err(HwError::UnknownChannel(_))));
        assert!(matches!(ard.digital(&mut bus, 9.into()), Err(HwError::UnknownChannel(_))));
        assert!(matches!(ard.set_pwm(&mut bus, "A1".into(), 0.5), Err(HwError::UnknownChannel(_))));
        assert_eq!(bus.monitor().total_successes(), before);
    }

    #[test]
    fn test_pwm() {
        let (sim, mut bus, ard) = sim();

        ard.set_pwm(&mut bus, "PWM10".into(), 0.5).unwrap();
        assert_eq!(sim.register(reg::PWM10), 127);

        ard.set_pwm(&mut bus, "all".into(), 2.0).unwrap();
        for &adr in reg::PWM_CHANS.iter() {
            assert_eq!(sim.register(adr), 255);
        }

        ard.set_pwm(&mut bus, 0.into(), -1.0).unwrap();
        assert_eq!(ard.get_pwm(&mut bus, "PWM11".into()).unwrap(), 0.0);
    }

    #[test]
    fn test_battery_and_read_all() {
        let (sim, mut bus, ard) = sim();
        sim.set_register(reg::BAT_M, 121);

        assert!((ard.battery_voltage(&mut bus, Battery::Main).unwrap() - 12.1).abs() < 1e-9);

        let regs = ard.read_all(&mut bus).unwrap();
        assert_eq!(regs[reg::BAT_M as usize], 121);
        assert_eq!(regs[reg::SIGV as usize], b'e');
    }
}
