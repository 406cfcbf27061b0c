//! # Bus transport
//!
//! The hardware facade only needs two primitives from the bus, read a register and write a
//! register, plus a way to pull the Arduino's reset lines. These are the [`RegisterBus`] and
//! [`ResetLine`] traits. [`HalBus`] and [`PinPair`] implement them over any `embedded-hal`
//! driver, which on the Raspberry Pi is `rppal`.
//!
//! [`SharedBus`] goes the other way: it puts a [`MonitoredBus`] back behind the `embedded-hal`
//! I2C traits so that off the shelf device drivers (the PCA9685 one) can share it with the
//! Arduino, with their traffic still counted by the bus monitor.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    fmt::Debug,
    ops::{Deref, DerefMut},
    sync::{Arc, Mutex, MutexGuard}
};

use embedded_hal::{
    blocking::i2c::{Write, WriteRead},
    digital::v2::OutputPin
};

use crate::bus_monitor::BusMonitor;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Register level access to devices on a bus.
pub trait RegisterBus {
    fn read_reg(&mut self, dev: u8, reg: u8) -> Result<u8, BusError>;

    fn write_reg(&mut self, dev: u8, reg: u8, val: u8) -> Result<(), BusError>;

    /// Read consecutive registers starting at `reg`.
    fn read_block(&mut self, dev: u8, reg: u8, buf: &mut [u8]) -> Result<(), BusError> {
        for (i, b) in buf.iter_mut().enumerate() {
            *b = self.read_reg(dev, reg.wrapping_add(i as u8))?;
        }
        Ok(())
    }

    /// Write consecutive registers starting at `reg`.
    fn write_block(&mut self, dev: u8, reg: u8, vals: &[u8]) -> Result<(), BusError> {
        for (i, &v) in vals.iter().enumerate() {
            self.write_reg(dev, reg.wrapping_add(i as u8), v)?;
        }
        Ok(())
    }
}

/// The Arduino's out of band reset lines.
pub trait ResetLine {
    /// Drive the reset lines active (low).
    fn assert_reset(&mut self) -> Result<(), BusError>;

    /// Return the reset lines to their idle (high) state.
    fn release_reset(&mut self) -> Result<(), BusError>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// [`RegisterBus`] over an `embedded-hal` blocking I2C driver.
pub struct HalBus<I> {
    i2c: I
}

/// [`ResetLine`] made of two `embedded-hal` output pins, both driven together.
pub struct PinPair<P> {
    d0: P,
    d1: P
}

/// A [`RegisterBus`] which reports the outcome of every transfer to a [`BusMonitor`].
pub struct MonitoredBus {
    bus: Box<dyn RegisterBus + Send>,

    monitor: BusMonitor,
}

/// Cloneable handle to a [`MonitoredBus`], implementing the `embedded-hal` blocking I2C traits.
///
/// The first byte of a write is the register address, the rest go to consecutive registers.
#[derive(Clone)]
pub struct SharedBus {
    inner: Arc<Mutex<MonitoredBus>>
}

/// Access to the [`BusMonitor`] of a [`SharedBus`], holding the bus for as long as it lives.
pub struct MonitorGuard<'a> {
    bus: MutexGuard<'a, MonitoredBus>
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BusError {
    #[error("Could not read register {reg} of device 0x{dev:02x}: {msg}")]
    ReadFailed {
        dev: u8,
        reg: u8,
        msg: String
    },

    #[error("Could not write register {reg} of device 0x{dev:02x}: {msg}")]
    WriteFailed {
        dev: u8,
        reg: u8,
        msg: String
    },

    #[error("Could not drive the reset lines: {0}")]
    ResetLine(String),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<I> HalBus<I> {
    pub fn new(i2c: I) -> Self {
        Self { i2c }
    }
}

impl<I, E> RegisterBus for HalBus<I>
where
    I: Write<Error = E> + WriteRead<Error = E>,
    E: Debug
{
    fn read_reg(&mut self, dev: u8, reg: u8) -> Result<u8, BusError> {
        let mut buf = [0u8; 1];

        self.i2c.write_read(dev, &[reg], &mut buf)
            .map_err(|e| BusError::ReadFailed { dev, reg, msg: format!("{:?}", e) })?;

        Ok(buf[0])
    }

    fn write_reg(&mut self, dev: u8, reg: u8, val: u8) -> Result<(), BusError> {
        self.i2c.write(dev, &[reg, val])
            .map_err(|e| BusError::WriteFailed { dev, reg, msg: format!("{:?}", e) })
    }

    fn read_block(&mut self, dev: u8, reg: u8, buf: &mut [u8]) -> Result<(), BusError> {
        self.i2c.write_read(dev, &[reg], buf)
            .map_err(|e| BusError::ReadFailed { dev, reg, msg: format!("{:?}", e) })
    }

    fn write_block(&mut self, dev: u8, reg: u8, vals: &[u8]) -> Result<(), BusError> {
        let mut bytes = Vec::with_capacity(vals.len() + 1);
        bytes.push(reg);
        bytes.extend_from_slice(vals);

        self.i2c.write(dev, &bytes)
            .map_err(|e| BusError::WriteFailed { dev, reg, msg: format!("{:?}", e) })
    }
}

impl<P> PinPair<P>
where
    P: OutputPin,
    P::Error: Debug
{
    /// Create the pair, putting both lines into their idle state.
    pub fn new(d0: P, d1: P) -> Result<Self, BusError> {
        let mut pair = Self { d0, d1 };
        pair.release_reset()?;
        Ok(pair)
    }
}

impl<P> ResetLine for PinPair<P>
where
    P: OutputPin,
    P::Error: Debug
{
    fn assert_reset(&mut self) -> Result<(), BusError> {
        self.d0.set_low().map_err(|e| BusError::ResetLine(format!("{:?}", e)))?;
        self.d1.set_low().map_err(|e| BusError::ResetLine(format!("{:?}", e)))
    }

    fn release_reset(&mut self) -> Result<(), BusError> {
        self.d0.set_high().map_err(|e| BusError::ResetLine(format!("{:?}", e)))?;
        self.d1.set_high().map_err(|e| BusError::ResetLine(format!("{:?}", e)))
    }
}

impl MonitoredBus {
    pub fn new(bus: Box<dyn RegisterBus + Send>, monitor: BusMonitor) -> Self {
        Self { bus, monitor }
    }

    pub fn read_reg(&mut self, dev: u8, reg: u8) -> Result<u8, BusError> {
        let res = self.bus.read_reg(dev, reg);
        self.record(res.is_ok());
        res
    }

    pub fn write_reg(&mut self, dev: u8, reg: u8, val: u8) -> Result<(), BusError> {
        let res = self.bus.write_reg(dev, reg, val);
        self.record(res.is_ok());
        res
    }

    /// Read consecutive registers, counted as a single transfer.
    pub fn read_block(&mut self, dev: u8, reg: u8, buf: &mut [u8]) -> Result<(), BusError> {
        let res = self.bus.read_block(dev, reg, buf);
        self.record(res.is_ok());
        res
    }

    /// Write consecutive registers, counted as a single transfer.
    pub fn write_block(&mut self, dev: u8, reg: u8, vals: &[u8]) -> Result<(), BusError> {
        let res = self.bus.write_block(dev, reg, vals);
        self.record(res.is_ok());
        res
    }

    pub fn monitor(&self) -> &BusMonitor {
        &self.monitor
    }

    pub fn monitor_mut(&mut self) -> &mut BusMonitor {
        &mut self.monitor
    }

    fn record(&mut self, ok: bool) {
        match ok {
            true => self.monitor.on_success(),
            false => self.monitor.on_fail()
        }
    }
}

impl SharedBus {
    pub fn new(bus: MonitoredBus) -> Self {
        Self { inner: Arc::new(Mutex::new(bus)) }
    }

    /// Take the bus. Drivers sharing the handle block until the guard is dropped.
    pub fn lock(&self) -> MutexGuard<'_, MonitoredBus> {
        // Every transfer completes or fails under the lock, so a poisoned bus is still consistent
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn monitor(&self) -> MonitorGuard<'_> {
        MonitorGuard { bus: self.lock() }
    }
}

impl Write for SharedBus {
    type Error = BusError;

    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), BusError> {
        match bytes.split_first() {
            Some((&reg, vals)) => self.lock().write_block(address, reg, vals),
            None => Err(BusError::WriteFailed {
                dev: address,
                reg: 0,
                msg: String::from("no register address given")
            })
        }
    }
}

impl WriteRead for SharedBus {
    type Error = BusError;

    fn write_read(&mut self, address: u8, bytes: &[u8], buffer: &mut [u8]) -> Result<(), BusError> {
        match bytes {
            [reg] => self.lock().read_block(address, *reg, buffer),
            _ => Err(BusError::ReadFailed {
                dev: address,
                reg: bytes.first().copied().unwrap_or(0),
                msg: format!("expected a single register address, got {} bytes", bytes.len())
            })
        }
    }
}

impl<'a> Deref for MonitorGuard<'a> {
    type Target = BusMonitor;

    fn deref(&self) -> &BusMonitor {
        self.bus.monitor()
    }
}

impl<'a> DerefMut for MonitorGuard<'a> {
    fn deref_mut(&mut self) -> &mut BusMonitor {
        self.bus.monitor_mut()
    }
}
