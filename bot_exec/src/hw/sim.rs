//! # Simulated hardware
//!
//! A register level stand-in for the robot's I2C bus, with the Arduino and the PCA9685 attached.
//! It's used when the executable runs off the robot and by the tests, which can inject bus
//! faults through the shared handle.
//!
//! [`SimBus`] is cheap to clone, every clone sees the same devices.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Instant
};

use comms_if::eqpt::arduino::{self as reg, NUM_REGS};

use super::transport::{BusError, RegisterBus, ResetLine};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Signature byte reported by the simulated Arduino.
const SIM_SIGNATURE: u8 = b'e';

/// Battery readings of a freshly charged robot, in tenths of a volt.
const SIM_BAT_M: u8 = 124;
const SIM_BAT_L: u8 = 79;

/// First PCA9685 LED register, each channel has four (ON_L, ON_H, OFF_L, OFF_H).
const PCA_LED0_ON_L: usize = 0x06;

/// Bit of a channel's off time which holds it fully off.
const PCA_FULL_OFF: u16 = 0x1000;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Clone)]
pub struct SimBus {
    state: Arc<Mutex<SimState>>,

    arduino_addr: u8,

    pca_addr: u8,
}

/// [`ResetLine`] which resets the simulated Arduino when released.
pub struct SimResetLine {
    bus: SimBus,

    asserted: bool,
}

struct SimState {
    arduino: [u8; NUM_REGS],

    pca: [u8; 256],

    /// Instant the Arduino last booted, the timestamp registers count from here
    boot: Instant,

    /// Every transfer fails until cleared
    failing: bool,

    /// Every transfer fails until the Arduino is reset
    locked: bool,

    /// Number of upcoming transfers which will fail
    fail_next: u32,

    /// Test register reads back the inverse of what was written
    corrupt_test_reg: bool,

    transfers: u64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SimBus {
    pub fn new(arduino_addr: u8, pca_addr: u8) -> Self {
        let mut arduino = [0u8; NUM_REGS];
        arduino[reg::SIGV as usize] = SIM_SIGNATURE;
        arduino[reg::BAT_M as usize] = SIM_BAT_M;
        arduino[reg::BAT_L as usize] = SIM_BAT_L;

        Self {
            state: Arc::new(Mutex::new(SimState {
                arduino,
                pca: [0u8; 256],
                boot: Instant::now(),
                failing: false,
                locked: false,
                fail_next: 0,
                corrupt_test_reg: false,
                transfers: 0,
            })),
            arduino_addr,
            pca_addr
        }
    }

    /// Make every transfer fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.lock().failing = failing;
    }

    /// Make every transfer fail until the Arduino is reset through its reset lines.
    pub fn lock_bus(&self) {
        self.lock().locked = true;
    }

    /// Make the next `n` transfers fail.
    pub fn fail_next(&self, n: u32) {
        self.lock().fail_next = n;
    }

    /// Make the test register read back corrupted values, so health tests fail without bus errors.
    pub fn corrupt_test_register(&self, corrupt: bool) {
        self.lock().corrupt_test_reg = corrupt;
    }

    /// Set an Arduino register directly, bypassing the bus.
    pub fn set_register(&self, adr: u8, val: u8) {
        if let Some(r) = self.lock().arduino.get_mut(adr as usize) {
            *r = val;
        }
    }

    /// Get an Arduino register directly, bypassing the bus.
    pub fn register(&self, adr: u8) -> u8 {
        self.lock().arduino.get(adr as usize).copied().unwrap_or(0)
    }

    pub fn pca_register(&self, adr: u8) -> u8 {
        self.lock().pca[adr as usize]
    }

    /// Off time in ticks of a PCA9685 channel, 0 if the channel is held fully off.
    pub fn pulse_width_ticks(&self, chan: u8) -> u16 {
        let state = self.lock();
        let base = PCA_LED0_ON_L + 4 * chan as usize;
        let off = u16::from_le_bytes([state.pca[base + 2], state.pca[base + 3]]);

        match off & PCA_FULL_OFF {
            0 => off,
            _ => 0
        }
    }

    /// Total number of transfers attempted on the bus.
    pub fn transfers(&self) -> u64 {
        self.lock().transfers
    }

    /// Reboot the Arduino: the clock restarts, the outputs turn off and a locked bus is released.
    pub fn reset_arduino(&self) {
        let mut state = self.lock();

        state.boot = Instant::now();
        state.locked = false;
        for &adr in reg::PWM_CHANS.iter() {
            state.arduino[adr as usize] = 0;
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        // Poisoning only happens if a test panicked while holding the lock
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Count the transfer and decide whether it fails.
    fn transfer_fails(state: &mut SimState) -> bool {
        state.transfers += 1;

        if state.fail_next > 0 {
            state.fail_next -= 1;
            return true
        }

        state.failing || state.locked
    }
}

impl RegisterBus for SimBus {
    fn read_reg(&mut self, dev: u8, adr: u8) -> Result<u8, BusError> {
        let mut state = self.lock();

        let fail = |msg: &str| BusError::ReadFailed { dev, reg: adr, msg: msg.to_string() };

        if Self::transfer_fails(&mut state) {
            return Err(fail("simulated bus fault"))
        }

        if dev == self.arduino_addr {
            let time = (state.boot.elapsed().as_millis() as u32).to_le_bytes();

            match adr {
                reg::DTME1..=reg::DTME4 => Ok(time[(adr - reg::DTME1) as usize]),
                reg::TEST_REG if state.corrupt_test_reg =>
                    Ok(!state.arduino[reg::TEST_REG as usize]),
                _ => state.arduino.get(adr as usize)
                    .copied()
                    .ok_or_else(|| fail("no such register"))
            }
        }
        else if dev == self.pca_addr {
            Ok(state.pca[adr as usize])
        }
        else {
            Err(fail("no device at address"))
        }
    }

    fn write_reg(&mut self, dev: u8, adr: u8, val: u8) -> Result<(), BusError> {
        self.write_block(dev, adr, &[val])
    }

    fn write_block(&mut self, dev: u8, adr: u8, vals: &[u8]) -> Result<(), BusError> {
        let mut state = self.lock();

        if Self::transfer_fails(&mut state) {
            return Err(BusError::WriteFailed {
                dev,
                reg: adr,
                msg: String::from("simulated bus fault")
            })
        }

        for (i, &val) in vals.iter().enumerate() {
            self.store(&mut state, dev, adr.wrapping_add(i as u8), val)?;
        }

        Ok(())
    }
}

impl SimBus {
    fn store(&self, state: &mut SimState, dev: u8, adr: u8, val: u8) -> Result<(), BusError> {
        let fail = |msg: &str| BusError::WriteFailed { dev, reg: adr, msg: msg.to_string() };

        if dev == self.arduino_addr {
            match adr {
                // Writing a 0 bit clears that change bit
                reg::SCC => state.arduino[reg::SC as usize] &= val,
                a if a >= reg::SCC && (a as usize) < NUM_REGS && a != reg::BAT_L =>
                    state.arduino[a as usize] = val,
                // Read only registers ignore writes
                a if (a as usize) < NUM_REGS => (),
                _ => return Err(fail("no such register"))
            }
            Ok(())
        }
        else if dev == self.pca_addr {
            state.pca[adr as usize] = val;
            Ok(())
        }
        else {
            Err(fail("no device at address"))
        }
    }
}

impl SimResetLine {
    pub fn new(bus: SimBus) -> Self {
        Self { bus, asserted: false }
    }
}

impl ResetLine for SimResetLine {
    fn assert_reset(&mut self) -> Result<(), BusError> {
        self.asserted = true;
        Ok(())
    }

    fn release_reset(&mut self) -> Result<(), BusError> {
        if self.asserted {
            self.bus.reset_arduino();
            self.asserted = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_sim_registers() {
        let mut sim = SimBus::new(0x08, 0x4c);

        assert_eq!(sim.read_reg(0x08, reg::SIGV), Ok(b'e'));
        sim.write_reg(0x08, reg::XXX1, 99).unwrap();
        assert_eq!(sim.read_reg(0x08, reg::XXX1), Ok(99));

        // Read only registers keep their value
        sim.write_reg(0x08, reg::BAT_M, 0).unwrap();
        assert_eq!(sim.register(reg::BAT_M), 124);

        sim.set_register(reg::SC, 0b11_1111);
        sim.write_reg(0x08, reg::SCC, 0b11_0000).unwrap();
        assert_eq!(sim.register(reg::SC), 0b11_0000);

        assert!(sim.read_reg(0x10, 0).is_err());
        assert!(sim.read_reg(0x08, 21).is_err());
        assert_eq!(sim.transfers(), 7);
    }

    #[test]
    fn test_sim_faults_and_reset() {
        let mut sim = SimBus::new(0x08, 0x4c);
        let mut line = SimResetLine::new(sim.clone());

        sim.fail_next(2);
        assert!(sim.read_reg(0x08, 0).is_err());
        assert!(sim.read_reg(0x4c, 0).is_err());
        assert!(sim.read_reg(0x08, 0).is_ok());

        sim.write_reg(0x08, reg::PWM9, 200).unwrap();
        sim.lock_bus();
        assert!(sim.read_reg(0x08, 0).is_err());

        line.assert_reset().unwrap();
        line.release_reset().unwrap();
        assert!(sim.read_reg(0x08, 0).is_ok());
        assert_eq!(sim.register(reg::PWM9), 0);

        // Timestamp restarts from the reset
        let t = u32::from_le_bytes([
            sim.read_reg(0x08, reg::DTME1).unwrap(),
            sim.read_reg(0x08, reg::DTME2).unwrap(),
            sim.read_reg(0x08, reg::DTME3).unwrap(),
            sim.read_reg(0x08, reg::DTME4).unwrap(),
        ]);
        assert!(t < 1000);
    }
}
