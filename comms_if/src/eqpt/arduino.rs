//! # Arduino register map
//!
//! The on-board Arduino exposes a flat file of byte registers over I2C. This module names those
//! registers and decodes a full dump of them into a [`HardwareSnapshot`].

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Serialize, Deserialize};

use crate::codec::DecodeError;
use crate::tm;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Device signature/version (RO)
pub const SIGV: u8 = 0;
/// Main battery voltage in tenths of a volt (RO)
pub const BAT_M: u8 = 1;
/// Device time in ms, least significant byte (RO)
pub const DTME1: u8 = 2;
pub const DTME2: u8 = 3;
pub const DTME3: u8 = 4;
/// Device time in ms, most significant byte (RO)
pub const DTME4: u8 = 5;
pub const A1: u8 = 6;
pub const A2: u8 = 7;
pub const A3: u8 = 8;
pub const A6: u8 = 9;
pub const A7: u8 = 10;
/// Sensor inputs, `[P1|P0|D8|D7|D6|D5|D4|D3]` (RO)
pub const SI: u8 = 11;
/// Sensor changes, same layout as `SI` (RO)
pub const SC: u8 = 12;
/// Sensor change clear, writing 0 to a bit clears that bit of `SC` (RW)
pub const SCC: u8 = 13;
pub const PWM9: u8 = 14;
pub const PWM10: u8 = 15;
pub const PWM11: u8 = 16;
pub const XXX0: u8 = 17;
pub const XXX1: u8 = 18;
pub const XXX2: u8 = 19;
/// Logic battery voltage in tenths of a volt (RO)
pub const BAT_L: u8 = 20;

/// Number of registers in the file.
pub const NUM_REGS: usize = 21;

/// Spare register used for the bus health test.
pub const TEST_REG: u8 = XXX1;

/// Register addresses and names, in address order.
pub const REG_TABLE: [(u8, &str); NUM_REGS] = [
    (SIGV, "SIGV"), (BAT_M, "BAT_M"), (DTME1, "DTME1"), (DTME2, "DTME2"), (DTME3, "DTME3"),
    (DTME4, "DTME4"), (A1, "A1"), (A2, "A2"), (A3, "A3"), (A6, "A6"), (A7, "A7"), (SI, "SI"),
    (SC, "SC"), (SCC, "SCC"), (PWM9, "PWM9"), (PWM10, "PWM10"), (PWM11, "PWM11"),
    (XXX0, "XXX0"), (XXX1, "XXX1"), (XXX2, "XXX2"), (BAT_L, "BAT_L"),
];

/// Analog input registers.
pub const ANALOG_CHANS: [u8; 5] = [A1, A2, A3, A6, A7];

/// PWM output registers.
pub const PWM_CHANS: [u8; 3] = [PWM9, PWM10, PWM11];

/// Digital input pin numbers, bit `n` of `SI` is pin `DIGITAL_PINS[n]`.
pub const DIGITAL_PINS: [u8; 6] = [3, 4, 5, 6, 7, 8];

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The Arduino's register file decoded into named fields.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HardwareSnapshot {
    /// Signature byte, an ASCII character on current firmware
    pub signature: u8,

    pub bat_m_v: f64,

    pub bat_l_v: f64,

    /// Milliseconds since the Arduino last reset
    pub time_ms: u32,

    /// A1, A2, A3, A6, A7 normalised to `[0.0, 1.0]`
    pub analog: [f64; 5],

    /// D3 to D8
    pub digital: [bool; 6],

    /// Raspberry Pi auxiliary bits, the top two bits of `SI`
    pub pi_bits: u8,

    /// Raw change bits from `SC`
    pub changes: u8,

    /// PWM9, PWM10, PWM11 normalised to `[0.0, 1.0]`
    pub pwm: [f64; 3],

    /// XXX0, XXX1, XXX2
    pub spare: [u8; 3],
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl HardwareSnapshot {
    /// Decode a full register file. Fails unless exactly [`NUM_REGS`] bytes are given.
    pub fn from_registers(regs: &[u8]) -> Result<Self, DecodeError> {
        if regs.len() != NUM_REGS {
            return Err(DecodeError::WrongArity {
                expected: format!("{}", NUM_REGS),
                found: regs.len()
            })
        }

        let r = |adr: u8| regs[adr as usize];

        let mut analog = [0f64; 5];
        for (a, &adr) in analog.iter_mut().zip(ANALOG_CHANS.iter()) {
            *a = byte_to_unit(r(adr));
        }

        let mut pwm = [0f64; 3];
        for (p, &adr) in pwm.iter_mut().zip(PWM_CHANS.iter()) {
            *p = byte_to_unit(r(adr));
        }

        let mut digital = [false; 6];
        for (bit, d) in digital.iter_mut().enumerate() {
            *d = r(SI) & (1 << bit) != 0;
        }

        Ok(Self {
            signature: r(SIGV),
            bat_m_v: r(BAT_M) as f64 / 10.0,
            bat_l_v: r(BAT_L) as f64 / 10.0,
            time_ms: u32::from_le_bytes([r(DTME1), r(DTME2), r(DTME3), r(DTME4)]),
            analog,
            digital,
            pi_bits: (r(SI) >> 6) & 0x03,
            changes: r(SC),
            pwm,
            spare: [r(XXX0), r(XXX1), r(XXX2)],
        })
    }

    /// Encode back into a register file. `SCC` reads as meaningless, and is encoded as 0.
    pub fn to_registers(&self) -> [u8; NUM_REGS] {
        let mut regs = [0u8; NUM_REGS];

        regs[SIGV as usize] = self.signature;
        regs[BAT_M as usize] = volts_to_byte(self.bat_m_v);
        regs[BAT_L as usize] = volts_to_byte(self.bat_l_v);

        let time = self.time_ms.to_le_bytes();
        regs[DTME1 as usize..=DTME4 as usize].copy_from_slice(&time);

        for (&a, &adr) in self.analog.iter().zip(ANALOG_CHANS.iter()) {
            regs[adr as usize] = unit_to_byte(a);
        }
        for (&p, &adr) in self.pwm.iter().zip(PWM_CHANS.iter()) {
            regs[adr as usize] = unit_to_byte(p);
        }

        let mut si = (self.pi_bits & 0x03) << 6;
        for (bit, &d) in self.digital.iter().enumerate() {
            if d {
                si |= 1 << bit;
            }
        }
        regs[SI as usize] = si;
        regs[SC as usize] = self.changes;

        regs[XXX0 as usize] = self.spare[0];
        regs[XXX1 as usize] = self.spare[1];
        regs[XXX2 as usize] = self.spare[2];

        regs
    }

    /// Decode from the register dump telemetry payload.
    pub fn from_wire(payload: &str) -> Result<Self, DecodeError> {
        Self::from_registers(&tm::decode_register_dump(payload)?)
    }

    /// Encode as a register dump telemetry payload.
    pub fn to_wire(&self) -> String {
        tm::encode_register_dump(&self.to_registers())
    }

    /// The signature as printed in the status line.
    pub fn version(&self) -> String {
        match self.signature {
            s if s.is_ascii_graphic() => (s as char).to_string(),
            s => format!("{}", s)
        }
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Get the address of a register from its name.
pub fn name2adr(name: &str) -> Option<u8> {
    REG_TABLE.iter()
        .find(|(_, n)| *n == name)
        .map(|(adr, _)| *adr)
}

/// Get the name of a register from its address.
pub fn adr2name(adr: u8) -> Option<&'static str> {
    REG_TABLE.get(adr as usize).map(|(_, n)| *n)
}

fn byte_to_unit(b: u8) -> f64 {
    b as f64 / 255.0
}

fn unit_to_byte(v: f64) -> u8 {
    match v.is_nan() {
        true => 0,
        false => (v.max(0.0).min(1.0) * 255.0).round() as u8
    }
}

fn volts_to_byte(v: f64) -> u8 {
    match v.is_nan() {
        true => 0,
        false => (v * 10.0).round().max(0.0).min(255.0) as u8
    }
}
