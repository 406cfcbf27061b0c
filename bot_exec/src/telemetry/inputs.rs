//! # Control inputs
//!
//! Last good value of each joystick report from the drive station. A report which fails to decode
//! leaves the previous value in place.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::{
    codec::DecodeError,
    tc::{Axes, Buttons, Pov},
    topics::{JoystickReport, NUM_JOYSTICKS}
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct JoystickState {
    pub buttons: Buttons,

    pub axes: Axes,

    pub pov: Pov,
}

#[derive(Debug, Clone, Default)]
pub struct ControlInputs {
    joysticks: [JoystickState; NUM_JOYSTICKS],
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ControlInputs {
    /// Decode a joystick report into the cache.
    pub fn apply(
        &mut self,
        idx: usize,
        report: JoystickReport,
        payload: &str
    ) -> Result<(), DecodeError> {
        let js = match self.joysticks.get_mut(idx) {
            Some(js) => js,
            None => return Err(DecodeError::OutOfRange(format!("joystick {}", idx)))
        };

        match report {
            JoystickReport::Buttons => js.buttons = Buttons::from_wire(payload)?,
            JoystickReport::Axes => js.axes = Axes::from_wire(payload)?,
            JoystickReport::Pov => js.pov = Pov::from_wire(payload)?,
        }

        Ok(())
    }

    pub fn joystick(&self, idx: usize) -> Option<&JoystickState> {
        self.joysticks.get(idx)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_bad_report_keeps_last_value() {
        let mut inputs = ControlInputs::default();

        inputs.apply(1, JoystickReport::Axes, "0.0 -0.5 0.0 0.0 0.25 1.0").unwrap();
        assert_eq!(inputs.joystick(1).unwrap().axes.get(1), -0.5);

        assert!(inputs.apply(1, JoystickReport::Axes, "0.0 -0.9").is_err());
        assert!(inputs.apply(1, JoystickReport::Axes, "0.0 1.5 0.0 0.0 0.0 0.0").is_err());
        assert_eq!(inputs.joystick(1).unwrap().axes.get(1), -0.5);

        inputs.apply(0, JoystickReport::Buttons, "T F F F F F F F F F F T").unwrap();
        assert!(inputs.joystick(0).unwrap().buttons.get(11));
        assert!(inputs.apply(0, JoystickReport::Pov, "2 0").is_err());
        assert_eq!(inputs.joystick(0).unwrap().pov, Pov::default());

        assert!(inputs.apply(2, JoystickReport::Pov, "0 0").is_err());
        assert!(inputs.joystick(2).is_none());
    }
}
