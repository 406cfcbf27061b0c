//! # User logic
//!
//! The logic units built into the executable. Which one runs is chosen by the `logic` parameter,
//! new logic is added by writing a [`UserLogic`] implementation and listing it in [`from_name`].

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

pub mod idle;
pub mod servo_demo;
pub mod tank_drive;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use crate::sandbox::UserLogic;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Names of every logic unit known to [`from_name`].
pub const NAMES: [&str; 3] = [idle::NAME, servo_demo::NAME, tank_drive::NAME];

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Create the logic unit with the given name, or `None` if there isn't one.
pub fn from_name(name: &str) -> Option<Box<dyn UserLogic>> {
    match name {
        idle::NAME => Some(Box::new(idle::Idle)),
        servo_demo::NAME => Some(Box::new(servo_demo::ServoDemo::default())),
        tank_drive::NAME => Some(Box::new(tank_drive::TankDrive::default())),
        _ => None
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_from_name() {
        for name in NAMES.iter() {
            assert_eq!(from_name(name).map(|l| l.name().to_string()), Some(name.to_string()));
        }

        assert!(from_name("user_logic").is_none());
        assert!(from_name("").is_none());
    }
}
