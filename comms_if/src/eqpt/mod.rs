//! # Equipment Interface
//!
//! This module defines the equipment data which is shared between the robot and the drive
//! station.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

pub mod arduino;
