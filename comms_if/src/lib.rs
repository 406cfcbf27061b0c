//! # Communications interface crate.
//!
//! Provides everything the robot and the drive station have to agree on: topic names, the
//! space-delimited payload codecs in both directions, the register map of the on-board Arduino,
//! and the network link.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Token splitting and parsing shared by the payload codecs
pub mod codec;

/// Topic names used on the operator link
pub mod topics;

/// Commands sent by the drive station to the robot
pub mod tc;

/// Telemetry sent by the robot to the drive station
pub mod tm;

/// Equipment definitions shared by both ends (register maps and snapshots)
pub mod eqpt;

/// Network module
pub mod net;
