//! # Bot library
//!
//! The parts of the bot executable, kept in a library so they can be tested without the hardware
//! or the network.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Bot context - the handle user logic drives the bot through
pub mod bot_ctx;

/// Bus health monitor - counts bus failures and raises the alert
pub mod bus_monitor;

/// Hardware access - the Arduino, the PWM driver and the bus they share
pub mod hw;

/// Built in user logic
pub mod logic;

/// Mode arbitrator - decides the bot's mode each cycle
pub mod mode_arb;

/// Executable parameters
pub mod params;

/// User logic sandbox - contains faults in user logic
pub mod sandbox;

/// Supervisor - runs one cycle of the main loop
pub mod supervisor;

/// Telemetry channel - the bot's side of the operator link
pub mod telemetry;
