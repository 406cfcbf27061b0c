//! # Mode Arbitrator
//!
//! Decides which mode the bot is in each cycle. The drive station commands the mode, and if it
//! goes quiet for longer than the failsafe timeout the bot is forced into [`BotMode::Stop`].
//!
//! The arbitrator counts the cycles spent in the current mode. The first cycle after a switch has
//! a loop count of 0, which is how user logic knows to set itself up for the new mode.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::time::{Duration, Instant};

use log::{info, warn};
use serde::Deserialize;

use comms_if::{codec::DecodeError, tc::{BotMode, ModeCmd}};

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// What to do with a mode command which can't be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedPolicy {
    /// Treat it as a stop command with no time remaining
    Stop,

    /// Keep the current mode
    Ignore,
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct ModeArbiter {
    policy: MalformedPolicy,

    failsafe_timeout: Duration,

    mode: BotMode,

    /// Mode dispatched on the previous cycle, `None` before the first cycle
    dispatched_mode: Option<BotMode>,

    /// Cycles since the last mode switch, -1 forces the next cycle to report 0
    loop_count: i64,

    /// Run the next cycle as a fresh switch even if the mode is unchanged
    restart: bool,

    time_remaining_s: f64,

    ds_loop_count: i64,

    aux_cmd: Option<String>,

    /// True while the link is lost, so each loss is only counted once
    failsafe_active: bool,

    msg_err_count: u64,

    timeout_count: u64,
}

/// What the sandbox should run this cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dispatch {
    pub mode: BotMode,

    /// Cycles since the mode last changed, 0 on the first cycle in a mode
    pub loop_count: u64,

    pub time_remaining_s: f64,

    pub just_switched: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for MalformedPolicy {
    fn default() -> Self {
        MalformedPolicy::Stop
    }
}

impl ModeArbiter {
    pub fn new(policy: MalformedPolicy, failsafe_timeout: Duration) -> Self {
        Self {
            policy,
            failsafe_timeout,
            mode: BotMode::Stop,
            dispatched_mode: None,
            loop_count: 0,
            restart: false,
            time_remaining_s: 0.0,
            ds_loop_count: 0,
            aux_cmd: None,
            failsafe_active: false,
            msg_err_count: 0,
            timeout_count: 0,
        }
    }

    /// Handle a mode command from the drive station, or the error from decoding it.
    pub fn on_mode_cmd(&mut self, cmd: Result<&ModeCmd, &DecodeError>) {
        match cmd {
            Ok(cmd) => {
                if self.failsafe_active {
                    info!("Mode commands received again, link restored");
                    self.failsafe_active = false;
                }

                self.mode = cmd.mode;
                self.time_remaining_s = cmd.time_remaining_s.max(0.0);
                self.ds_loop_count = cmd.ds_loop_count;
                self.aux_cmd = cmd.aux_cmd.clone();
            },
            Err(e) => {
                self.msg_err_count += 1;
                warn!("Malformed mode command: {}", e);

                if self.policy == MalformedPolicy::Stop {
                    self.mode = BotMode::Stop;
                    self.time_remaining_s = 0.0;
                    self.restart = true;
                }
            }
        }
    }

    /// Advance one cycle.
    ///
    /// `last_valid` is when the last well formed mode command was received, `None` if one never
    /// has been. The failsafe only runs once a command has been received.
    pub fn step(&mut self, now: Instant, last_valid: Option<Instant>) -> Dispatch {
        if let Some(t) = last_valid {
            if now.saturating_duration_since(t) > self.failsafe_timeout && !self.failsafe_active {
                self.failsafe_active = true;
                self.timeout_count += 1;

                warn!(
                    "No mode command for {:.1} s, stopping",
                    now.saturating_duration_since(t).as_secs_f64()
                );

                if self.mode != BotMode::Stop {
                    self.mode = BotMode::Stop;
                    self.loop_count = -1;
                }
                self.time_remaining_s = 0.0;
                self.aux_cmd = None;
            }
        }

        self.loop_count += 1;

        let just_switched = self.dispatched_mode != Some(self.mode) || self.restart;
        if just_switched {
            self.restart = false;
            if let Some(prev) = self.dispatched_mode.filter(|m| *m != self.mode) {
                info!("Mode switched from {} to {}", prev, self.mode);
            }
            self.loop_count = 0;
            self.dispatched_mode = Some(self.mode);
        }

        Dispatch {
            mode: self.mode,
            loop_count: self.loop_count.max(0) as u64,
            time_remaining_s: self.time_remaining_s,
            just_switched,
        }
    }

    pub fn mode(&self) -> BotMode {
        self.mode
    }

    pub fn time_remaining_s(&self) -> f64 {
        self.time_remaining_s
    }

    /// The drive station's loop count from the last well formed command.
    pub fn ds_loop_count(&self) -> i64 {
        self.ds_loop_count
    }

    pub fn aux_cmd(&self) -> Option<&str> {
        self.aux_cmd.as_deref()
    }

    /// Whether the failsafe is currently holding the bot stopped.
    pub fn failsafe_active(&self) -> bool {
        self.failsafe_active
    }

    /// Number of malformed mode commands received.
    pub fn msg_err_count(&self) -> u64 {
        self.msg_err_count
    }

    /// Number of times the link has been lost.
    pub fn timeout_count(&self) -> u64 {
        self.timeout_count
    }
}
