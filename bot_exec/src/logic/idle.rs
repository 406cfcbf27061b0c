//! # Idle logic
//!
//! Logic which does nothing. Copy it as the starting point for new logic.

use crate::{bot_ctx::BotCtx, sandbox::UserLogic};

pub const NAME: &str = "idle";

pub struct Idle;

impl UserLogic for Idle {
    fn name(&self) -> &str {
        NAME
    }

    fn initialize(&mut self, _ctx: &mut BotCtx) -> color_eyre::Result<()> {
        Ok(())
    }

    fn stop(&mut self, _ctx: &mut BotCtx, _loop_count: u64) -> color_eyre::Result<()> {
        Ok(())
    }

    fn auto(&mut self, _ctx: &mut BotCtx, _loop_count: u64) -> color_eyre::Result<()> {
        Ok(())
    }

    fn teleop(&mut self, _ctx: &mut BotCtx, _loop_count: u64) -> color_eyre::Result<()> {
        Ok(())
    }
}
