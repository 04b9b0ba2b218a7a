use std::path::{Path, PathBuf};

use crate::core::error::{ClientError, ClientResult};

/// Everything the startup checks learn along the way. One per run, owned by
/// the state machine.
#[derive(Debug, Clone, Default)]
pub struct OrchestrationContext {
    pub platform_path: Option<PathBuf>,
    pub active_user: Option<u32>,
    pub game_path: PathBuf,
    pub needs_game_restart: bool,
    pub needs_platform_restart: bool,
}

impl OrchestrationContext {
    /// The option can only be written with the platform closed, and only
    /// takes effect once the game restarts, so a missing option needs both.
    pub fn record_launch_option(&mut self, present: bool) {
        if !present {
            self.needs_game_restart = true;
            self.needs_platform_restart = true;
        }
    }

    /// Restored sandbox files are picked up by a game restart alone.
    pub fn record_sandbox(&mut self, valid: bool) {
        if !valid {
            self.needs_game_restart = true;
        }
    }

    pub fn needs_restart(&self) -> bool {
        self.needs_game_restart
    }

    pub fn platform(&self) -> ClientResult<(&Path, u32)> {
        match (&self.platform_path, self.active_user) {
            (Some(path), Some(user)) => Ok((path.as_path(), user)),
            _ => Err(ClientError::Other(
                "The Steam path and active user must be resolved first".into(),
            )),
        }
    }
}
