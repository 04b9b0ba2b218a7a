use std::path::PathBuf;

use crate::core::ipc::ParentEvent;
use crate::core::process::ProcessHandle;

/// Steps of the startup checks, in the only order they may run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckState {
    AwaitGamePath,
    ResolvePlatformPath,
    ResolveActiveUser,
    LocateMod,
    VerifyModIntegrity { mod_root: PathBuf },
    CheckLaunchOption,
    CheckSandboxAssets,
    DecideRestart,
    NoRestartNeeded,
    CloseGame(ProcessHandle),
    CloseOrRestartPlatform,
    ApplyLaunchOption,
    StartGame,
    Done(CheckOutcome),
}

/// How a run ended without a fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    ChecksComplete,
    ModNotFound,
    ModCorrupt,
    IsaacNotFound,
}

impl CheckOutcome {
    pub fn event(self) -> ParentEvent {
        match self {
            CheckOutcome::ChecksComplete => ParentEvent::IsaacChecksComplete,
            CheckOutcome::ModNotFound => ParentEvent::ModNotFound,
            CheckOutcome::ModCorrupt => ParentEvent::ModCorrupt,
            CheckOutcome::IsaacNotFound => ParentEvent::IsaacNotFound,
        }
    }
}
