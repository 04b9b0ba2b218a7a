use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use super::lister::{find_in_listing, ProcessLister, ProcessTerminator};
use crate::core::error::ClientResult;

/// A running process, resolved fresh for every decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessHandle {
    pub name: String,
    pub pid: u32,
}

/// Finds and closes the game and platform processes.
///
/// Never starts anything: launching the game is the parent's job.
pub struct ProcessSupervisor {
    lister: Arc<dyn ProcessLister>,
    terminator: Arc<dyn ProcessTerminator>,
    kill_timeout: Duration,
}

impl ProcessSupervisor {
    pub fn new(
        lister: Arc<dyn ProcessLister>,
        terminator: Arc<dyn ProcessTerminator>,
        kill_timeout: Duration,
    ) -> Self {
        Self {
            lister,
            terminator,
            kill_timeout,
        }
    }

    pub async fn find_process(&self, name: &str) -> ClientResult<Option<ProcessHandle>> {
        let listing = self.lister.list().await?;
        Ok(find_in_listing(&listing, name)?.map(|pid| ProcessHandle {
            name: name.to_string(),
            pid,
        }))
    }

    /// Returns once the process has fully exited.
    pub async fn kill(&self, handle: &ProcessHandle) -> ClientResult<()> {
        info!("Terminating {} (PID {})", handle.name, handle.pid);
        self.terminator.terminate(handle, self.kill_timeout).await?;
        info!("{} (PID {}) has exited", handle.name, handle.pid);
        Ok(())
    }
}
