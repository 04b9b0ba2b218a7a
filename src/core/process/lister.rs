use std::time::{Duration, Instant};

use async_trait::async_trait;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::debug;

use super::supervisor::ProcessHandle;
use crate::core::error::{ClientError, ClientResult};

/// Raw text of the OS process listing, one process per line.
#[async_trait]
pub trait ProcessLister: Send + Sync {
    async fn list(&self) -> ClientResult<String>;
}

/// Terminates a process and only returns once it is gone.
#[async_trait]
pub trait ProcessTerminator: Send + Sync {
    async fn terminate(&self, handle: &ProcessHandle, timeout: Duration) -> ClientResult<()>;
}

/// Find the pid of `name` in a listing.
///
/// A line matches when it starts with the exact name followed by
/// whitespace; the pid is the first run of digits after that. A matching
/// line without a pid means the listing format changed, which is fatal.
pub fn find_in_listing(listing: &str, name: &str) -> ClientResult<Option<u32>> {
    for line in listing.lines() {
        let Some(rest) = line.strip_prefix(name) else {
            continue;
        };
        if !rest.starts_with(char::is_whitespace) {
            continue;
        }

        let rest = rest.trim_start();
        let digits_len = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        let after = &rest[digits_len..];
        if digits_len == 0 || !(after.is_empty() || after.starts_with(char::is_whitespace)) {
            return Err(ClientError::ProcessListParse(line.to_string()));
        }

        let pid = rest[..digits_len]
            .parse::<u32>()
            .map_err(|_| ClientError::ProcessListParse(line.to_string()))?;
        return Ok(Some(pid));
    }

    Ok(None)
}

/// The real operating system: `tasklist` (or `ps`) for listing, sysinfo for
/// killing.
#[derive(Debug, Default)]
pub struct SystemProcesses;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[cfg(target_os = "windows")]
fn listing_command() -> (&'static str, &'static [&'static str]) {
    ("tasklist", &[])
}

#[cfg(not(target_os = "windows"))]
fn listing_command() -> (&'static str, &'static [&'static str]) {
    ("ps", &["-A", "-o", "comm=,pid="])
}

#[async_trait]
impl ProcessLister for SystemProcesses {
    async fn list(&self) -> ClientResult<String> {
        let (program, args) = listing_command();
        let mut cmd = tokio::process::Command::new(program);
        cmd.args(args);

        #[cfg(target_os = "windows")]
        {
            const CREATE_NO_WINDOW: u32 = 0x08000000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        let output = cmd.output().await.map_err(|e| ClientError::ProcessList {
            command: program.to_string(),
            reason: e.to_string(),
        })?;
        if !output.status.success() {
            return Err(ClientError::ProcessList {
                command: program.to_string(),
                reason: format!("exit status {:?}", output.status.code()),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl ProcessTerminator for SystemProcesses {
    async fn terminate(&self, handle: &ProcessHandle, timeout: Duration) -> ClientResult<()> {
        let pid = Pid::from_u32(handle.pid);
        let signalled = tokio::task::spawn_blocking(move || {
            let mut system = System::new();
            system.refresh_processes(ProcessesToUpdate::Some(&[pid]));
            system.process(pid).map(|process| process.kill())
        })
        .await
        .map_err(|e| kill_error(handle, e.to_string()))?;

        match signalled {
            None => {
                debug!("{} (PID {}) was already gone", handle.name, handle.pid);
                return Ok(());
            }
            Some(false) => return Err(kill_error(handle, "the kill signal was refused".into())),
            Some(true) => {}
        }

        let deadline = Instant::now() + timeout;
        while is_alive(handle).await? {
            if Instant::now() >= deadline {
                return Err(ClientError::KillTimeout {
                    name: handle.name.clone(),
                    pid: handle.pid,
                    seconds: timeout.as_secs(),
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        Ok(())
    }
}

async fn is_alive(handle: &ProcessHandle) -> ClientResult<bool> {
    let pid = Pid::from_u32(handle.pid);
    tokio::task::spawn_blocking(move || {
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]));
        system.process(pid).is_some()
    })
    .await
    .map_err(|e| kill_error(handle, format!("could not check whether it exited: {e}")))
}

fn kill_error(handle: &ProcessHandle, reason: String) -> ClientError {
    ClientError::ProcessKill {
        name: handle.name.clone(),
        pid: handle.pid,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TASKLIST: &str = "\r\n\
Image Name                     PID Session Name        Session#    Mem Usage\r\n\
========================= ======== ================ =========== ============\r\n\
System Idle Process              0 Services                   0          8 K\r\n\
steamwebhelper.exe            6120 Console                    1     45,112 K\r\n\
steam.exe                     5312 Console                    1     61,204 K\r\n\
isaac-ng.exe                 10244 Console                    1    301,876 K\r\n";

    #[test]
    fn finds_pids_in_tasklist_output() {
        assert_eq!(find_in_listing(TASKLIST, "steam.exe").unwrap(), Some(5312));
        assert_eq!(find_in_listing(TASKLIST, "isaac-ng.exe").unwrap(), Some(10244));
    }

    #[test]
    fn name_match_is_exact_and_case_sensitive() {
        assert_eq!(find_in_listing(TASKLIST, "steam").unwrap(), None);
        assert_eq!(find_in_listing(TASKLIST, "Steam.exe").unwrap(), None);
    }

    #[test]
    fn tolerates_tabs_and_missing_trailing_columns() {
        assert_eq!(
            find_in_listing("isaac-ng.exe\t\t 77", "isaac-ng.exe").unwrap(),
            Some(77)
        );
    }

    #[test]
    fn matching_line_without_pid_is_fatal() {
        let err = find_in_listing("steam.exe     N/A Console", "steam.exe").unwrap_err();
        assert!(matches!(err, ClientError::ProcessListParse(_)));

        assert!(find_in_listing("steam.exe   12ab Console", "steam.exe").is_err());
        assert!(find_in_listing("steam.exe   99999999999 Console", "steam.exe").is_err());
    }

    #[tokio::test]
    async fn liveness_is_reported_as_a_result() {
        let me = ProcessHandle {
            name: "racing-client".into(),
            pid: std::process::id(),
        };
        assert!(is_alive(&me).await.unwrap());

        let gone = ProcessHandle {
            name: "isaac-ng.exe".into(),
            pid: u32::MAX - 1,
        };
        assert!(!is_alive(&gone).await.unwrap());
        SystemProcesses
            .terminate(&gone, Duration::from_millis(100))
            .await
            .unwrap();
    }
}
