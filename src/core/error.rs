use std::path::PathBuf;
use thiserror::Error;

/// Central error type for both child processes.
/// Every variant is fatal: the runner reports it to the parent and exits.
#[derive(Debug, Error)]
pub enum ClientError {
    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download failed for {url}: HTTP {status}")]
    DownloadFailed { url: String, status: u16 },

    #[error("Socket error ({context}): {source}")]
    Socket {
        context: String,
        source: std::io::Error,
    },

    #[error("Failed to resolve the remote host {host}:{port}")]
    UnresolvedHost { host: String, port: u16 },

    // ── JSON ────────────────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ── Platform registry ───────────────────────────────
    #[error("Failed to read the registry value {value}: {reason}")]
    Registry { value: &'static str, reason: String },

    #[error("The registry has a blank {0}. Is Steam running and are you properly logged in? If so, try restarting your computer.")]
    BlankRegistryValue(&'static str),

    #[error("Failed to parse the Steam ID from the registry: {0}")]
    InvalidActiveUser(String),

    #[error("You do not appear to be logged into Steam. (Your Steam active user ID is 0 in the registry.) Is Steam running and are you properly logged in? If so, try restarting your computer.")]
    NotLoggedIn,

    #[error("The platform registry is not available on this operating system")]
    RegistryUnavailable,

    // ── Launch configuration ────────────────────────────
    #[error("Failed to parse {path:?} at line {line}: {reason}")]
    VdfParse {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("Refusing to write the launch option while {0} is still running")]
    PlatformStillRunning(String),

    // ── Mod / sandbox ───────────────────────────────────
    #[error("Failed to find the \"mods\" directory at: {0:?}")]
    ModsDirMissing(PathBuf),

    #[error("Failed to find the sandbox files at: {0:?}")]
    SandboxSourceMissing(PathBuf),

    // ── Processes ───────────────────────────────────────
    #[error("Failed to execute the \"{command}\" command: {reason}")]
    ProcessList { command: String, reason: String },

    #[error("Failed to parse the process listing line: {0:?}")]
    ProcessListParse(String),

    #[error("Failed to close {name} (PID {pid}): {reason}")]
    ProcessKill {
        name: String,
        pid: u32,
        reason: String,
    },

    #[error("{name} (PID {pid}) did not exit within {seconds} seconds")]
    KillTimeout { name: String, pid: u32, seconds: u64 },

    // ── Parent channel ──────────────────────────────────
    #[error("The channel to the parent process is closed")]
    ParentChannelClosed,

    // ── Configuration ───────────────────────────────────
    #[error("Invalid settings file {path:?}: {reason}")]
    Settings { path: PathBuf, reason: String },

    // ── Generic ─────────────────────────────────────────
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the crate.
pub type ClientResult<T> = Result<T, ClientError>;

impl From<std::io::Error> for ClientError {
    fn from(source: std::io::Error) -> Self {
        ClientError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

impl ClientError {
    /// Wrap an IO error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ClientError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn socket(context: impl Into<String>, source: std::io::Error) -> Self {
        ClientError::Socket {
            context: context.into(),
            source,
        }
    }
}
