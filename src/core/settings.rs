use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::error::{ClientError, ClientResult};

const APP_DIR_NAME: &str = "racing-client";
const SETTINGS_FILE: &str = "settings.json";

/// Everything both child processes can be configured with.
/// Every field has a default, so a partial (or missing) file is fine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub checks: CheckSettings,
    pub relay: RelaySettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckSettings {
    pub manifest_url: String,
    /// Folder name of the mod after Steam Workshop downloads it.
    pub mod_directory_name: String,
    pub game_process_name: String,
    pub platform_process_name: String,
    pub game_app_id: u32,
    pub launch_option: String,
    /// Bundled sandbox Lua files. Defaults to `<exe dir>/sandbox`.
    pub sandbox_dir: Option<PathBuf>,
    pub restart_delay_ms: u64,
    pub kill_timeout_secs: u64,
    pub http_timeout_secs: u64,
}

impl Default for CheckSettings {
    fn default() -> Self {
        Self {
            manifest_url: "https://raw.githubusercontent.com/Zamiell/racing-plus/main/sha1.json"
                .into(),
            mod_directory_name: "racing+_857628390".into(),
            game_process_name: "isaac-ng.exe".into(),
            platform_process_name: "steam.exe".into(),
            game_app_id: 250900,
            launch_option: "--luadebug".into(),
            sandbox_dir: None,
            restart_delay_ms: 1000,
            kill_timeout_secs: 30,
            http_timeout_secs: 60,
        }
    }
}

impl CheckSettings {
    pub fn resolved_sandbox_dir(&self) -> PathBuf {
        if let Some(dir) = &self.sandbox_dir {
            return dir.clone();
        }

        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sandbox")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    pub local_host: String,
    pub tcp_port: u16,
    pub udp_port: u16,
    pub remote_host: String,
    pub remote_udp_port: u16,
    /// First token of a line the mod sends every frame to probe the socket.
    pub keepalive_token: String,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            local_host: "127.0.0.1".into(),
            tcp_port: 9112,
            udp_port: 9113,
            remote_host: "isaacracing-tuga.sytes.net".into(),
            remote_udp_port: 9113,
            keepalive_token: "ping".into(),
        }
    }
}

impl Settings {
    /// Load from an explicit path, or from the per-user config dir when the
    /// file exists there, or fall back to defaults.
    pub fn load(explicit: Option<&Path>) -> ClientResult<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let default_path = default_settings_path();
                if !default_path.exists() {
                    debug!("No settings file at {:?}, using defaults", default_path);
                    return Ok(Self::default());
                }
                default_path
            }
        };

        let raw = std::fs::read_to_string(&path).map_err(|e| ClientError::io(&path, e))?;
        let settings = Self::from_json(&raw).map_err(|e| ClientError::Settings {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        info!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

fn default_settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
        .join(SETTINGS_FILE)
}
