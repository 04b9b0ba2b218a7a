use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::vdf;
use crate::core::error::{ClientError, ClientResult};

/// Per-user launch options of the game, as stored by the platform.
///
/// The platform keeps this file cached in memory while it runs, so a write
/// only sticks when it happens after the platform process has exited.
#[async_trait]
pub trait LaunchOptionStore: Send + Sync {
    /// Current launch options string, if the game has one.
    async fn read(&self, platform_path: &Path, user: u32) -> ClientResult<Option<String>>;
    async fn write(&self, platform_path: &Path, user: u32, options: &str) -> ClientResult<()>;
}

/// `<steam>/userdata/<user>/config/localconfig.vdf`
pub struct LocalConfigStore {
    app_id: String,
}

impl LocalConfigStore {
    pub fn new(app_id: u32) -> Self {
        Self {
            app_id: app_id.to_string(),
        }
    }

    pub fn config_path(platform_path: &Path, user: u32) -> PathBuf {
        platform_path
            .join("userdata")
            .join(user.to_string())
            .join("config")
            .join("localconfig.vdf")
    }

    fn option_path(&self) -> [&str; 7] {
        [
            "UserLocalConfigStore",
            "Software",
            "Valve",
            "Steam",
            "apps",
            &self.app_id,
            "LaunchOptions",
        ]
    }

    async fn load(path: &Path) -> ClientResult<vdf::VdfSection> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ClientError::io(path, e))?;
        vdf::parse(&raw).map_err(|e| ClientError::VdfParse {
            path: path.to_path_buf(),
            line: e.line,
            reason: e.reason,
        })
    }
}

#[async_trait]
impl LaunchOptionStore for LocalConfigStore {
    async fn read(&self, platform_path: &Path, user: u32) -> ClientResult<Option<String>> {
        let path = Self::config_path(platform_path, user);
        let root = Self::load(&path).await?;
        Ok(root.lookup(&self.option_path()).map(str::to_string))
    }

    async fn write(&self, platform_path: &Path, user: u32, options: &str) -> ClientResult<()> {
        let path = Self::config_path(platform_path, user);
        let mut root = Self::load(&path).await?;
        root.set(&self.option_path(), options);

        replace_file(&path, root.render().as_bytes()).await?;
        debug!("Wrote launch options {:?} to {:?}", options, path);
        Ok(())
    }
}

/// Write `contents` next to `path` and rename it into place, so Steam's
/// config is either the old file or the new one, never a truncated mix.
async fn replace_file(path: &Path, contents: &[u8]) -> ClientResult<()> {
    let temp = path.with_extension("vdf.tmp");
    tokio::fs::write(&temp, contents)
        .await
        .map_err(|e| ClientError::io(&temp, e))?;

    if let Err(source) = tokio::fs::rename(&temp, path).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(ClientError::io(path, source));
    }
    Ok(())
}

/// Checks and sets the one launch option the mod needs to talk to the
/// client.
pub struct LaunchConfigManager {
    store: Arc<dyn LaunchOptionStore>,
    option: String,
}

impl LaunchConfigManager {
    pub fn new(store: Arc<dyn LaunchOptionStore>, option: impl Into<String>) -> Self {
        Self {
            store,
            option: option.into(),
        }
    }

    pub fn option(&self) -> &str {
        &self.option
    }

    pub async fn has_option(&self, platform_path: &Path, user: u32) -> ClientResult<bool> {
        let current = self.store.read(platform_path, user).await?;
        Ok(current
            .as_deref()
            .is_some_and(|options| contains_option(options, &self.option)))
    }

    /// Append the option, keeping whatever else the user put there.
    /// Must only be called once the platform process is gone.
    pub async fn set_option(&self, platform_path: &Path, user: u32) -> ClientResult<()> {
        let current = self
            .store
            .read(platform_path, user)
            .await?
            .unwrap_or_default();
        if contains_option(&current, &self.option) {
            return Ok(());
        }

        let updated = if current.trim().is_empty() {
            self.option.clone()
        } else {
            format!("{} {}", current.trim_end(), self.option)
        };

        self.store.write(platform_path, user, &updated).await?;
        info!("Launch options are now {:?}", updated);
        Ok(())
    }
}

fn contains_option(options: &str, option: &str) -> bool {
    options.split_whitespace().any(|token| token == option)
}
