// ─── Lua Sandbox ───
// Turning on `--luadebug` gives mods full Lua access, so the client ships
// sandbox scripts that the game loads first and that restrict what can be
// called. They live in `<game>/resources/scripts`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::core::error::{ClientError, ClientResult};
use crate::core::integrity::{file_sha1, ModDirectorySnapshot};
use crate::core::ipc::{Message, MessageSink};

pub struct SandboxInstaller {
    source_dir: PathBuf,
    sink: Arc<dyn MessageSink>,
}

impl SandboxInstaller {
    pub fn new(source_dir: PathBuf, sink: Arc<dyn MessageSink>) -> Self {
        Self { source_dir, sink }
    }

    pub fn scripts_dir(game_path: &Path) -> PathBuf {
        game_path.join("resources").join("scripts")
    }

    /// Returns `true` when every sandbox file was already in place.
    /// Missing or modified files are copied over before returning `false`;
    /// the game has to be restarted to pick them up.
    pub async fn ensure(&self, game_path: &Path) -> ClientResult<bool> {
        let is_dir = tokio::fs::metadata(&self.source_dir)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !is_dir {
            return Err(ClientError::SandboxSourceMissing(self.source_dir.clone()));
        }

        let scripts_dir = Self::scripts_dir(game_path);
        let bundled = ModDirectorySnapshot::scan(&self.source_dir).await?;
        let mut valid = true;

        for (relative, source) in bundled.files {
            let target = relative
                .split('/')
                .fold(scripts_dir.clone(), |path, part| path.join(part));

            let exists = tokio::fs::metadata(&target)
                .await
                .map(|m| m.is_file())
                .unwrap_or(false);
            if exists && file_sha1(&target).await? == file_sha1(&source).await? {
                debug!("Sandbox file in place: {:?}", target);
                continue;
            }

            self.sink.send(Message::progress(format!(
                "Sandbox file is missing or modified: {}",
                target.display()
            )))?;
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| ClientError::io(parent, e))?;
            }
            tokio::fs::copy(&source, &target)
                .await
                .map_err(|e| ClientError::io(&target, e))?;
            info!("Restored sandbox file {:?}", target);
            valid = false;
        }

        Ok(valid)
    }
}
