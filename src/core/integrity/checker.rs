use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::hash::file_sha1;
use super::manifest::{normalize_relative_path, ChecksumManifest, ManifestSource};
use crate::core::error::{ClientError, ClientResult};
use crate::core::ipc::{Message, MessageSink};

/// Never hash-compared: the manifest itself, and a file the workshop rewrites
/// on upload.
const HASH_EXEMPT_FILES: [&str; 2] = ["sha1.json", "metadata.xml"];

/// Never treated as extraneous: the workshop metadata, and the marker the
/// game drops when the mod is disabled.
const EXTRANEOUS_ALLOWED_FILES: [&str; 2] = ["metadata.xml", "disable.it"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    Ok,
    Corrupt { expected: String, actual: String },
    Missing,
    ExtraneousDeleted,
}

/// Outcome of one verification pass over the mod directory.
#[derive(Debug, Clone, Default)]
pub struct IntegrityVerdict {
    pub files: BTreeMap<String, FileStatus>,
}

impl IntegrityVerdict {
    pub fn is_valid(&self) -> bool {
        self.files.values().all(|status| *status == FileStatus::Ok)
    }

    pub fn status(&self, relative_path: &str) -> Option<&FileStatus> {
        self.files.get(relative_path)
    }

    pub fn problems(&self) -> impl Iterator<Item = (&str, &FileStatus)> {
        self.files
            .iter()
            .filter(|(_, status)| **status != FileStatus::Ok)
            .map(|(path, status)| (path.as_str(), status))
    }
}

/// Regular files present under the mod root right now.
#[derive(Debug, Clone, Default)]
pub struct ModDirectorySnapshot {
    /// (relative POSIX path, absolute path)
    pub files: Vec<(String, PathBuf)>,
}

impl ModDirectorySnapshot {
    pub async fn scan(root: &Path) -> ClientResult<Self> {
        let mut files = Vec::new();
        let mut pending = vec![root.to_path_buf()];

        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir)
                .await
                .map_err(|e| ClientError::io(&dir, e))?;

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| ClientError::io(&dir, e))?
            {
                let path = entry.path();
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| ClientError::io(&path, e))?;

                // Extraneous directories are harmless, only files matter.
                if file_type.is_dir() {
                    pending.push(path);
                } else if file_type.is_file() {
                    let relative = path
                        .strip_prefix(root)
                        .map(|p| normalize_relative_path(&p.to_string_lossy()))
                        .unwrap_or_default();
                    files.push((relative, path));
                }
            }
        }

        files.sort();
        Ok(Self { files })
    }
}

/// Verifies the mod against the published checksums and repairs what it can.
pub struct IntegrityChecker {
    source: Arc<dyn ManifestSource>,
    sink: Arc<dyn MessageSink>,
}

impl IntegrityChecker {
    pub fn new(source: Arc<dyn ManifestSource>, sink: Arc<dyn MessageSink>) -> Self {
        Self { source, sink }
    }

    pub async fn verify(&self, mod_root: &Path) -> ClientResult<IntegrityVerdict> {
        let manifest = self.source.fetch().await?;
        self.verify_against(mod_root, &manifest).await
    }

    /// Both passes always run: extraneous files are deleted even when the
    /// manifest pass already found a corrupt file.
    pub async fn verify_against(
        &self,
        mod_root: &Path,
        manifest: &ChecksumManifest,
    ) -> ClientResult<IntegrityVerdict> {
        let mut verdict = IntegrityVerdict::default();

        self.check_manifest_files(mod_root, manifest, &mut verdict)
            .await?;
        self.remove_extraneous_files(mod_root, manifest, &mut verdict)
            .await?;

        info!(
            "Integrity check of {:?}: {} files, {} problems",
            mod_root,
            verdict.files.len(),
            verdict.problems().count()
        );
        Ok(verdict)
    }

    async fn check_manifest_files(
        &self,
        mod_root: &Path,
        manifest: &ChecksumManifest,
        verdict: &mut IntegrityVerdict,
    ) -> ClientResult<()> {
        for (relative, expected) in manifest.iter() {
            let path = join_relative(mod_root, relative);

            let is_file = tokio::fs::metadata(&path)
                .await
                .map(|m| m.is_file())
                .unwrap_or(false);
            if !is_file {
                self.sink
                    .send(Message::progress(format!("File is missing: {}", path.display())))?;
                verdict.files.insert(relative.to_string(), FileStatus::Missing);
                continue;
            }

            if has_file_name(relative, &HASH_EXEMPT_FILES) {
                verdict.files.insert(relative.to_string(), FileStatus::Ok);
                continue;
            }

            let actual = file_sha1(&path).await?;
            if actual.eq_ignore_ascii_case(expected) {
                verdict.files.insert(relative.to_string(), FileStatus::Ok);
            } else {
                warn!("Checksum mismatch for {:?}", path);
                self.sink
                    .send(Message::progress(format!("File is corrupt: {}", path.display())))?;
                self.sink.send(Message::progress(format!(
                    "The hash of \"{}\" does not match the hash of \"{}\" for the file of \"{}\".",
                    actual,
                    expected,
                    path.display()
                )))?;
                verdict.files.insert(
                    relative.to_string(),
                    FileStatus::Corrupt {
                        expected: expected.to_string(),
                        actual,
                    },
                );
            }
        }

        Ok(())
    }

    async fn remove_extraneous_files(
        &self,
        mod_root: &Path,
        manifest: &ChecksumManifest,
        verdict: &mut IntegrityVerdict,
    ) -> ClientResult<()> {
        let snapshot = ModDirectorySnapshot::scan(mod_root).await?;

        for (relative, path) in snapshot.files {
            if has_file_name(&relative, &EXTRANEOUS_ALLOWED_FILES) || manifest.contains(&relative) {
                continue;
            }

            self.sink.send(Message::progress(format!(
                "Extraneous file found: {}",
                path.display()
            )))?;
            tokio::fs::remove_file(&path)
                .await
                .map_err(|e| ClientError::io(&path, e))?;
            debug!("Deleted extraneous file {:?}", path);

            verdict.files.insert(relative, FileStatus::ExtraneousDeleted);
        }

        Ok(())
    }
}

fn join_relative(root: &Path, relative: &str) -> PathBuf {
    relative
        .split('/')
        .filter(|part| !part.is_empty())
        .fold(root.to_path_buf(), |path, part| path.join(part))
}

fn has_file_name(relative: &str, names: &[&str]) -> bool {
    let name = relative.rsplit('/').next().unwrap_or(relative);
    names.contains(&name)
}
