// ─── Checksum Manifest ───
// SHA-1 of every file of the mod, computed when the mod is built and
// published next to its sources.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use reqwest::Client;
use tracing::info;

use crate::core::error::{ClientError, ClientResult};

/// Relative path → expected lowercase hex SHA-1.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChecksumManifest {
    entries: BTreeMap<String, String>,
}

impl ChecksumManifest {
    pub fn from_json(raw: &str) -> ClientResult<Self> {
        let parsed: HashMap<String, String> = serde_json::from_str(raw)?;
        Ok(parsed.into_iter().collect())
    }

    pub fn get(&self, relative_path: &str) -> Option<&str> {
        self.entries
            .get(&normalize_relative_path(relative_path))
            .map(String::as_str)
    }

    pub fn contains(&self, relative_path: &str) -> bool {
        self.entries
            .contains_key(&normalize_relative_path(relative_path))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, String)> for ChecksumManifest {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let entries = iter
            .into_iter()
            .map(|(path, hash)| (normalize_relative_path(&path), hash.to_ascii_lowercase()))
            .collect();
        Self { entries }
    }
}

/// Manifest keys are POSIX paths; tolerate Windows separators on either side.
pub fn normalize_relative_path(raw: &str) -> String {
    let unified = raw.replace('\\', "/");
    unified
        .trim_start_matches("./")
        .trim_start_matches('/')
        .to_string()
}

/// Where the authoritative manifest comes from.
#[async_trait]
pub trait ManifestSource: Send + Sync {
    async fn fetch(&self) -> ClientResult<ChecksumManifest>;
}

/// The manifest published alongside the mod sources.
pub struct RemoteManifest {
    client: Client,
    url: String,
}

impl RemoteManifest {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl ManifestSource for RemoteManifest {
    async fn fetch(&self) -> ClientResult<ChecksumManifest> {
        info!("Fetching the mod checksums from {}", self.url);

        let response = self.client.get(&self.url).send().await?;
        if !response.status().is_success() {
            return Err(ClientError::DownloadFailed {
                url: self.url.clone(),
                status: response.status().as_u16(),
            });
        }

        let body = response.text().await?;
        let manifest = ChecksumManifest::from_json(&body)?;

        info!("Loaded {} checksums", manifest.len());
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_normalizes_keys() {
        let manifest = ChecksumManifest::from_json(
            r#"{ "main.lua": "ABCDEF", "resources\\scripts\\race.lua": "0123" }"#,
        )
        .unwrap();

        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest.get("main.lua"), Some("abcdef"));
        assert!(manifest.contains("resources/scripts/race.lua"));
        assert!(manifest.contains("resources\\scripts\\race.lua"));
    }

    #[test]
    fn rejects_non_object_json() {
        let err = ChecksumManifest::from_json(r#"["main.lua"]"#).unwrap_err();
        assert!(matches!(err, ClientError::Json(_)));
    }

    #[test]
    fn rejects_non_string_hashes() {
        assert!(ChecksumManifest::from_json(r#"{ "main.lua": 12 }"#).is_err());
    }
}
