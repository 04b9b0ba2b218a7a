use std::path::Path;

use sha1::{Digest, Sha1};

use crate::core::error::{ClientError, ClientResult};

/// Lowercase hex SHA-1 of a file's content.
pub async fn file_sha1(path: &Path) -> ClientResult<String> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| ClientError::io(path, e))?;
    Ok(sha1_hex(&bytes))
}

pub fn sha1_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digest() {
        assert_eq!(sha1_hex(b"abc"), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[tokio::test]
    async fn hashes_file_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.lua");
        std::fs::write(&path, b"abc").unwrap();

        assert_eq!(file_sha1(&path).await.unwrap(), sha1_hex(b"abc"));
    }

    #[tokio::test]
    async fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = file_sha1(&dir.path().join("nope")).await.unwrap_err();
        assert!(matches!(err, ClientError::Io { .. }));
    }
}
