pub mod checker;
pub mod hash;
pub mod manifest;

pub use checker::{FileStatus, IntegrityChecker, IntegrityVerdict, ModDirectorySnapshot};
pub use hash::{file_sha1, sha1_hex};
pub use manifest::{ChecksumManifest, ManifestSource, RemoteManifest};
