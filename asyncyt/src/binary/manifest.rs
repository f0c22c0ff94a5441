use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::Platform;

/// Record of what was provisioned into a directory, stored as
/// `manifest.json` next to the executables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub binaries: BTreeMap<String, ManifestEntry>
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub version: String,
    /// Digest of the downloaded asset (the archive, for zipped builds).
    pub sha256: String,
    pub platform: Platform,
    pub file: String,
    #[serde(default)]
    pub companions: Vec<String>
}

impl Manifest {
    pub const FILE_NAME: &'static str = "manifest.json";
    pub const LOCK_FILE_NAME: &'static str = ".manifest.lock";

    pub fn path(dir: &Path) -> PathBuf {
        dir.join(Self::FILE_NAME)
    }

    /// Missing or unreadable manifests load as empty.
    pub async fn load(dir: &Path) -> Self {
        let path = Self::path(dir);
        Self::decode(&path, tokio::fs::read(&path).await)
    }

    fn load_blocking(dir: &Path) -> Self {
        let path = Self::path(dir);
        Self::decode(&path, std::fs::read(&path))
    }

    fn decode(path: &Path, read: std::io::Result<Vec<u8>>) -> Self {
        match read {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "ignoring corrupt manifest");
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to read manifest");
                Self::default()
            }
        }
    }

    /// Entry usable on `platform`; copies provisioned for another platform
    /// are never returned.
    pub fn entry_for(&self, name: &str, platform: Platform) -> Option<&ManifestEntry> {
        self.binaries
            .get(name)
            .filter(|entry| entry.platform == platform)
    }

    /// Adds or replaces `name` and rewrites the manifest atomically.
    ///
    /// The read-modify-write runs under an exclusive lock on
    /// `.manifest.lock`, so processes sharing a provisioning dir never drop
    /// each other's entries.
    pub async fn record(dir: &Path, name: &str, entry: ManifestEntry) -> std::io::Result<()> {
        let dir = dir.to_path_buf();
        let name = name.to_string();

        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let _lock = lock_dir(&dir)?;

            let mut manifest = Self::load_blocking(&dir);
            manifest.binaries.insert(name, entry);
            let bytes = serde_json::to_vec_pretty(&manifest)?;

            let mut temp = tempfile::Builder::new()
                .prefix(".manifest-")
                .tempfile_in(&dir)?;
            temp.write_all(&bytes)?;
            temp.as_file().sync_all()?;
            temp.persist(Self::path(&dir)).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(std::io::Error::other)?
    }
}

/// Blocks until this process holds the manifest lock of `dir`. Released on
/// drop.
#[cfg(unix)]
fn lock_dir(dir: &Path) -> std::io::Result<nix::fcntl::Flock<std::fs::File>> {
    use nix::fcntl::{Flock, FlockArg};

    let file = std::fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(dir.join(Manifest::LOCK_FILE_NAME))?;
    Flock::lock(file, FlockArg::LockExclusive).map_err(|(_, errno)| std::io::Error::from(errno))
}

/// Without `flock` only writers within this process are serialized, by the
/// fetcher's manifest mutex.
#[cfg(not(unix))]
fn lock_dir(_dir: &Path) -> std::io::Result<Unlocked> {
    Ok(Unlocked)
}

#[cfg(not(unix))]
struct Unlocked;

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(platform: Platform) -> ManifestEntry {
        ManifestEntry {
            version: "2024.12.13".to_string(),
            sha256: "ab".repeat(32),
            platform,
            file: "yt-dlp".to_string(),
            companions: Vec::new()
        }
    }

    #[tokio::test]
    async fn test_record_and_load() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(Manifest::load(dir.path()).await, Manifest::default());

        Manifest::record(dir.path(), "yt-dlp", entry(Platform::LinuxX64))
            .await
            .unwrap();
        Manifest::record(dir.path(), "ffmpeg", entry(Platform::WindowsX64))
            .await
            .unwrap();

        let manifest = Manifest::load(dir.path()).await;
        assert_eq!(manifest.binaries.len(), 2);
        assert!(manifest.entry_for("yt-dlp", Platform::LinuxX64).is_some());
        assert!(manifest.entry_for("yt-dlp", Platform::MacOs).is_none());
    }

    #[tokio::test]
    async fn test_concurrent_records_keep_every_entry() {
        let dir = tempfile::tempdir().unwrap();
        let names: Vec<String> = (0..8).map(|n| format!("tool-{n}")).collect();

        let writes = names
            .iter()
            .map(|name| Manifest::record(dir.path(), name, entry(Platform::LinuxX64)));
        for result in futures::future::join_all(writes).await {
            result.unwrap();
        }

        let manifest = Manifest::load(dir.path()).await;
        assert_eq!(manifest.binaries.len(), names.len());
        for name in &names {
            assert!(manifest.entry_for(name, Platform::LinuxX64).is_some(), "{name} was lost");
        }
    }

    #[tokio::test]
    async fn test_corrupt_manifest_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(Manifest::path(dir.path()), b"{not json").unwrap();
        assert!(Manifest::load(dir.path()).await.binaries.is_empty());
    }
}
