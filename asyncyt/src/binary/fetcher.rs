use std::io::Write;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use async_stream::try_stream;
use futures_core::Stream;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, mpsc};

use super::{
    BinaryCache, BinarySource, Checksum, ExecutableSpec, Manifest, ManifestEntry, Platform,
    PlatformAsset, ResolvedBinary, probe_version
};
use crate::error::ProvisionError;
use crate::process::ProcessRunner;
use crate::types::format_bytes;

const PROGRESS_THRESHOLD: u64 = 256 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPhase {
    Checksum,
    Downloading,
    Verifying,
    Extracting,
    Installing
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchProgress {
    pub name: String,
    pub phase: FetchPhase,
    pub downloaded: u64,
    pub total: Option<u64>
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchEvent {
    Progress(FetchProgress),
    Finished(ResolvedBinary)
}

pub type FetchStream<'a> = Pin<Box<dyn Stream<Item = Result<FetchEvent, ProvisionError>> + Send + 'a>>;

/// Downloads pinned builds into the provisioning directory.
///
/// Concurrent fetches of one executable share a single download. Files are
/// written to a temporary name inside the directory, verified against the
/// published SHA-256 and renamed into place, so a partially written binary
/// is never visible under its final name.
#[derive(Debug)]
pub struct BinaryFetcher {
    client: reqwest::Client,
    bin_dir: PathBuf,
    runner: ProcessRunner,
    platform: Option<Platform>,
    installed: BinaryCache,
    manifest_lock: Mutex<()>
}

impl BinaryFetcher {
    pub fn new(client: reqwest::Client, bin_dir: impl Into<PathBuf>, runner: ProcessRunner) -> Self {
        Self {
            client,
            bin_dir: bin_dir.into(),
            runner,
            platform: Platform::current(),
            installed: BinaryCache::new(),
            manifest_lock: Mutex::new(())
        }
    }

    /// Overrides the detected platform when choosing assets.
    pub fn with_platform(mut self, platform: Option<Platform>) -> Self {
        self.platform = platform;
        self
    }

    pub fn bin_dir(&self) -> &Path {
        &self.bin_dir
    }

    pub async fn fetch(&self, spec: &ExecutableSpec) -> Result<ResolvedBinary, ProvisionError> {
        self.installed
            .get_or_try_init(&spec.name, || self.install(spec, None))
            .await
    }

    /// Like [`fetch`](Self::fetch), reporting progress as it goes. Joining a
    /// fetch that is already running yields only the final event.
    pub fn fetch_with_progress<'a>(&'a self, spec: &'a ExecutableSpec) -> FetchStream<'a> {
        enum Step {
            Progress(FetchProgress),
            Done(Result<ResolvedBinary, ProvisionError>)
        }

        Box::pin(try_stream! {
            let (tx, mut rx) = mpsc::unbounded_channel();
            let fetch = self
                .installed
                .get_or_try_init(&spec.name, || self.install(spec, Some(tx)));
            tokio::pin!(fetch);

            let resolved = loop {
                let step = tokio::select! {
                    Some(progress) = rx.recv() => Step::Progress(progress),
                    result = &mut fetch => Step::Done(result)
                };
                match step {
                    Step::Progress(progress) => yield FetchEvent::Progress(progress),
                    Step::Done(result) => break result?
                }
            };

            while let Ok(progress) = rx.try_recv() {
                yield FetchEvent::Progress(progress);
            }
            yield FetchEvent::Finished(resolved);
        })
    }

    /// Drops the remembered result so the next fetch installs again.
    pub async fn forget(&self, name: &str) {
        self.installed.invalidate(name).await;
    }

    async fn install(
        &self,
        spec: &ExecutableSpec,
        progress: Option<mpsc::UnboundedSender<FetchProgress>>
    ) -> Result<ResolvedBinary, ProvisionError> {
        let unsupported = || ProvisionError::UnsupportedPlatform {
            name: spec.name.clone()
        };
        let platform = self.platform.ok_or_else(unsupported)?;
        let asset = spec.asset_for(platform).ok_or_else(unsupported)?;
        let reporter = Reporter {
            name: &spec.name,
            tx: progress
        };

        tokio::fs::create_dir_all(&self.bin_dir).await?;

        if let Some(existing) = self.reuse_existing(spec, platform).await {
            return Ok(existing);
        }

        tracing::info!(name = %spec.name, version = %spec.pinned_version, %platform, url = %asset.url, "provisioning binary");

        reporter.send(FetchPhase::Checksum, 0, None);
        let expected = self.expected_sha256(asset).await?;

        let (temp, actual, size) = self.download_to_temp(spec, asset, &reporter).await?;

        reporter.send(FetchPhase::Verifying, size, Some(size));
        if !actual.eq_ignore_ascii_case(&expected) {
            return Err(ProvisionError::ChecksumMismatch {
                name: spec.name.clone(),
                expected,
                actual
            });
        }
        tracing::debug!(name = %spec.name, size = %format_bytes(size), "checksum verified");

        let file = spec.file_name(platform);
        let companions = if asset.archive_members.is_empty() {
            reporter.send(FetchPhase::Installing, size, Some(size));
            let target = self.bin_dir.join(&file);
            mark_executable(temp.path())?;
            temp.persist(&target).map_err(|e| e.error)?;
            Vec::new()
        } else {
            reporter.send(FetchPhase::Extracting, size, Some(size));
            let bin_dir = self.bin_dir.clone();
            let name = spec.name.clone();
            let members = asset.archive_members.clone();
            let mut extracted = tokio::task::spawn_blocking(move || {
                extract_members(temp.path(), &bin_dir, &name, &members)
            })
            .await
            .map_err(std::io::Error::other)??;
            reporter.send(FetchPhase::Installing, size, Some(size));
            if extracted.is_empty() {
                Vec::new()
            } else {
                extracted.split_off(1)
            }
        };

        let path = self.bin_dir.join(&file);
        let version = probe_version(&self.runner, &path, spec)
            .await
            .ok_or_else(|| ProvisionError::NotRunnable { path: path.clone() })?;

        {
            let _lock = self.manifest_lock.lock().await;
            Manifest::record(&self.bin_dir, &spec.name, ManifestEntry {
                version: spec.pinned_version.clone(),
                sha256: actual,
                platform,
                file,
                companions
            })
            .await?;
        }

        tracing::info!(name = %spec.name, %version, path = %path.display(), "binary provisioned");
        Ok(ResolvedBinary {
            name: spec.name.clone(),
            path,
            version,
            source: BinarySource::Provisioned,
            platform: Some(platform)
        })
    }

    /// A copy of the pinned release already recorded for this platform,
    /// possibly installed by another process.
    async fn reuse_existing(&self, spec: &ExecutableSpec, platform: Platform) -> Option<ResolvedBinary> {
        let manifest = Manifest::load(&self.bin_dir).await;
        let entry = manifest
            .entry_for(&spec.name, platform)
            .filter(|entry| entry.version == spec.pinned_version)?;
        let path = self.bin_dir.join(&entry.file);
        if !path.is_file() {
            return None;
        }
        let version = probe_version(&self.runner, &path, spec).await?;
        tracing::debug!(name = %spec.name, path = %path.display(), "reusing provisioned binary");
        Some(ResolvedBinary {
            name: spec.name.clone(),
            path,
            version,
            source: BinarySource::Provisioned,
            platform: Some(platform)
        })
    }

    async fn expected_sha256(&self, asset: &PlatformAsset) -> Result<String, ProvisionError> {
        match &asset.checksum {
            Checksum::Sha256(digest) => Ok(digest.to_ascii_lowercase()),
            Checksum::Sha256Sums { url, asset: file } => {
                let listing = self
                    .client
                    .get(url)
                    .send()
                    .await
                    .and_then(reqwest::Response::error_for_status)
                    .map_err(http_error(url))?
                    .text()
                    .await
                    .map_err(http_error(url))?;
                parse_sha256_for_asset(&listing, file).ok_or_else(|| ProvisionError::ChecksumUnavailable {
                    asset: file.clone(),
                    url: url.clone()
                })
            }
        }
    }

    /// Streams the asset into a temporary file in the provisioning directory,
    /// returning it with its digest and size.
    async fn download_to_temp(
        &self,
        spec: &ExecutableSpec,
        asset: &PlatformAsset,
        reporter: &Reporter<'_>
    ) -> Result<(tempfile::NamedTempFile, String, u64), ProvisionError> {
        let mut response = self
            .client
            .get(&asset.url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(http_error(&asset.url))?;
        let total = response.content_length();

        let temp = tempfile::Builder::new()
            .prefix(&format!(".{}-", spec.name))
            .suffix(".part")
            .tempfile_in(&self.bin_dir)?;
        let mut file = tokio::fs::File::from_std(temp.as_file().try_clone()?);
        let mut hasher = Sha256::new();
        let mut downloaded = 0u64;
        let mut last_reported = 0u64;

        reporter.send(FetchPhase::Downloading, 0, total);
        while let Some(chunk) = response.chunk().await.map_err(http_error(&asset.url))? {
            hasher.update(&chunk);
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;

            if downloaded - last_reported >= PROGRESS_THRESHOLD {
                reporter.send(FetchPhase::Downloading, downloaded, total);
                last_reported = downloaded;
            }
        }
        file.flush().await?;
        file.sync_all().await?;
        if last_reported != downloaded {
            reporter.send(FetchPhase::Downloading, downloaded, total);
        }

        tracing::info!(name = %spec.name, size = %format_bytes(downloaded), "download finished");
        Ok((temp, hex::encode(hasher.finalize()), downloaded))
    }
}

struct Reporter<'a> {
    name: &'a str,
    tx: Option<mpsc::UnboundedSender<FetchProgress>>
}

impl Reporter<'_> {
    fn send(&self, phase: FetchPhase, downloaded: u64, total: Option<u64>) {
        if let Some(ref tx) = self.tx {
            let _ = tx.send(FetchProgress {
                name: self.name.to_string(),
                phase,
                downloaded,
                total
            });
        }
    }
}

fn http_error(url: &str) -> impl Fn(reqwest::Error) -> ProvisionError + '_ {
    move |source| ProvisionError::Http {
        url: url.to_string(),
        source
    }
}

/// Finds `asset` in a `sha256sum`-style listing (`<hex>  <file>` or
/// `<hex> *<file>`).
fn parse_sha256_for_asset(listing: &str, asset: &str) -> Option<String> {
    listing.lines().find_map(|line| {
        let (digest, file) = line.trim().split_once(char::is_whitespace)?;
        let file = file.trim_start().trim_start_matches('*');
        (file == asset && digest.len() == 64 && digest.chars().all(|c| c.is_ascii_hexdigit()))
            .then(|| digest.to_ascii_lowercase())
    })
}

/// Pulls `members` (matched by file name, at any depth) out of the archive
/// into `bin_dir`. Returns the installed file names in order.
fn extract_members(
    archive_path: &Path,
    bin_dir: &Path,
    name: &str,
    members: &[String]
) -> Result<Vec<String>, ProvisionError> {
    let mut archive = zip::ZipArchive::new(std::fs::File::open(archive_path)?)?;
    let mut installed = Vec::with_capacity(members.len());

    for member in members {
        let full_name = archive
            .file_names()
            .find(|entry| Path::new(entry).file_name().is_some_and(|f| f == member.as_str()))
            .map(str::to_string)
            .ok_or_else(|| ProvisionError::MissingArchiveMember {
                name: name.to_string(),
                member: member.clone()
            })?;

        let mut entry = archive.by_name(&full_name)?;
        let mut out = tempfile::Builder::new()
            .prefix(&format!(".{member}-"))
            .tempfile_in(bin_dir)?;
        std::io::copy(&mut entry, &mut out)?;
        out.flush()?;
        mark_executable(out.path())?;
        out.persist(bin_dir.join(member)).map_err(|e| e.error)?;
        installed.push(member.clone());
    }

    Ok(installed)
}

#[cfg(unix)]
fn mark_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
#[allow(clippy::unnecessary_wraps)]
fn mark_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
