use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::{BinarySource, ExecutableSpec, Manifest, Platform, ResolvedBinary, probe_version};
use crate::process::ProcessRunner;

/// Read-only search for a usable executable.
#[derive(Debug, Clone)]
pub struct BinaryLocator {
    bin_dir: PathBuf,
    overrides: HashMap<String, PathBuf>,
    runner: ProcessRunner,
    use_system_path: bool
}

impl BinaryLocator {
    pub fn new(bin_dir: impl Into<PathBuf>, runner: ProcessRunner) -> Self {
        Self {
            bin_dir: bin_dir.into(),
            overrides: HashMap::new(),
            runner,
            use_system_path: true
        }
    }

    /// Checked before anything else for `name`.
    pub fn with_override(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.overrides.insert(name.into(), path.into());
        self
    }

    pub fn use_system_path(mut self, enabled: bool) -> Self {
        self.use_system_path = enabled;
        self
    }

    pub fn bin_dir(&self) -> &Path {
        &self.bin_dir
    }

    /// Configured path, then `PATH`, then the provisioning directory. `None`
    /// means nothing usable was found; it is up to the caller to fetch.
    pub async fn locate(&self, spec: &ExecutableSpec) -> Option<ResolvedBinary> {
        let platform = Platform::current();

        if let Some(path) = self.overrides.get(&spec.name) {
            match probe_version(&self.runner, path, spec).await {
                Some(version) => {
                    if !spec.meets_min_version(&version) {
                        tracing::warn!(
                            name = %spec.name,
                            %version,
                            min = ?spec.min_version,
                            "configured binary is older than supported"
                        );
                    }
                    return Some(ResolvedBinary {
                        name: spec.name.clone(),
                        path: path.clone(),
                        version,
                        source: BinarySource::Configured,
                        platform
                    });
                }
                None => tracing::warn!(
                    name = %spec.name,
                    path = %path.display(),
                    "configured binary does not run, searching elsewhere"
                )
            }
        }

        if self.use_system_path
            && let Ok(path) = which::which(&spec.name)
        {
            match probe_version(&self.runner, &path, spec).await {
                Some(version) if spec.meets_min_version(&version) => {
                    return Some(ResolvedBinary {
                        name: spec.name.clone(),
                        path,
                        version,
                        source: BinarySource::System,
                        platform
                    });
                }
                Some(version) => tracing::warn!(
                    name = %spec.name,
                    path = %path.display(),
                    %version,
                    "system binary is too old, ignoring"
                ),
                None => tracing::debug!(path = %path.display(), "system binary does not run")
            }
        }

        let platform = platform?;
        let manifest = Manifest::load(&self.bin_dir).await;
        let entry = manifest.entry_for(&spec.name, platform)?;
        let path = self.bin_dir.join(&entry.file);
        if !path.is_file() {
            return None;
        }

        let version = probe_version(&self.runner, &path, spec).await?;
        Some(ResolvedBinary {
            name: spec.name.clone(),
            path,
            version,
            source: BinarySource::Provisioned,
            platform: Some(platform)
        })
    }
}
