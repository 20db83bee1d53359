use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use fs4::FileExt;
use tracing::debug;

use crate::archive::zip_dir_contents;
use crate::fs::StagingDir;
use crate::installer::Installer;
use crate::keys::dependency_key;

pub(crate) const MANIFEST_NAME: &str = "requirements.txt";

/// Content-addressed store of dependency archives under the build directory.
///
/// Each distinct (requirement text, prefix) pair maps to one `{key}.zip`; a
/// hit skips the installer entirely. The probe-and-build sequence runs under
/// a per-key advisory file lock, so concurrent callers with the same key
/// build at most once and never delete each other's staging trees.
pub struct DependencyCache {
    build_dir: PathBuf,
    installer: Arc<dyn Installer>,
}

impl DependencyCache {
    #[must_use]
    pub fn new(build_dir: PathBuf, installer: Arc<dyn Installer>) -> Self {
        Self {
            build_dir,
            installer,
        }
    }

    /// Return the archive for `requirement_text`, building it on a miss.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock cannot be taken, the installer fails, or
    /// the archive cannot be written. On failure no artifact is left at the
    /// final path.
    pub fn get_or_build(&self, requirement_text: &str, prefix: Option<&str>) -> Result<PathBuf> {
        let key = dependency_key(requirement_text, prefix);
        let artifact = self.build_dir.join(format!("{key}.zip"));

        let _lock = KeyLock::acquire(&self.build_dir, &key)?;
        if artifact.exists() {
            debug!(key, "dependency cache hit");
            return Ok(artifact);
        }
        debug!(key, "dependency cache miss");
        self.build_archive(requirement_text, prefix, &key, &artifact)?;
        Ok(artifact)
    }

    fn build_archive(
        &self,
        requirement_text: &str,
        prefix: Option<&str>,
        key: &str,
        artifact: &Path,
    ) -> Result<()> {
        let staging = StagingDir::create(self.build_dir.join(key))?;
        let install_target = match prefix {
            Some(prefix) => staging.path().join(prefix),
            None => staging.path().to_path_buf(),
        };
        fs::create_dir_all(&install_target)
            .with_context(|| format!("failed to create {}", install_target.display()))?;

        let manifest = install_target.join(MANIFEST_NAME);
        fs::write(&manifest, requirement_text)
            .with_context(|| format!("failed to write {}", manifest.display()))?;

        self.installer.install(&manifest, &install_target)?;
        zip_dir_contents(staging.path(), artifact)
        // Staging is removed by its guard on every exit path.
    }
}

/// Advisory lock keyed by digest, held for the probe-and-build sequence.
/// Released when the file handle drops.
struct KeyLock {
    _file: File,
}

impl KeyLock {
    fn acquire(build_dir: &Path, key: &str) -> Result<Self> {
        fs::create_dir_all(build_dir)
            .with_context(|| format!("failed to create {}", build_dir.display()))?;
        let path = build_dir.join(format!("{key}.lock"));
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        file.lock_exclusive()
            .with_context(|| format!("failed to lock {}", path.display()))?;
        Ok(Self { _file: file })
    }
}
