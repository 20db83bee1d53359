use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use glob::Pattern;
use tracing::warn;

/// Best-effort recursive chmod for trees an installer may have hardened.
#[cfg(unix)]
fn make_writable_recursive(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    let Ok(meta) = fs::symlink_metadata(path) else {
        return;
    };
    if meta.file_type().is_symlink() {
        return;
    }
    let mode = if meta.is_dir() { 0o755 } else { 0o644 };
    let _ = fs::set_permissions(path, fs::Permissions::from_mode(mode));
    if meta.is_dir() {
        if let Ok(entries) = fs::read_dir(path) {
            for entry in entries.flatten() {
                make_writable_recursive(&entry.path());
            }
        }
    }
}

#[cfg(not(unix))]
fn make_writable_recursive(path: &Path) {
    let Ok(meta) = fs::symlink_metadata(path) else {
        return;
    };
    if meta.file_type().is_symlink() {
        return;
    }
    let mut perms = meta.permissions();
    if perms.readonly() {
        perms.set_readonly(false);
        let _ = fs::set_permissions(path, perms);
    }
    if meta.is_dir() {
        if let Ok(entries) = fs::read_dir(path) {
            for entry in entries.flatten() {
                make_writable_recursive(&entry.path());
            }
        }
    }
}

pub(crate) fn remove_dir_all_writable(path: &Path) -> Result<()> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err).with_context(|| format!("failed to stat {}", path.display())),
    };
    if meta.file_type().is_symlink() {
        fs::remove_file(path)
            .with_context(|| format!("failed to remove symlink {}", path.display()))?;
        return Ok(());
    }
    make_writable_recursive(path);
    fs::remove_dir_all(path).with_context(|| format!("failed to remove {}", path.display()))?;
    Ok(())
}

/// Keyed staging directory under the build root.
///
/// The path is deterministic so an interrupted build leaves recognizable
/// wreckage; a pre-existing directory is deleted with a warning before the
/// fresh one is created. The directory is removed on drop, on every exit
/// path.
pub(crate) struct StagingDir {
    path: PathBuf,
}

impl StagingDir {
    pub(crate) fn create(path: PathBuf) -> Result<Self> {
        if path.exists() {
            warn!(
                path = %path.display(),
                "staging directory already exists, probably from a failed build - deleting it"
            );
            remove_dir_all_writable(&path)?;
        }
        fs::create_dir_all(&path)
            .with_context(|| format!("failed to create staging directory {}", path.display()))?;
        Ok(Self { path })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        let _ = remove_dir_all_writable(&self.path);
    }
}

/// Anonymous scratch directory for archive extension, cleaned up on drop and
/// pruned when a crashed process left one behind.
pub(crate) struct ScratchDir {
    inner: Option<tempfile::TempDir>,
    path: PathBuf,
}

impl ScratchDir {
    pub(crate) fn new_in(root: &Path, prefix: &str) -> Result<Self> {
        fs::create_dir_all(root).with_context(|| format!("failed to create {}", root.display()))?;
        prune_stale_scratch(root, prefix, Duration::from_secs(24 * 60 * 60));
        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(root)
            .with_context(|| format!("failed to create scratch dir under {}", root.display()))?;
        let path = dir.path().to_path_buf();
        Ok(Self {
            inner: Some(dir),
            path,
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let Some(dir) = self.inner.take() else {
            return;
        };
        let path = dir.keep();
        let _ = remove_dir_all_writable(&path);
    }
}

fn prune_stale_scratch(root: &Path, prefix: &str, max_age: Duration) {
    let Ok(entries) = fs::read_dir(root) else {
        return;
    };
    let now = SystemTime::now();
    for entry in entries.flatten() {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if !file_type.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !name.starts_with(prefix) {
            continue;
        }
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        let Some(modified) = meta.modified().ok() else {
            continue;
        };
        let age = now.duration_since(modified).unwrap_or_default();
        if age < max_age {
            continue;
        }
        let _ = remove_dir_all_writable(&entry.path());
    }
}

/// Copy `src` into `dst`, skipping any entry whose file name matches one of
/// `excludes`. Patterns apply to path segments, the way `shutil`'s ignore
/// patterns do, so `__pycache__` prunes the whole subtree.
pub(crate) fn copy_tree_filtered(src: &Path, dst: &Path, excludes: &[Pattern]) -> Result<()> {
    fs::create_dir_all(dst).with_context(|| format!("failed to create {}", dst.display()))?;
    let entries =
        fs::read_dir(src).with_context(|| format!("failed to read directory {}", src.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to read entry in {}", src.display()))?;
        let name = entry.file_name();
        let name_str = name.to_string_lossy();
        if excludes.iter().any(|pattern| pattern.matches(&name_str)) {
            continue;
        }
        let src_path = entry.path();
        let dst_path = dst.join(&name);
        let file_type = entry
            .file_type()
            .with_context(|| format!("failed to stat {}", src_path.display()))?;
        if file_type.is_symlink() {
            continue;
        }
        if file_type.is_dir() {
            copy_tree_filtered(&src_path, &dst_path, excludes)?;
        } else {
            fs::copy(&src_path, &dst_path).with_context(|| {
                format!(
                    "failed to copy {} to {}",
                    src_path.display(),
                    dst_path.display()
                )
            })?;
        }
    }
    Ok(())
}
