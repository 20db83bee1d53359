use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use glob::Pattern;
use tracing::debug;
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::fs::{copy_tree_filtered, ScratchDir};

/// Patterns excluded from every code copy. Interpreter bytecode caches are
/// dead weight in a deployment archive.
pub const DEFAULT_EXCLUDES: &[&str] = &["__pycache__"];

pub(crate) fn compile_excludes(extra: &[String]) -> Result<Vec<Pattern>> {
    DEFAULT_EXCLUDES
        .iter()
        .copied()
        .map(String::from)
        .chain(extra.iter().cloned())
        .map(|raw| {
            Pattern::new(&raw).with_context(|| format!("invalid exclude pattern '{raw}'"))
        })
        .collect()
}

fn normalize_entry_path(rel: &Path) -> Result<String> {
    let normalized = rel.to_string_lossy().replace('\\', "/");
    if normalized.is_empty() {
        return Err(anyhow!("archive entry path is empty"));
    }
    if normalized.starts_with('/') {
        return Err(anyhow!(
            "archive entries must be relative (got {normalized})"
        ));
    }
    Ok(normalized)
}

fn append_tree<W: io::Write + io::Seek>(zip: &mut ZipWriter<W>, root: &Path) -> Result<()> {
    let file_options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    let dir_options = FileOptions::default().compression_method(CompressionMethod::Stored);

    for entry in WalkDir::new(root).sort_by(|a, b| a.path().cmp(b.path())) {
        let entry = entry.with_context(|| format!("failed to walk {}", root.display()))?;
        let path = entry.path();
        if path == root {
            continue;
        }
        let rel = path
            .strip_prefix(root)
            .context("failed to relativize archive path")?;
        let rel_path = normalize_entry_path(rel)?;
        let file_type = entry.file_type();
        if file_type.is_symlink() {
            continue;
        }
        if file_type.is_dir() {
            // Zip has no implicit directories; only record the empty ones so
            // they survive extraction.
            let is_empty = fs::read_dir(path)
                .with_context(|| format!("failed to read directory {}", path.display()))?
                .next()
                .is_none();
            if is_empty {
                zip.add_directory(&rel_path, dir_options)
                    .with_context(|| format!("failed to add directory entry {rel_path}"))?;
            }
        } else if file_type.is_file() {
            zip.start_file(&rel_path, file_options)
                .with_context(|| format!("failed to start archive entry {rel_path}"))?;
            let mut file =
                File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
            io::copy(&mut file, zip)
                .with_context(|| format!("failed to write archive entry {rel_path}"))?;
        }
    }
    Ok(())
}

/// Zip the contents of `root` (not the directory itself) into a fresh archive
/// at `dest`.
///
/// The archive is assembled in a temporary file next to `dest` and renamed
/// into place, so an interrupted build never leaves a partial file at the
/// final path.
///
/// # Errors
///
/// Returns an error if the tree cannot be walked or the archive written.
pub fn zip_dir_contents(root: &Path, dest: &Path) -> Result<()> {
    let parent = dest
        .parent()
        .ok_or_else(|| anyhow!("archive destination {} has no parent", dest.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("failed to create {}", parent.display()))?;

    let temp = tempfile::Builder::new()
        .prefix(".bale-zip-")
        .suffix(".partial")
        .tempfile_in(parent)
        .with_context(|| format!("failed to create temp archive under {}", parent.display()))?;

    let mut zip = ZipWriter::new(temp);
    append_tree(&mut zip, root)?;
    let temp = zip.finish().context("failed to finalize archive")?;
    temp.persist(dest)
        .map_err(|err| err.error)
        .with_context(|| format!("failed to move archive into place at {}", dest.display()))?;
    debug!(dest = %dest.display(), "archive written");
    Ok(())
}

/// Append the contents of `code_directories` to an existing zip archive.
///
/// Each directory lands under its final path segment. Entries already in the
/// archive are untouched and nothing de-duplicates against them, so extend a
/// given artifact at most once per code set. The built-in excludes are always
/// applied on top of `exclude_patterns`.
///
/// # Errors
///
/// Returns an error if the archive does not exist, a source directory is
/// missing, or a pattern is malformed.
pub fn extend_zip(
    zip_path: &Path,
    code_directories: &[impl AsRef<Path>],
    exclude_patterns: &[String],
) -> Result<()> {
    if !zip_path.exists() {
        return Err(anyhow!(
            "cannot extend missing archive {}",
            zip_path.display()
        ));
    }
    let excludes = compile_excludes(exclude_patterns)?;
    let scratch_root = zip_path
        .parent()
        .ok_or_else(|| anyhow!("archive path {} has no parent", zip_path.display()))?;
    let scratch = ScratchDir::new_in(scratch_root, ".bale-extend-")?;

    for directory in code_directories {
        let directory = directory.as_ref();
        let name = directory
            .file_name()
            .ok_or_else(|| anyhow!("code directory {} has no name", directory.display()))?;
        debug!(directory = %directory.display(), "copying code to staging");
        copy_tree_filtered(directory, &scratch.path().join(name), &excludes)?;
    }

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(zip_path)
        .with_context(|| format!("failed to open archive {}", zip_path.display()))?;
    let mut zip = ZipWriter::new_append(file)
        .with_context(|| format!("failed to open {} for appending", zip_path.display()))?;
    append_tree(&mut zip, scratch.path())?;
    zip.finish()
        .with_context(|| format!("failed to finalize archive {}", zip_path.display()))?;
    debug!(zip = %zip_path.display(), "archive extended");
    Ok(())
}

/// Create a valid zero-entry archive at `dest` if none exists yet.
///
/// # Errors
///
/// Returns an error if the archive cannot be written.
pub(crate) fn ensure_empty_zip(dest: &Path) -> Result<()> {
    if dest.exists() {
        return Ok(());
    }
    let parent = dest
        .parent()
        .ok_or_else(|| anyhow!("archive destination {} has no parent", dest.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("failed to create {}", parent.display()))?;
    let temp = tempfile::Builder::new()
        .prefix(".bale-zip-")
        .suffix(".partial")
        .tempfile_in(parent)
        .with_context(|| format!("failed to create temp archive under {}", parent.display()))?;
    let mut zip = ZipWriter::new(temp);
    let temp = zip.finish().context("failed to finalize empty archive")?;
    temp.persist(dest)
        .map_err(|err| err.error)
        .with_context(|| format!("failed to move archive into place at {}", dest.display()))?;
    Ok(())
}
