use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

/// Merge the contents of several requirement manifests into one canonical text.
///
/// Lines are trimmed, blank lines dropped, and the surviving lines from all
/// inputs sorted lexicographically, so the result is independent of the order
/// in which the manifests are supplied. Duplicate lines are preserved.
#[must_use]
pub fn merge_requirement_texts<S: AsRef<str>>(texts: &[S]) -> String {
    let mut lines: Vec<&str> = texts
        .iter()
        .flat_map(|text| text.as_ref().lines())
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    lines.sort_unstable();
    lines.join("\n")
}

/// Read every manifest in `paths` and merge the contents canonically.
///
/// # Errors
///
/// Returns an error if any manifest cannot be read.
pub fn collect_and_merge<P: AsRef<Path>>(paths: &[P]) -> Result<String> {
    let mut contents = Vec::with_capacity(paths.len());
    for path in paths {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read requirements file {}", path.display()))?;
        contents.push(text);
    }
    Ok(merge_requirement_texts(&contents))
}
