use std::path::Path;

use sha2::{Digest, Sha256};

/// SHA-256 hex digest of a text's UTF-8 bytes.
#[must_use]
pub fn sha256_hex(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Deterministic key for a dependency artifact.
///
/// The in-zip prefix is part of the key, so a flat install and a prefixed
/// install of the same requirement set never share a cache entry.
#[must_use]
pub fn dependency_key(requirement_text: &str, prefix: Option<&str>) -> String {
    match prefix {
        Some(prefix) => sha256_hex(&format!("{requirement_text}\n#prefix={prefix}")),
        None => sha256_hex(requirement_text),
    }
}

/// Deterministic key for a combined code-plus-dependencies artifact.
///
/// Mixes the dependency key with a digest of the code directory paths, so
/// identical dependency sets paired with different code (or the reverse)
/// always land at distinct artifact paths.
#[must_use]
pub fn function_key(dependency_key: &str, code_directories: &[impl AsRef<Path>]) -> String {
    let code = code_digest(code_directories);
    sha256_hex(&format!("{dependency_key}\n{code}"))
}

pub(crate) fn code_digest(code_directories: &[impl AsRef<Path>]) -> String {
    let joined = code_directories
        .iter()
        .map(|dir| dir.as_ref().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("\n");
    sha256_hex(&joined)
}
