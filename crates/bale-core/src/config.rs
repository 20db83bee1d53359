use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};

pub const BUILD_DIR_ENV: &str = "BALE_BUILD_DIR";
pub const SKIP_INSTALL_ENV: &str = "BALE_SKIP_INSTALL";

/// Captured process environment, so configuration reads stay testable.
#[derive(Debug, Clone)]
pub struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    #[must_use]
    pub fn capture() -> Self {
        Self {
            vars: env::vars().collect(),
        }
    }

    #[must_use]
    pub fn testing(pairs: &[(&str, &str)]) -> Self {
        let vars = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Self { vars }
    }

    pub(crate) fn var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub(crate) fn flag_is_enabled(&self, key: &str) -> bool {
        self.var(key).is_some_and(|value| {
            matches!(
                value.to_ascii_lowercase().as_str(),
                "1" | "t" | "true" | "y" | "yes"
            )
        })
    }
}

/// Root directory for cache entries and output artifacts, resolved once per
/// process and threaded through explicitly.
#[derive(Debug, Clone)]
pub struct BuildDirLocation {
    pub path: PathBuf,
    pub source: &'static str,
}

/// Whether dependency installation actually runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallMode {
    Normal,
    /// Short-circuit dependency builds with a valid empty archive. Useful
    /// for CI passes that only validate packaging plumbing.
    SkipAndEmitEmpty,
}

#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub build_dir: BuildDirLocation,
    pub install_mode: InstallMode,
}

impl BuildConfig {
    /// Build a configuration snapshot from the current process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the build directory override cannot be resolved.
    pub fn from_env() -> Result<Self> {
        Self::from_snapshot(&EnvSnapshot::capture())
    }

    pub fn from_snapshot(snapshot: &EnvSnapshot) -> Result<Self> {
        Ok(Self {
            build_dir: resolve_build_dir(snapshot)?,
            install_mode: if snapshot.flag_is_enabled(SKIP_INSTALL_ENV) {
                InstallMode::SkipAndEmitEmpty
            } else {
                InstallMode::Normal
            },
        })
    }
}

/// Determine the root directory for artifacts and the dependency cache.
///
/// # Errors
///
/// Returns an error if a relative override cannot be absolutized.
pub fn resolve_build_dir(snapshot: &EnvSnapshot) -> Result<BuildDirLocation> {
    if let Some(override_path) = snapshot.var(BUILD_DIR_ENV) {
        let path = absolutize(PathBuf::from(override_path))?;
        return Ok(BuildDirLocation {
            path,
            source: BUILD_DIR_ENV,
        });
    }

    Ok(BuildDirLocation {
        path: env::temp_dir().join("bale-builds"),
        source: "default (temp dir)",
    })
}

fn absolutize(path: PathBuf) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path)
    } else {
        Ok(env::current_dir()
            .context("failed to resolve BALE_BUILD_DIR")?
            .join(path))
    }
}
