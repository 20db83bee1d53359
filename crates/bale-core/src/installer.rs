use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::{Context, Result};
use tracing::debug;

pub const PYTHON_ENV: &str = "BALE_PYTHON";

/// Failure reported by the external package installer.
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error("failed to start installer {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("installer exited with status {code}: {stderr}")]
    Failed { code: i32, stderr: String },
}

/// External tool that populates a target directory from a requirements
/// manifest. The implementation is opaque to the build pipeline; a non-Ok
/// result aborts the whole build.
pub trait Installer: Send + Sync {
    /// Install every requirement named in `manifest` into `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if the installer cannot be spawned or reports a
    /// non-zero exit.
    fn install(&self, manifest: &Path, target: &Path) -> Result<()>;
}

/// Installs dependencies by shelling out to `pip` via a Python interpreter.
#[derive(Debug, Clone)]
pub struct PipInstaller {
    python: String,
}

impl PipInstaller {
    #[must_use]
    pub fn new(python: impl Into<String>) -> Self {
        Self {
            python: python.into(),
        }
    }

    /// Resolve the interpreter from `BALE_PYTHON`, defaulting to `python3`.
    #[must_use]
    pub fn from_env() -> Self {
        let python = std::env::var(PYTHON_ENV).unwrap_or_else(|_| "python3".to_string());
        Self::new(python)
    }
}

impl Installer for PipInstaller {
    fn install(&self, manifest: &Path, target: &Path) -> Result<()> {
        debug!(
            manifest = %manifest.display(),
            target = %target.display(),
            "installing dependencies via pip"
        );
        // -I ignores packages already present in the invoking environment.
        let output = Command::new(&self.python)
            .arg("-m")
            .arg("pip")
            .arg("install")
            .arg("-r")
            .arg(manifest)
            .arg("-t")
            .arg(target)
            .arg("-I")
            .stdin(Stdio::null())
            .output()
            .map_err(|source| InstallError::Spawn {
                program: self.python.clone(),
                source,
            })
            .context("pip invocation failed")?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!(%stdout, %stderr, code = output.status.code(), "pip finished");

        if !output.status.success() {
            return Err(InstallError::Failed {
                code: output.status.code().unwrap_or(-1),
                stderr: stderr.trim().to_string(),
            }
            .into());
        }
        Ok(())
    }
}
