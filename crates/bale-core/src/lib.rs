#![deny(clippy::all, warnings)]

mod archive;
mod bundler;
mod cache;
mod config;
mod fs;
mod installer;
mod keys;
mod requirements;

pub use crate::archive::{extend_zip, zip_dir_contents, DEFAULT_EXCLUDES};
pub use crate::bundler::{Bundler, FunctionRequest, LayerRequest};
pub use crate::cache::DependencyCache;
pub use crate::config::{
    resolve_build_dir, BuildConfig, BuildDirLocation, EnvSnapshot, InstallMode, BUILD_DIR_ENV,
    SKIP_INSTALL_ENV,
};
pub use crate::installer::{InstallError, Installer, PipInstaller, PYTHON_ENV};
pub use crate::keys::{dependency_key, function_key, sha256_hex};
pub use crate::requirements::{collect_and_merge, merge_requirement_texts};

/// Directory prefix a Lambda layer expects its packages under.
pub const LAYER_PREFIX: &str = "python";
