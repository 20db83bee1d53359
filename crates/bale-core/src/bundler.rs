use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::archive::{compile_excludes, ensure_empty_zip, extend_zip, zip_dir_contents};
use crate::cache::DependencyCache;
use crate::config::{BuildConfig, InstallMode};
use crate::fs::{copy_tree_filtered, ScratchDir};
use crate::installer::Installer;
use crate::keys::{code_digest, dependency_key, function_key};
use crate::requirements::collect_and_merge;
use crate::LAYER_PREFIX;

/// Inputs for a dependency-only layer artifact.
#[derive(Debug, Clone)]
pub struct LayerRequest {
    pub requirement_files: Vec<PathBuf>,
}

/// Inputs for a combined code-plus-dependencies artifact.
#[derive(Debug, Clone, Default)]
pub struct FunctionRequest {
    pub code_directories: Vec<PathBuf>,
    pub requirement_files: Vec<PathBuf>,
    pub exclude_patterns: Vec<String>,
}

/// Top-level assembler for deployable archives.
///
/// Owns an explicit configuration and the installer collaborator; nothing
/// below this type reads process state ad hoc.
pub struct Bundler {
    config: BuildConfig,
    installer: Arc<dyn Installer>,
}

impl Bundler {
    #[must_use]
    pub fn new(config: BuildConfig, installer: Arc<dyn Installer>) -> Self {
        Self { config, installer }
    }

    /// Build a dependency-only artifact laid out for the runtime's layer
    /// convention (packages under `python/`).
    ///
    /// # Errors
    ///
    /// Returns an error if a manifest cannot be read or the build fails.
    pub fn build_layer_artifact(&self, request: &LayerRequest) -> Result<PathBuf> {
        if self.config.install_mode == InstallMode::SkipAndEmitEmpty {
            return self.empty_artifact();
        }
        let merged = collect_and_merge(&request.requirement_files)?;
        self.cache().get_or_build(&merged, Some(LAYER_PREFIX))
    }

    /// Build a deployable function artifact from code directories plus an
    /// optional requirement set.
    ///
    /// # Errors
    ///
    /// Returns an error if any input is missing or the build fails.
    pub fn build_function_artifact(&self, request: &FunctionRequest) -> Result<PathBuf> {
        if request.requirement_files.is_empty() {
            return self.build_code_only(request);
        }
        if self.config.install_mode == InstallMode::SkipAndEmitEmpty {
            return self.empty_artifact();
        }

        let merged = collect_and_merge(&request.requirement_files)?;
        let dependency_zip = self.cache().get_or_build(&merged, None)?;

        // The final path is keyed on both the dependency set and the code
        // directories, so neither half can collide on its own.
        let key = function_key(
            &dependency_key(&merged, None),
            &request.code_directories,
        );
        let target = self.config.build_dir.path.join(format!("{key}.zip"));
        fs::copy(&dependency_zip, &target).with_context(|| {
            format!(
                "failed to copy {} to {}",
                dependency_zip.display(),
                target.display()
            )
        })?;
        extend_zip(&target, &request.code_directories, &request.exclude_patterns)?;
        debug!(artifact = %target.display(), "function artifact ready");
        Ok(target)
    }

    fn build_code_only(&self, request: &FunctionRequest) -> Result<PathBuf> {
        let key = code_digest(&request.code_directories);
        let target = self.config.build_dir.path.join(format!("{key}.zip"));

        let excludes = compile_excludes(&request.exclude_patterns)?;
        let scratch = ScratchDir::new_in(&self.config.build_dir.path, ".bale-code-")?;
        for directory in &request.code_directories {
            let name = directory.file_name().ok_or_else(|| {
                anyhow::anyhow!("code directory {} has no name", directory.display())
            })?;
            copy_tree_filtered(directory, &scratch.path().join(name), &excludes)?;
        }
        zip_dir_contents(scratch.path(), &target)?;
        debug!(artifact = %target.display(), "code-only artifact ready");
        Ok(target)
    }

    fn empty_artifact(&self) -> Result<PathBuf> {
        info!("skipping installation of dependencies");
        let path = self.config.build_dir.path.join("empty.zip");
        ensure_empty_zip(&path)?;
        Ok(path)
    }

    fn cache(&self) -> DependencyCache {
        DependencyCache::new(self.config.build_dir.path.clone(), self.installer.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::config::{BuildDirLocation, EnvSnapshot};

    struct StubInstaller {
        calls: AtomicUsize,
    }

    impl StubInstaller {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Installer for StubInstaller {
        fn install(&self, manifest: &Path, target: &Path) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let text = fs::read_to_string(manifest)?;
            for line in text.lines() {
                let name = line.split("==").next().unwrap_or(line);
                let pkg = target.join(name);
                fs::create_dir_all(&pkg)?;
                fs::write(pkg.join("__init__.py"), b"")?;
            }
            Ok(())
        }
    }

    fn bundler_in(dir: &Path) -> (Bundler, Arc<StubInstaller>) {
        bundler_with_mode(dir, InstallMode::Normal)
    }

    fn bundler_with_mode(dir: &Path, install_mode: InstallMode) -> (Bundler, Arc<StubInstaller>) {
        let installer = Arc::new(StubInstaller::new());
        let config = BuildConfig {
            build_dir: BuildDirLocation {
                path: dir.to_path_buf(),
                source: "test",
            },
            install_mode,
        };
        (Bundler::new(config, installer.clone()), installer)
    }

    fn entry_names(path: &Path) -> Vec<String> {
        let file = File::open(path).expect("open archive");
        let archive = zip::ZipArchive::new(file).expect("read archive");
        archive.file_names().map(String::from).collect()
    }

    fn write_manifest(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).expect("write manifest");
        path
    }

    fn write_code_dir(dir: &Path, name: &str) -> PathBuf {
        let code = dir.join(name);
        fs::create_dir_all(&code).expect("code dir");
        fs::write(code.join("app.py"), b"def main(): pass\n").expect("app");
        code
    }

    #[test]
    fn layer_artifact_lands_under_python_prefix() {
        let temp = tempfile::tempdir().expect("tempdir");
        let build = temp.path().join("build");
        let (bundler, _) = bundler_in(&build);
        let first = write_manifest(temp.path(), "a.txt", "pytz==2020.1\n");
        let second = write_manifest(temp.path(), "b.txt", "certifi==2020.6.20\n");

        let artifact = bundler
            .build_layer_artifact(&LayerRequest {
                requirement_files: vec![first, second],
            })
            .expect("layer");

        assert_eq!(artifact.extension().and_then(|e| e.to_str()), Some("zip"));
        let names = entry_names(&artifact);
        assert!(names.contains(&"python/pytz/__init__.py".to_string()));
        assert!(names.contains(&"python/certifi/__init__.py".to_string()));
    }

    #[test]
    fn function_artifact_combines_code_and_dependencies() {
        let temp = tempfile::tempdir().expect("tempdir");
        let build = temp.path().join("build");
        let (bundler, installer) = bundler_in(&build);
        let manifest = write_manifest(temp.path(), "reqs.txt", "pytz==2020.1\n");
        let code = write_code_dir(temp.path(), "handler");

        let artifact = bundler
            .build_function_artifact(&FunctionRequest {
                code_directories: vec![code],
                requirement_files: vec![manifest],
                exclude_patterns: Vec::new(),
            })
            .expect("function");

        let names = entry_names(&artifact);
        assert!(names.contains(&"pytz/__init__.py".to_string()));
        assert!(names.contains(&"handler/app.py".to_string()));
        assert_eq!(installer.call_count(), 1);
    }

    #[test]
    fn second_function_build_reuses_cached_dependencies() {
        let temp = tempfile::tempdir().expect("tempdir");
        let build = temp.path().join("build");
        let (bundler, installer) = bundler_in(&build);
        let manifest = write_manifest(temp.path(), "reqs.txt", "pytz==2020.1\n");
        let code = write_code_dir(temp.path(), "handler");

        let request = FunctionRequest {
            code_directories: vec![code],
            requirement_files: vec![manifest],
            exclude_patterns: Vec::new(),
        };
        let first = bundler.build_function_artifact(&request).expect("first");
        let second = bundler.build_function_artifact(&request).expect("second");

        assert_eq!(first, second);
        assert_eq!(installer.call_count(), 1, "dependency build must be cached");
    }

    #[test]
    fn different_requirement_sets_get_different_function_paths() {
        let temp = tempfile::tempdir().expect("tempdir");
        let build = temp.path().join("build");
        let (bundler, _) = bundler_in(&build);
        let code = write_code_dir(temp.path(), "handler");
        let reqs_a = write_manifest(temp.path(), "a.txt", "pytz==2020.1\n");
        let reqs_b = write_manifest(temp.path(), "b.txt", "certifi==2020.6.20\n");

        let with_a = bundler
            .build_function_artifact(&FunctionRequest {
                code_directories: vec![code.clone()],
                requirement_files: vec![reqs_a],
                exclude_patterns: Vec::new(),
            })
            .expect("a");
        let with_b = bundler
            .build_function_artifact(&FunctionRequest {
                code_directories: vec![code],
                requirement_files: vec![reqs_b],
                exclude_patterns: Vec::new(),
            })
            .expect("b");

        assert_ne!(
            with_a, with_b,
            "same code with different dependencies must not collapse"
        );
    }

    #[test]
    fn code_only_build_needs_no_installer() {
        let temp = tempfile::tempdir().expect("tempdir");
        let build = temp.path().join("build");
        let (bundler, installer) = bundler_in(&build);
        let code = write_code_dir(temp.path(), "handler");

        let artifact = bundler
            .build_function_artifact(&FunctionRequest {
                code_directories: vec![code],
                ..FunctionRequest::default()
            })
            .expect("code only");

        assert!(entry_names(&artifact).contains(&"handler/app.py".to_string()));
        assert_eq!(installer.call_count(), 0);
    }

    #[test]
    fn skip_install_mode_emits_valid_empty_archive() {
        let temp = tempfile::tempdir().expect("tempdir");
        let build = temp.path().join("build");
        let (bundler, installer) = bundler_with_mode(&build, InstallMode::SkipAndEmitEmpty);
        let manifest = write_manifest(temp.path(), "reqs.txt", "pytz==2020.1\n");

        let artifact = bundler
            .build_layer_artifact(&LayerRequest {
                requirement_files: vec![manifest],
            })
            .expect("layer");

        assert!(artifact.ends_with("empty.zip"));
        assert_eq!(installer.call_count(), 0);
        let archive = zip::ZipArchive::new(File::open(&artifact).expect("open")).expect("read");
        assert_eq!(archive.len(), 0);
    }

    #[test]
    fn snapshot_config_round_trips_through_bundler() {
        let temp = tempfile::tempdir().expect("tempdir");
        let build = temp.path().join("build");
        let snapshot = EnvSnapshot::testing(&[(
            crate::config::BUILD_DIR_ENV,
            build.to_str().expect("utf-8 path"),
        )]);
        let config = BuildConfig::from_snapshot(&snapshot).expect("config");
        let bundler = Bundler::new(config, Arc::new(StubInstaller::new()));
        let code = write_code_dir(temp.path(), "handler");

        let artifact = bundler
            .build_function_artifact(&FunctionRequest {
                code_directories: vec![code],
                ..FunctionRequest::default()
            })
            .expect("build");
        assert!(artifact.starts_with(&build));
    }
}
