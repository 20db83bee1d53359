#![allow(dead_code)]

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use assert_cmd::assert::Assert;
use serde_json::Value;

pub fn parse_json(assert: &Assert) -> Value {
    serde_json::from_slice(&assert.get_output().stdout).expect("valid json")
}

pub fn stdout_path(assert: &Assert) -> PathBuf {
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout);
    PathBuf::from(stdout.trim())
}

pub fn entry_names(path: &Path) -> Vec<String> {
    let file = File::open(path).expect("open archive");
    let archive = zip::ZipArchive::new(file).expect("read archive");
    archive.file_names().map(String::from).collect()
}

pub fn write_code_dir(root: &Path, name: &str) -> PathBuf {
    let code = root.join(name);
    fs::create_dir_all(code.join("empty")).expect("empty dir");
    fs::create_dir_all(code.join("__pycache__")).expect("pycache");
    fs::write(code.join("app.py"), b"def main(): pass\n").expect("app");
    fs::write(code.join("__pycache__").join("app.pyc"), b"\x00").expect("pyc");
    code
}

/// Interpreter stand-in that mimics `python -m pip install -r M -t T -I` by
/// creating a package directory per requirement line.
#[cfg(unix)]
pub fn write_fake_python(root: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let script = root.join("fake-python");
    let body = r#"#!/bin/sh
manifest=""
target=""
while [ $# -gt 0 ]; do
    case "$1" in
        -r) manifest="$2"; shift 2 ;;
        -t) target="$2"; shift 2 ;;
        *) shift ;;
    esac
done
[ -n "$manifest" ] || exit 1
[ -n "$target" ] || exit 1
while IFS= read -r line || [ -n "$line" ]; do
    name="${line%%==*}"
    if [ -n "$name" ]; then
        mkdir -p "$target/$name"
        : > "$target/$name/__init__.py"
    fi
done < "$manifest"
"#;
    fs::write(&script, body).expect("write fake python");
    let mut perms = fs::metadata(&script).expect("stat").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&script, perms).expect("chmod");
    script
}
