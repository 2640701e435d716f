//! Shared test helpers for CLI integration tests.

use std::fs::{self, File};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Compiler stand-in: fails on `#error`, warns on `#warning`, otherwise
/// concatenates its inputs.
const FAKE_CC: &str = r#"#!/bin/sh
out=""
inputs=""
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift 2; continue ;;
    -MF) shift 2; continue ;;
    -*) ;;
    *) inputs="$inputs $1" ;;
  esac
  shift
done
for f in $inputs; do
  if grep -q '#error' "$f"; then
    echo "$f:1: error: forced failure" >&2
    exit 1
  fi
  if grep -q '#warning' "$f"; then
    echo "$f:1: warning: noted" >&2
  fi
done
cat $inputs > "$out"
"#;

/// `pkg-config` stand-in that only knows `sdl`.
const FAKE_PKG_CONFIG: &str = r#"#!/bin/sh
mode="$1"
shift
for pkg in "$@"; do
  if [ "$pkg" != "sdl" ]; then
    echo "Package $pkg was not found in the pkg-config search path." >&2
    exit 1
  fi
done
case "$mode" in
  --cflags) echo "-I/usr/include/sdl -D_GNU_SOURCE" ;;
  --libs) echo "-lsdl" ;;
esac
"#;

/// Isolated project directory.
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  pub fn new() -> Self {
    let temp = TempDir::new().unwrap();
    let env = Self { temp };
    env.write_tool("tools/cc", FAKE_CC);
    env.write_tool("tools/pkg-config", FAKE_PKG_CONFIG);
    env
  }

  /// A project with the given `[[target]]` tables and the fake toolchain.
  pub fn with_targets(targets: &str) -> Self {
    let env = Self::new();
    env.write_bakefile("Bakefile.toml", targets);
    env
  }

  pub fn root(&self) -> PathBuf {
    let p = self.temp.path().to_path_buf();
    dunce::canonicalize(&p).unwrap_or(p)
  }

  pub fn path(&self, relative: &str) -> PathBuf {
    self.root().join(relative)
  }

  /// Write a Bakefile using the fake toolchain.
  pub fn write_bakefile(&self, relative: &str, targets: &str) {
    let contents = format!(
      "[toolchain]\ncc = \"{}\"\npkg-config = \"{}\"\ndepfiles = false\n\n{}",
      self.path("tools/cc").display(),
      self.path("tools/pkg-config").display(),
      targets
    );
    self.write_file(relative, &contents);
  }

  /// Write a file relative to the temp directory.
  pub fn write_file(&self, relative_path: &str, content: &str) {
    let path = self.path(relative_path);
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
  }

  /// Write a source file dated an hour back.
  pub fn write_source(&self, relative_path: &str, content: &str) {
    self.write_file(relative_path, content);
    set_mtime(&self.path(relative_path), SystemTime::now() - Duration::from_secs(3600));
  }

  /// Rewrite a source file with a timestamp ahead of any output.
  pub fn edit_source(&self, relative_path: &str, content: &str) {
    self.write_file(relative_path, content);
    set_mtime(&self.path(relative_path), SystemTime::now() + Duration::from_secs(60));
  }

  fn write_tool(&self, relative_path: &str, script: &str) {
    self.write_file(relative_path, script);
    fs::set_permissions(self.path(relative_path), fs::Permissions::from_mode(0o755)).unwrap();
  }

  /// Get a pre-configured Command for the bake binary, run from the project root.
  pub fn bake_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("bake");
    cmd.current_dir(self.root());
    cmd.env_remove("RUST_LOG");
    cmd
  }
}

fn set_mtime(path: &Path, when: SystemTime) {
  File::options()
    .write(true)
    .open(path)
    .and_then(|f| f.set_modified(when))
    .unwrap();
}

/// Single `app` target from `a.c` and `b.c` linked against `sdl`.
pub const APP: &str = r#"
[[target]]
name = "app"
sources = ["a.c", "b.c"]
cflags = ["-Wall"]
packages = ["sdl"]
"#;

/// `APP` plus an independent `tool` target.
pub const APP_AND_TOOL: &str = r#"
[[target]]
name = "app"
sources = ["a.c", "b.c"]
cflags = ["-Wall"]
packages = ["sdl"]

[[target]]
name = "tool"
sources = ["tool.c"]
"#;
