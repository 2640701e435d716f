//! Where derived files live under the output directory.
//!
//! ```text
//! <output-dir>/
//! ├── .signatures            # per-rule signature cache
//! ├── obj/<mirrored>.o       # one object per source
//! ├── bin/<target>           # executables
//! └── lib/lib<target>.a      # static libraries
//! ```

use std::path::{Component, Path, PathBuf};

use crate::consts::{BIN_DIR, LIB_DIR, OBJ_DIR, SIGNATURES_FILE};

use super::types::{Target, TargetKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
  output_dir: PathBuf,
}

impl Layout {
  pub fn new(output_dir: impl Into<PathBuf>) -> Self {
    Self {
      output_dir: output_dir.into(),
    }
  }

  pub fn output_dir(&self) -> &Path {
    &self.output_dir
  }

  /// Object path for a source file.
  ///
  /// The source's relative path is mirrored under `obj/` with its extension
  /// replaced by `.o`. Root and `..` components are neutralized so objects
  /// always stay inside the output directory.
  pub fn object_path(&self, source: &Path) -> PathBuf {
    let mut mirrored = PathBuf::new();
    for component in source.components() {
      match component {
        Component::Normal(part) => mirrored.push(part),
        Component::ParentDir => mirrored.push("__"),
        Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
      }
    }
    self.output_dir.join(OBJ_DIR).join(mirrored.with_extension("o"))
  }

  /// Make-style dependency file written next to an object.
  pub fn depfile_path(object: &Path) -> PathBuf {
    object.with_extension("d")
  }

  /// Final artifact of a target.
  pub fn artifact_path(&self, target: &Target) -> PathBuf {
    match target.kind() {
      TargetKind::Executable => self.output_dir.join(BIN_DIR).join(target.name()),
      TargetKind::StaticLibrary => self.output_dir.join(LIB_DIR).join(format!("lib{}.a", target.name())),
    }
  }

  pub fn signatures_path(&self) -> PathBuf {
    self.output_dir.join(SIGNATURES_FILE)
  }
}
