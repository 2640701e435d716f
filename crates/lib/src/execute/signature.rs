//! Per-rule signature cache.
//!
//! Remembers, for every output that last ended successfully, the hash of the
//! command that produced it and (under the content policy) the hashes of its
//! inputs. The cache lives at `<output-dir>/.signatures`:
//!
//! ```text
//! {
//!   "version": 1,
//!   "entries": {
//!     "build/obj/main.o": { "command": "<sha256>", "succeeded_at": 1760000000, "inputs": {} }
//!   }
//! }
//! ```
//!
//! The file is only a cache. A missing, corrupt or foreign-version file is
//! treated as empty, which at worst causes extra rebuilds.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::consts::SIGNATURES_VERSION;
use crate::target::Rule;
use crate::util::hash::ContentHash;

#[derive(Debug, Error)]
pub enum SignatureError {
  #[error("failed to read signature cache: {0}")]
  Read(#[source] io::Error),

  #[error("failed to parse signature cache: {0}")]
  Parse(#[source] serde_json::Error),

  #[error("unsupported signature cache version {0} (expected {SIGNATURES_VERSION})")]
  UnsupportedVersion(u32),

  #[error("failed to serialize signature cache: {0}")]
  Serialize(#[source] serde_json::Error),

  #[error("failed to write signature cache: {0}")]
  Write(#[source] io::Error),
}

/// What was true the last time a rule succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
  /// Hash of program and arguments.
  pub command: ContentHash,
  /// Seconds since the Unix epoch.
  pub succeeded_at: u64,
  /// Input path to content hash. Empty unless recorded under the content policy.
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub inputs: BTreeMap<String, ContentHash>,
}

impl Signature {
  pub fn new(rule: &Rule, inputs: BTreeMap<String, ContentHash>) -> Self {
    let succeeded_at = SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .map(|d| d.as_secs())
      .unwrap_or(0);
    Self {
      command: rule.signature(),
      succeeded_at,
      inputs,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SignatureFile {
  version: u32,
  entries: BTreeMap<String, Signature>,
}

impl Default for SignatureFile {
  fn default() -> Self {
    Self {
      version: SIGNATURES_VERSION,
      entries: BTreeMap::new(),
    }
  }
}

pub(crate) fn key(path: &Path) -> String {
  path.to_string_lossy().into_owned()
}

/// In-memory view of the signature cache, written back with [`SignatureStore::save`].
#[derive(Debug)]
pub struct SignatureStore {
  path: PathBuf,
  file: SignatureFile,
  dirty: bool,
}

impl SignatureStore {
  /// An empty store that will be saved to `path`.
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      file: SignatureFile::default(),
      dirty: false,
    }
  }

  /// Load the cache strictly. A missing file gives an empty store.
  pub fn load(path: impl Into<PathBuf>) -> Result<Self, SignatureError> {
    let path = path.into();

    let content = match fs::read_to_string(&path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::new(path)),
      Err(e) => return Err(SignatureError::Read(e)),
    };

    let file: SignatureFile = serde_json::from_str(&content).map_err(SignatureError::Parse)?;
    if file.version != SIGNATURES_VERSION {
      return Err(SignatureError::UnsupportedVersion(file.version));
    }

    debug!(path = %path.display(), entries = file.entries.len(), "loaded signature cache");

    Ok(Self {
      path,
      file,
      dirty: false,
    })
  }

  /// Load the cache, discarding it with a warning if it cannot be used.
  pub fn open(path: impl Into<PathBuf>) -> Self {
    let path = path.into();
    match Self::load(&path) {
      Ok(store) => store,
      Err(e) => {
        warn!(path = %path.display(), error = %e, "discarding signature cache");
        // Rewrite on the next save even if nothing changes.
        Self {
          dirty: true,
          ..Self::new(path)
        }
      }
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn get(&self, output: &Path) -> Option<&Signature> {
    self.file.entries.get(&key(output))
  }

  pub fn record(&mut self, output: &Path, signature: Signature) {
    self.file.entries.insert(key(output), signature);
    self.dirty = true;
  }

  pub fn remove(&mut self, output: &Path) {
    if self.file.entries.remove(&key(output)).is_some() {
      self.dirty = true;
    }
  }

  pub fn len(&self) -> usize {
    self.file.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.file.entries.is_empty()
  }

  /// Write the cache if anything changed.
  ///
  /// Uses atomic write (write to temp, then rename) so an interrupted save
  /// never leaves a truncated file behind.
  pub fn save(&mut self) -> Result<(), SignatureError> {
    if !self.dirty {
      return Ok(());
    }

    if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
      fs::create_dir_all(parent).map_err(SignatureError::Write)?;
    }

    let mut temp_name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    temp_name.push(".tmp");
    let temp_path = self.path.with_file_name(temp_name);

    let content = serde_json::to_string_pretty(&self.file).map_err(SignatureError::Serialize)?;
    fs::write(&temp_path, &content).map_err(SignatureError::Write)?;
    fs::rename(&temp_path, &self.path).map_err(SignatureError::Write)?;

    debug!(path = %self.path.display(), entries = self.file.entries.len(), "saved signature cache");
    self.dirty = false;

    Ok(())
  }
}
