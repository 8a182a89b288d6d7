//! Vault configuration.
//!
//! The vault root and the config values are always passed explicitly; there
//! is no global state. Editing and wizard flows live outside this crate;
//! here we only read `config.yaml` from the state directory, falling back
//! to defaults when it is absent.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default note file extension (case-sensitive in the watcher).
pub const DEFAULT_EXTENSION: &str = "Rmd";

/// Default state directory name under the vault root.
pub const DEFAULT_STATE_DIR: &str = ".notegraph";

/// Index database filename inside the state directory.
pub const INDEX_FILE: &str = "index.db";

/// Transient database filename used during a full rebuild.
pub const TMP_INDEX_FILE: &str = "index.db.tmp";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Vault root directory.
    #[serde(skip)]
    pub root: PathBuf,
    /// Configured note types; each names a type directory under the root.
    pub types: Vec<String>,
    /// Note file extension, without the leading dot.
    pub extension: String,
    /// State directory name under the vault root.
    pub state_dir: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::new(),
            types: vec!["note".to_string()],
            extension: DEFAULT_EXTENSION.to_string(),
            state_dir: DEFAULT_STATE_DIR.to_string(),
        }
    }
}

impl VaultConfig {
    /// Config with defaults rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Load `config.yaml` (or `config.yml`) from the state directory,
    /// falling back to defaults when neither exists.
    ///
    /// The root is canonicalized so that paths recorded by the builder and
    /// paths surfaced by the watcher agree.
    pub fn load(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let root = std::fs::canonicalize(&root).unwrap_or(root);
        let state = root.join(DEFAULT_STATE_DIR);
        let mut cfg = None;
        for name in ["config.yaml", "config.yml"] {
            let path = state.join(name);
            if path.is_file() {
                let text = std::fs::read_to_string(&path)?;
                let parsed: VaultConfig = serde_yaml::from_str(&text).map_err(|e| {
                    crate::error::IndexError::InvalidArgument(format!(
                        "Malformed config {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                cfg = Some(parsed);
                break;
            }
        }
        let mut cfg = cfg.unwrap_or_default();
        cfg.root = root;
        Ok(cfg)
    }

    /// `<root>/<state_dir>`.
    pub fn state_dir_path(&self) -> PathBuf {
        self.root.join(&self.state_dir)
    }

    /// Path of the live index database.
    pub fn index_path(&self) -> PathBuf {
        self.state_dir_path().join(INDEX_FILE)
    }

    /// Path of the transient rebuild database.
    pub fn tmp_index_path(&self) -> PathBuf {
        self.state_dir_path().join(TMP_INDEX_FILE)
    }

    /// Directory holding notes of `ty`, i.e. `<root>/<ty>`.
    pub fn type_dir(&self, ty: &str) -> PathBuf {
        self.root.join(ty)
    }

    /// Whether `path` has the configured note extension (case-sensitive).
    pub fn is_note_path(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e == self.extension)
            .unwrap_or(false)
    }
}
