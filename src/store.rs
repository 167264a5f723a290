//! Keyed persistence — one JSON file per logical key under the data dir.
//!
//! The store exposes the three keys the rest of the system reads and
//! writes: `repositories`, `options`, and `badge_number`. Each set is an
//! atomic temp-file-plus-rename write, so a failed operation never leaves a
//! partially written key behind. Reads of a missing key return the key's
//! default instead of an error; parse failures propagate.

use color_eyre::eyre::{Result, WrapErr};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

use crate::model::{Options, TrackedRepository};

/// Load a JSON state file. Errors if the file is missing or malformed.
pub fn load_state<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&contents)
        .wrap_err_with(|| format!("failed to parse {}", path.display()))
}

/// Save a JSON state file atomically (write to a temp file, then rename).
/// Creates parent directories as needed.
pub fn save_state<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .wrap_err_with(|| format!("failed to create {}", parent.display()))?;
    }

    let json = serde_json::to_string_pretty(value).wrap_err("failed to serialize state")?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).wrap_err_with(|| format!("failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .wrap_err_with(|| format!("failed to rename {} into place", tmp.display()))?;

    Ok(())
}

/// The persistence store, rooted at the data directory.
pub struct Store {
    root: PathBuf,
}

impl Store {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }

    /// The tracked repository list. Missing key = empty list.
    pub fn repositories(&self) -> Result<Vec<TrackedRepository>> {
        let path = self.key_path("repositories");
        if !path.exists() {
            return Ok(Vec::new());
        }
        load_state(&path)
    }

    pub fn set_repositories(&self, repositories: &[TrackedRepository]) -> Result<()> {
        save_state(&self.key_path("repositories"), &repositories)
    }

    /// User options. Missing key = defaults (empty key, notifications on).
    pub fn options(&self) -> Result<Options> {
        let path = self.key_path("options");
        if !path.exists() {
            return Ok(Options::default());
        }
        load_state(&path)
    }

    pub fn set_options(&self, options: &Options) -> Result<()> {
        save_state(&self.key_path("options"), options)
    }

    /// The persisted badge number. Missing key = 0.
    pub fn badge_number(&self) -> Result<u64> {
        let path = self.key_path("badge_number");
        if !path.exists() {
            return Ok(0);
        }
        load_state(&path)
    }

    pub fn set_badge_number(&self, badge_number: u64) -> Result<()> {
        save_state(&self.key_path("badge_number"), &badge_number)
    }

    /// Seed the three keys with their defaults. Existing keys are left
    /// untouched, so running `init` twice is safe.
    pub fn initialize(&self) -> Result<()> {
        if !self.key_path("options").exists() {
            self.set_options(&Options::default())?;
        }
        if !self.key_path("repositories").exists() {
            self.set_repositories(&[])?;
        }
        if !self.key_path("badge_number").exists() {
            self.set_badge_number(0)?;
        }
        Ok(())
    }
}
