//! Local trust-override store.
//!
//! An absolution says "I know this artifact differs from (or cannot be
//! matched to) its source, and I accept it anyway" — keyed by package
//! name and content hash so it stops applying the moment the registry
//! serves different bytes. Stored as a TOML file, `hexprov.lock` by
//! default.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_LOCKFILE: &str = "hexprov.lock";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Absolution {
    pub name: String,
    pub checksum: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Lockfile {
    #[serde(default, rename = "absolution")]
    absolutions: Vec<Absolution>,
    #[serde(skip)]
    path: PathBuf,
}

impl Lockfile {
    /// Loads the lockfile, or returns an empty one if the file doesn't
    /// exist yet.
    pub fn load(path: &Path) -> Result<Self> {
        let mut lockfile = if path.exists() {
            let content = fs::read_to_string(path)?;
            toml::from_str::<Lockfile>(&content)?
        } else {
            Lockfile::default()
        };
        lockfile.path = path.to_path_buf();
        Ok(lockfile)
    }

    /// The absolution message for `(name, checksum)`, if one was recorded.
    pub fn lookup(&self, name: &str, checksum: &str) -> Option<&str> {
        self.absolutions
            .iter()
            .find(|entry| entry.name == name && entry.checksum == checksum)
            .map(|entry| entry.message.as_str())
    }

    /// Records an absolution, replacing any previous entry for the same
    /// `(name, checksum)` pair.
    pub fn absolve(
        &mut self,
        name: impl Into<String>,
        checksum: impl Into<String>,
        message: impl Into<String>,
    ) {
        let entry = Absolution {
            name: name.into(),
            checksum: checksum.into(),
            message: message.into(),
        };
        self.absolutions
            .retain(|existing| !(existing.name == entry.name && existing.checksum == entry.checksum));
        self.absolutions.push(entry);
    }

    pub fn save(&self) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(&self.path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_keyed_by_name_and_checksum() {
        let mut lockfile = Lockfile::default();
        lockfile.absolve("plug", "abc123", "vendored docs, reviewed by hand");

        assert_eq!(
            lockfile.lookup("plug", "abc123"),
            Some("vendored docs, reviewed by hand")
        );
        assert_eq!(lockfile.lookup("plug", "other"), None);
        assert_eq!(lockfile.lookup("phoenix", "abc123"), None);
    }

    #[test]
    fn test_absolve_replaces_existing_entry() {
        let mut lockfile = Lockfile::default();
        lockfile.absolve("plug", "abc123", "first");
        lockfile.absolve("plug", "abc123", "second");
        assert_eq!(lockfile.lookup("plug", "abc123"), Some("second"));
        assert_eq!(lockfile.absolutions.len(), 1);
    }

    #[test]
    fn test_load_missing_file_yields_empty() {
        let dir = tempfile::tempdir().unwrap();
        let lockfile = Lockfile::load(&dir.path().join("hexprov.lock")).unwrap();
        assert_eq!(lockfile.lookup("plug", "abc123"), None);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hexprov.lock");

        let mut lockfile = Lockfile::load(&path).unwrap();
        lockfile.absolve("plug", "abc123", "accepted");
        lockfile.save().unwrap();

        let reloaded = Lockfile::load(&path).unwrap();
        assert_eq!(reloaded.lookup("plug", "abc123"), Some("accepted"));
    }
}
