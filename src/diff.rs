//! Directory diff engine.
//!
//! Compares a baseline tree (the checked-out source) against a candidate
//! tree (the unpacked artifact) and classifies every difference. The
//! engine itself stays pure and unfiltered; [`relevant_diffs`] applies
//! the packaging-noise policy on top.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Files the stock packaging step adds to every artifact; never evidence
/// of tampering when candidate-only.
const PACKAGING_ARTIFACTS: &[&str] = &[".hex", ".fetch", "hex_metadata.config"];

#[derive(Debug, Error)]
pub enum DiffError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// One classified difference, with the path relative to its tree root so
/// results are portable across machines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "path")]
pub enum DiffEntry {
    OnlyInBaseline(String),
    OnlyInCandidate(String),
    ContentDiffers(String),
}

impl DiffEntry {
    pub fn path(&self) -> &str {
        match self {
            DiffEntry::OnlyInBaseline(path)
            | DiffEntry::OnlyInCandidate(path)
            | DiffEntry::ContentDiffers(path) => path,
        }
    }
}

impl std::fmt::Display for DiffEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiffEntry::OnlyInBaseline(path) => write!(f, "only in source: {}", path),
            DiffEntry::OnlyInCandidate(path) => write!(f, "only in artifact: {}", path),
            DiffEntry::ContentDiffers(path) => write!(f, "content differs: {}", path),
        }
    }
}

/// Compares two directory trees, returning every difference in path order.
///
/// Identical files produce no entry. `.git/` in the baseline is version
/// control bookkeeping, not part of the source tree, and is skipped.
pub fn diff_dirs(baseline: &Path, candidate: &Path) -> Result<Vec<DiffEntry>, DiffError> {
    let baseline_files = collect_files(baseline, true)?;
    let candidate_files = collect_files(candidate, false)?;

    let mut entries = Vec::new();
    let mut paths: Vec<&String> = baseline_files.keys().chain(candidate_files.keys()).collect();
    paths.sort();
    paths.dedup();

    for rel_path in paths {
        match (baseline_files.get(rel_path), candidate_files.get(rel_path)) {
            (Some(_), None) => entries.push(DiffEntry::OnlyInBaseline(rel_path.clone())),
            (None, Some(_)) => entries.push(DiffEntry::OnlyInCandidate(rel_path.clone())),
            (Some(left), Some(right)) => {
                if read_file(left)? != read_file(right)? {
                    entries.push(DiffEntry::ContentDiffers(rel_path.clone()));
                }
            }
            (None, None) => unreachable!("path came from one of the two maps"),
        }
    }

    Ok(entries)
}

/// Packaging-noise filter applied on top of [`diff_dirs`].
///
/// Baseline-only entries are always dropped: extra files in the source
/// repo (tests, CI config) are expected and say nothing about the
/// artifact. Candidate-only entries are dropped when they are known
/// packaging artifacts or `.DS_Store` droppings. Everything else is
/// relevant.
pub fn relevant_diffs(entries: Vec<DiffEntry>) -> Vec<DiffEntry> {
    entries
        .into_iter()
        .filter(|entry| match entry {
            DiffEntry::OnlyInBaseline(_) => false,
            DiffEntry::OnlyInCandidate(path) => {
                !PACKAGING_ARTIFACTS.contains(&path.as_str()) && base_name(path) != ".DS_Store"
            }
            DiffEntry::ContentDiffers(_) => true,
        })
        .collect()
}

fn base_name(rel_path: &str) -> &str {
    rel_path.rsplit('/').next().unwrap_or(rel_path)
}

/// Maps relative paths (with `/` separators) to absolute file paths.
fn collect_files(root: &Path, skip_git: bool) -> Result<BTreeMap<String, PathBuf>, DiffError> {
    let mut files = BTreeMap::new();

    let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
        !(skip_git && entry.file_type().is_dir() && entry.file_name() == ".git")
    });

    for entry in walker {
        let entry = entry.map_err(|e| DiffError::Io {
            path: root.to_path_buf(),
            source: e.into(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel_path = entry
            .path()
            .strip_prefix(root)
            .expect("walkdir yields paths under its root")
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        files.insert(rel_path, entry.path().to_path_buf());
    }

    Ok(files)
}

fn read_file(path: &Path) -> Result<Vec<u8>, DiffError> {
    fs::read(path).map_err(|source| DiffError::Io {
        path: path.to_path_buf(),
        source,
    })
}
