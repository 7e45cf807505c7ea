use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::diff::DiffEntry;

/// Resolved registry artifact descriptor: what the registry says was
/// published. Read-only input to the verification pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HexPackage {
    pub name: String,
    pub version: String,
    /// SHA-256 hex of the published tarball. Empty until the artifact has
    /// been fetched.
    pub checksum: String,
}

impl HexPackage {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            checksum: String::new(),
        }
    }
}

/// A concrete source revision matched to a published version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "value")]
pub enum GitRef {
    /// A tag matched the version string (directly or with a `v` prefix).
    Tag(String),
    /// No tag existed; bisection found the version-bump commit.
    Bisect(String),
}

impl GitRef {
    /// Human label for the status line.
    pub fn describe(&self) -> String {
        match self {
            GitRef::Tag(name) => format!("tag {}", name),
            GitRef::Bisect(commit) => {
                let short = &commit[..commit.len().min(12)];
                format!("commit {}", short)
            }
        }
    }
}

/// Per-package verification record.
///
/// Created empty at the start of a check and filled in as each pipeline
/// step succeeds; an error stops the pipeline and is recorded in
/// `error_reason`. Never mutated after the orchestrator returns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub hex_package: HexPackage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<GitRef>,
    /// Relevant differences between source tree and artifact, path-ordered.
    /// Empty until the diff step has run.
    pub diffs: Vec<DiffEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub absolution_message: Option<String>,
}

impl CheckResult {
    pub fn new(hex_package: HexPackage) -> Self {
        Self {
            hex_package,
            git_url: None,
            git_ref: None,
            diffs: Vec::new(),
            error_reason: None,
            absolution_message: None,
        }
    }
}

/// A full run's worth of results, for rendering and file output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckReport {
    pub checked_at: DateTime<Utc>,
    pub results: Vec<CheckResult>,
}

impl CheckReport {
    pub fn new(results: Vec<CheckResult>) -> Self {
        Self {
            checked_at: Utc::now(),
            results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_ref_describe() {
        assert_eq!(GitRef::Tag("v1.2.3".into()).describe(), "tag v1.2.3");
        assert_eq!(
            GitRef::Bisect("0123456789abcdef0123456789abcdef01234567".into()).describe(),
            "commit 0123456789ab"
        );
    }

    #[test]
    fn test_check_result_starts_empty() {
        let result = CheckResult::new(HexPackage::new("plug", "1.14.2"));
        assert!(result.git_url.is_none());
        assert!(result.git_ref.is_none());
        assert!(result.diffs.is_empty());
        assert!(result.error_reason.is_none());
        assert!(result.absolution_message.is_none());
    }
}
