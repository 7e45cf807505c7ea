//! Trust status evaluation and rendering.
//!
//! One ordered, total function from a finished (or halted) check to a
//! verdict. Priority is fixed: an absolution overrides everything, an
//! unresolved source beats any diff talk, and only a resolved ref gets
//! judged honest or corrupt.

use serde::{Deserialize, Serialize};

use crate::model::{CheckResult, GitRef};

/// Final per-package verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// A lockfile entry for this exact artifact accepts the mismatch.
    Absolved,
    /// No repository URL or no git ref could be resolved.
    Unresolved,
    /// Source and artifact match.
    Honest,
    /// Relevant differences exist between source and artifact.
    Corrupt,
}

impl Status {
    /// Evaluates a check result. First matching state wins, in the order
    /// the variants are tried here.
    pub fn of(result: &CheckResult) -> Status {
        if result.absolution_message.is_some() {
            Status::Absolved
        } else if result.git_url.is_none() || result.git_ref.is_none() {
            Status::Unresolved
        } else if result.diffs.is_empty() {
            Status::Honest
        } else {
            Status::Corrupt
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Absolved => "absolved",
            Status::Unresolved => "unresolved",
            Status::Honest => "honest",
            Status::Corrupt => "corrupt",
        }
    }

    /// CI exit code for this status.
    pub fn exit_code(&self) -> u8 {
        match self {
            Status::Absolved | Status::Honest => 0,
            Status::Unresolved => 11,
            Status::Corrupt => 12,
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Derives the `user/repo` shorthand from a repository URL.
///
/// Returns `None` when the URL has no two trailing path segments to
/// take.
pub fn user_repo(git_url: &str) -> Option<String> {
    let trimmed = git_url
        .trim_end_matches('/')
        .trim_end_matches(".git");
    let without_scheme = trimmed
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(trimmed);
    let mut segments = without_scheme.rsplit('/');
    let repo = segments.next()?;
    let user = segments.next()?;
    // The host would mean the URL had only one path segment
    if user.contains('.') && segments.next().is_none() {
        return None;
    }
    if repo.is_empty() || user.is_empty() {
        return None;
    }
    Some(format!("{}/{}", user, repo))
}

/// The status label for one result, with diffs inlined for corrupt
/// packages and the override message for absolved ones.
pub fn status_label(result: &CheckResult) -> String {
    match Status::of(result) {
        Status::Corrupt => {
            let diffs: Vec<String> = result.diffs.iter().map(|d| d.to_string()).collect();
            format!("corrupt ({})", diffs.join("; "))
        }
        Status::Absolved => format!(
            "absolved ({}: {})",
            result.hex_package.checksum,
            result
                .absolution_message
                .as_deref()
                .unwrap_or_default()
        ),
        status => status.as_str().to_string(),
    }
}

/// One summary line per package: name, version, repo, ref, status.
pub fn render_line(result: &CheckResult) -> String {
    let repo = result
        .git_url
        .as_deref()
        .and_then(user_repo)
        .unwrap_or_else(|| "-".to_string());
    let git_ref = result
        .git_ref
        .as_ref()
        .map(GitRef::describe)
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{} {} {} {} {}",
        result.hex_package.name,
        result.hex_package.version,
        repo,
        git_ref,
        status_label(result)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::DiffEntry;
    use crate::model::HexPackage;

    fn resolved_result() -> CheckResult {
        let mut result = CheckResult::new(HexPackage {
            name: "plug".to_string(),
            version: "1.14.2".to_string(),
            checksum: "abc123".to_string(),
        });
        result.git_url = Some("https://github.com/elixir-plug/plug".to_string());
        result.git_ref = Some(GitRef::Tag("v1.14.2".to_string()));
        result
    }

    #[test]
    fn test_honest_when_resolved_and_clean() {
        assert_eq!(Status::of(&resolved_result()), Status::Honest);
    }

    #[test]
    fn test_corrupt_when_resolved_with_diffs() {
        let mut result = resolved_result();
        result.diffs = vec![DiffEntry::ContentDiffers("lib/a.ex".to_string())];
        assert_eq!(Status::of(&result), Status::Corrupt);
    }

    #[test]
    fn test_unresolved_without_url_or_ref() {
        let mut result = resolved_result();
        result.git_ref = None;
        assert_eq!(Status::of(&result), Status::Unresolved);

        let mut result = resolved_result();
        result.git_url = None;
        assert_eq!(Status::of(&result), Status::Unresolved);
    }

    #[test]
    fn test_absolution_overrides_everything() {
        let mut result = resolved_result();
        result.diffs = vec![DiffEntry::ContentDiffers("lib/a.ex".to_string())];
        result.absolution_message = Some("accepted".to_string());
        assert_eq!(Status::of(&result), Status::Absolved);

        let mut result = resolved_result();
        result.git_url = None;
        result.git_ref = None;
        result.absolution_message = Some("accepted".to_string());
        assert_eq!(Status::of(&result), Status::Absolved);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(Status::Absolved.exit_code(), 0);
        assert_eq!(Status::Honest.exit_code(), 0);
        assert_eq!(Status::Unresolved.exit_code(), 11);
        assert_eq!(Status::Corrupt.exit_code(), 12);
    }

    #[test]
    fn test_user_repo_derivation() {
        assert_eq!(
            user_repo("https://github.com/elixir-plug/plug").as_deref(),
            Some("elixir-plug/plug")
        );
        assert_eq!(
            user_repo("https://github.com/elixir-plug/plug.git/").as_deref(),
            Some("elixir-plug/plug")
        );
        assert_eq!(
            user_repo("git@github.com:acme/widget".replace(':', "/").as_str()).as_deref(),
            Some("acme/widget")
        );
        assert_eq!(user_repo("https://example.com/plug"), None);
    }

    #[test]
    fn test_corrupt_label_lists_diffs() {
        let mut result = resolved_result();
        result.diffs = vec![
            DiffEntry::ContentDiffers("b.txt".to_string()),
            DiffEntry::OnlyInCandidate("c.txt".to_string()),
        ];
        let label = status_label(&result);
        assert!(label.starts_with("corrupt ("));
        assert!(label.contains("content differs: b.txt"));
        assert!(label.contains("only in artifact: c.txt"));
    }

    #[test]
    fn test_absolved_label_includes_checksum_and_message() {
        let mut result = resolved_result();
        result.absolution_message = Some("vendored docs".to_string());
        assert_eq!(status_label(&result), "absolved (abc123: vendored docs)");
    }

    #[test]
    fn test_render_line_uses_sentinels_when_unresolved() {
        let result = CheckResult::new(HexPackage::new("ghost", "0.1.0"));
        assert_eq!(render_line(&result), "ghost 0.1.0 - - unresolved");
    }
}
