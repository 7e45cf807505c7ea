//! Version resolution: published version string to concrete git ref.
//!
//! Most releases are tagged `1.2.3` or `v1.2.3`; when neither tag exists
//! the resolver falls back to bisecting the full history for the commit
//! where the project version changed to the target.

use regex::Regex;
use thiserror::Error;
use tracing::{debug, info};

use crate::git::{Git, GitError};
use crate::model::GitRef;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("commit not found for version {0}")]
    CommitNotFound(String),
    #[error(transparent)]
    Git(#[from] GitError),
}

/// Resolves `version` against an already-cloned, clean repository.
///
/// Tag attempts come first (exact, then `v`-prefixed); bisection is the
/// fallback. Exactly one of a [`GitRef`] or an error comes back, and the
/// repository is left without bisect state either way.
pub async fn resolve_version(git: &Git, version: &str) -> Result<GitRef, ResolveError> {
    for tag in [version.to_string(), format!("v{}", version)] {
        match git.checkout(&tag).await {
            Ok(()) => {
                info!(%tag, "resolved version by tag");
                return Ok(GitRef::Tag(tag));
            }
            Err(GitError::RefNotFound(_)) => continue,
            Err(err) => return Err(err.into()),
        }
    }

    debug!(version, "no tag found, falling back to bisection");
    let commit = bisect_version(git, version).await?;
    git.checkout(&commit).await?;
    Ok(GitRef::Bisect(commit))
}

/// Finds the first commit whose project version no longer matches
/// `version`, i.e. the commit right after the release was cut.
async fn bisect_version(git: &Git, version: &str) -> Result<String, ResolveError> {
    let first = git.first_commit().await?;
    let tip = git.commit_hash("HEAD").await?;

    // Bisection degenerates on a single-point range
    if first == tip {
        return Ok(first);
    }

    git.bisect_start(&tip, &first).await?;
    let run = git.bisect_run(&probe_script(version)).await;
    // Leave no bisect-in-progress state behind regardless of outcome
    let _ = git.bisect_reset().await;

    match run {
        Ok(trace) => parse_transition_commit(&trace)
            .ok_or_else(|| ResolveError::CommitNotFound(version.to_string())),
        Err(GitError::Command { .. }) => Err(ResolveError::CommitNotFound(version.to_string())),
        Err(err) => Err(err.into()),
    }
}

/// Probe run at every bisection step: exit 0 ("good") iff the checked-out
/// project version equals the target.
///
/// Reads the version from the files Hex packages actually carry: a
/// `mix.exs`, a `gleam.toml`, or an OTP `.app.src`.
fn probe_script(version: &str) -> String {
    format!(
        r#"v=$(sed -n 's/.*version: *"\([^"]*\)".*/\1/p' mix.exs 2>/dev/null | head -n1)
if [ -z "$v" ]; then v=$(sed -n 's/^version *= *"\([^"]*\)".*/\1/p' gleam.toml 2>/dev/null | head -n1); fi
if [ -z "$v" ]; then v=$(sed -n 's/.*{{vsn, *"\([^"]*\)"}}.*/\1/p' src/*.app.src 2>/dev/null | head -n1); fi
test "$v" = "{}""#,
        version
    )
}

/// Extracts the transition commit from a bisect run trace.
///
/// The conclusive `<hash> is the first <word> commit` line appears last,
/// so the trace is scanned from the end.
fn parse_transition_commit(trace: &str) -> Option<String> {
    let pattern =
        Regex::new(r"^([0-9a-f]{40}) is the first \w+ commit").expect("pattern is valid");
    trace
        .lines()
        .rev()
        .find_map(|line| pattern.captures(line.trim()))
        .map(|captures| captures[1].to_string())
}
