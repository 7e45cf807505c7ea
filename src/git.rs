//! Git subprocess wrapper.
//!
//! The verification pipeline drives a real `git` binary; this module owns
//! every invocation and interprets only exit status, stdout, and stderr.
//! Only the narrow operations provenance checking needs are exposed:
//! clone-or-update, clean reset, checkout, ref hashing, first-commit
//! lookup, and the bisect primitives.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Error)]
pub enum GitError {
    #[error("failed to run git: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("ref not found: {0}")]
    RefNotFound(String),
    #[error("git {command} failed: {stderr}")]
    Command { command: String, stderr: String },
}

/// Aggregated pre-flight failure naming every missing external tool.
#[derive(Debug, Error)]
#[error("missing required tools: {}", missing.join(", "))]
pub struct CapabilityError {
    pub missing: Vec<String>,
}

/// Checks that the external programs the pipeline shells out to exist.
///
/// `git` runs every version-control operation; `sh` runs the bisect
/// probe. All missing tools are reported at once, before any package is
/// processed.
pub async fn preflight() -> Result<(), CapabilityError> {
    let mut missing = Vec::new();

    for (tool, args) in [
        ("git", ["--version"].as_slice()),
        ("sh", ["-c", "exit 0"].as_slice()),
    ] {
        let probe = Command::new(tool)
            .args(args)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .await;
        if probe.is_err() {
            missing.push(tool.to_string());
        }
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(CapabilityError { missing })
    }
}

/// Handle to one local clone. All operations run with the repository as
/// working directory.
pub struct Git {
    repo_dir: PathBuf,
}

impl Git {
    /// Clones `url` into `repo_dir`, or fetches updates if a clone is
    /// already there, and returns a handle to the resulting repository.
    pub async fn clone_or_update(url: &str, repo_dir: &Path) -> Result<Git, GitError> {
        if repo_dir.join(".git").is_dir() {
            let git = Git {
                repo_dir: repo_dir.to_path_buf(),
            };
            git.run(&["fetch", "--all", "--tags", "--prune"]).await?;
            Ok(git)
        } else {
            if let Some(parent) = repo_dir.parent() {
                std::fs::create_dir_all(parent)?;
            }
            debug!(url, dir = %repo_dir.display(), "cloning repository");
            let output = Command::new("git")
                .args(["clone", url])
                .arg(repo_dir)
                .output()
                .await?;
            if !output.status.success() {
                return Err(GitError::Command {
                    command: "clone".to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                });
            }
            Ok(Git {
                repo_dir: repo_dir.to_path_buf(),
            })
        }
    }

    pub fn dir(&self) -> &Path {
        &self.repo_dir
    }

    /// Discards local modifications, untracked files, and any in-progress
    /// bisect, leaving the working tree pristine.
    pub async fn reset_clean(&self) -> Result<(), GitError> {
        // Not an error if no bisect is in progress
        let _ = self.run(&["bisect", "reset"]).await;
        self.run(&["reset", "--hard"]).await?;
        self.run(&["clean", "-fdx"]).await?;
        Ok(())
    }

    /// Checks out a ref, distinguishing a missing ref from other failures.
    pub async fn checkout(&self, refname: &str) -> Result<(), GitError> {
        let verify = Command::new("git")
            .current_dir(&self.repo_dir)
            .args(["rev-parse", "--verify", "--quiet"])
            .arg(format!("{}^{{commit}}", refname))
            .output()
            .await?;
        if !verify.status.success() {
            return Err(GitError::RefNotFound(refname.to_string()));
        }
        self.run(&["checkout", "--force", refname]).await?;
        Ok(())
    }

    /// Full commit hash of a ref.
    pub async fn commit_hash(&self, refname: &str) -> Result<String, GitError> {
        let stdout = self.run(&["rev-parse", refname]).await?;
        Ok(stdout.trim().to_string())
    }

    /// Hash of the repository's first commit.
    ///
    /// Repositories with several root commits list them all; the last
    /// line of `rev-list` is the oldest.
    pub async fn first_commit(&self) -> Result<String, GitError> {
        let stdout = self.run(&["rev-list", "--max-parents=0", "HEAD"]).await?;
        stdout
            .lines()
            .last()
            .map(|line| line.trim().to_string())
            .ok_or_else(|| GitError::Command {
                command: "rev-list".to_string(),
                stderr: "no commits in repository".to_string(),
            })
    }

    pub async fn bisect_start(&self, bad: &str, good: &str) -> Result<(), GitError> {
        self.run(&["bisect", "start", bad, good]).await?;
        Ok(())
    }

    /// Runs an automated bisection with `script` as the probe, executed
    /// under `sh -c` at every step.
    ///
    /// Returns the combined textual trace whether or not the run
    /// converged; a failed run is reported as a `Command` error carrying
    /// the trace in `stderr`.
    pub async fn bisect_run(&self, script: &str) -> Result<String, GitError> {
        let output = Command::new("git")
            .current_dir(&self.repo_dir)
            .args(["bisect", "run", "sh", "-c", script])
            .output()
            .await?;
        let trace = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        if output.status.success() {
            Ok(trace)
        } else {
            Err(GitError::Command {
                command: "bisect run".to_string(),
                stderr: trace.trim().to_string(),
            })
        }
    }

    pub async fn bisect_reset(&self) -> Result<(), GitError> {
        self.run(&["bisect", "reset"]).await?;
        Ok(())
    }

    async fn run(&self, args: &[&str]) -> Result<String, GitError> {
        debug!(?args, dir = %self.repo_dir.display(), "running git");
        let output = Command::new("git")
            .current_dir(&self.repo_dir)
            .args(args)
            .output()
            .await?;
        if !output.status.success() {
            return Err(GitError::Command {
                command: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
