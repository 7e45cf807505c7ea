//! Resolver tests against real throwaway git repositories.

use std::path::Path;
use std::process::Command;

use hexprov::git::{Git, GitError};
use hexprov::model::GitRef;
use hexprov::resolver::resolve_version;

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn run_git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .current_dir(dir)
        .args([
            "-c",
            "user.email=test@example.com",
            "-c",
            "user.name=test",
        ])
        .args(args)
        .status()
        .unwrap();
    assert!(status.success(), "git {:?} failed", args);
}

/// A repository with one commit whose mix.exs declares `version`.
fn init_repo(dir: &Path, version: &str) {
    run_git(dir, &["init", "--initial-branch=main"]);
    std::fs::write(
        dir.join("mix.exs"),
        format!(
            "defmodule Demo.MixProject do\n  use Mix.Project\n\n  def project do\n    [app: :demo, version: \"{}\"]\n  end\nend\n",
            version
        ),
    )
    .unwrap();
    run_git(dir, &["add", "."]);
    run_git(dir, &["commit", "-m", "initial"]);
}

#[tokio::test]
async fn test_exact_tag_wins() {
    if !git_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    init_repo(dir.path(), "1.2.3");
    run_git(dir.path(), &["tag", "1.2.3"]);

    let git = Git::clone_or_update("unused", dir.path()).await.unwrap();
    let resolved = resolve_version(&git, "1.2.3").await.unwrap();
    assert_eq!(resolved, GitRef::Tag("1.2.3".to_string()));
}

#[tokio::test]
async fn test_v_prefixed_tag_fallback() {
    if !git_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    init_repo(dir.path(), "1.2.3");
    run_git(dir.path(), &["tag", "v1.2.3"]);

    let git = Git::clone_or_update("unused", dir.path()).await.unwrap();
    let resolved = resolve_version(&git, "1.2.3").await.unwrap();
    assert_eq!(resolved, GitRef::Tag("v1.2.3".to_string()));
}

#[tokio::test]
async fn test_single_commit_repo_skips_bisection() {
    if !git_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    init_repo(dir.path(), "0.1.0");

    let git = Git::clone_or_update("unused", dir.path()).await.unwrap();
    let head = git.commit_hash("HEAD").await.unwrap();

    let resolved = resolve_version(&git, "0.1.0").await.unwrap();
    assert_eq!(resolved, GitRef::Bisect(head));
}

#[tokio::test]
async fn test_bisection_finds_version_bump_commit() {
    if !git_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    init_repo(dir.path(), "0.1.0");

    // Two commits after the bump exist; the resolver should converge on
    // the first commit whose version is no longer 0.1.0
    std::fs::write(
        dir.path().join("mix.exs"),
        "defmodule Demo.MixProject do\n  def project do\n    [app: :demo, version: \"0.2.0\"]\n  end\nend\n",
    )
    .unwrap();
    run_git(dir.path(), &["commit", "-am", "bump to 0.2.0"]);
    std::fs::write(dir.path().join("extra.txt"), "later work\n").unwrap();
    run_git(dir.path(), &["add", "."]);
    run_git(dir.path(), &["commit", "-m", "later work"]);

    let git = Git::clone_or_update("unused", dir.path()).await.unwrap();
    let resolved = resolve_version(&git, "0.1.0").await.unwrap();

    match resolved {
        GitRef::Bisect(commit) => {
            assert_eq!(commit.len(), 40);
            // No leftover bisect state
            assert!(!dir.path().join(".git").join("BISECT_LOG").exists());
        }
        other => panic!("expected bisect resolution, got {:?}", other),
    }
}

#[tokio::test]
async fn test_checkout_reports_missing_ref() {
    if !git_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    init_repo(dir.path(), "0.1.0");

    let git = Git::clone_or_update("unused", dir.path()).await.unwrap();
    match git.checkout("no-such-tag").await {
        Err(GitError::RefNotFound(refname)) => assert_eq!(refname, "no-such-tag"),
        other => panic!("expected ref-not-found, got {:?}", other),
    }
}
