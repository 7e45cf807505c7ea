//! Per-package verification pipeline and its orchestration.
//!
//! Each package runs the same sequence: fetch artifact, consult the
//! lockfile, look up the repository URL, clone, resolve the version to a
//! ref, diff source against artifact. Every failure is captured into that
//! package's [`CheckResult`] — one package never aborts the others. Only
//! the capability preflight stops the whole run.
//!
//! Packages run concurrently, except that two packages resolving to the
//! same clone directory serialize on a per-path lock: checkout, reset,
//! and bisection all mutate the shared working tree, and the lock stays
//! held through the baseline read of the diff so a later checkout can't
//! invalidate the tree mid-read.

use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::diff::{diff_dirs, relevant_diffs};
use crate::git::{self, Git};
use crate::lockfile::Lockfile;
use crate::model::{CheckReport, CheckResult, HexPackage};
use crate::registry::Registry;
use crate::resolver::resolve_version;
use crate::status::user_repo;

/// One package to verify, as requested on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckRequest {
    pub name: String,
    /// Omitted means "whatever the registry calls latest".
    pub version: Option<String>,
}

impl FromStr for CheckRequest {
    type Err = String;

    /// Parses `name` or `name@version`; the version must be valid semver.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, version) = match s.split_once('@') {
            Some((name, version)) => (name, Some(version)),
            None => (s, None),
        };
        if name.is_empty() {
            return Err(format!("invalid package spec: {}", s));
        }
        if let Some(version) = version {
            semver::Version::parse(version)
                .map_err(|e| format!("invalid version {}: {}", version, e))?;
        }
        Ok(CheckRequest {
            name: name.to_string(),
            version: version.map(|v| v.to_string()),
        })
    }
}

/// One async mutex per canonical clone path.
#[derive(Default)]
struct CloneLocks {
    inner: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl CloneLocks {
    async fn for_path(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut map = self.inner.lock().await;
        map.entry(path.to_path_buf()).or_default().clone()
    }
}

/// Runs the verification pipeline for every requested package.
///
/// Fails fast only if a required external tool is missing; per-package
/// failures land in the individual results.
pub async fn check_packages(
    registry: &dyn Registry,
    lockfile: &Lockfile,
    requests: &[CheckRequest],
    parallel: bool,
    interactive: bool,
) -> anyhow::Result<CheckReport> {
    git::preflight().await?;

    let clones_dir = crate::platform::clones_dir();
    let locks = CloneLocks::default();

    let progress = if interactive {
        let pb = ProgressBar::new(requests.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} Checking packages...")
                .unwrap()
                .progress_chars("#>-"),
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        Some(Arc::new(pb))
    } else {
        None
    };

    let results = if parallel && requests.len() > 1 {
        let futures: Vec<_> = requests
            .iter()
            .map(|request| {
                let pb = progress.clone();
                let locks = &locks;
                let clones_dir = &clones_dir;
                async move {
                    let result =
                        check_one(registry, lockfile, locks, clones_dir, request).await;
                    if let Some(ref pb) = pb {
                        pb.inc(1);
                    }
                    result
                }
            })
            .collect();
        join_all(futures).await
    } else {
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            results.push(check_one(registry, lockfile, &locks, &clones_dir, request).await);
            if let Some(ref pb) = progress {
                pb.inc(1);
            }
        }
        results
    };

    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    Ok(CheckReport::new(results))
}

/// The full pipeline for one package; never returns an error, only a
/// result with `error_reason` set.
async fn check_one(
    registry: &dyn Registry,
    lockfile: &Lockfile,
    locks: &CloneLocks,
    clones_dir: &Path,
    request: &CheckRequest,
) -> CheckResult {
    let version = match &request.version {
        Some(version) => version.clone(),
        None => match registry.latest_version(&request.name).await {
            Ok(version) => version,
            Err(err) => {
                let mut result =
                    CheckResult::new(HexPackage::new(request.name.clone(), "latest"));
                result.error_reason = Some(err.to_string());
                return result;
            }
        },
    };

    let mut result = CheckResult::new(HexPackage::new(request.name.clone(), version.clone()));

    let artifact_dir = match registry.fetch(&request.name, &version).await {
        Ok((hex_package, dir)) => {
            result.hex_package = hex_package;
            dir
        }
        Err(err) => {
            warn!(name = %request.name, %err, "artifact fetch failed");
            result.error_reason = Some(err.to_string());
            return result;
        }
    };

    // An absolution wins regardless of what the other steps would say, so
    // the expensive clone work is skipped entirely
    if let Some(message) = lockfile.lookup(&result.hex_package.name, &result.hex_package.checksum)
    {
        result.absolution_message = Some(message.to_string());
        return result;
    }

    let url = match registry.repository_url(&request.name).await {
        Ok(url) => url,
        Err(err) => {
            result.error_reason = Some(err.to_string());
            return result;
        }
    };
    result.git_url = Some(url.clone());

    let Some(repo_slug) = user_repo(&url) else {
        result.error_reason = Some(format!("cannot derive user/repo from {}", url));
        return result;
    };
    let clone_path = clones_dir.join(&repo_slug);

    // Exclusive per clone path from prepare through the baseline diff
    // read; a concurrent checkout would change the tree under the walk
    let lock = locks.for_path(&clone_path).await;
    let _guard = lock.lock().await;
    debug!(%repo_slug, "clone path locked");

    if let Err(reason) =
        resolve_and_diff(&mut result, &url, &clone_path, &version, &artifact_dir).await
    {
        result.error_reason = Some(reason);
    }
    result
}

/// Result-chaining tail of the pipeline over the accumulator: each step
/// fills its slot in `result` or halts with a reason.
async fn resolve_and_diff(
    result: &mut CheckResult,
    url: &str,
    clone_path: &Path,
    version: &str,
    artifact_dir: &Path,
) -> Result<(), String> {
    let git = Git::clone_or_update(url, clone_path)
        .await
        .map_err(|e| e.to_string())?;
    git.reset_clean().await.map_err(|e| e.to_string())?;

    let git_ref = resolve_version(&git, version)
        .await
        .map_err(|e| e.to_string())?;
    result.git_ref = Some(git_ref);

    let diffs = diff_dirs(git.dir(), artifact_dir).map_err(|e| e.to_string())?;
    result.diffs = relevant_diffs(diffs);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RegistryError;
    use crate::status::Status;
    use async_trait::async_trait;

    struct FakeRegistry {
        repository_url: Option<String>,
        checksum: String,
        artifact_dir: PathBuf,
    }

    #[async_trait]
    impl Registry for FakeRegistry {
        async fn repository_url(&self, name: &str) -> Result<String, RegistryError> {
            self.repository_url
                .clone()
                .ok_or_else(|| RegistryError::NotFound(name.to_string()))
        }

        async fn latest_version(&self, _name: &str) -> Result<String, RegistryError> {
            Ok("1.0.0".to_string())
        }

        async fn fetch(
            &self,
            name: &str,
            version: &str,
        ) -> Result<(HexPackage, PathBuf), RegistryError> {
            Ok((
                HexPackage {
                    name: name.to_string(),
                    version: version.to_string(),
                    checksum: self.checksum.clone(),
                },
                self.artifact_dir.clone(),
            ))
        }
    }

    fn fake_registry(dir: &Path, repository_url: Option<&str>) -> FakeRegistry {
        FakeRegistry {
            repository_url: repository_url.map(|s| s.to_string()),
            checksum: "abc123".to_string(),
            artifact_dir: dir.to_path_buf(),
        }
    }

    #[test]
    fn test_check_request_parsing() {
        assert_eq!(
            "plug@1.14.2".parse::<CheckRequest>(),
            Ok(CheckRequest {
                name: "plug".to_string(),
                version: Some("1.14.2".to_string()),
            })
        );
        assert_eq!(
            "plug".parse::<CheckRequest>(),
            Ok(CheckRequest {
                name: "plug".to_string(),
                version: None,
            })
        );
        assert!("plug@not-a-version".parse::<CheckRequest>().is_err());
        assert!("@1.0.0".parse::<CheckRequest>().is_err());
    }

    #[tokio::test]
    async fn test_absolution_short_circuits_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        // No repository URL: the pipeline would end unresolved if it got
        // that far
        let registry = fake_registry(dir.path(), None);

        let mut lockfile = Lockfile::default();
        lockfile.absolve("plug", "abc123", "known benign repack");

        let request = CheckRequest {
            name: "plug".to_string(),
            version: Some("1.14.2".to_string()),
        };
        let result = check_one(
            &registry,
            &lockfile,
            &CloneLocks::default(),
            dir.path(),
            &request,
        )
        .await;

        assert_eq!(Status::of(&result), Status::Absolved);
        assert_eq!(result.absolution_message.as_deref(), Some("known benign repack"));
    }

    #[tokio::test]
    async fn test_missing_repository_url_yields_unresolved() {
        let dir = tempfile::tempdir().unwrap();
        let registry = fake_registry(dir.path(), None);

        let request = CheckRequest {
            name: "plug".to_string(),
            version: Some("1.14.2".to_string()),
        };
        let result = check_one(
            &registry,
            &Lockfile::default(),
            &CloneLocks::default(),
            dir.path(),
            &request,
        )
        .await;

        assert_eq!(Status::of(&result), Status::Unresolved);
        assert!(result.error_reason.is_some());
        assert!(result.git_url.is_none());
    }

    #[tokio::test]
    async fn test_underivable_repo_slug_yields_unresolved() {
        let dir = tempfile::tempdir().unwrap();
        let registry = fake_registry(dir.path(), Some("https://example.com/plug"));

        let request = CheckRequest {
            name: "plug".to_string(),
            version: Some("1.14.2".to_string()),
        };
        let result = check_one(
            &registry,
            &Lockfile::default(),
            &CloneLocks::default(),
            dir.path(),
            &request,
        )
        .await;

        assert_eq!(Status::of(&result), Status::Unresolved);
        assert_eq!(
            result.git_url.as_deref(),
            Some("https://example.com/plug")
        );
    }

    #[tokio::test]
    async fn test_clone_locks_hand_out_one_mutex_per_path() {
        let locks = CloneLocks::default();
        let a1 = locks.for_path(Path::new("clones/acme/widget")).await;
        let a2 = locks.for_path(Path::new("clones/acme/widget")).await;
        let b = locks.for_path(Path::new("clones/other/repo")).await;

        assert!(Arc::ptr_eq(&a1, &a2));
        assert!(!Arc::ptr_eq(&a1, &b));
    }
}
