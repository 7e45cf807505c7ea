//! hex.pm registry client.
//!
//! Two concerns: resolving a package's source repository URL from its
//! registry metadata, and fetching + unpacking the published artifact so
//! the diff engine can compare it against a checkout. URL and version
//! lookups go through the file cache; tarballs are always fetched fresh
//! (their checksum is the whole point).

use async_trait::async_trait;
use flate2::read::GzDecoder;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info};

use crate::cache::Cache;
use crate::model::HexPackage;
use crate::platform::artifacts_dir;

const API_URL: &str = "https://hex.pm/api";
const REPO_URL: &str = "https://repo.hex.pm";

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("package not found: {0}")]
    NotFound(String),
    #[error("no repository link in registry metadata for {0}")]
    NoRepositoryLink(String),
    #[error("registry request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("malformed artifact for {name}: {reason}")]
    MalformedArtifact { name: String, reason: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Registry operations the orchestrator needs, as a capability so tests
/// can substitute a fake.
#[async_trait]
pub trait Registry: Send + Sync {
    /// The package's source repository URL.
    async fn repository_url(&self, name: &str) -> Result<String, RegistryError>;

    /// The latest published version, for requests that omit one.
    async fn latest_version(&self, name: &str) -> Result<String, RegistryError>;

    /// Downloads the published tarball, computes its content hash, and
    /// unpacks the contents. Returns the artifact descriptor and the
    /// directory the contents were unpacked into.
    async fn fetch(&self, name: &str, version: &str) -> Result<(HexPackage, PathBuf), RegistryError>;
}

pub struct HexRegistry {
    client: reqwest::Client,
    cache: Cache,
    api_url: String,
    repo_url: String,
}

impl HexRegistry {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            cache: Cache::new(),
            api_url: API_URL.to_string(),
            repo_url: REPO_URL.to_string(),
        }
    }

    pub fn with_urls(api_url: impl Into<String>, repo_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            cache: Cache::new(),
            api_url: api_url.into(),
            repo_url: repo_url.into(),
        }
    }

    async fn package_info(&self, name: &str) -> Result<PackageInfo, RegistryError> {
        let url = format!("{}/packages/{}", self.api_url, name);
        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(RegistryError::NotFound(name.to_string()));
        }
        let response = response.error_for_status()?;
        Ok(response.json().await?)
    }
}

impl Default for HexRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
struct PackageInfo {
    meta: PackageMeta,
    #[serde(default)]
    latest_stable_version: Option<String>,
    #[serde(default)]
    latest_version: Option<String>,
}

#[derive(Deserialize)]
struct PackageMeta {
    #[serde(default)]
    links: BTreeMap<String, String>,
}

#[async_trait]
impl Registry for HexRegistry {
    async fn repository_url(&self, name: &str) -> Result<String, RegistryError> {
        let cache_key = format!("repo_url_{}", name);
        if let Some(url) = self.cache.get::<String>(&cache_key) {
            return Ok(url);
        }

        let info = self.package_info(name).await?;
        let url = repository_link(&info.meta.links)
            .ok_or_else(|| RegistryError::NoRepositoryLink(name.to_string()))?;

        let _ = self.cache.set(&cache_key, &url);
        Ok(url)
    }

    async fn latest_version(&self, name: &str) -> Result<String, RegistryError> {
        let cache_key = format!("latest_version_{}", name);
        if let Some(version) = self.cache.get::<String>(&cache_key) {
            return Ok(version);
        }

        let info = self.package_info(name).await?;
        let version = info
            .latest_stable_version
            .or(info.latest_version)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;

        let _ = self.cache.set(&cache_key, &version);
        Ok(version)
    }

    async fn fetch(&self, name: &str, version: &str) -> Result<(HexPackage, PathBuf), RegistryError> {
        let url = format!("{}/tarballs/{}-{}.tar", self.repo_url, name, version);
        debug!(url, "downloading artifact");

        let response = self.client.get(&url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(RegistryError::NotFound(format!("{} {}", name, version)));
        }
        let bytes = response.error_for_status()?.bytes().await?;

        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let checksum = hex::encode(hasher.finalize());

        let dest = artifacts_dir().join(format!("{}-{}", name, version));
        if dest.exists() {
            std::fs::remove_dir_all(&dest)?;
        }
        std::fs::create_dir_all(&dest)?;
        unpack_artifact(name, &bytes, &dest)?;

        info!(name, version, checksum, "fetched artifact");
        let hex_package = HexPackage {
            name: name.to_string(),
            version: version.to_string(),
            checksum,
        };
        Ok((hex_package, dest))
    }
}

/// Picks the source repository out of the metadata links, which use
/// free-form display names as keys.
fn repository_link(links: &BTreeMap<String, String>) -> Option<String> {
    const KNOWN_KEYS: &[&str] = &["github", "repository", "source", "source code", "git"];

    for (key, url) in links {
        if KNOWN_KEYS.contains(&key.to_lowercase().as_str()) {
            return Some(url.clone());
        }
    }
    links
        .values()
        .find(|url| url.contains("github.com") || url.contains("gitlab.com"))
        .cloned()
}

/// Unpacks a Hex artifact: the outer tar holds `contents.tar.gz` (the
/// actual file tree) and `metadata.config`, which the stock unpacker
/// writes beside the contents as `hex_metadata.config`.
fn unpack_artifact(name: &str, bytes: &[u8], dest: &std::path::Path) -> Result<(), RegistryError> {
    let malformed = |reason: &str| RegistryError::MalformedArtifact {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let mut outer = tar::Archive::new(Cursor::new(bytes));
    let mut saw_contents = false;

    for entry in outer.entries().map_err(|_| malformed("not a tar archive"))? {
        let mut entry = entry.map_err(|_| malformed("truncated tar archive"))?;
        let path = entry
            .path()
            .map_err(|_| malformed("bad entry path"))?
            .to_path_buf();

        match path.to_str() {
            Some("contents.tar.gz") => {
                let mut compressed = Vec::new();
                entry
                    .read_to_end(&mut compressed)
                    .map_err(|_| malformed("truncated contents"))?;
                let mut contents = tar::Archive::new(GzDecoder::new(Cursor::new(compressed)));
                contents
                    .unpack(dest)
                    .map_err(|_| malformed("bad contents archive"))?;
                saw_contents = true;
            }
            Some("metadata.config") => {
                let mut metadata = Vec::new();
                entry
                    .read_to_end(&mut metadata)
                    .map_err(|_| malformed("truncated metadata"))?;
                std::fs::write(dest.join("hex_metadata.config"), metadata)?;
            }
            _ => {}
        }
    }

    if !saw_contents {
        return Err(malformed("missing contents.tar.gz"));
    }
    Ok(())
}
