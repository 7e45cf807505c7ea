//! Cross-platform path resolution.
//!
//! Local state lives in the platform cache and data directories:
//! - cache: registry responses, unpacked artifacts, repository clones
//! - data: the local signing key and trusted-keys file

use std::path::PathBuf;

/// Returns the cache directory for hexprov.
///
/// - Linux: `~/.cache/hexprov/`
/// - macOS: `~/Library/Caches/hexprov/`
/// - Windows: `%LOCALAPPDATA%\hexprov\cache\`
///
/// Falls back to `/tmp/hexprov/` if no cache directory can be determined.
pub fn cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("hexprov")
}

/// Directory holding unpacked registry artifacts, one subdirectory per
/// `{name}-{version}`.
pub fn artifacts_dir() -> PathBuf {
    cache_dir().join("artifacts")
}

/// Directory holding local repository clones, one subdirectory per
/// `{user}/{repo}`.
pub fn clones_dir() -> PathBuf {
    cache_dir().join("clones")
}

/// Returns the data directory for hexprov (signing key, trusted keys).
pub fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hexprov")
}
