//! On-disk cache for fetched assets, keyed by the SHA-256 of their URL.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use sha2::{Digest, Sha256};

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct AssetCache {
    dir: PathBuf,
}

impl AssetCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        AssetCache { dir: dir.into() }
    }

    /// Per-user cache directory (e.g. `~/.cache/tonedeaf/assets` on Linux).
    pub fn default_dir() -> Option<PathBuf> {
        ProjectDirs::from("net", "tonedeaf", "tonedeaf").map(|dirs| dirs.cache_dir().join("assets"))
    }

    /// Cache in [`AssetCache::default_dir`], if the platform has one.
    pub fn in_default_dir() -> Option<Self> {
        Self::default_dir().map(Self::new)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn key(url: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn entry_path(&self, url: &str) -> PathBuf {
        self.dir.join(Self::key(url))
    }

    /// Cached bytes for `url`, if present and readable.
    pub async fn get(&self, url: &str) -> Option<Vec<u8>> {
        tokio::fs::read(self.entry_path(url)).await.ok()
    }

    pub async fn put(&self, url: &str, bytes: &[u8]) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.entry_path(url), bytes).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_stable_hex() {
        let key = AssetCache::key("https://example.com/audio/anthem.mp3");
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(key, AssetCache::key("https://example.com/audio/anthem.mp3"));
        assert_ne!(key, AssetCache::key("https://example.com/audio/other.mp3"));
    }

    #[test]
    fn key_of_empty_string() {
        assert_eq!(
            AssetCache::key(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[tokio::test]
    async fn put_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AssetCache::new(dir.path().join("nested"));
        assert!(cache.get("a").await.is_none());

        cache.put("a", b"bytes").await.unwrap();
        assert_eq!(cache.get("a").await.unwrap(), b"bytes");
        assert!(cache.get("b").await.is_none());
    }
}
