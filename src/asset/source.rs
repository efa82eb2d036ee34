//! Where assets come from: a local directory or an HTTP server.

use std::future::Future;
use std::path::PathBuf;

use super::cache::AssetCache;
use super::decode::decode_audio;
use crate::dsp::buffer::SampleBuffer;
use crate::error::{Result, ToneError};

/// Fetches raw asset bytes and decodes them.
pub trait AssetSource: Send + Sync {
    /// Retrieve the bytes stored at `path`. Failures are [`ToneError::Fetch`].
    fn fetch(&self, path: &str) -> impl Future<Output = Result<Vec<u8>>> + Send;

    /// Decode fetched bytes. Failures are [`ToneError::Decode`].
    fn decode(&self, bytes: &[u8]) -> Result<SampleBuffer> {
        decode_audio(bytes)
    }
}

/// Serves asset paths relative to a root directory, the way a static web
/// root serves `/audio/anthem.mp3`.
#[derive(Debug, Clone)]
pub struct FileAssetSource {
    root: PathBuf,
}

impl FileAssetSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileAssetSource { root: root.into() }
    }

    pub fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

impl AssetSource for FileAssetSource {
    async fn fetch(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.resolve(path);
        log::debug!("fetching asset from {}", full.display());
        tokio::fs::read(&full).await.map_err(|e| ToneError::fetch(path, e))
    }
}

/// Fetches assets over HTTP(S), optionally through an [`AssetCache`].
#[derive(Debug, Clone)]
pub struct HttpAssetSource {
    client: reqwest::Client,
    base_url: String,
    cache: Option<AssetCache>,
}

impl HttpAssetSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        HttpAssetSource {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: AssetCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn cache(&self) -> Option<&AssetCache> {
        self.cache.as_ref()
    }

    pub fn url_for(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    async fn download(&self, url: &str) -> std::result::Result<Vec<u8>, reqwest::Error> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

impl AssetSource for HttpAssetSource {
    async fn fetch(&self, path: &str) -> Result<Vec<u8>> {
        let url = self.url_for(path);

        if let Some(cache) = &self.cache {
            if let Some(bytes) = cache.get(&url).await {
                log::debug!("asset cache hit for {url}");
                return Ok(bytes);
            }
        }

        log::debug!("fetching asset from {url}");
        let bytes = self.download(&url).await.map_err(|e| ToneError::fetch(path, e))?;

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.put(&url, &bytes).await {
                log::warn!("could not cache {url}: {e}");
            }
        }

        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_paths_resolve_under_root() {
        let source = FileAssetSource::new("/srv/public");
        assert_eq!(source.resolve("/audio/anthem.mp3"), PathBuf::from("/srv/public/audio/anthem.mp3"));
        assert_eq!(source.resolve("audio/anthem.mp3"), PathBuf::from("/srv/public/audio/anthem.mp3"));
    }

    #[test]
    fn urls_join_cleanly() {
        let source = HttpAssetSource::new("http://localhost:3000/");
        assert_eq!(source.url_for("/audio/anthem.mp3"), "http://localhost:3000/audio/anthem.mp3");
    }

    #[tokio::test]
    async fn missing_file_is_a_fetch_failure() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileAssetSource::new(dir.path());
        let err = source.fetch("/audio/missing.mp3").await.unwrap_err();
        assert!(matches!(err, ToneError::Fetch { ref path, .. } if path == "/audio/missing.mp3"), "{err:?}");
    }

    #[tokio::test]
    async fn reads_file_bytes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("audio")).unwrap();
        std::fs::write(dir.path().join("audio/clip.wav"), b"RIFF").unwrap();

        let source = FileAssetSource::new(dir.path());
        assert_eq!(source.fetch("/audio/clip.wav").await.unwrap(), b"RIFF");
    }

    #[tokio::test]
    async fn cached_http_asset_skips_network() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AssetCache::new(dir.path());
        // Nothing listens on this port; only the cache can satisfy the fetch
        let source = HttpAssetSource::new("http://127.0.0.1:9").with_cache(cache.clone());
        cache.put(&source.url_for("/audio/anthem.mp3"), b"cached").await.unwrap();

        assert_eq!(source.fetch("/audio/anthem.mp3").await.unwrap(), b"cached");
    }

    #[tokio::test]
    async fn unreachable_host_is_a_fetch_failure() {
        let source = HttpAssetSource::new("http://127.0.0.1:9");
        let err = source.fetch("/audio/anthem.mp3").await.unwrap_err();
        assert!(matches!(err, ToneError::Fetch { .. }), "{err:?}");
    }
}
