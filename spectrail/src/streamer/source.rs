//! Tile asset sources.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use thiserror::Error;

use crate::pyramid::{TileDescriptor, TileNaming};

/// Loaded tile data, shared cheaply between the instance and render output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetHandle {
    key: Arc<str>,
    data: Bytes,
}

impl AssetHandle {
    pub fn new(key: &str, data: Bytes) -> Self {
        Self {
            key: Arc::from(key),
            data,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Errors from fetching a tile asset.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Tile not found: {0}")]
    NotFound(String),

    #[error("Failed to decode tile: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        FetchError::Http(e.to_string())
    }
}

impl From<image::ImageError> for FetchError {
    fn from(e: image::ImageError) -> Self {
        FetchError::Decode(e.to_string())
    }
}

/// What happens to a tile whose fetch failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FetchFailurePolicy {
    /// The instance settles as failed and is never refetched while resident.
    #[default]
    Suppress,
    /// The instance is dropped; it is recreated and refetched the next time
    /// it is wanted.
    Evict,
}

impl FetchFailurePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchFailurePolicy::Suppress => "suppress",
            FetchFailurePolicy::Evict => "evict",
        }
    }
}

impl fmt::Display for FetchFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FetchFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "suppress" => Ok(FetchFailurePolicy::Suppress),
            "evict" => Ok(FetchFailurePolicy::Evict),
            other => Err(format!("unknown failure policy '{}'", other)),
        }
    }
}

/// Source of tile assets.
///
/// Fetches are spawned onto the tokio runtime by the streamer, so the
/// returned future must own everything it needs.
pub trait AssetSource: Send + Sync {
    fn fetch(&self, descriptor: &TileDescriptor) -> BoxFuture<'static, Result<AssetHandle, FetchError>>;
}

/// Fetches tiles over HTTP, resolving URLs through a naming strategy.
pub struct HttpAssetSource {
    client: reqwest::Client,
    naming: Arc<dyn TileNaming>,
}

impl HttpAssetSource {
    pub fn new(naming: Arc<dyn TileNaming>, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Http(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, naming })
    }
}

impl AssetSource for HttpAssetSource {
    fn fetch(&self, descriptor: &TileDescriptor) -> BoxFuture<'static, Result<AssetHandle, FetchError>> {
        let url = self.naming.url(&descriptor.resource_key);
        let key = descriptor.resource_key.clone();
        let request = self.client.get(url.clone());
        async move {
            let response = request.send().await?;
            let status = response.status();
            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(FetchError::NotFound(key));
            }
            if !status.is_success() {
                return Err(FetchError::Status {
                    status: status.as_u16(),
                    url,
                });
            }
            let data = response.bytes().await?;
            Ok(AssetHandle::new(&key, data))
        }
        .boxed()
    }
}

/// Zero-latency in-memory source.
///
/// Every tile resolves immediately to a small payload naming its key, except
/// keys registered as failing. Clones share the fetch counter.
#[derive(Debug, Clone, Default)]
pub struct SyntheticAssetSource {
    failing: HashSet<String>,
    fetches: Arc<AtomicUsize>,
}

impl SyntheticAssetSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make fetches of `key` fail with [`FetchError::NotFound`].
    pub fn with_failing_key(mut self, key: impl Into<String>) -> Self {
        self.failing.insert(key.into());
        self
    }

    /// Total fetches started so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl AssetSource for SyntheticAssetSource {
    fn fetch(&self, descriptor: &TileDescriptor) -> BoxFuture<'static, Result<AssetHandle, FetchError>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let key = descriptor.resource_key.clone();
        let result = if self.failing.contains(&key) {
            Err(FetchError::NotFound(key))
        } else {
            let data = Bytes::from(key.clone().into_bytes());
            Ok(AssetHandle::new(&key, data))
        };
        async move { result }.boxed()
    }
}
