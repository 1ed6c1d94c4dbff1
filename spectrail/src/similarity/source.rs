//! Similarity matrix sources.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;

use super::tile::SimilarityMatrix;
use crate::pyramid::{SimilarityNaming, TileDescriptor};
use crate::streamer::{AssetSource, FetchError, HttpAssetSource};

/// Source of decoded similarity matrices.
pub trait SimilaritySource: Send + Sync {
    fn fetch_matrix(
        &self,
        descriptor: &TileDescriptor,
    ) -> BoxFuture<'static, Result<SimilarityMatrix, FetchError>>;
}

/// Fetches similarity images through an [`AssetSource`] and decodes them.
pub struct ImageSimilaritySource {
    assets: Arc<dyn AssetSource>,
}

impl ImageSimilaritySource {
    pub fn new(assets: Arc<dyn AssetSource>) -> Self {
        Self { assets }
    }

    /// Images from the similarity bucket over HTTP.
    pub fn http(naming: SimilarityNaming, timeout: Duration) -> Result<Self, FetchError> {
        let assets = HttpAssetSource::new(Arc::new(naming), timeout)?;
        Ok(Self::new(Arc::new(assets)))
    }
}

impl SimilaritySource for ImageSimilaritySource {
    fn fetch_matrix(
        &self,
        descriptor: &TileDescriptor,
    ) -> BoxFuture<'static, Result<SimilarityMatrix, FetchError>> {
        let fetch = self.assets.fetch(descriptor);
        async move {
            let asset = fetch.await?;
            SimilarityMatrix::decode(asset.data())
        }
        .boxed()
    }
}

/// Deterministic matrices with a bright diagonal. Clones share the fetch
/// counter.
#[derive(Debug, Clone)]
pub struct SyntheticSimilaritySource {
    size: usize,
    fetches: Arc<AtomicUsize>,
}

impl SyntheticSimilaritySource {
    pub fn new(size: usize) -> Self {
        Self {
            size: size.max(2),
            fetches: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl Default for SyntheticSimilaritySource {
    fn default() -> Self {
        Self::new(64)
    }
}

impl SimilaritySource for SyntheticSimilaritySource {
    fn fetch_matrix(
        &self,
        _descriptor: &TileDescriptor,
    ) -> BoxFuture<'static, Result<SimilarityMatrix, FetchError>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let n = self.size;
        let rows = (0..n)
            .map(|i| {
                (0..n)
                    .map(|j| 1.0 / (1.0 + i.abs_diff(j) as f64))
                    .collect()
            })
            .collect();
        let result = SimilarityMatrix::new(rows)
            .ok_or_else(|| FetchError::Decode("empty synthetic matrix".to_string()));
        async move { result }.boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pyramid::TileSpan;
    use crate::streamer::SyntheticAssetSource;

    fn descriptor() -> TileDescriptor {
        TileDescriptor {
            span: TileSpan {
                time: 0.0,
                duration: 225_000.0,
                zoom_level: 4,
            },
            resource_key: "tiles-4/Hawaii/1970_01_01T00_00_00.jpg".to_string(),
        }
    }

    #[tokio::test]
    async fn test_synthetic_matrix_is_square() {
        let source = SyntheticSimilaritySource::new(8);
        let matrix = source.fetch_matrix(&descriptor()).await.unwrap();
        assert_eq!(matrix.row_count(), 8);
        assert_eq!(matrix.row_len(), 8);
        assert_eq!(matrix.rows()[3][3], 1.0);
        assert_eq!(source.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_undecodable_asset_fails() {
        let source = ImageSimilaritySource::new(Arc::new(SyntheticAssetSource::new()));
        let result = source.fetch_matrix(&descriptor()).await;
        assert!(matches!(result, Err(FetchError::Decode(_))));
    }

    #[test]
    fn test_http_source_builds() {
        assert!(ImageSimilaritySource::http(SimilarityNaming::default(), Duration::from_secs(5)).is_ok());
    }
}
