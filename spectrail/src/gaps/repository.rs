//! Location repository: fetch-once cache of gap models.

use std::sync::Arc;

use dashmap::DashMap;

use super::{GapModel, GapModelError, GapModelOptions, LocationSource};

/// Caches one [`GapModel`] per location name.
///
/// Construct once and pass by reference to whatever switches locations.
/// Tests get a fresh cache simply by building a new repository.
pub struct LocationRepository {
    source: Arc<dyn LocationSource>,
    options: GapModelOptions,
    cache: DashMap<String, Arc<GapModel>>,
}

impl std::fmt::Debug for LocationRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationRepository")
            .field("options", &self.options)
            .field("cached", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl LocationRepository {
    pub fn new(source: Arc<dyn LocationSource>, options: GapModelOptions) -> Self {
        Self {
            source,
            options,
            cache: DashMap::new(),
        }
    }

    /// Get the gap model for `location`, fetching it on first use.
    ///
    /// A failed range fetch is an error. A failed gap fetch is logged and the
    /// location is treated as having no gaps.
    pub async fn get(&self, location: &str) -> Result<Arc<GapModel>, GapModelError> {
        if let Some(model) = self.cache.get(location) {
            return Ok(Arc::clone(model.value()));
        }

        let range = self.source.fetch_range(location).await?;
        let gaps = match self
            .source
            .fetch_gaps(location, range.min_time, range.max_time)
            .await
        {
            Ok(gaps) => gaps,
            Err(e) => {
                tracing::warn!(location, error = %e, "Gap fetch failed, assuming no gaps");
                Vec::new()
            }
        };

        let model = Arc::new(GapModel::new(location, range, gaps, &self.options)?);
        tracing::info!(
            location,
            gaps = model.gaps().len(),
            min_time = model.range().min_time,
            max_time = model.range().max_time,
            "Loaded location"
        );

        // Another caller may have raced us; keep whichever landed first.
        let entry = self
            .cache
            .entry(location.to_string())
            .or_insert_with(|| Arc::clone(&model));
        Ok(Arc::clone(entry.value()))
    }

    /// Drop a cached location so the next `get` refetches it.
    pub fn invalidate(&self, location: &str) {
        self.cache.remove(location);
    }

    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gaps::{GapInterval, LocationRecord, StaticLocationSource, TimeRange};
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn source() -> StaticLocationSource {
        StaticLocationSource::new().with_record(LocationRecord {
            location: "Hawaii".to_string(),
            range: TimeRange::new(0.0, 1e9),
            gaps: vec![GapInterval::new(100_000.0, 200_000.0)],
        })
    }

    /// Counts range fetches and fails every gap fetch.
    struct FlakyGaps {
        inner: StaticLocationSource,
        range_calls: AtomicUsize,
    }

    impl LocationSource for FlakyGaps {
        fn fetch_range(
            &self,
            location: &str,
        ) -> BoxFuture<'static, Result<TimeRange, GapModelError>> {
            self.range_calls.fetch_add(1, Ordering::SeqCst);
            self.inner.fetch_range(location)
        }

        fn fetch_gaps(
            &self,
            _location: &str,
            _start: f64,
            _end: f64,
        ) -> BoxFuture<'static, Result<Vec<GapInterval>, GapModelError>> {
            async { Err(GapModelError::Http("connection reset".to_string())) }.boxed()
        }
    }

    #[tokio::test]
    async fn test_get_loads_and_caches() {
        let repo = LocationRepository::new(Arc::new(source()), GapModelOptions::default());
        let first = repo.get("Hawaii").await.unwrap();
        let second = repo.get("Hawaii").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.gaps().len(), 1);
        assert_eq!(repo.cached_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_gaps_means_no_gaps() {
        let flaky = Arc::new(FlakyGaps {
            inner: source(),
            range_calls: AtomicUsize::new(0),
        });
        let repo = LocationRepository::new(flaky.clone(), GapModelOptions::default());
        let model = repo.get("Hawaii").await.unwrap();
        assert!(model.gaps().is_empty());

        repo.get("Hawaii").await.unwrap();
        assert_eq!(flaky.range_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_location_is_error() {
        let repo = LocationRepository::new(Arc::new(source()), GapModelOptions::default());
        assert!(repo.get("Nowhere").await.is_err());
        assert_eq!(repo.cached_count(), 0);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let repo = LocationRepository::new(Arc::new(source()), GapModelOptions::default());
        let first = repo.get("Hawaii").await.unwrap();
        repo.invalidate("Hawaii");
        let second = repo.get("Hawaii").await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }
}
