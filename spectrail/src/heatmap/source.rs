//! Classification score sources.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::pyramid::HOUR_MS;
use crate::streamer::FetchError;

/// Source of classification scores.
///
/// Scores come back as `[time_start, score]` pairs, one per bar of
/// `HOUR_MS / 2^zoom` milliseconds.
pub trait ClassificationSource: Send + Sync {
    fn fetch_scores(
        &self,
        location: &str,
        start: f64,
        end: f64,
        zoom: i32,
    ) -> BoxFuture<'static, Result<Vec<(f64, f64)>, FetchError>>;
}

/// Scores from the recording service's `classifications_bq` endpoint.
#[derive(Debug, Clone)]
pub struct HttpClassificationSource {
    client: reqwest::Client,
    api_base: String,
}

impl HttpClassificationSource {
    pub fn new(api_base: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Http(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            api_base: api_base.into(),
        })
    }
}

impl ClassificationSource for HttpClassificationSource {
    fn fetch_scores(
        &self,
        location: &str,
        start: f64,
        end: f64,
        zoom: i32,
    ) -> BoxFuture<'static, Result<Vec<(f64, f64)>, FetchError>> {
        let url = format!("{}classifications_bq", self.api_base);
        let request = self.client.get(&url).query(&[
            ("location", location.to_string()),
            ("time_start", format!("{:.0}", start)),
            ("time_end", format!("{:.0}", end)),
            ("zoom", zoom.to_string()),
            ("compressed", "true".to_string()),
        ]);
        async move {
            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status {
                    status: status.as_u16(),
                    url,
                });
            }
            Ok(response.json::<Vec<(f64, f64)>>().await?)
        }
        .boxed()
    }
}

/// Deterministic scores computed from bar start times.
///
/// Each bar scores `(sin(start / period) + 1) / 2`. Clones share the fetch
/// counter.
#[derive(Debug, Clone)]
pub struct SyntheticClassificationSource {
    period_ms: f64,
    fetches: Arc<AtomicUsize>,
}

impl SyntheticClassificationSource {
    pub fn new(period_ms: f64) -> Self {
        Self {
            period_ms,
            fetches: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl Default for SyntheticClassificationSource {
    fn default() -> Self {
        Self::new(6.0 * HOUR_MS)
    }
}

impl ClassificationSource for SyntheticClassificationSource {
    fn fetch_scores(
        &self,
        _location: &str,
        start: f64,
        end: f64,
        zoom: i32,
    ) -> BoxFuture<'static, Result<Vec<(f64, f64)>, FetchError>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let bar = HOUR_MS / 2f64.powi(zoom);
        let count = ((end - start) / bar).round().max(0.0) as usize;
        let period = self.period_ms;
        let pairs = (0..count)
            .map(|i| {
                let t = start + i as f64 * bar;
                (t, ((t / period).sin() + 1.0) / 2.0)
            })
            .collect();
        async move { Ok(pairs) }.boxed()
    }
}
