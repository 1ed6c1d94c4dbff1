//! Location data sources.
//!
//! The [`LocationSource`] trait abstracts where a location's range and gaps
//! come from, so the repository can be tested without a network.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};

use super::{GapInterval, GapModelError, TimeRange};

/// Source of per-location range and gap data.
///
/// Methods return boxed futures so the trait stays dyn-compatible
/// (`Arc<dyn LocationSource>`).
pub trait LocationSource: Send + Sync {
    /// Fetch the overall recorded range of a location.
    fn fetch_range(&self, location: &str) -> BoxFuture<'static, Result<TimeRange, GapModelError>>;

    /// Fetch the raw gap list of a location between `start` and `end`.
    fn fetch_gaps(
        &self,
        location: &str,
        start: f64,
        end: f64,
    ) -> BoxFuture<'static, Result<Vec<GapInterval>, GapModelError>>;
}

/// Serialized form of one location, as stored in JSON fixtures.
///
/// ```json
/// { "location": "Hawaii", "range": { "min_time": 0, "max_time": 1e9 },
///   "gaps": [ { "time_start": 100000, "time_end": 200000 } ] }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationRecord {
    pub location: String,
    pub range: TimeRange,
    #[serde(default)]
    pub gaps: Vec<GapInterval>,
}

/// In-memory location source.
#[derive(Debug, Clone, Default)]
pub struct StaticLocationSource {
    records: HashMap<String, LocationRecord>,
}

impl StaticLocationSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a location record.
    pub fn with_record(mut self, record: LocationRecord) -> Self {
        self.records.insert(record.location.clone(), record);
        self
    }

    /// Parse a single record or an array of records.
    pub fn from_json_str(json: &str) -> Result<Self, GapModelError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        let records: Vec<LocationRecord> = if value.is_array() {
            serde_json::from_value(value)?
        } else {
            vec![serde_json::from_value(value)?]
        };
        Ok(records
            .into_iter()
            .fold(Self::new(), |source, record| source.with_record(record)))
    }

    /// Load records from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, GapModelError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Names of all known locations, sorted.
    pub fn locations(&self) -> Vec<String> {
        let mut names: Vec<String> = self.records.keys().cloned().collect();
        names.sort();
        names
    }
}

impl LocationSource for StaticLocationSource {
    fn fetch_range(&self, location: &str) -> BoxFuture<'static, Result<TimeRange, GapModelError>> {
        let result = self
            .records
            .get(location)
            .map(|r| r.range)
            .ok_or_else(|| GapModelError::UnknownLocation(location.to_string()));
        async move { result }.boxed()
    }

    fn fetch_gaps(
        &self,
        location: &str,
        start: f64,
        end: f64,
    ) -> BoxFuture<'static, Result<Vec<GapInterval>, GapModelError>> {
        let result = self
            .records
            .get(location)
            .map(|r| {
                r.gaps
                    .iter()
                    .filter(|g| g.end > start && g.start < end)
                    .copied()
                    .collect()
            })
            .ok_or_else(|| GapModelError::UnknownLocation(location.to_string()));
        async move { result }.boxed()
    }
}

/// Location source backed by the recording service's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpLocationSource {
    client: reqwest::Client,
    api_base: String,
}

impl HttpLocationSource {
    /// Create a source for the API rooted at `api_base` (trailing slash expected).
    pub fn new(api_base: impl Into<String>, timeout: Duration) -> Result<Self, GapModelError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GapModelError::Http(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            api_base: api_base.into(),
        })
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }
}

async fn get_json<T: serde::de::DeserializeOwned>(
    request: reqwest::RequestBuilder,
) -> Result<T, GapModelError> {
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(GapModelError::Status {
            status: status.as_u16(),
            url: response.url().to_string(),
        });
    }
    Ok(response.json::<T>().await?)
}

impl LocationSource for HttpLocationSource {
    fn fetch_range(&self, location: &str) -> BoxFuture<'static, Result<TimeRange, GapModelError>> {
        let request = self
            .client
            .get(format!("{}range", self.api_base))
            .query(&[("location", location), ("ms_timestamps", "true")]);
        get_json::<TimeRange>(request).boxed()
    }

    fn fetch_gaps(
        &self,
        location: &str,
        start: f64,
        end: f64,
    ) -> BoxFuture<'static, Result<Vec<GapInterval>, GapModelError>> {
        let request = self.client.get(format!("{}gaps", self.api_base)).query(&[
            ("location", location.to_string()),
            ("time_start", format!("{:.0}", start)),
            ("time_end", format!("{:.0}", end)),
        ]);
        get_json::<Vec<GapInterval>>(request).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"[
        { "location": "Hawaii", "range": { "min_time": 0, "max_time": 1000000 },
          "gaps": [ { "time_start": 100, "time_end": 200 },
                    { "time_start": 5000, "time_end": 6000 } ] },
        { "location": "Saipan", "range": { "min_time": 10, "max_time": 20 } }
    ]"#;

    #[test]
    fn test_from_json_array() {
        let source = StaticLocationSource::from_json_str(FIXTURE).unwrap();
        assert_eq!(source.locations(), vec!["Hawaii", "Saipan"]);
    }

    #[test]
    fn test_from_json_single_record() {
        let json = r#"{ "location": "X", "range": { "min_time": 0, "max_time": 5 } }"#;
        let source = StaticLocationSource::from_json_str(json).unwrap();
        assert_eq!(source.locations(), vec!["X"]);
    }

    #[tokio::test]
    async fn test_fetch_gaps_filters_window() {
        let source = StaticLocationSource::from_json_str(FIXTURE).unwrap();
        let gaps = source.fetch_gaps("Hawaii", 1000.0, 10_000.0).await.unwrap();
        assert_eq!(gaps, vec![GapInterval::new(5000.0, 6000.0)]);
    }

    #[tokio::test]
    async fn test_unknown_location() {
        let source = StaticLocationSource::new();
        let result = source.fetch_range("Nowhere").await;
        assert!(matches!(result, Err(GapModelError::UnknownLocation(_))));
    }

    #[test]
    fn test_http_source_keeps_api_base() {
        let source =
            HttpLocationSource::new("https://example.com/api/", Duration::from_secs(5)).unwrap();
        assert_eq!(source.api_base(), "https://example.com/api/");
    }
}
