//! Per-location gap data.
//!
//! A recording location has an overall time range and a list of gaps:
//! intervals where no data was recorded. Everything outside a gap is an
//! audio period. Gap lists are loaded once per location through a
//! [`LocationRepository`] and shared as immutable [`GapModel`]s.
//!
//! All times are epoch milliseconds stored as `f64`. Tile durations at fine
//! zoom levels are fractional milliseconds, so integer storage would drift.

mod error;
mod repository;
mod source;

pub use error::GapModelError;
pub use repository::LocationRepository;
pub use source::{HttpLocationSource, LocationRecord, LocationSource, StaticLocationSource};

use serde::{Deserialize, Serialize};

/// A dataless interval `[start, end)` in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GapInterval {
    #[serde(rename = "time_start")]
    pub start: f64,
    #[serde(rename = "time_end")]
    pub end: f64,
}

impl GapInterval {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Length of the gap in milliseconds.
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// True if `time` lies inside `[start, end)`.
    pub fn contains(&self, time: f64) -> bool {
        self.start <= time && time < self.end
    }
}

/// The full recorded range of a location.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub min_time: f64,
    pub max_time: f64,
}

impl TimeRange {
    pub fn new(min_time: f64, max_time: f64) -> Self {
        Self { min_time, max_time }
    }

    pub fn duration(&self) -> f64 {
        self.max_time - self.min_time
    }
}

/// Normalization options applied when building a [`GapModel`].
#[derive(Debug, Clone, Default)]
pub struct GapModelOptions {
    /// Lower bound for the location's start time.
    ///
    /// Recordings before this instant are ignored by clamping `min_time`.
    pub min_start_time: Option<f64>,

    /// Periods that are always treated as gaps, replacing any gaps that
    /// overlap them.
    pub skip_periods: Vec<GapInterval>,
}

impl GapModelOptions {
    pub fn with_min_start_time(mut self, time: f64) -> Self {
        self.min_start_time = Some(time);
        self
    }

    pub fn with_skip_period(mut self, start: f64, end: f64) -> Self {
        self.skip_periods.push(GapInterval::new(start, end));
        self
    }
}

/// Immutable gap list and range for one location.
///
/// Gaps are sorted by start, non-overlapping and non-empty.
#[derive(Debug, Clone, PartialEq)]
pub struct GapModel {
    location: String,
    range: TimeRange,
    gaps: Vec<GapInterval>,
}

impl GapModel {
    /// Build a model from raw service data, normalizing the gap list.
    pub fn new(
        location: impl Into<String>,
        range: TimeRange,
        raw_gaps: Vec<GapInterval>,
        options: &GapModelOptions,
    ) -> Result<Self, GapModelError> {
        let location = location.into();
        let mut range = range;
        if let Some(min_start) = options.min_start_time {
            range.min_time = range.min_time.max(min_start);
        }
        if !(range.min_time < range.max_time) {
            return Err(GapModelError::InvalidRange {
                location,
                min_time: range.min_time,
                max_time: range.max_time,
            });
        }

        let gaps = normalize_gaps(raw_gaps, &options.skip_periods);
        Ok(Self {
            location,
            range,
            gaps,
        })
    }

    /// A model where the whole range is audio.
    pub fn without_gaps(location: impl Into<String>, range: TimeRange) -> Self {
        Self {
            location: location.into(),
            range,
            gaps: Vec::new(),
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn range(&self) -> TimeRange {
        self.range
    }

    pub fn gaps(&self) -> &[GapInterval] {
        &self.gaps
    }

    /// The gap containing `time`, if any.
    pub fn gap_at(&self, time: f64) -> Option<&GapInterval> {
        let idx = self.gaps.partition_point(|g| g.start <= time);
        idx.checked_sub(1)
            .map(|i| &self.gaps[i])
            .filter(|g| g.end > time)
    }

    /// The gap that fully covers `[start, end]`, if any.
    pub fn range_in_gap(&self, start: f64, end: f64) -> Option<&GapInterval> {
        self.gap_at(start).filter(|g| g.end > end)
    }

    /// True if `time` is inside the recorded range and not inside a gap.
    pub fn has_audio_at(&self, time: f64) -> bool {
        time >= self.range.min_time && time < self.range.max_time && self.gap_at(time).is_none()
    }
}

/// Drop empty intervals, splice in skip periods, sort and merge overlaps.
fn normalize_gaps(raw: Vec<GapInterval>, skip_periods: &[GapInterval]) -> Vec<GapInterval> {
    let mut gaps: Vec<GapInterval> = raw.into_iter().filter(|g| g.start < g.end).collect();

    for period in skip_periods.iter().filter(|p| p.start < p.end) {
        gaps.retain(|g| g.end < period.start || g.start > period.end);
        gaps.push(*period);
    }

    gaps.sort_by(|a, b| a.start.total_cmp(&b.start));

    let mut merged: Vec<GapInterval> = Vec::with_capacity(gaps.len());
    for gap in gaps {
        match merged.last_mut() {
            Some(last) if gap.start <= last.end => last.end = last.end.max(gap.end),
            _ => merged.push(gap),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range() -> TimeRange {
        TimeRange::new(0.0, 1_000_000.0)
    }

    #[test]
    fn test_normalize_drops_empty_and_sorts() {
        let raw = vec![
            GapInterval::new(500.0, 600.0),
            GapInterval::new(100.0, 100.0),
            GapInterval::new(300.0, 200.0),
            GapInterval::new(10.0, 20.0),
        ];
        let model = GapModel::new("a", range(), raw, &GapModelOptions::default()).unwrap();
        assert_eq!(
            model.gaps(),
            &[GapInterval::new(10.0, 20.0), GapInterval::new(500.0, 600.0)]
        );
    }

    #[test]
    fn test_normalize_merges_overlaps() {
        let raw = vec![
            GapInterval::new(100.0, 300.0),
            GapInterval::new(200.0, 400.0),
            GapInterval::new(400.0, 450.0),
        ];
        let model = GapModel::new("a", range(), raw, &GapModelOptions::default()).unwrap();
        assert_eq!(model.gaps(), &[GapInterval::new(100.0, 450.0)]);
    }

    #[test]
    fn test_skip_period_replaces_overlapping_gaps() {
        let raw = vec![
            GapInterval::new(100.0, 200.0),
            GapInterval::new(1_000.0, 1_100.0),
            GapInterval::new(5_000.0, 6_000.0),
        ];
        let options = GapModelOptions::default().with_skip_period(900.0, 2_000.0);
        let model = GapModel::new("a", range(), raw, &options).unwrap();
        assert_eq!(
            model.gaps(),
            &[
                GapInterval::new(100.0, 200.0),
                GapInterval::new(900.0, 2_000.0),
                GapInterval::new(5_000.0, 6_000.0),
            ]
        );
    }

    #[test]
    fn test_min_start_time_clamps_range() {
        let options = GapModelOptions::default().with_min_start_time(250.0);
        let model = GapModel::new("a", range(), vec![], &options).unwrap();
        assert_eq!(model.range().min_time, 250.0);
    }

    #[test]
    fn test_invalid_range_rejected() {
        let options = GapModelOptions::default().with_min_start_time(2_000_000.0);
        let result = GapModel::new("a", range(), vec![], &options);
        assert!(matches!(result, Err(GapModelError::InvalidRange { .. })));
    }

    #[test]
    fn test_gap_at_is_half_open() {
        let raw = vec![GapInterval::new(100.0, 200.0)];
        let model = GapModel::new("a", range(), raw, &GapModelOptions::default()).unwrap();
        assert!(model.gap_at(99.9).is_none());
        assert!(model.gap_at(100.0).is_some());
        assert!(model.gap_at(199.9).is_some());
        assert!(model.gap_at(200.0).is_none());
    }

    #[test]
    fn test_range_in_gap_requires_full_cover() {
        let raw = vec![GapInterval::new(100.0, 200.0)];
        let model = GapModel::new("a", range(), raw, &GapModelOptions::default()).unwrap();
        assert!(model.range_in_gap(120.0, 180.0).is_some());
        assert!(model.range_in_gap(120.0, 250.0).is_none());
        assert!(model.range_in_gap(50.0, 150.0).is_none());
    }

    #[test]
    fn test_has_audio_at() {
        let raw = vec![GapInterval::new(100.0, 200.0)];
        let model = GapModel::new("a", range(), raw, &GapModelOptions::default()).unwrap();
        assert!(model.has_audio_at(50.0));
        assert!(!model.has_audio_at(150.0));
        assert!(!model.has_audio_at(-1.0));
        assert!(!model.has_audio_at(1_000_000.0));
    }

    #[test]
    fn test_gap_interval_serde_field_names() {
        let json = r#"{"time_start": 1.0, "time_end": 2.5}"#;
        let gap: GapInterval = serde_json::from_str(json).unwrap();
        assert_eq!(gap, GapInterval::new(1.0, 2.5));
    }
}
