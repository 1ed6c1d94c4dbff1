//! Time ↔ pixel coordinate mapping.
//!
//! [`CoordinateMapper`] owns the current anchor time, the window duration
//! and the viewport width, and keeps a gap-compressing [`Lookup`] in sync
//! with them. Every setter rebuilds the lookup synchronously, so queries
//! made after a setter always see the new mapping.
//!
//! Until a gap model has been attached (or when the inputs cannot produce a
//! mapping), queries answer from the plain symmetric window
//! `current_time ± window_duration / 2`.

mod lookup;

pub use lookup::{
    build_lookup, preprocess_gaps, Lookup, LookupConfig, LookupSegment, DEFAULT_BACKWARD_VIEWPORTS,
    DEFAULT_FORWARD_VIEWPORTS, DEFAULT_GAP_MAX_PX, DEFAULT_MAX_WALK_STEPS,
    DEFAULT_MERGE_SLIVER_PX, DEFAULT_MIN_GAP_PX, DEFAULT_OPEN_PERIOD_MS,
};

use std::sync::Arc;

use crate::gaps::GapModel;

/// Bidirectional time ↔ pixel mapping for one viewport.
#[derive(Debug, Clone)]
pub struct CoordinateMapper {
    config: LookupConfig,
    viewport_width: f64,
    current_time: f64,
    duration: f64,
    resolution: f64,
    gaps: Option<Arc<GapModel>>,
    lookup: Option<Lookup>,
    prev_window: Option<(f64, f64)>,
    updated: bool,
}

impl CoordinateMapper {
    pub fn new(viewport_width: f64, config: LookupConfig) -> Self {
        Self {
            config,
            viewport_width,
            current_time: 0.0,
            duration: 0.0,
            resolution: 0.0,
            gaps: None,
            lookup: None,
            prev_window: None,
            updated: false,
        }
    }

    /// Window duration that shows tiles of `tile_duration` at their
    /// nominal pixel width.
    pub fn calc_ideal_window_duration(tile_duration: f64, viewport_width: f64, tile_width: f64) -> f64 {
        tile_duration * viewport_width / tile_width
    }

    pub fn config(&self) -> &LookupConfig {
        &self.config
    }

    pub fn set_current_time(&mut self, time: f64) {
        self.current_time = time;
        self.rebuild();
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    /// Set the window duration; resolution becomes `duration / viewport_width`.
    pub fn set_window_duration(&mut self, duration: f64) {
        self.duration = duration;
        self.update_resolution();
        self.rebuild();
    }

    pub fn set_viewport_width(&mut self, width: f64) {
        self.viewport_width = width;
        self.update_resolution();
        self.rebuild();
    }

    pub fn viewport_width(&self) -> f64 {
        self.viewport_width
    }

    /// Attach a location's gap model and rebuild around it.
    pub fn set_gaps(&mut self, model: Arc<GapModel>) {
        self.gaps = Some(model);
        self.rebuild();
    }

    /// Detach the gap model; queries fall back to the plain window.
    pub fn clear_gaps(&mut self) {
        self.gaps = None;
        self.lookup = None;
    }

    pub fn gap_model(&self) -> Option<&Arc<GapModel>> {
        self.gaps.as_ref()
    }

    pub fn lookup(&self) -> Option<&Lookup> {
        self.lookup.as_ref()
    }

    /// Milliseconds of timeline per pixel at true scale.
    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    /// The requested window duration, ignoring gap compression.
    pub fn ideal_window_duration(&self) -> f64 {
        self.duration
    }

    pub fn window_start(&self) -> f64 {
        self.px_to_time(0.0)
    }

    pub fn window_end(&self) -> f64 {
        self.px_to_time(self.viewport_width)
    }

    /// Time actually spanned by the viewport, including compressed gaps.
    pub fn window_duration(&self) -> f64 {
        self.window_end() - self.window_start()
    }

    pub fn time_to_px(&self, time: f64) -> f64 {
        match &self.lookup {
            Some(lookup) => lookup.time_to_px(time),
            None if self.resolution > 0.0 => (time - self.naive_start()) / self.resolution,
            None => self.viewport_width / 2.0,
        }
    }

    pub fn px_to_time(&self, px: f64) -> f64 {
        match &self.lookup {
            Some(lookup) => lookup.px_to_time(px),
            None => self.naive_start() + px * self.resolution,
        }
    }

    /// Pixel distance from `time_start` to `time_end`.
    pub fn duration_to_px(&self, time_start: f64, time_end: f64) -> f64 {
        self.time_to_px(time_end) - self.time_to_px(time_start)
    }

    /// Absolute time spanned between two pixel positions.
    pub fn px_to_duration(&self, x1: f64, x2: f64) -> f64 {
        (self.px_to_time(x2) - self.px_to_time(x1)).abs()
    }

    /// Gap segments overlapping `[start, end)`.
    pub fn get_gaps(&self, start: f64, end: f64) -> Vec<LookupSegment> {
        match &self.lookup {
            Some(lookup) => lookup.overlapping(start, end, true),
            None => Vec::new(),
        }
    }

    /// Audio segments overlapping `[start, end)`.
    ///
    /// Without a lookup the whole interval is one audio period.
    pub fn get_audio_periods(&self, start: f64, end: f64) -> Vec<LookupSegment> {
        match &self.lookup {
            Some(lookup) => lookup.overlapping(start, end, false),
            None if end > start => vec![LookupSegment {
                time_start: start,
                time_end: end,
                pixel_start: self.time_to_px(start),
                pixel_end: self.time_to_px(end),
                time_scale: 1.0,
                is_gap: false,
            }],
            None => Vec::new(),
        }
    }

    /// The lookup segment containing `time`, clamped to the covered range.
    pub fn segment_at(&self, time: f64) -> Option<&LookupSegment> {
        self.lookup.as_ref().map(|l| l.segment_at_time(time))
    }

    pub fn gap_at_time(&self, time: f64) -> bool {
        self.get_gap(time).is_some()
    }

    /// The gap segment containing `time`, if any.
    pub fn get_gap(&self, time: f64) -> Option<LookupSegment> {
        self.segment_at(time).filter(|s| s.is_gap).copied()
    }

    /// Recompute [`updated`](Self::updated): true iff the window moved
    /// since the previous tick.
    pub fn tick(&mut self) {
        let window = (self.window_start(), self.window_end());
        self.updated = self.prev_window != Some(window);
        self.prev_window = Some(window);
    }

    pub fn updated(&self) -> bool {
        self.updated
    }

    fn naive_start(&self) -> f64 {
        self.current_time - self.duration / 2.0
    }

    fn update_resolution(&mut self) {
        self.resolution = if self.viewport_width > 0.0 {
            self.duration / self.viewport_width
        } else {
            0.0
        };
    }

    fn rebuild(&mut self) {
        let Some(model) = &self.gaps else {
            return;
        };
        self.lookup = build_lookup(
            self.current_time,
            self.resolution,
            model.gaps(),
            self.viewport_width,
            &self.config,
        );
        if let Some(lookup) = &self.lookup {
            tracing::trace!(
                location = model.location(),
                segments = lookup.segments().len(),
                resolution = self.resolution,
                "Rebuilt time lookup"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gaps::{GapInterval, GapModelOptions, TimeRange};

    fn model(gaps: Vec<GapInterval>) -> Arc<GapModel> {
        Arc::new(
            GapModel::new("Hawaii", TimeRange::new(0.0, 1e9), gaps, &GapModelOptions::default())
                .unwrap(),
        )
    }

    fn mapper_with(gaps: Vec<GapInterval>) -> CoordinateMapper {
        let mut mapper = CoordinateMapper::new(1000.0, LookupConfig::default());
        mapper.set_gaps(model(gaps));
        mapper.set_current_time(0.0);
        mapper.set_window_duration(500_000.0);
        mapper
    }

    #[test]
    fn test_naive_window_before_gaps() {
        let mut mapper = CoordinateMapper::new(1000.0, LookupConfig::default());
        mapper.set_current_time(1_000_000.0);
        mapper.set_window_duration(500_000.0);
        assert!(mapper.lookup().is_none());
        assert_eq!(mapper.window_start(), 750_000.0);
        assert_eq!(mapper.window_end(), 1_250_000.0);
        assert_eq!(mapper.time_to_px(1_000_000.0), 500.0);
        assert!(mapper.get_gaps(0.0, 2e6).is_empty());
        let audio = mapper.get_audio_periods(750_000.0, 1_250_000.0);
        assert_eq!(audio.len(), 1);
        assert_eq!(audio[0].pixel_start, 0.0);
        assert_eq!(audio[0].pixel_end, 1000.0);
    }

    #[test]
    fn test_zero_width_does_not_panic() {
        let mut mapper = CoordinateMapper::new(0.0, LookupConfig::default());
        mapper.set_gaps(model(vec![]));
        mapper.set_window_duration(500_000.0);
        assert_eq!(mapper.resolution(), 0.0);
        assert!(mapper.lookup().is_none());
        assert_eq!(mapper.time_to_px(123.0), 0.0);
    }

    #[test]
    fn test_gap_rendered_at_true_width() {
        let mapper = mapper_with(vec![GapInterval::new(100_000.0, 200_000.0)]);
        assert_eq!(mapper.resolution(), 500.0);
        let gaps = mapper.get_gaps(0.0, 1e6);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].time_scale, 1.0);
        assert!((mapper.duration_to_px(100_000.0, 200_000.0) - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_long_gap_compressed() {
        let mapper = mapper_with(vec![GapInterval::new(100_000.0, 900_000.0)]);
        let gap = mapper.get_gap(500_000.0).unwrap();
        assert!((gap.time_scale - 0.1875).abs() < 1e-12);
        assert!((mapper.duration_to_px(100_000.0, 900_000.0) - 300.0).abs() < 1e-9);
        assert!(mapper.gap_at_time(100_000.0));
        assert!(!mapper.gap_at_time(900_000.0));
    }

    #[test]
    fn test_window_spans_compressed_gap() {
        // Gap left of centre is squeezed, so the window covers more time.
        let mut mapper = mapper_with(vec![GapInterval::new(-900_000.0, -100_000.0)]);
        mapper.set_current_time(0.0);
        assert!(mapper.window_duration() > mapper.ideal_window_duration());
    }

    #[test]
    fn test_tick_reports_window_changes() {
        let mut mapper = mapper_with(vec![]);
        mapper.tick();
        assert!(mapper.updated());
        mapper.tick();
        assert!(!mapper.updated());
        mapper.set_current_time(10_000.0);
        mapper.tick();
        assert!(mapper.updated());
    }

    #[test]
    fn test_viewport_width_change_rebuilds() {
        let mut mapper = mapper_with(vec![]);
        mapper.set_viewport_width(2000.0);
        assert_eq!(mapper.resolution(), 250.0);
        assert_eq!(mapper.time_to_px(0.0), 1000.0);
    }

    #[test]
    fn test_clear_gaps_falls_back() {
        let mut mapper = mapper_with(vec![GapInterval::new(100_000.0, 900_000.0)]);
        mapper.clear_gaps();
        assert!(mapper.get_gap(500_000.0).is_none());
        assert_eq!(mapper.window_start(), -250_000.0);
    }

    #[test]
    fn test_px_to_duration_is_absolute() {
        let mapper = mapper_with(vec![]);
        assert_eq!(mapper.px_to_duration(600.0, 500.0), 50_000.0);
    }

    #[test]
    fn test_ideal_window_duration() {
        let ideal = CoordinateMapper::calc_ideal_window_duration(3_600_000.0, 1024.0, 512.0);
        assert_eq!(ideal, 7_200_000.0);
    }
}
