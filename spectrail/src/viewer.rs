//! Timeline: the mapper, tile streamer and classification feed driven
//! together, one frame at a time.
//!
//! Each [`Timeline::frame`] runs the stages in a fixed order:
//!
//! 1. the mapper compares its window with the previous frame (`tick`);
//! 2. the tile streamer runs its pass against the mapper;
//! 3. the classification feed refreshes its bars;
//! 4. below the similarity breakpoint the classification layer fades out
//!    and the similarity feed takes over;
//! 5. tiles are painted and gap bands positioned.
//!
//! Setters rebuild the mapper's lookup immediately, so every stage of the
//! next frame sees the same mapping.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::gaps::GapModel;
use crate::heatmap::ClassificationFeed;
use crate::mapper::CoordinateMapper;
use crate::overlay::{gap_bands, GapBand, DEFAULT_LABEL_MIN_WIDTH_PX};
use crate::similarity::{intensity_scale, SimilarityBand, SimilarityFeed};
use crate::streamer::{FrameContext, FrameReport, RenderTarget, TileStreamer, ViewportDebounce};

/// Result of one [`Timeline::frame`].
#[derive(Debug, Clone, Default)]
pub struct TimelineFrame {
    pub tiles: FrameReport,
    /// Sprites painted this frame.
    pub drawn: usize,
    /// Whether the visible window moved since the previous frame.
    pub window_changed: bool,
    pub gap_bands: Vec<GapBand>,
    /// Opacity of the classification layer, in `[0, 1]`.
    pub classification_opacity: f64,
    /// Similarity bands, empty while classification is fully shown.
    pub similarity_bands: Vec<SimilarityBand>,
}

/// Display duration, in milliseconds, below which similarity replaces
/// classification.
pub const DEFAULT_SIMILARITY_BREAKPOINT_MS: f64 = 80_000.0;

/// Time for the classification layer to fade fully in or out.
pub const DEFAULT_LAYER_FADE: Duration = Duration::from_millis(100);

/// One pannable, zoomable spectrogram timeline.
#[derive(Debug)]
pub struct Timeline {
    mapper: CoordinateMapper,
    streamer: TileStreamer,
    feed: Option<ClassificationFeed>,
    similarity: Option<SimilarityFeed>,
    similarity_breakpoint: f64,
    classification_opacity: f64,
    debounce: ViewportDebounce,
    display_duration: f64,
    label_min_width_px: f64,
}

impl Timeline {
    pub fn new(mapper: CoordinateMapper, streamer: TileStreamer) -> Self {
        let debounce = ViewportDebounce::new(streamer.config().debounce);
        let display_duration = streamer.pyramid().duration(streamer.config().zoom_range.min);
        let mut timeline = Self {
            mapper,
            streamer,
            feed: None,
            similarity: None,
            similarity_breakpoint: DEFAULT_SIMILARITY_BREAKPOINT_MS,
            classification_opacity: 1.0,
            debounce,
            display_duration,
            label_min_width_px: DEFAULT_LABEL_MIN_WIDTH_PX,
        };
        timeline.apply_window_duration();
        timeline
    }

    pub fn with_feed(mut self, feed: ClassificationFeed) -> Self {
        self.feed = Some(feed);
        self
    }

    pub fn with_similarity(mut self, similarity: SimilarityFeed) -> Self {
        self.similarity = Some(similarity);
        self
    }

    pub fn with_similarity_breakpoint(mut self, duration: f64) -> Self {
        self.similarity_breakpoint = duration;
        self
    }

    pub fn with_label_min_width_px(mut self, px: f64) -> Self {
        self.label_min_width_px = px;
        self
    }

    /// Switch every component to `model`'s location.
    ///
    /// Must be called within a tokio runtime.
    pub fn set_location(&mut self, model: Arc<GapModel>) {
        self.mapper.set_gaps(Arc::clone(&model));
        if let Some(feed) = &mut self.feed {
            feed.set_location(model.location());
        }
        if let Some(similarity) = &mut self.similarity {
            similarity.set_location(model.location());
        }
        self.streamer.set_location(model);
    }

    /// Move the anchor (window centre) to `time`.
    pub fn set_time(&mut self, time: f64, now: Instant) {
        self.mapper.set_current_time(time);
        self.debounce.note_change(now);
    }

    /// Show tiles of `duration` at their nominal width.
    pub fn set_duration(&mut self, duration: f64, now: Instant) {
        self.display_duration = duration;
        self.apply_window_duration();
        self.debounce.note_change(now);
    }

    pub fn set_viewport_width(&mut self, width: f64, now: Instant) {
        self.mapper.set_viewport_width(width);
        self.apply_window_duration();
        self.debounce.note_change(now);
    }

    fn apply_window_duration(&mut self) {
        self.mapper
            .set_window_duration(CoordinateMapper::calc_ideal_window_duration(
                self.display_duration,
                self.mapper.viewport_width(),
                self.streamer.config().tile_width,
            ));
    }

    /// Run one frame and paint into `target`.
    ///
    /// `elapsed` is the wall time since the previous frame; it drives fades.
    pub fn frame(&mut self, now: Instant, elapsed: Duration, target: &mut dyn RenderTarget) -> TimelineFrame {
        self.mapper.tick();
        let window_changed = self.mapper.updated();

        let ctx = FrameContext::new(now, elapsed, &self.debounce);
        let tiles = self.streamer.frame(&self.mapper, &ctx, self.display_duration);

        if let Some(feed) = &mut self.feed {
            feed.update(&self.mapper);
        }
        self.fade_classification(elapsed);
        let similarity_bands = self.update_similarity();

        let drawn = self.streamer.render(&self.mapper, self.display_duration, target);
        TimelineFrame {
            tiles,
            drawn,
            window_changed,
            gap_bands: gap_bands(&self.mapper, self.label_min_width_px),
            classification_opacity: self.classification_opacity,
            similarity_bands,
        }
    }

    /// True while the display duration is below the similarity breakpoint.
    pub fn shows_similarity(&self) -> bool {
        self.display_duration < self.similarity_breakpoint
    }

    fn fade_classification(&mut self, elapsed: Duration) {
        let target = if self.shows_similarity() { 0.0 } else { 1.0 };
        let step = elapsed.as_secs_f64() / DEFAULT_LAYER_FADE.as_secs_f64();
        self.classification_opacity = if target > self.classification_opacity {
            (self.classification_opacity + step).min(target)
        } else {
            (self.classification_opacity - step).max(target)
        };
    }

    fn update_similarity(&mut self) -> Vec<SimilarityBand> {
        let Some(similarity) = &mut self.similarity else {
            return Vec::new();
        };
        if self.classification_opacity >= 1.0 {
            similarity.clear();
            return Vec::new();
        }
        similarity.update(&self.mapper);
        let average = self.feed.as_ref().map_or(0.0, |f| f.average_score());
        similarity.bands(&self.mapper, intensity_scale(average))
    }

    pub fn mapper(&self) -> &CoordinateMapper {
        &self.mapper
    }

    pub fn streamer(&self) -> &TileStreamer {
        &self.streamer
    }

    pub fn feed(&self) -> Option<&ClassificationFeed> {
        self.feed.as_ref()
    }

    pub fn similarity(&self) -> Option<&SimilarityFeed> {
        self.similarity.as_ref()
    }

    pub fn display_duration(&self) -> f64 {
        self.display_duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gaps::{GapInterval, GapModelOptions, TimeRange};
    use crate::heatmap::SyntheticClassificationSource;
    use crate::mapper::LookupConfig;
    use crate::pyramid::SpectrogramNaming;
    use crate::similarity::SyntheticSimilaritySource;
    use crate::streamer::{RecordingTarget, StreamerConfig, SyntheticAssetSource};

    const HOUR: f64 = 3_600_000.0;
    const T0: f64 = 1_423_612_800_000.0;

    fn timeline(config: StreamerConfig) -> Timeline {
        let mapper = CoordinateMapper::new(1024.0, LookupConfig::default());
        let streamer = TileStreamer::new(
            config,
            Arc::new(SpectrogramNaming::default()),
            Arc::new(SyntheticAssetSource::new()),
        );
        let feed = ClassificationFeed::new(Arc::new(SyntheticClassificationSource::default()));
        Timeline::new(mapper, streamer).with_feed(feed)
    }

    fn model() -> Arc<GapModel> {
        Arc::new(
            GapModel::new(
                "Hawaii",
                TimeRange::new(T0, T0 + 20.0 * 24.0 * HOUR),
                vec![GapInterval::new(T0 + 5.0 * 24.0 * HOUR, T0 + 7.0 * 24.0 * HOUR)],
                &GapModelOptions::default(),
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_set_duration_sizes_window() {
        let mut timeline = timeline(StreamerConfig::default());
        timeline.set_duration(HOUR, Instant::now());
        // 1024 px of 512 px tiles: two tile durations.
        assert_eq!(timeline.mapper().ideal_window_duration(), 2.0 * HOUR);
        assert_eq!(timeline.display_duration(), HOUR);
    }

    #[tokio::test]
    async fn test_frames_converge() {
        let config = StreamerConfig::default().with_debounce(Duration::ZERO);
        let mut timeline = timeline(config);
        timeline.set_location(model());

        let start = Instant::now();
        timeline.set_time(T0 + 10.0 * 24.0 * HOUR, start);
        timeline.set_duration(HOUR, start);

        let mut target = RecordingTarget::new();
        let first = timeline.frame(start, Duration::ZERO, &mut target);
        assert!(first.window_changed);

        let mut last = first;
        for i in 1..12 {
            for _ in 0..4 {
                tokio::task::yield_now().await;
            }
            last = timeline.frame(
                start + Duration::from_millis(100 * i),
                Duration::from_millis(100),
                &mut target,
            );
        }
        assert!(!last.window_changed);
        assert!(last.tiles.all_loaded);
        assert!(last.drawn > 0);
        assert!(timeline.streamer().is_ready());
        assert!(timeline.feed().is_some_and(|f| !f.bars().is_empty()));
    }

    #[tokio::test]
    async fn test_gap_bands_reported() {
        let mut timeline = timeline(StreamerConfig::default());
        timeline.set_location(model());
        let now = Instant::now();
        // Anchor on the gap's end with a two-day window.
        timeline.set_time(T0 + 7.0 * 24.0 * HOUR, now);
        timeline.set_duration(HOUR * 24.0, now);

        let mut target = RecordingTarget::new();
        let frame = timeline.frame(now, Duration::ZERO, &mut target);
        assert_eq!(frame.gap_bands.len(), 1);
        let band = &frame.gap_bands[0];
        assert!((band.width - LookupConfig::default().gap_max_px).abs() < 1e-6);
        assert!(band.label.is_some());
    }

    async fn run(timeline: &mut Timeline, start: Instant, frames: u64) -> TimelineFrame {
        let mut target = RecordingTarget::new();
        let mut last = timeline.frame(start, Duration::ZERO, &mut target);
        for i in 1..=frames {
            for _ in 0..4 {
                tokio::task::yield_now().await;
            }
            last = timeline.frame(
                start + Duration::from_millis(50 * i),
                Duration::from_millis(50),
                &mut target,
            );
        }
        last
    }

    #[tokio::test]
    async fn test_similarity_takes_over_below_breakpoint() {
        let source = SyntheticSimilaritySource::default();
        let config = StreamerConfig::default().with_debounce(Duration::ZERO);
        let mut timeline =
            timeline(config).with_similarity(SimilarityFeed::new(Arc::new(source.clone())));
        timeline.set_location(model());

        let start = Instant::now();
        timeline.set_time(T0 + 10.0 * 24.0 * HOUR + HOUR / 32.0, start);
        // 60 s tiles: a 120 s window, under the similarity window cap.
        timeline.set_duration(60_000.0, start);
        assert!(timeline.shows_similarity());

        let frame = run(&mut timeline, start, 8).await;
        assert_eq!(frame.classification_opacity, 0.0);
        assert!(source.fetch_count() > 0);
        assert!(!frame.similarity_bands.is_empty());
        assert!(timeline.similarity().is_some_and(|s| !s.profile().is_empty()));
        // Classification keeps updating underneath.
        assert!(timeline.feed().is_some_and(|f| !f.bars().is_empty()));
    }

    #[tokio::test]
    async fn test_classification_shown_above_breakpoint() {
        let source = SyntheticSimilaritySource::default();
        let mut timeline = timeline(StreamerConfig::default())
            .with_similarity(SimilarityFeed::new(Arc::new(source.clone())));
        timeline.set_location(model());

        let start = Instant::now();
        timeline.set_time(T0 + 10.0 * 24.0 * HOUR, start);
        timeline.set_duration(HOUR, start);
        assert!(!timeline.shows_similarity());

        let frame = run(&mut timeline, start, 4).await;
        assert_eq!(frame.classification_opacity, 1.0);
        assert!(frame.similarity_bands.is_empty());
        assert_eq!(source.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_classification_fades_over_layer_fade() {
        let mut timeline = timeline(StreamerConfig::default());
        let start = Instant::now();
        timeline.set_duration(60_000.0, start);

        let mut target = RecordingTarget::new();
        let half = DEFAULT_LAYER_FADE / 2;
        let frame = timeline.frame(start, half, &mut target);
        assert!((frame.classification_opacity - 0.5).abs() < 1e-9);
        let frame = timeline.frame(start + half, half, &mut target);
        assert_eq!(frame.classification_opacity, 0.0);

        timeline.set_duration(HOUR, start);
        let frame = timeline.frame(start + DEFAULT_LAYER_FADE, DEFAULT_LAYER_FADE, &mut target);
        assert_eq!(frame.classification_opacity, 1.0);
    }
}
