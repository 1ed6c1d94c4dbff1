//! Similarity overlay for close-up zoom levels.
//!
//! Each similarity tile holds a self-similarity matrix of its audio. At the
//! centre of the window the feed reads one interpolated row, which
//! highlights sounds repeating the one under the playhead, and it keeps
//! per-row averages for a heatmap strip.
//!
//! Tiles are fetched at a fixed zoom level over the audio in the visible
//! window, and only while the ideal window is short enough for the detail
//! to be legible.

mod source;
mod tile;

pub use source::{ImageSimilaritySource, SimilaritySource, SyntheticSimilaritySource};
pub use tile::{SimilarityCell, SimilarityMatrix, SimilarityTile, DEFAULT_VALUE_EXPONENT};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::mapper::CoordinateMapper;
use crate::pyramid::{SimilarityNaming, TileDescriptor, TileNaming, ZoomPyramid, ZoomRange};
use crate::streamer::FetchError;
use tile::SimilarityTileState;

/// Zoom level of similarity tiles.
pub const SIMILARITY_ZOOM: i32 = 4;

/// Longest ideal window, in milliseconds, for which similarity is shown.
pub const DEFAULT_MAX_WINDOW_MS: f64 = 440_000.0;

/// Bands dimmer than this are not drawn.
const MIN_INTENSITY: f64 = 0.01;

/// Shapes band intensity after scaling.
const INTENSITY_EXPONENT: f64 = 0.8;

/// Overall similarity scaling for a mean classification score.
///
/// Quiet stretches dim the overlay; it never drops below 0.1.
pub fn intensity_scale(average_score: f64) -> f64 {
    average_score.max(0.0).sqrt() * 0.9 + 0.1
}

/// A similarity cell positioned on screen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityBand {
    pub x: f64,
    pub width: f64,
    /// In `(0.01, 1]`.
    pub intensity: f64,
}

struct Completion {
    key: String,
    result: Result<SimilarityMatrix, FetchError>,
}

/// Streams similarity tiles for the current window.
pub struct SimilarityFeed {
    source: Arc<dyn SimilaritySource>,
    naming: SimilarityNaming,
    pyramid: ZoomPyramid,
    max_window_duration: f64,
    location: Option<String>,
    tiles: HashMap<String, SimilarityTile>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
    profile: Vec<SimilarityCell>,
    averages: Vec<SimilarityCell>,
}

impl std::fmt::Debug for SimilarityFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimilarityFeed")
            .field("location", &self.location)
            .field("tiles", &self.tiles.len())
            .field("profile", &self.profile.len())
            .finish_non_exhaustive()
    }
}

impl SimilarityFeed {
    pub fn new(source: Arc<dyn SimilaritySource>) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            source,
            naming: SimilarityNaming::default(),
            pyramid: ZoomPyramid::hourly(ZoomRange::SIMILARITY),
            max_window_duration: DEFAULT_MAX_WINDOW_MS,
            location: None,
            tiles: HashMap::new(),
            completions_tx,
            completions_rx,
            profile: Vec::new(),
            averages: Vec::new(),
        }
    }

    pub fn with_max_window_duration(mut self, duration: f64) -> Self {
        self.max_window_duration = duration;
        self
    }

    /// Forget all data and switch to `location`.
    pub fn set_location(&mut self, location: impl Into<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.completions_tx = tx;
        self.completions_rx = rx;
        self.tiles.clear();
        self.clear();
        self.location = Some(location.into());
    }

    /// True if the mapper's ideal window is short enough to show similarity.
    pub fn is_active(&self, mapper: &CoordinateMapper) -> bool {
        mapper.ideal_window_duration() <= self.max_window_duration
    }

    /// Drop the current profile and averages. Resident tiles are kept.
    pub fn clear(&mut self) {
        self.profile.clear();
        self.averages.clear();
    }

    /// Tiles over the audio in the visible window, deduplicated by key.
    fn wanted(&self, mapper: &CoordinateMapper, location: &str) -> Vec<TileDescriptor> {
        let (start, end) = (mapper.window_start(), mapper.window_end());
        let mut seen = HashSet::new();
        let mut wanted = Vec::new();
        for period in mapper.get_audio_periods(start, end) {
            let spans = self.pyramid.get_range(
                start.max(period.time_start),
                end.min(period.time_end),
                SIMILARITY_ZOOM,
            );
            for descriptor in self.naming.describe(location, spans) {
                if seen.insert(descriptor.resource_key.clone()) {
                    wanted.push(descriptor);
                }
            }
        }
        wanted
    }

    /// Refresh the profile and averages for the mapper's current window.
    ///
    /// Must be called within a tokio runtime.
    pub fn update(&mut self, mapper: &CoordinateMapper) {
        self.drain_completions();

        let Some(location) = self.location.clone() else {
            return;
        };
        if !self.is_active(mapper) {
            self.clear();
            return;
        }

        let wanted = self.wanted(mapper, &location);
        for descriptor in &wanted {
            if !self.tiles.contains_key(&descriptor.resource_key) {
                self.start_fetch(descriptor);
            }
        }
        let keys: HashSet<&str> = wanted.iter().map(|d| d.resource_key.as_str()).collect();
        self.tiles.retain(|key, _| keys.contains(key.as_str()));

        let centre = (mapper.window_start() + mapper.window_end()) / 2.0;
        let mut profile = Vec::new();
        let mut averages = Vec::new();
        for descriptor in &wanted {
            if let Some(tile) = self.tiles.get(&descriptor.resource_key) {
                profile.extend(tile.profile_at(centre, DEFAULT_VALUE_EXPONENT));
                averages.extend(tile.averages());
            }
        }
        self.profile = profile;
        self.averages = averages;
    }

    fn start_fetch(&mut self, descriptor: &TileDescriptor) {
        let key = descriptor.resource_key.clone();
        let fetch = self.source.fetch_matrix(descriptor);
        let tx = self.completions_tx.clone();
        let task_key = key.clone();
        tokio::spawn(async move {
            let result = fetch.await;
            let _ = tx.send(Completion {
                key: task_key,
                result,
            });
        });
        tracing::trace!(key = %key, "Similarity fetch started");
        self.tiles.insert(key, SimilarityTile::loading(descriptor.span));
    }

    fn drain_completions(&mut self) {
        while let Ok(completion) = self.completions_rx.try_recv() {
            let Some(tile) = self.tiles.get_mut(&completion.key) else {
                continue;
            };
            tile.state = match completion.result {
                Ok(matrix) => SimilarityTileState::Loaded(matrix),
                Err(e) => {
                    tracing::debug!(key = %completion.key, error = %e, "Similarity fetch failed");
                    SimilarityTileState::Failed
                }
            };
        }
    }

    /// Similarity profile at the window centre.
    pub fn profile(&self) -> &[SimilarityCell] {
        &self.profile
    }

    /// Per-row averages of the wanted tiles.
    pub fn averages(&self) -> &[SimilarityCell] {
        &self.averages
    }

    /// On-screen bands for the profile, scaled by `scaling`.
    pub fn bands(&self, mapper: &CoordinateMapper, scaling: f64) -> Vec<SimilarityBand> {
        let (start, end) = (mapper.window_start(), mapper.window_end());
        let width = mapper.viewport_width();
        self.profile
            .iter()
            .filter(|c| c.overlaps(start, end))
            .filter_map(|c| {
                let intensity = (c.value * scaling).clamp(0.0, 1.0).powf(INTENSITY_EXPONENT);
                let x = mapper.time_to_px(c.time_start);
                let x_end = mapper.time_to_px(c.time_end());
                let visible = x_end >= 0.0 && x <= width;
                (intensity > MIN_INTENSITY && visible).then_some(SimilarityBand {
                    x,
                    width: x_end - x,
                    intensity,
                })
            })
            .collect()
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    pub fn loaded_count(&self) -> usize {
        self.tiles.values().filter(|t| t.is_loaded()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gaps::{GapModel, TimeRange};
    use crate::mapper::LookupConfig;
    use crate::pyramid::HOUR_MS;

    const WIDTH: f64 = 1000.0;
    /// Start of a similarity tile.
    const T: f64 = HOUR_MS * 1000.0;
    const TILE: f64 = HOUR_MS / 16.0;

    fn mapper(anchor: f64, window: f64) -> CoordinateMapper {
        let mut mapper = CoordinateMapper::new(WIDTH, LookupConfig::default());
        mapper.set_gaps(Arc::new(GapModel::without_gaps(
            "Hawaii",
            TimeRange::new(0.0, 2.0 * T),
        )));
        mapper.set_current_time(anchor);
        mapper.set_window_duration(window);
        mapper
    }

    fn feed(source: &SyntheticSimilaritySource) -> SimilarityFeed {
        let mut feed = SimilarityFeed::new(Arc::new(source.clone()));
        feed.set_location("Hawaii");
        feed
    }

    async fn settle() {
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn test_intensity_scale_bounds() {
        assert!((intensity_scale(0.0) - 0.1).abs() < 1e-12);
        assert!((intensity_scale(1.0) - 1.0).abs() < 1e-12);
        assert!((intensity_scale(-1.0) - 0.1).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_inactive_for_long_windows() {
        let source = SyntheticSimilaritySource::default();
        let mut feed = feed(&source);
        let mapper = mapper(T, DEFAULT_MAX_WINDOW_MS * 2.0);
        assert!(!feed.is_active(&mapper));
        feed.update(&mapper);
        assert_eq!(source.fetch_count(), 0);
        assert!(feed.profile().is_empty());
    }

    #[tokio::test]
    async fn test_fetches_each_window_tile_once() {
        let source = SyntheticSimilaritySource::default();
        let mut feed = feed(&source);
        // Window just past a tile boundary spans two tiles.
        let mapper = mapper(T + 1000.0, 200_000.0);
        feed.update(&mapper);
        assert_eq!(source.fetch_count(), 2);
        assert_eq!(feed.tile_count(), 2);

        for _ in 0..3 {
            settle().await;
            feed.update(&mapper);
        }
        assert_eq!(source.fetch_count(), 2);
        assert_eq!(feed.loaded_count(), 2);
        // Only the tile holding the centre yields a profile row.
        assert_eq!(feed.profile().len(), 64);
        assert_eq!(feed.averages().len(), 128);
    }

    #[tokio::test]
    async fn test_bands_on_screen() {
        let source = SyntheticSimilaritySource::default();
        let mut feed = feed(&source);
        let mapper = mapper(T + TILE / 2.0, 200_000.0);
        for _ in 0..3 {
            feed.update(&mapper);
            settle().await;
        }
        feed.update(&mapper);

        let bands = feed.bands(&mapper, 1.0);
        assert!(!bands.is_empty());
        assert!(bands
            .iter()
            .all(|b| b.intensity > MIN_INTENSITY && b.intensity <= 1.0));
        assert!(bands.iter().all(|b| b.x <= WIDTH && b.x + b.width >= 0.0));
        // The diagonal sits at the window centre.
        let brightest = bands
            .iter()
            .max_by(|a, b| a.intensity.total_cmp(&b.intensity))
            .unwrap();
        assert!((brightest.x + brightest.width / 2.0 - WIDTH / 2.0).abs() < 100.0);
    }

    #[tokio::test]
    async fn test_tiles_leaving_window_are_dropped() {
        let source = SyntheticSimilaritySource::default();
        let mut feed = feed(&source);
        feed.update(&mapper(T + TILE / 2.0, 200_000.0));
        assert_eq!(feed.tile_count(), 1);

        feed.update(&mapper(T + 10.0 * TILE + TILE / 2.0, 200_000.0));
        assert_eq!(feed.tile_count(), 1);
        assert_eq!(source.fetch_count(), 2);
    }
}
