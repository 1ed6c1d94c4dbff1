//! Classification score feed.
//!
//! Bars are sized so one bar is roughly [`DEFAULT_BAR_WIDTH_PX`] pixels
//! wide. Scores are fetched in data tiles [`DEFAULT_ZOOM_OUT_FACTOR`] zoom
//! levels coarser than the bars, so one tile holds `2^12` bars.
//!
//! The feed fetches at most one data tile at a time: a new fetch starts only
//! when nothing is in flight. While a tile is missing its span is filled
//! from a coarser loaded tile, or failing that from finer loaded tiles
//! averaged down.

mod source;
mod tile;

pub use source::{ClassificationSource, HttpClassificationSource, SyntheticClassificationSource};
pub use tile::{bars_from_pairs, downsample, DataTile, ScoreBar};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::mapper::CoordinateMapper;
use crate::pyramid::{TileSpan, ZoomPyramid, ZoomRange};
use crate::streamer::FetchError;
use tile::DataTileState;

/// Target on-screen width of one score bar, in pixels.
pub const DEFAULT_BAR_WIDTH_PX: f64 = 10.0;

/// Zoom levels between a bar and the data tile holding it.
pub const DEFAULT_ZOOM_OUT_FACTOR: i32 = 12;

/// Data tiles are loaded this many ideal windows beyond each window edge.
pub const DEFAULT_LOAD_MARGIN_WINDOWS: f64 = 2.0;

/// Tiles are keyed by bar zoom and start time in whole milliseconds.
type TileKey = (i32, i64);

fn tile_key(bar_zoom: i32, time: f64) -> TileKey {
    (bar_zoom, time.round() as i64)
}

struct Completion {
    key: TileKey,
    result: Result<Vec<(f64, f64)>, FetchError>,
}

/// Streams classification scores for the current window.
pub struct ClassificationFeed {
    source: Arc<dyn ClassificationSource>,
    pyramid: ZoomPyramid,
    bar_width_px: f64,
    zoom_out_factor: i32,
    location: Option<String>,
    tiles: HashMap<TileKey, DataTile>,
    in_flight: usize,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
    bars: Vec<ScoreBar>,
    bar_zoom: i32,
}

impl std::fmt::Debug for ClassificationFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassificationFeed")
            .field("location", &self.location)
            .field("tiles", &self.tiles.len())
            .field("in_flight", &self.in_flight)
            .field("bars", &self.bars.len())
            .finish_non_exhaustive()
    }
}

impl ClassificationFeed {
    pub fn new(source: Arc<dyn ClassificationSource>) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            source,
            pyramid: ZoomPyramid::hourly(ZoomRange::CLASSIFICATION),
            bar_width_px: DEFAULT_BAR_WIDTH_PX,
            zoom_out_factor: DEFAULT_ZOOM_OUT_FACTOR,
            location: None,
            tiles: HashMap::new(),
            in_flight: 0,
            completions_tx,
            completions_rx,
            bars: Vec::new(),
            bar_zoom: ZoomRange::CLASSIFICATION.min,
        }
    }

    pub fn with_bar_width_px(mut self, px: f64) -> Self {
        self.bar_width_px = px;
        self
    }

    /// Forget all data and switch to `location`.
    pub fn set_location(&mut self, location: impl Into<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.completions_tx = tx;
        self.completions_rx = rx;
        self.tiles.clear();
        self.bars.clear();
        self.in_flight = 0;
        self.location = Some(location.into());
    }

    /// Bar zoom level for the mapper's current resolution.
    pub fn bar_zoom_for(&self, mapper: &CoordinateMapper) -> i32 {
        self.pyramid.zoom_level(mapper.resolution() * self.bar_width_px)
    }

    /// Data tiles for bars at `bar_zoom` over `[start, end)`, without those
    /// lying entirely inside one gap.
    fn data_tiles(&self, mapper: &CoordinateMapper, start: f64, end: f64, bar_zoom: i32) -> Vec<TileSpan> {
        let gaps = mapper.get_gaps(start, end);
        self.pyramid
            .get_range(start, end, bar_zoom - self.zoom_out_factor)
            .into_iter()
            .filter(|s| {
                !gaps
                    .iter()
                    .any(|g| g.time_start <= s.time && g.time_end >= s.end())
            })
            .collect()
    }

    fn loaded_tile(&self, bar_zoom: i32, time: f64) -> Option<&DataTile> {
        self.tiles
            .get(&tile_key(bar_zoom, time))
            .filter(|t| t.is_loaded())
    }

    /// Refresh bars for the mapper's current window.
    pub fn update(&mut self, mapper: &CoordinateMapper) {
        self.drain_completions();

        let Some(location) = self.location.clone() else {
            return;
        };

        let zoom = self.bar_zoom_for(mapper);
        self.bar_zoom = zoom;
        let margin = mapper.ideal_window_duration() * DEFAULT_LOAD_MARGIN_WINDOWS;
        let load_start = mapper.window_start() - margin;
        let load_end = mapper.window_end() + margin;

        // A tile can straddle two audio periods; list it once.
        let mut seen = HashSet::new();
        let mut defs = Vec::new();
        for period in mapper.get_audio_periods(load_start, load_end) {
            for span in self.data_tiles(
                mapper,
                load_start.max(period.time_start),
                load_end.min(period.time_end),
                zoom,
            ) {
                if seen.insert(tile_key(zoom, span.time)) {
                    defs.push(span);
                }
            }
        }

        let mut data = Vec::new();
        for def in &defs {
            let key = tile_key(zoom, def.time);
            if !self.tiles.contains_key(&key) && self.in_flight == 0 {
                self.start_fetch(&location, *def, zoom);
            }

            if let Some(tile) = self.loaded_tile(zoom, def.time) {
                data.extend_from_slice(tile.bars());
            } else if let Some(bars) = self.coarser_fallback(mapper, def, zoom) {
                data.extend(bars);
            } else if let Some(bars) = self.finer_fallback(mapper, def, zoom) {
                data.extend(bars);
            }
        }

        if !data.is_empty() {
            self.bars = data;
        }
    }

    fn coarser_fallback(&self, mapper: &CoordinateMapper, def: &TileSpan, zoom: i32) -> Option<Vec<ScoreBar>> {
        let min = self.pyramid.range().min;
        for z in (min..zoom).rev() {
            let first = self.data_tiles(mapper, def.time, def.end(), z).into_iter().next()?;
            if let Some(tile) = self.loaded_tile(z, first.time) {
                return Some(
                    tile.bars()
                        .iter()
                        .filter(|b| b.overlaps(def.time, def.end()))
                        .copied()
                        .collect(),
                );
            }
        }
        None
    }

    fn finer_fallback(&self, mapper: &CoordinateMapper, def: &TileSpan, zoom: i32) -> Option<Vec<ScoreBar>> {
        let max = self.pyramid.range().max;
        for z in zoom + 1..=max {
            let tiles: Vec<&DataTile> = self
                .data_tiles(mapper, def.time, def.end(), z)
                .iter()
                .filter_map(|s| self.loaded_tile(z, s.time))
                .collect();
            if tiles.is_empty() {
                continue;
            }
            let factor = 1usize << (z - zoom);
            return Some(
                tiles
                    .into_iter()
                    .flat_map(|t| downsample(t.bars(), factor, zoom))
                    .collect(),
            );
        }
        None
    }

    fn start_fetch(&mut self, location: &str, span: TileSpan, bar_zoom: i32) {
        let key = tile_key(bar_zoom, span.time);
        let fetch = self
            .source
            .fetch_scores(location, span.time, span.end(), bar_zoom);
        let tx = self.completions_tx.clone();
        tokio::spawn(async move {
            let result = fetch.await;
            let _ = tx.send(Completion { key, result });
        });
        self.in_flight += 1;
        self.tiles.insert(key, DataTile::loading(span, bar_zoom));
        tracing::debug!(location, bar_zoom, time = span.time, "Classification fetch started");
    }

    fn drain_completions(&mut self) {
        while let Ok(completion) = self.completions_rx.try_recv() {
            self.in_flight = self.in_flight.saturating_sub(1);
            let Some(tile) = self.tiles.get_mut(&completion.key) else {
                continue;
            };
            let bar_duration = self.pyramid.duration(tile.bar_zoom);
            let bars = match completion.result {
                Ok(pairs) => bars_from_pairs(&pairs, bar_duration, tile.bar_zoom),
                Err(e) => {
                    tracing::debug!(error = %e, "Classification fetch failed");
                    Vec::new()
                }
            };
            tile.state = DataTileState::Loaded(bars);
        }
    }

    /// Bars from the latest update.
    pub fn bars(&self) -> &[ScoreBar] {
        &self.bars
    }

    /// Bars overlapping the mapper's window.
    pub fn visible_bars(&self, mapper: &CoordinateMapper) -> Vec<ScoreBar> {
        let (start, end) = (mapper.window_start(), mapper.window_end());
        self.bars
            .iter()
            .filter(|b| b.overlaps(start, end))
            .copied()
            .collect()
    }

    /// Mean score of the current bars, or 0 with none.
    pub fn average_score(&self) -> f64 {
        if self.bars.is_empty() {
            return 0.0;
        }
        self.bars.iter().map(|b| b.score).sum::<f64>() / self.bars.len() as f64
    }

    /// Score of the bar under pixel `px`, clamped to `[0, 1]`.
    pub fn score_at_px(&self, px: f64, mapper: &CoordinateMapper) -> Option<f64> {
        self.bars
            .iter()
            .find(|b| mapper.time_to_px(b.time_start) <= px && mapper.time_to_px(b.time_end) >= px)
            .map(|b| b.score.clamp(0.0, 1.0))
    }

    pub fn bar_zoom(&self) -> i32 {
        self.bar_zoom
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }
}
