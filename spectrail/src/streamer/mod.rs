//! Multi-resolution tile streaming.
//!
//! The [`TileStreamer`] keeps exactly the tiles the viewport needs resident.
//! It is driven by [`TileStreamer::frame`] once per display frame, after the
//! [`CoordinateMapper`] has been updated for that frame and before
//! [`TileStreamer::render`].
//!
//! # Frame pass
//!
//! 1. Apply fetch completions that arrived since the last frame.
//! 2. Pick the zoom level for the display duration.
//! 3. Evict or hide every instance outside the coarsest layer.
//! 4. Enumerate wanted tiles over the audio in the prefetch window.
//! 5. Keep wanted instances and create missing ones (unless debounced or
//!    over the prefetch ceiling).
//! 6. Track full coverage and keep the newest fully covered layer visible
//!    while the current one is incomplete.
//! 7. Advance fades and drop removed instances.
//!
//! # Concurrency
//!
//! Fetches run as tokio tasks. Results come back over an unbounded channel
//! and are applied only inside `frame`, so the resident map is never shared.
//! Each instance carries a unique id; a completion is applied only to the
//! instance that issued it, and dropped if that instance is gone.

mod config;
mod debounce;
mod instance;
mod layer;
mod render;
mod source;

pub use config::{
    StreamerConfig, DEFAULT_DEBOUNCE_MS, DEFAULT_FADE_IN_PER_SEC, DEFAULT_FADE_OUT_PER_SEC,
    DEFAULT_HOLD_BELOW_ZOOM, DEFAULT_PREFETCH_CEILING, DEFAULT_TILE_HEIGHT, DEFAULT_TILE_WIDTH,
};
pub use debounce::{AlwaysChanging, NeverChanging, ViewportActivity, ViewportDebounce};
pub use instance::{transition, Phase, TileEvent, TileInstance, TileState};
pub use layer::Layer;
pub use render::{place_tile, Placement, RecordingTarget, RenderTarget, TileSprite};
pub use source::{
    AssetHandle, AssetSource, FetchError, FetchFailurePolicy, HttpAssetSource, SyntheticAssetSource,
};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::gaps::GapModel;
use crate::mapper::CoordinateMapper;
use crate::pyramid::{TileDescriptor, TileNaming, ZoomPyramid};

/// Per-frame inputs.
#[derive(Debug, Clone, Copy)]
pub struct FrameContext {
    pub now: Instant,
    /// Seconds since the previous frame.
    pub dt: f64,
    /// Suppresses new tile creation while true.
    pub viewport_changing: bool,
}

impl FrameContext {
    pub fn new(now: Instant, elapsed: Duration, activity: &dyn ViewportActivity) -> Self {
        Self {
            now,
            dt: elapsed.as_secs_f64(),
            viewport_changing: activity.is_changing(now),
        }
    }
}

/// What one frame pass did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameReport {
    pub zoom_level: i32,
    /// Distinct tiles wanted at the current zoom level.
    pub wanted: usize,
    /// Instances created (and fetches started) this frame.
    pub created: usize,
    /// Completions applied this frame.
    pub completed: usize,
    /// Instances resident after the pass.
    pub resident: usize,
    pub all_loaded: bool,
    /// True on the first frame with full coverage after a location change.
    pub became_ready: bool,
    /// Zoom level held visible while the current layer is incomplete.
    pub fallback_zoom: Option<i32>,
}

struct Completion {
    key: String,
    id: u64,
    result: Result<AssetHandle, FetchError>,
}

/// Resident tile set for one imagery source.
pub struct TileStreamer {
    config: StreamerConfig,
    pyramid: ZoomPyramid,
    naming: Arc<dyn TileNaming>,
    source: Arc<dyn AssetSource>,
    location: Option<Arc<GapModel>>,
    tiles: HashMap<String, TileInstance>,
    layers: Vec<Layer>,
    next_id: u64,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
    current_zoom: i32,
    all_loaded: bool,
    ready: bool,
}

impl std::fmt::Debug for TileStreamer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileStreamer")
            .field("config", &self.config)
            .field("location", &self.location.as_ref().map(|l| l.location().to_string()))
            .field("resident", &self.tiles.len())
            .field("current_zoom", &self.current_zoom)
            .field("all_loaded", &self.all_loaded)
            .finish_non_exhaustive()
    }
}

impl TileStreamer {
    pub fn new(
        config: StreamerConfig,
        naming: Arc<dyn TileNaming>,
        source: Arc<dyn AssetSource>,
    ) -> Self {
        let pyramid = ZoomPyramid::hourly(config.zoom_range);
        let layers = Self::build_layers(&pyramid);
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            current_zoom: config.zoom_range.min,
            config,
            pyramid,
            naming,
            source,
            location: None,
            tiles: HashMap::new(),
            layers,
            next_id: 0,
            completions_tx,
            completions_rx,
            all_loaded: false,
            ready: false,
        }
    }

    fn build_layers(pyramid: &ZoomPyramid) -> Vec<Layer> {
        pyramid
            .range()
            .iter()
            .map(|z| Layer::new(z, pyramid.duration(z)))
            .collect()
    }

    pub fn config(&self) -> &StreamerConfig {
        &self.config
    }

    pub fn pyramid(&self) -> &ZoomPyramid {
        &self.pyramid
    }

    pub fn location(&self) -> Option<&Arc<GapModel>> {
        self.location.as_ref()
    }

    fn coarsest_zoom(&self) -> i32 {
        self.config.zoom_range.min
    }

    /// Switch to a new location.
    ///
    /// Drops every resident tile, forgets layer coverage, and preloads the
    /// coarsest layer across the whole recording, skipping tiles that lie
    /// entirely inside one gap. Must be called within a tokio runtime.
    pub fn set_location(&mut self, model: Arc<GapModel>) {
        self.tiles.clear();
        self.layers = Self::build_layers(&self.pyramid);
        // Fresh channel so completions for the old location are never seen.
        let (tx, rx) = mpsc::unbounded_channel();
        self.completions_tx = tx;
        self.completions_rx = rx;
        self.all_loaded = false;
        self.ready = false;

        let range = model.range();
        let zoom = self.coarsest_zoom();
        let spans: Vec<_> = self
            .pyramid
            .get_range(range.min_time, range.max_time, zoom)
            .into_iter()
            .filter(|s| model.range_in_gap(s.time, s.end()).is_none())
            .collect();
        let descriptors = self.naming.describe(model.location(), spans);

        tracing::info!(
            location = model.location(),
            zoom,
            preload = descriptors.len(),
            "Location changed, preloading coarsest layer"
        );

        self.location = Some(model);
        for descriptor in descriptors {
            self.create(descriptor);
        }
    }

    /// Run one frame pass.
    ///
    /// `display_duration` is the tile duration currently being displayed at
    /// nominal width; it selects the zoom level and scales tile widths.
    pub fn frame(
        &mut self,
        mapper: &CoordinateMapper,
        ctx: &FrameContext,
        display_duration: f64,
    ) -> FrameReport {
        let completed = self.drain_completions();

        let Some(model) = self.location.clone() else {
            return FrameReport {
                zoom_level: self.current_zoom,
                completed,
                ..FrameReport::default()
            };
        };

        let zoom = self.pyramid.zoom_level(display_duration);
        if zoom != self.current_zoom {
            tracing::debug!(from = self.current_zoom, to = zoom, "Zoom level changed");
        }
        self.current_zoom = zoom;

        let ideal = mapper.ideal_window_duration();
        let load_start = mapper.window_start() - ideal;
        let load_end = mapper.window_end() + ideal;

        self.eviction_pass(load_start, load_end);

        let wanted = self.wanted_descriptors(mapper, model.location(), zoom, load_start, load_end);
        let over_ceiling = wanted.len() > self.config.prefetch_ceiling;
        let may_create = !over_ceiling && !ctx.viewport_changing;
        if over_ceiling {
            tracing::debug!(
                wanted = wanted.len(),
                ceiling = self.config.prefetch_ceiling,
                "Too many tiles wanted, skipping creation"
            );
        }

        let mut all_loaded = !over_ceiling;
        let mut created = 0;
        for descriptor in &wanted {
            match self.tiles.get_mut(&descriptor.resource_key) {
                Some(instance) => {
                    instance.keep();
                    if instance.zoom_level() == zoom && !instance.is_loaded() {
                        all_loaded = false;
                    }
                }
                None => {
                    all_loaded = false;
                    if may_create {
                        self.create(descriptor.clone());
                        created += 1;
                    }
                }
            }
        }

        let mut became_ready = false;
        if all_loaded {
            self.layer_mut(zoom).mark_full_coverage(ctx.now);
            if !self.ready {
                self.ready = true;
                became_ready = true;
                tracing::info!(location = model.location(), zoom, "Tiles ready");
            }
        }
        self.all_loaded = all_loaded;

        let fallback_zoom = if all_loaded {
            None
        } else {
            self.hold_fallback_layer()
        };

        let (fade_in, fade_out) = (self.config.fade_in_per_sec, self.config.fade_out_per_sec);
        for instance in self.tiles.values_mut() {
            instance.advance(ctx.dt, fade_in, fade_out);
        }
        self.tiles.retain(|_, t| !t.is_removed());

        let report = FrameReport {
            zoom_level: zoom,
            wanted: wanted.len(),
            created,
            completed,
            resident: self.tiles.len(),
            all_loaded,
            became_ready,
            fallback_zoom,
        };
        tracing::trace!(
            zoom,
            wanted = report.wanted,
            created,
            resident = report.resident,
            all_loaded,
            "Frame pass"
        );
        report
    }

    fn drain_completions(&mut self) -> usize {
        let policy = self.config.failure_policy;
        let mut applied = 0;
        while let Ok(completion) = self.completions_rx.try_recv() {
            match self.tiles.get_mut(&completion.key) {
                Some(instance) if instance.id() == completion.id => {
                    instance.apply_load(completion.result, policy);
                    if instance.is_removed() {
                        self.tiles.remove(&completion.key);
                    }
                    applied += 1;
                }
                _ => {
                    tracing::trace!(key = %completion.key, "Dropping completion for removed tile");
                }
            }
        }
        applied
    }

    fn eviction_pass(&mut self, load_start: f64, load_end: f64) {
        let coarsest = self.coarsest_zoom();
        let hold_below = self.config.hold_below_zoom;
        for instance in self.tiles.values_mut() {
            if instance.zoom_level() == coarsest {
                continue;
            }
            if instance.zoom_level() >= hold_below || !instance.is_in_range(load_start, load_end) {
                instance.evict();
            } else {
                instance.hide();
            }
        }
    }

    /// Tiles at `zoom` over the audio periods of `[load_start, load_end)`,
    /// deduplicated by key.
    fn wanted_descriptors(
        &self,
        mapper: &CoordinateMapper,
        location: &str,
        zoom: i32,
        load_start: f64,
        load_end: f64,
    ) -> Vec<TileDescriptor> {
        let mut seen = HashSet::new();
        let mut wanted = Vec::new();
        for period in mapper.get_audio_periods(load_start, load_end) {
            let spans = self.pyramid.get_range(
                load_start.max(period.time_start),
                load_end.min(period.time_end),
                zoom,
            );
            for descriptor in self.naming.describe(location, spans) {
                if seen.insert(descriptor.resource_key.clone()) {
                    wanted.push(descriptor);
                }
            }
        }
        wanted
    }

    /// Keep the newest fully covered layer on screen; returns its zoom.
    fn hold_fallback_layer(&mut self) -> Option<i32> {
        let zoom = layer::newest_covered(&self.layers)?.zoom_level();
        if zoom != self.coarsest_zoom() {
            for instance in self.tiles.values_mut().filter(|t| t.zoom_level() == zoom) {
                instance.keep();
            }
        }
        Some(zoom)
    }

    fn layer_mut(&mut self, zoom: i32) -> &mut Layer {
        let index = self.config.zoom_range.index_of(zoom);
        &mut self.layers[index]
    }

    fn create(&mut self, descriptor: TileDescriptor) {
        let id = self.next_id;
        self.next_id += 1;

        let key = descriptor.resource_key.clone();
        let fetch = self.source.fetch(&descriptor);
        let tx = self.completions_tx.clone();
        let task_key = key.clone();
        tokio::spawn(async move {
            let result = fetch.await;
            // Receiver is gone once the location changed or the streamer dropped.
            let _ = tx.send(Completion {
                key: task_key,
                id,
                result,
            });
        });

        let mut instance = TileInstance::new(id, descriptor);
        instance.start_fetch();
        tracing::trace!(key = %key, id, "Tile fetch started");
        self.tiles.insert(key, instance);
    }

    /// Paint every drawable tile, coarse layers first.
    ///
    /// Returns the number of sprites drawn.
    pub fn render(
        &self,
        mapper: &CoordinateMapper,
        display_duration: f64,
        target: &mut dyn RenderTarget,
    ) -> usize {
        let mut drawable: Vec<&TileInstance> =
            self.tiles.values().filter(|t| t.is_drawable()).collect();
        drawable.sort_by(|a, b| {
            a.zoom_level()
                .cmp(&b.zoom_level())
                .then(a.descriptor().time().total_cmp(&b.descriptor().time()))
        });

        target.begin_frame();
        let mut drawn = 0;
        for instance in drawable {
            let Some(asset) = instance.asset() else {
                continue;
            };
            let Some(placement) = place_tile(
                &instance.descriptor().span,
                mapper,
                display_duration,
                self.config.tile_width,
            ) else {
                continue;
            };
            target.draw(&TileSprite {
                resource_key: instance.key().to_string(),
                zoom_level: instance.zoom_level(),
                x: placement.x,
                y: 0.0,
                width: placement.width,
                height: self.config.tile_height,
                opacity: instance.alpha(),
                asset: asset.clone(),
                crop_left: placement.crop_left,
                crop_right: placement.crop_right,
            });
            drawn += 1;
        }
        drawn
    }

    pub fn instance(&self, key: &str) -> Option<&TileInstance> {
        self.tiles.get(key)
    }

    pub fn instances(&self) -> impl Iterator<Item = &TileInstance> {
        self.tiles.values()
    }

    pub fn resident_count(&self) -> usize {
        self.tiles.len()
    }

    /// Resident instance count at one zoom level.
    pub fn resident_at(&self, zoom: i32) -> usize {
        self.tiles.values().filter(|t| t.zoom_level() == zoom).count()
    }

    pub fn layer(&self, zoom: i32) -> Option<&Layer> {
        if !self.config.zoom_range.contains(zoom) {
            return None;
        }
        self.layers.get(self.config.zoom_range.index_of(zoom))
    }

    pub fn current_zoom(&self) -> i32 {
        self.current_zoom
    }

    pub fn all_loaded(&self) -> bool {
        self.all_loaded
    }

    /// True once the current location has been fully covered at least once.
    pub fn is_ready(&self) -> bool {
        self.ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gaps::{GapInterval, GapModelOptions, TimeRange};
    use crate::mapper::LookupConfig;
    use crate::pyramid::SpectrogramNaming;

    const HOUR: f64 = 3_600_000.0;
    const WIDTH: f64 = 1024.0;
    // Well past 1970 so tile stamps are ordinary dates.
    const T0: f64 = 1_423_612_800_000.0;

    fn model(gaps: Vec<GapInterval>) -> Arc<GapModel> {
        Arc::new(
            GapModel::new(
                "Hawaii",
                TimeRange::new(T0, T0 + 30.0 * 24.0 * HOUR),
                gaps,
                &GapModelOptions::default(),
            )
            .unwrap(),
        )
    }

    fn mapper(model: &Arc<GapModel>, time: f64, display: f64) -> CoordinateMapper {
        let mut mapper = CoordinateMapper::new(WIDTH, LookupConfig::default());
        mapper.set_gaps(Arc::clone(model));
        mapper.set_current_time(time);
        mapper.set_window_duration(CoordinateMapper::calc_ideal_window_duration(
            display, WIDTH, 512.0,
        ));
        mapper
    }

    fn streamer(source: SyntheticAssetSource, config: StreamerConfig) -> TileStreamer {
        TileStreamer::new(config, Arc::new(SpectrogramNaming::default()), Arc::new(source))
    }

    fn ctx(now: Instant) -> FrameContext {
        FrameContext::new(now, Duration::from_millis(100), &NeverChanging)
    }

    async fn settle() {
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_set_location_preloads_coarsest() {
        let model = model(vec![]);
        let mut streamer = streamer(SyntheticAssetSource::new(), StreamerConfig::default());
        streamer.set_location(Arc::clone(&model));
        // 30 days of 64-hour tiles, T0 not aligned to 64h.
        let expected = streamer
            .pyramid()
            .get_range(model.range().min_time, model.range().max_time, -6)
            .len();
        assert_eq!(streamer.resident_at(-6), expected);
        assert!(!streamer.is_ready());
    }

    #[tokio::test]
    async fn test_preload_skips_tiles_inside_gap() {
        let pyramid = ZoomPyramid::default();
        let first = pyramid.snap(T0, -6);
        let tile = pyramid.duration(-6);
        // Gap swallows the second coarse tile entirely.
        let model = model(vec![GapInterval::new(first + tile - 1.0, first + 2.0 * tile + 1.0)]);
        let mut streamer = streamer(SyntheticAssetSource::new(), StreamerConfig::default());
        streamer.set_location(Arc::clone(&model));
        let expected = pyramid
            .get_range(model.range().min_time, model.range().max_time, -6)
            .len()
            - 1;
        assert_eq!(streamer.resident_at(-6), expected);
    }

    #[tokio::test]
    async fn test_converges_and_reports_ready_once() {
        let model = model(vec![]);
        let time = T0 + 10.0 * 24.0 * HOUR;
        let mapper = mapper(&model, time, HOUR);
        let mut streamer = streamer(SyntheticAssetSource::new(), StreamerConfig::default());
        streamer.set_location(Arc::clone(&model));

        let now = Instant::now();
        let first = streamer.frame(&mapper, &ctx(now), HOUR);
        assert_eq!(first.zoom_level, 0);
        assert!(first.created > 0);
        assert!(!first.all_loaded);

        let mut ready_frames = 0;
        for i in 1..10 {
            settle().await;
            let report = streamer.frame(&mapper, &ctx(now + Duration::from_millis(100 * i)), HOUR);
            if report.became_ready {
                ready_frames += 1;
            }
        }
        assert!(streamer.all_loaded());
        assert!(streamer.is_ready());
        assert_eq!(ready_frames, 1);
        assert!(streamer.layer(0).unwrap().full_coverage().is_some());
    }

    #[tokio::test]
    async fn test_debounce_suppresses_creation() {
        let model = model(vec![]);
        let mapper = mapper(&model, T0 + 5.0 * 24.0 * HOUR, HOUR);
        let mut streamer = streamer(SyntheticAssetSource::new(), StreamerConfig::default());
        streamer.set_location(Arc::clone(&model));

        let ctx = FrameContext::new(Instant::now(), Duration::ZERO, &AlwaysChanging);
        let report = streamer.frame(&mapper, &ctx, HOUR);
        assert!(report.wanted > 0);
        assert_eq!(report.created, 0);
        assert_eq!(streamer.resident_at(0), 0);
    }

    #[tokio::test]
    async fn test_prefetch_ceiling_blocks_creation() {
        let model = model(vec![]);
        let mapper = mapper(&model, T0 + 5.0 * 24.0 * HOUR, HOUR);
        let config = StreamerConfig::default().with_prefetch_ceiling(2);
        let mut streamer = streamer(SyntheticAssetSource::new(), config);
        streamer.set_location(Arc::clone(&model));

        let report = streamer.frame(&mapper, &ctx(Instant::now()), HOUR);
        assert!(report.wanted > 2);
        assert_eq!(report.created, 0);
        assert!(!report.all_loaded);
    }

    #[tokio::test]
    async fn test_frame_without_location_is_noop() {
        let model = model(vec![]);
        let mapper = mapper(&model, T0, HOUR);
        let mut streamer = streamer(SyntheticAssetSource::new(), StreamerConfig::default());
        let report = streamer.frame(&mapper, &ctx(Instant::now()), HOUR);
        assert_eq!(report.wanted, 0);
        assert_eq!(streamer.resident_count(), 0);
    }

    #[tokio::test]
    async fn test_render_coarse_first() {
        let model = model(vec![]);
        let time = T0 + 10.0 * 24.0 * HOUR;
        let mapper = mapper(&model, time, HOUR);
        let mut streamer = streamer(SyntheticAssetSource::new(), StreamerConfig::default());
        streamer.set_location(Arc::clone(&model));

        let now = Instant::now();
        for i in 0..10 {
            streamer.frame(&mapper, &ctx(now + Duration::from_millis(100 * i)), HOUR);
            settle().await;
        }

        let mut target = RecordingTarget::new();
        let drawn = streamer.render(&mapper, HOUR, &mut target);
        assert_eq!(drawn, target.sprites().len());
        assert!(drawn > 0);
        let zooms: Vec<i32> = target.sprites().iter().map(|s| s.zoom_level).collect();
        let mut sorted = zooms.clone();
        sorted.sort();
        assert_eq!(zooms, sorted);
        assert!(target.sprites().iter().all(|s| s.opacity > 0.0));
    }
}
