//! Configuration for the tile streamer.

use std::time::Duration;

use super::source::FetchFailurePolicy;
use crate::pyramid::ZoomRange;

// ==================== Streamer Defaults ====================

/// Default nominal on-screen width of one tile, in pixels.
pub const DEFAULT_TILE_WIDTH: f64 = 512.0;

/// Default on-screen height of one tile, in pixels.
pub const DEFAULT_TILE_HEIGHT: f64 = 1024.0;

/// Default cap on wanted descriptors before new tile creation is skipped.
///
/// Guards against thrashing during fast zoom changes.
pub const DEFAULT_PREFETCH_CEILING: usize = 75;

/// Default zoom level from which off-layer tiles are always evicted.
///
/// Coarser tiles are only hidden while inside the prefetch window, so
/// zooming back out reuses them instantly.
pub const DEFAULT_HOLD_BELOW_ZOOM: i32 = 1;

/// Default fade-in rate in alpha per second.
pub const DEFAULT_FADE_IN_PER_SEC: f64 = 2.4;

/// Default fade-out rate in alpha per second.
pub const DEFAULT_FADE_OUT_PER_SEC: f64 = 0.8;

/// Default debounce window after a viewport change, in milliseconds.
pub const DEFAULT_DEBOUNCE_MS: u64 = 20;

/// Tile streamer configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamerConfig {
    /// Nominal tile width in pixels.
    ///
    /// A tile is drawn at this width when the display duration equals its
    /// own duration.
    pub tile_width: f64,

    pub tile_height: f64,

    /// Wanted-descriptor count above which no tiles are created.
    pub prefetch_ceiling: usize,

    /// Tiles at or above this zoom level are evicted, not hidden, when they
    /// stop being wanted.
    pub hold_below_zoom: i32,

    pub fade_in_per_sec: f64,
    pub fade_out_per_sec: f64,

    /// New tile creation is suppressed for this long after a viewport change.
    pub debounce: Duration,

    pub failure_policy: FetchFailurePolicy,

    /// Zoom levels the imagery exists at. The minimum is the always-resident
    /// fallback layer.
    pub zoom_range: ZoomRange,
}

impl Default for StreamerConfig {
    fn default() -> Self {
        Self {
            tile_width: DEFAULT_TILE_WIDTH,
            tile_height: DEFAULT_TILE_HEIGHT,
            prefetch_ceiling: DEFAULT_PREFETCH_CEILING,
            hold_below_zoom: DEFAULT_HOLD_BELOW_ZOOM,
            fade_in_per_sec: DEFAULT_FADE_IN_PER_SEC,
            fade_out_per_sec: DEFAULT_FADE_OUT_PER_SEC,
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            failure_policy: FetchFailurePolicy::default(),
            zoom_range: ZoomRange::SPECTROGRAM,
        }
    }
}

impl StreamerConfig {
    pub fn with_failure_policy(mut self, policy: FetchFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_zoom_range(mut self, range: ZoomRange) -> Self {
        self.zoom_range = range;
        self
    }

    pub fn with_prefetch_ceiling(mut self, ceiling: usize) -> Self {
        self.prefetch_ceiling = ceiling;
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StreamerConfig::default();
        assert_eq!(config.tile_width, 512.0);
        assert_eq!(config.prefetch_ceiling, 75);
        assert_eq!(config.debounce, Duration::from_millis(20));
        assert_eq!(config.failure_policy, FetchFailurePolicy::Suppress);
        // Fade in three times faster than out.
        assert!((config.fade_in_per_sec / config.fade_out_per_sec - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_builders() {
        let config = StreamerConfig::default()
            .with_failure_policy(FetchFailurePolicy::Evict)
            .with_zoom_range(ZoomRange::SIMILARITY)
            .with_prefetch_ceiling(10);
        assert_eq!(config.failure_policy, FetchFailurePolicy::Evict);
        assert_eq!(config.zoom_range.min, 0);
        assert_eq!(config.prefetch_ceiling, 10);
    }
}
