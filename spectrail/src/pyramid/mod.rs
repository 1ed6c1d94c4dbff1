//! Zoom pyramid math.
//!
//! Each zoom level `z` splits time into tiles of `base / 2^z` milliseconds.
//! With the default one-hour base unit, level 0 tiles are one hour long,
//! level 2 tiles fifteen minutes, and level -1 tiles two hours.
//!
//! The pyramid is stateless. Naming of concrete tile resources lives in the
//! `naming` submodule so data sources can plug in their own layouts.

mod naming;

pub use naming::{
    tile_stamp, zoom_dir, SimilarityNaming, SpectrogramNaming, TileNaming, SIMILARITY_BASE_URL,
    SPECTROGRAM_BASE_URL,
};

/// One hour in milliseconds; the duration of a level-0 tile.
pub const HOUR_MS: f64 = 3_600_000.0;

/// Inclusive range of zoom levels a data source supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoomRange {
    pub min: i32,
    pub max: i32,
}

impl ZoomRange {
    /// Spectrogram imagery: from 64-hour tiles down to ~14 second tiles.
    pub const SPECTROGRAM: ZoomRange = ZoomRange { min: -6, max: 8 };

    /// Similarity imagery, only meaningful when zoomed in.
    pub const SIMILARITY: ZoomRange = ZoomRange { min: 0, max: 8 };

    /// Classification score bars.
    pub const CLASSIFICATION: ZoomRange = ZoomRange { min: -4, max: 9 };

    pub fn new(min: i32, max: i32) -> Self {
        debug_assert!(min <= max, "zoom range inverted: {}..={}", min, max);
        Self { min, max }
    }

    pub fn clamp(&self, zoom: i32) -> i32 {
        zoom.clamp(self.min, self.max)
    }

    pub fn contains(&self, zoom: i32) -> bool {
        (self.min..=self.max).contains(&zoom)
    }

    /// Number of levels in the range.
    pub fn len(&self) -> usize {
        (self.max - self.min + 1) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.max < self.min
    }

    /// Zero-based index of `zoom` within the range (clamped).
    pub fn index_of(&self, zoom: i32) -> usize {
        (self.clamp(zoom) - self.min) as usize
    }

    pub fn iter(&self) -> impl Iterator<Item = i32> {
        self.min..=self.max
    }
}

/// The time slice a tile covers at a given zoom level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileSpan {
    pub time: f64,
    pub duration: f64,
    pub zoom_level: i32,
}

impl TileSpan {
    pub fn end(&self) -> f64 {
        self.time + self.duration
    }

    /// True if the span overlaps `[start, end)`.
    pub fn overlaps(&self, start: f64, end: f64) -> bool {
        self.time < end && self.end() > start
    }
}

/// A tile span decorated with its resource key.
///
/// The key is a pure function of (location, time, zoom level), so identical
/// queries always resolve to the same resident tile.
#[derive(Debug, Clone, PartialEq)]
pub struct TileDescriptor {
    pub span: TileSpan,
    pub resource_key: String,
}

impl TileDescriptor {
    pub fn time(&self) -> f64 {
        self.span.time
    }

    pub fn duration(&self) -> f64 {
        self.span.duration
    }

    pub fn zoom_level(&self) -> i32 {
        self.span.zoom_level
    }
}

/// Maps zoom levels to tile durations and enumerates tiles over a range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomPyramid {
    base_unit_ms: f64,
    range: ZoomRange,
}

impl ZoomPyramid {
    pub fn new(base_unit_ms: f64, range: ZoomRange) -> Self {
        Self {
            base_unit_ms,
            range,
        }
    }

    /// Pyramid with the one-hour base unit.
    pub fn hourly(range: ZoomRange) -> Self {
        Self::new(HOUR_MS, range)
    }

    pub fn range(&self) -> ZoomRange {
        self.range
    }

    pub fn base_unit_ms(&self) -> f64 {
        self.base_unit_ms
    }

    /// Tile duration in milliseconds at `zoom`.
    pub fn duration(&self, zoom: i32) -> f64 {
        self.base_unit_ms / 2f64.powi(zoom)
    }

    /// Unrounded zoom level whose tile duration equals `duration`.
    pub fn raw_zoom_level(&self, duration: f64) -> f64 {
        (self.base_unit_ms / duration).log2()
    }

    /// Closest supported zoom level for a tile duration.
    pub fn zoom_level(&self, duration: f64) -> i32 {
        let raw = self.raw_zoom_level(duration);
        if raw.is_nan() {
            return self.range.min;
        }
        // Saturating cast handles +/- infinity for zero or huge durations.
        self.range.clamp(raw.round() as i32)
    }

    /// Snap `time` down to the start of the tile containing it.
    pub fn snap(&self, time: f64, zoom: i32) -> f64 {
        let duration = self.duration(zoom);
        (time / duration).floor() * duration
    }

    /// Every tile at `zoom` overlapping `[start, end)`.
    ///
    /// Independent of data availability: tiles inside gaps are included.
    pub fn get_range(&self, start: f64, end: f64, zoom: i32) -> Vec<TileSpan> {
        let duration = self.duration(zoom);
        let first = self.snap(start, zoom);
        let mut spans = Vec::new();
        let mut index = 0u64;
        loop {
            // Multiply rather than accumulate so long ranges don't drift.
            let time = first + index as f64 * duration;
            if time >= end {
                break;
            }
            spans.push(TileSpan {
                time,
                duration,
                zoom_level: zoom,
            });
            index += 1;
        }
        spans
    }
}

impl Default for ZoomPyramid {
    fn default() -> Self {
        Self::hourly(ZoomRange::SPECTROGRAM)
    }
}
