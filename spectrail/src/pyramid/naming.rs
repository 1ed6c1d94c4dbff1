//! Tile resource naming.
//!
//! Tiles are stored in buckets laid out as
//! `tiles-{dir}{suffix}/{location}/{YYYY}_{MM}_{DD}T{HH}_{MM}_{SS}.jpg`,
//! where `dir` is the zoom level with negative levels written as `n{abs}`
//! and the timestamp is the tile's UTC start.

use chrono::{DateTime, Utc};

use super::{TileDescriptor, TileSpan};

/// Default bucket for spectrogram tiles.
pub const SPECTROGRAM_BASE_URL: &str = "https://storage.googleapis.com/deepblue-tiled-spectrograms/";

/// Default bucket for similarity tiles.
pub const SIMILARITY_BASE_URL: &str = "https://storage.googleapis.com/deepblue-similarities/";

/// Naming strategy for a tiled data source.
pub trait TileNaming: Send + Sync {
    /// Deterministic resource key for a tile of `location`.
    fn resource_key(&self, location: &str, span: &TileSpan) -> String;

    /// Fetchable URL for a resource key.
    fn url(&self, resource_key: &str) -> String;

    /// Decorate spans with their resource keys.
    fn describe(&self, location: &str, spans: Vec<TileSpan>) -> Vec<TileDescriptor> {
        spans
            .into_iter()
            .map(|span| TileDescriptor {
                resource_key: self.resource_key(location, &span),
                span,
            })
            .collect()
    }
}

/// Directory component for a zoom level: `n3` for -3, `3` for 3.
pub fn zoom_dir(zoom: i32) -> String {
    if zoom < 0 {
        format!("n{}", -zoom)
    } else {
        zoom.to_string()
    }
}

/// Zero-padded UTC stamp of a tile start, e.g. `2015_02_11T09_00_00`.
pub fn tile_stamp(time: f64) -> String {
    DateTime::<Utc>::from_timestamp_millis(time.floor() as i64)
        .map(|date| date.format("%Y_%m_%dT%H_%M_%S").to_string())
        // Outside chrono's range; still deterministic.
        .unwrap_or_else(|| format!("{:.0}", time))
}

fn tile_key(dir_suffix: &str, location: &str, span: &TileSpan) -> String {
    format!(
        "tiles-{}{}/{}/{}.jpg",
        zoom_dir(span.zoom_level),
        dir_suffix,
        location,
        tile_stamp(span.time)
    )
}

/// Spectrogram imagery, optionally from the denoised bucket variant.
#[derive(Debug, Clone)]
pub struct SpectrogramNaming {
    base_url: String,
    denoise: bool,
}

impl SpectrogramNaming {
    pub fn new(base_url: impl Into<String>, denoise: bool) -> Self {
        Self {
            base_url: base_url.into(),
            denoise,
        }
    }

    pub fn denoise(&self) -> bool {
        self.denoise
    }
}

impl Default for SpectrogramNaming {
    fn default() -> Self {
        Self::new(SPECTROGRAM_BASE_URL, true)
    }
}

impl TileNaming for SpectrogramNaming {
    fn resource_key(&self, location: &str, span: &TileSpan) -> String {
        // Denoised tiles only exist in the default bucket.
        let suffix = if self.denoise && self.base_url == SPECTROGRAM_BASE_URL {
            "-denoise"
        } else {
            ""
        };
        tile_key(suffix, location, span)
    }

    fn url(&self, resource_key: &str) -> String {
        format!("{}{}", self.base_url, resource_key)
    }
}

/// Similarity imagery.
#[derive(Debug, Clone)]
pub struct SimilarityNaming {
    base_url: String,
}

impl SimilarityNaming {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

impl Default for SimilarityNaming {
    fn default() -> Self {
        Self::new(SIMILARITY_BASE_URL)
    }
}

impl TileNaming for SimilarityNaming {
    fn resource_key(&self, location: &str, span: &TileSpan) -> String {
        tile_key("", location, span)
    }

    fn url(&self, resource_key: &str) -> String {
        format!("{}{}", self.base_url, resource_key)
    }
}
