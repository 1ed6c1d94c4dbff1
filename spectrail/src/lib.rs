//! Spectrail - gap-compressed timelines over multi-year recordings
//!
//! This library maps time to pixels across recordings with irregular gaps,
//! squeezing long gaps to a bounded width while real audio stays at true
//! scale, and streams a multi-resolution spectrogram tile pyramid in and
//! out of memory as the viewport pans and zooms.
//!
//! # Modules
//!
//! - [`gaps`] - per-location range and gap lists, fetched once and cached
//! - [`pyramid`] - zoom level math and tile naming
//! - [`mapper`] - the gap-compressing time ↔ pixel lookup
//! - [`streamer`] - resident tile set, fetches, fades and painting
//! - [`heatmap`] - classification score bars
//! - [`similarity`] - self-similarity overlay for close zoom levels
//! - [`overlay`] - gap bands and their labels
//! - [`config`] - `~/.spectrail/config.ini`
//! - [`viewer`] - the per-frame driver tying the above together

pub mod config;
pub mod gaps;
pub mod heatmap;
pub mod mapper;
pub mod overlay;
pub mod pyramid;
pub mod similarity;
pub mod streamer;
pub mod viewer;

pub use gaps::{GapInterval, GapModel, LocationRepository, TimeRange};
pub use mapper::{CoordinateMapper, LookupConfig};
pub use pyramid::{TileDescriptor, ZoomPyramid, ZoomRange};
pub use streamer::{StreamerConfig, TileStreamer};
pub use viewer::{Timeline, TimelineFrame};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
