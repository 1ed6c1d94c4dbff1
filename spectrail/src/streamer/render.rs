//! Tile placement and the paint boundary.

use super::source::AssetHandle;
use crate::mapper::CoordinateMapper;
use crate::pyramid::TileSpan;

/// One tile ready to paint.
///
/// `x` and `width` describe the full tile rectangle; `crop_left` and
/// `crop_right` are the fractions of it (and of the image) to leave
/// unpainted on each side.
#[derive(Debug, Clone, PartialEq)]
pub struct TileSprite {
    pub resource_key: String,
    pub zoom_level: i32,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub opacity: f64,
    pub asset: AssetHandle,
    pub crop_left: f64,
    pub crop_right: f64,
}

impl TileSprite {
    /// Left edge of the painted region.
    pub fn painted_left(&self) -> f64 {
        self.x + self.width * self.crop_left
    }

    /// Right edge of the painted region.
    pub fn painted_right(&self) -> f64 {
        self.x + self.width * (1.0 - self.crop_right)
    }
}

/// Paint backend.
pub trait RenderTarget {
    /// Called once before the frame's sprites, coarse layers first.
    fn begin_frame(&mut self) {}

    fn draw(&mut self, sprite: &TileSprite);
}

/// Render target that keeps the last frame's sprites.
#[derive(Debug, Default)]
pub struct RecordingTarget {
    sprites: Vec<TileSprite>,
}

impl RecordingTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sprites(&self) -> &[TileSprite] {
        &self.sprites
    }

    pub fn into_sprites(self) -> Vec<TileSprite> {
        self.sprites
    }
}

impl RenderTarget for RecordingTarget {
    fn begin_frame(&mut self) {
        self.sprites.clear();
    }

    fn draw(&mut self, sprite: &TileSprite) {
        self.sprites.push(sprite.clone());
    }
}

/// Horizontal placement of a tile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: f64,
    pub width: f64,
    pub crop_left: f64,
    pub crop_right: f64,
}

/// Position a tile on screen, cropping the parts that fall in gaps.
///
/// Returns `None` when the tile is outside the window or entirely inside a
/// gap.
pub fn place_tile(
    span: &TileSpan,
    mapper: &CoordinateMapper,
    display_duration: f64,
    tile_width: f64,
) -> Option<Placement> {
    let start = span.time;
    let end = span.end();
    if !(start < mapper.window_end() && end > mapper.window_start()) {
        return None;
    }

    let gaps = mapper.get_gaps(start, end);
    if gaps
        .iter()
        .any(|g| g.time_start <= start && g.time_end >= end)
    {
        return None;
    }

    let mut placement = Placement {
        x: mapper.time_to_px(start),
        width: span.duration / display_duration * tile_width,
        crop_left: 0.0,
        crop_right: 0.0,
    };

    // Starts in a gap: re-anchor so the gap end lands where it is drawn.
    if let Some(gap) = mapper.get_gap(start) {
        let offset = gap.time_end - start;
        placement.x = mapper.time_to_px(gap.time_end) - offset / mapper.resolution();
        placement.crop_left = (offset / span.duration).clamp(0.0, 1.0);
    }

    // Ends in a gap: trim from the gap start.
    if let Some(gap) = mapper.get_gap(end) {
        if gap.time_start > start {
            placement.crop_right = ((end - gap.time_start) / span.duration).clamp(0.0, 1.0);
        }
    }

    Some(placement)
}
