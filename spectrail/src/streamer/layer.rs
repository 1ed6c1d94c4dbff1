use std::time::Instant;

/// Bookkeeping for all tiles at one zoom level.
///
/// Instances themselves live in the streamer's resident map; a layer only
/// tracks when it last fully covered the prefetch window.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    zoom_level: i32,
    tile_duration: f64,
    full_coverage: Option<Instant>,
}

impl Layer {
    pub fn new(zoom_level: i32, tile_duration: f64) -> Self {
        Self {
            zoom_level,
            tile_duration,
            full_coverage: None,
        }
    }

    pub fn zoom_level(&self) -> i32 {
        self.zoom_level
    }

    pub fn tile_duration(&self) -> f64 {
        self.tile_duration
    }

    /// When every wanted tile of this layer was last loaded.
    pub fn full_coverage(&self) -> Option<Instant> {
        self.full_coverage
    }

    pub fn mark_full_coverage(&mut self, now: Instant) {
        self.full_coverage = Some(now);
    }
}

/// The layer that most recently had full coverage, if any has.
pub fn newest_covered(layers: &[Layer]) -> Option<&Layer> {
    layers
        .iter()
        .filter(|l| l.full_coverage.is_some())
        .max_by_key(|l| l.full_coverage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_newest_covered() {
        let t0 = Instant::now();
        let mut layers = vec![Layer::new(-6, 1.0), Layer::new(0, 1.0), Layer::new(2, 1.0)];
        assert!(newest_covered(&layers).is_none());

        layers[0].mark_full_coverage(t0);
        layers[2].mark_full_coverage(t0 + Duration::from_millis(5));
        assert_eq!(newest_covered(&layers).map(Layer::zoom_level), Some(2));

        layers[1].mark_full_coverage(t0 + Duration::from_millis(10));
        assert_eq!(newest_covered(&layers).map(Layer::zoom_level), Some(0));
    }
}
