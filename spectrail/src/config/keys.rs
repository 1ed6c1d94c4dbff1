use std::str::FromStr;

use super::file::{ConfigError, ConfigFile};

/// A single setting, addressed as `section.key`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    TimelineLocation,
    TimelinePositionMs,
    TimelineDurationMs,
    TimelineViewportWidth,
    TimelineGapMaxPx,
    TimelineMergeSliverPx,
    TimelineMinGapPx,
    TimelineForwardViewports,
    TimelineBackwardViewports,
    TimelineMaxWalkSteps,
    TilesTileWidth,
    TilesTileHeight,
    TilesPrefetchCeiling,
    TilesHoldBelowZoom,
    TilesFadeInPerSec,
    TilesFadeOutPerSec,
    TilesDebounceMs,
    TilesFailurePolicy,
    TilesDenoise,
    TilesBaseUrl,
    NetworkApiBase,
    NetworkTimeoutSecs,
}

impl ConfigKey {
    /// Every key, grouped by section in file order.
    pub fn all() -> &'static [ConfigKey] {
        use ConfigKey::*;
        &[
            TimelineLocation,
            TimelinePositionMs,
            TimelineDurationMs,
            TimelineViewportWidth,
            TimelineGapMaxPx,
            TimelineMergeSliverPx,
            TimelineMinGapPx,
            TimelineForwardViewports,
            TimelineBackwardViewports,
            TimelineMaxWalkSteps,
            TilesTileWidth,
            TilesTileHeight,
            TilesPrefetchCeiling,
            TilesHoldBelowZoom,
            TilesFadeInPerSec,
            TilesFadeOutPerSec,
            TilesDebounceMs,
            TilesFailurePolicy,
            TilesDenoise,
            TilesBaseUrl,
            NetworkApiBase,
            NetworkTimeoutSecs,
        ]
    }

    /// Full `section.key` name.
    pub fn name(&self) -> &'static str {
        use ConfigKey::*;
        match self {
            TimelineLocation => "timeline.location",
            TimelinePositionMs => "timeline.position_ms",
            TimelineDurationMs => "timeline.duration_ms",
            TimelineViewportWidth => "timeline.viewport_width",
            TimelineGapMaxPx => "timeline.gap_max_px",
            TimelineMergeSliverPx => "timeline.merge_sliver_px",
            TimelineMinGapPx => "timeline.min_gap_px",
            TimelineForwardViewports => "timeline.forward_viewports",
            TimelineBackwardViewports => "timeline.backward_viewports",
            TimelineMaxWalkSteps => "timeline.max_walk_steps",
            TilesTileWidth => "tiles.tile_width",
            TilesTileHeight => "tiles.tile_height",
            TilesPrefetchCeiling => "tiles.prefetch_ceiling",
            TilesHoldBelowZoom => "tiles.hold_below_zoom",
            TilesFadeInPerSec => "tiles.fade_in_per_sec",
            TilesFadeOutPerSec => "tiles.fade_out_per_sec",
            TilesDebounceMs => "tiles.debounce_ms",
            TilesFailurePolicy => "tiles.failure_policy",
            TilesDenoise => "tiles.denoise",
            TilesBaseUrl => "tiles.base_url",
            NetworkApiBase => "network.api_base",
            NetworkTimeoutSecs => "network.timeout_secs",
        }
    }

    pub fn section(&self) -> &'static str {
        self.split().0
    }

    pub fn key_name(&self) -> &'static str {
        self.split().1
    }

    fn split(&self) -> (&'static str, &'static str) {
        let name = self.name();
        name.split_once('.').unwrap_or(("", name))
    }

    /// Current value as written to the file.
    pub fn get(&self, config: &ConfigFile) -> String {
        config
            .to_ini()
            .get_from(Some(self.section()), self.key_name())
            .unwrap_or_default()
            .to_string()
    }

    /// Set from a string, validated the same way as a loaded file.
    ///
    /// On error `config` is left unchanged.
    pub fn set(&self, config: &mut ConfigFile, value: &str) -> Result<(), ConfigError> {
        let mut ini = config.to_ini();
        ini.with_section(Some(self.section()))
            .set(self.key_name(), value.trim());
        *config = ConfigFile::from_ini(&ini)?;
        Ok(())
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ConfigKey::all()
            .iter()
            .copied()
            .find(|k| k.name() == wanted)
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}

impl std::fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streamer::FetchFailurePolicy;

    #[test]
    fn test_names_parse_back() {
        for key in ConfigKey::all() {
            assert_eq!(key.name().parse::<ConfigKey>().unwrap(), *key);
        }
        assert_eq!(ConfigKey::TilesDenoise.section(), "tiles");
        assert_eq!(ConfigKey::TilesDenoise.key_name(), "denoise");
    }

    #[test]
    fn test_unknown_key() {
        assert!(matches!(
            "tiles.colour".parse::<ConfigKey>(),
            Err(ConfigError::UnknownKey(_))
        ));
    }

    #[test]
    fn test_get_and_set() {
        let mut config = ConfigFile::default();
        assert_eq!(ConfigKey::TimelineLocation.get(&config), "Hawaii");
        assert_eq!(ConfigKey::TilesFailurePolicy.get(&config), "suppress");

        ConfigKey::TilesFailurePolicy.set(&mut config, "evict").unwrap();
        assert_eq!(config.tiles.failure_policy, FetchFailurePolicy::Evict);

        ConfigKey::TimelineGapMaxPx.set(&mut config, "150").unwrap();
        assert_eq!(config.timeline.gap_max_px, 150.0);
        assert_eq!(ConfigKey::TimelineGapMaxPx.get(&config), "150");
    }

    #[test]
    fn test_invalid_set_leaves_config_unchanged() {
        let mut config = ConfigFile::default();
        let before = config.clone();
        assert!(ConfigKey::TilesPrefetchCeiling.set(&mut config, "-3").is_err());
        assert!(ConfigKey::TimelineViewportWidth.set(&mut config, "0").is_err());
        assert_eq!(config, before);
    }
}
