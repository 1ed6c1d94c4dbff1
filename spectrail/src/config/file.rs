use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::{Ini, Properties};
use thiserror::Error;

use crate::mapper::{
    LookupConfig, DEFAULT_BACKWARD_VIEWPORTS, DEFAULT_FORWARD_VIEWPORTS, DEFAULT_GAP_MAX_PX,
    DEFAULT_MAX_WALK_STEPS, DEFAULT_MERGE_SLIVER_PX, DEFAULT_MIN_GAP_PX,
};
use crate::pyramid::{SpectrogramNaming, SPECTROGRAM_BASE_URL};
use crate::streamer::{
    FetchFailurePolicy, StreamerConfig, DEFAULT_DEBOUNCE_MS, DEFAULT_FADE_IN_PER_SEC,
    DEFAULT_FADE_OUT_PER_SEC, DEFAULT_HOLD_BELOW_ZOOM, DEFAULT_PREFETCH_CEILING,
    DEFAULT_TILE_HEIGHT, DEFAULT_TILE_WIDTH,
};

/// Default location shown on start.
pub const DEFAULT_LOCATION: &str = "Hawaii";

/// Default playhead position, epoch milliseconds.
pub const DEFAULT_POSITION_MS: f64 = 1_423_645_400_000.0;

/// Default display duration, milliseconds.
pub const DEFAULT_DURATION_MS: f64 = 236_034.0;

/// Default viewport width in pixels.
pub const DEFAULT_VIEWPORT_WIDTH: f64 = 1920.0;

/// Default base URL for the location, gap and classification endpoints.
pub const DEFAULT_API_BASE: &str = "https://us-central1-gweb-deepblue.cloudfunctions.net/";

/// Default HTTP request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

const CONFIG_DIR: &str = ".spectrail";
const CONFIG_FILE: &str = "config.ini";

/// Errors from loading or saving the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(String),

    #[error("Invalid value '{value}' for {section}.{key}: {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    #[error("Unknown configuration key '{0}'")]
    UnknownKey(String),
}

impl From<ini::Error> for ConfigError {
    fn from(err: ini::Error) -> Self {
        match err {
            ini::Error::Io(e) => ConfigError::Io(e),
            ini::Error::Parse(e) => ConfigError::Parse(e.to_string()),
        }
    }
}

/// `[timeline]` settings.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineSettings {
    pub location: String,
    pub position_ms: f64,
    pub duration_ms: f64,
    pub viewport_width: f64,
    pub gap_max_px: f64,
    pub merge_sliver_px: f64,
    pub min_gap_px: f64,
    pub forward_viewports: f64,
    pub backward_viewports: f64,
    pub max_walk_steps: usize,
}

impl Default for TimelineSettings {
    fn default() -> Self {
        Self {
            location: DEFAULT_LOCATION.to_string(),
            position_ms: DEFAULT_POSITION_MS,
            duration_ms: DEFAULT_DURATION_MS,
            viewport_width: DEFAULT_VIEWPORT_WIDTH,
            gap_max_px: DEFAULT_GAP_MAX_PX,
            merge_sliver_px: DEFAULT_MERGE_SLIVER_PX,
            min_gap_px: DEFAULT_MIN_GAP_PX,
            forward_viewports: DEFAULT_FORWARD_VIEWPORTS,
            backward_viewports: DEFAULT_BACKWARD_VIEWPORTS,
            max_walk_steps: DEFAULT_MAX_WALK_STEPS,
        }
    }
}

/// `[tiles]` settings.
#[derive(Debug, Clone, PartialEq)]
pub struct TileSettings {
    pub tile_width: f64,
    pub tile_height: f64,
    pub prefetch_ceiling: usize,
    pub hold_below_zoom: i32,
    pub fade_in_per_sec: f64,
    pub fade_out_per_sec: f64,
    pub debounce_ms: u64,
    pub failure_policy: FetchFailurePolicy,
    pub denoise: bool,
    pub base_url: String,
}

impl Default for TileSettings {
    fn default() -> Self {
        Self {
            tile_width: DEFAULT_TILE_WIDTH,
            tile_height: DEFAULT_TILE_HEIGHT,
            prefetch_ceiling: DEFAULT_PREFETCH_CEILING,
            hold_below_zoom: DEFAULT_HOLD_BELOW_ZOOM,
            fade_in_per_sec: DEFAULT_FADE_IN_PER_SEC,
            fade_out_per_sec: DEFAULT_FADE_OUT_PER_SEC,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            failure_policy: FetchFailurePolicy::default(),
            denoise: true,
            base_url: SPECTROGRAM_BASE_URL.to_string(),
        }
    }
}

/// `[network]` settings.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkSettings {
    pub api_base: String,
    pub timeout_secs: u64,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// The whole configuration file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigFile {
    pub timeline: TimelineSettings,
    pub tiles: TileSettings,
    pub network: NetworkSettings,
}

/// Directory holding the configuration file (`~/.spectrail`).
pub fn config_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR)
}

/// Path to the configuration file (`~/.spectrail/config.ini`).
pub fn config_file_path() -> PathBuf {
    config_directory().join(CONFIG_FILE)
}

impl ConfigFile {
    /// Load from the default path. A missing file yields the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file_path())
    }

    /// Load from `path`. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let ini = Ini::load_from_file(path)?;
        Self::from_ini(&ini)
    }

    /// Parse INI text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::from_ini(&ini)
    }

    pub(crate) fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let timeline = match ini.section(Some("timeline")) {
            Some(s) => {
                let d = &defaults.timeline;
                TimelineSettings {
                    location: s.get("location").map_or_else(|| d.location.clone(), str::to_string),
                    position_ms: value(s, "timeline", "position_ms", d.position_ms)?,
                    duration_ms: positive(s, "timeline", "duration_ms", d.duration_ms)?,
                    viewport_width: positive(s, "timeline", "viewport_width", d.viewport_width)?,
                    gap_max_px: positive(s, "timeline", "gap_max_px", d.gap_max_px)?,
                    merge_sliver_px: value(s, "timeline", "merge_sliver_px", d.merge_sliver_px)?,
                    min_gap_px: value(s, "timeline", "min_gap_px", d.min_gap_px)?,
                    forward_viewports: past_centre(s, "timeline", "forward_viewports", d.forward_viewports)?,
                    backward_viewports: positive(s, "timeline", "backward_viewports", d.backward_viewports)?,
                    max_walk_steps: value(s, "timeline", "max_walk_steps", d.max_walk_steps)?,
                }
            }
            None => defaults.timeline,
        };

        let tiles = match ini.section(Some("tiles")) {
            Some(s) => {
                let d = &defaults.tiles;
                TileSettings {
                    tile_width: positive(s, "tiles", "tile_width", d.tile_width)?,
                    tile_height: positive(s, "tiles", "tile_height", d.tile_height)?,
                    prefetch_ceiling: value(s, "tiles", "prefetch_ceiling", d.prefetch_ceiling)?,
                    hold_below_zoom: value(s, "tiles", "hold_below_zoom", d.hold_below_zoom)?,
                    fade_in_per_sec: positive(s, "tiles", "fade_in_per_sec", d.fade_in_per_sec)?,
                    fade_out_per_sec: positive(s, "tiles", "fade_out_per_sec", d.fade_out_per_sec)?,
                    debounce_ms: value(s, "tiles", "debounce_ms", d.debounce_ms)?,
                    failure_policy: value(s, "tiles", "failure_policy", d.failure_policy)?,
                    denoise: value(s, "tiles", "denoise", d.denoise)?,
                    base_url: s.get("base_url").map_or_else(|| d.base_url.clone(), str::to_string),
                }
            }
            None => defaults.tiles,
        };

        let network = match ini.section(Some("network")) {
            Some(s) => {
                let d = &defaults.network;
                NetworkSettings {
                    api_base: s.get("api_base").map_or_else(|| d.api_base.clone(), str::to_string),
                    timeout_secs: value(s, "network", "timeout_secs", d.timeout_secs)?,
                }
            }
            None => defaults.network,
        };

        Ok(Self {
            timeline,
            tiles,
            network,
        })
    }

    /// Render as an INI document.
    pub fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();
        let t = &self.timeline;
        ini.with_section(Some("timeline"))
            .set("location", t.location.as_str())
            .set("position_ms", t.position_ms.to_string())
            .set("duration_ms", t.duration_ms.to_string())
            .set("viewport_width", t.viewport_width.to_string())
            .set("gap_max_px", t.gap_max_px.to_string())
            .set("merge_sliver_px", t.merge_sliver_px.to_string())
            .set("min_gap_px", t.min_gap_px.to_string())
            .set("forward_viewports", t.forward_viewports.to_string())
            .set("backward_viewports", t.backward_viewports.to_string())
            .set("max_walk_steps", t.max_walk_steps.to_string());

        let tiles = &self.tiles;
        ini.with_section(Some("tiles"))
            .set("tile_width", tiles.tile_width.to_string())
            .set("tile_height", tiles.tile_height.to_string())
            .set("prefetch_ceiling", tiles.prefetch_ceiling.to_string())
            .set("hold_below_zoom", tiles.hold_below_zoom.to_string())
            .set("fade_in_per_sec", tiles.fade_in_per_sec.to_string())
            .set("fade_out_per_sec", tiles.fade_out_per_sec.to_string())
            .set("debounce_ms", tiles.debounce_ms.to_string())
            .set("failure_policy", tiles.failure_policy.as_str())
            .set("denoise", tiles.denoise.to_string())
            .set("base_url", tiles.base_url.as_str());

        ini.with_section(Some("network"))
            .set("api_base", self.network.api_base.as_str())
            .set("timeout_secs", self.network.timeout_secs.to_string());
        ini
    }

    /// Save to the default path, creating `~/.spectrail` if needed.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_file_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.to_ini().write_to_file(path)?;
        tracing::debug!(path = %path.display(), "Saved configuration");
        Ok(())
    }

    /// Lookup tuning from `[timeline]`.
    pub fn to_lookup_config(&self) -> LookupConfig {
        let t = &self.timeline;
        LookupConfig {
            gap_max_px: t.gap_max_px,
            merge_sliver_px: t.merge_sliver_px,
            min_gap_px: t.min_gap_px,
            forward_viewports: t.forward_viewports,
            backward_viewports: t.backward_viewports,
            max_walk_steps: t.max_walk_steps,
            ..LookupConfig::default()
        }
    }

    /// Streamer tuning from `[tiles]`.
    pub fn to_streamer_config(&self) -> StreamerConfig {
        let t = &self.tiles;
        StreamerConfig {
            tile_width: t.tile_width,
            tile_height: t.tile_height,
            prefetch_ceiling: t.prefetch_ceiling,
            hold_below_zoom: t.hold_below_zoom,
            fade_in_per_sec: t.fade_in_per_sec,
            fade_out_per_sec: t.fade_out_per_sec,
            debounce: Duration::from_millis(t.debounce_ms),
            failure_policy: t.failure_policy,
            ..StreamerConfig::default()
        }
    }

    pub fn spectrogram_naming(&self) -> SpectrogramNaming {
        SpectrogramNaming::new(self.tiles.base_url.as_str(), self.tiles.denoise)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.network.timeout_secs)
    }
}

/// Parse `key` from `section`, falling back to `default` when absent.
fn value<T>(props: &Properties, section: &str, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match props.get(key) {
        Some(raw) => parse_setting(section, key, raw),
        None => Ok(default),
    }
}

fn positive(props: &Properties, section: &str, key: &str, default: f64) -> Result<f64, ConfigError> {
    let v = value(props, section, key, default)?;
    if !(v.is_finite() && v > 0.0) {
        return Err(invalid(section, key, &v.to_string(), "must be a positive number"));
    }
    Ok(v)
}

/// The anchor sits half a viewport in, so the forward walk must reach
/// beyond it.
fn past_centre(props: &Properties, section: &str, key: &str, default: f64) -> Result<f64, ConfigError> {
    let v = value(props, section, key, default)?;
    if !(v.is_finite() && v > 0.5) {
        return Err(invalid(section, key, &v.to_string(), "must be greater than 0.5"));
    }
    Ok(v)
}

fn parse_setting<T>(section: &str, key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| invalid(section, key, raw, &e.to_string()))
}

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = ConfigFile::load_from(&dir.path().join("nope.ini")).unwrap();
        assert_eq!(config, ConfigFile::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config = ConfigFile::parse(
            "[timeline]\ngap_max_px = 150\n\n[tiles]\nfailure_policy = evict\ndenoise = false\n",
        )
        .unwrap();
        assert_eq!(config.timeline.gap_max_px, 150.0);
        assert_eq!(config.timeline.min_gap_px, DEFAULT_MIN_GAP_PX);
        assert_eq!(config.tiles.failure_policy, FetchFailurePolicy::Evict);
        assert!(!config.tiles.denoise);
        assert_eq!(config.network, NetworkSettings::default());
    }

    #[test]
    fn test_invalid_value_is_reported() {
        let err = ConfigFile::parse("[tiles]\nprefetch_ceiling = lots\n").unwrap_err();
        match err {
            ConfigError::InvalidValue { section, key, value, .. } => {
                assert_eq!(section, "tiles");
                assert_eq!(key, "prefetch_ceiling");
                assert_eq!(value, "lots");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_non_positive_width_rejected() {
        let err = ConfigFile::parse("[timeline]\nviewport_width = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_forward_walk_must_pass_centre() {
        for raw in ["0.5", "0.25", "-2"] {
            let err = ConfigFile::parse(&format!("[timeline]\nforward_viewports = {raw}\n")).unwrap_err();
            assert!(matches!(
                err,
                ConfigError::InvalidValue { ref key, .. } if key == "forward_viewports"
            ));
        }
        let config = ConfigFile::parse("[timeline]\nforward_viewports = 0.75\n").unwrap();
        let lookup = crate::mapper::build_lookup(0.0, 500.0, &[], 1000.0, &config.to_lookup_config());
        assert!(lookup.is_some());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.ini");

        let mut config = ConfigFile::default();
        config.timeline.location = "Saipan".to_string();
        config.tiles.prefetch_ceiling = 40;
        config.tiles.failure_policy = FetchFailurePolicy::Evict;
        config.network.timeout_secs = 3;
        config.save_to(&path).unwrap();

        let loaded = ConfigFile::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_conversions() {
        let mut config = ConfigFile::default();
        config.timeline.gap_max_px = 120.0;
        config.tiles.debounce_ms = 50;
        config.tiles.hold_below_zoom = 3;

        let lookup = config.to_lookup_config();
        assert_eq!(lookup.gap_max_px, 120.0);
        assert_eq!(lookup.max_walk_steps, DEFAULT_MAX_WALK_STEPS);

        let streamer = config.to_streamer_config();
        assert_eq!(streamer.debounce, Duration::from_millis(50));
        assert_eq!(streamer.hold_below_zoom, 3);
        assert_eq!(config.timeout(), Duration::from_secs(DEFAULT_TIMEOUT_SECS));
    }
}
