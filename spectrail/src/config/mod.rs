//! INI configuration file.
//!
//! Settings live in `~/.spectrail/config.ini`:
//!
//! ```ini
//! [timeline]
//! location = Hawaii
//! gap_max_px = 300
//!
//! [tiles]
//! prefetch_ceiling = 75
//! failure_policy = suppress
//!
//! [network]
//! api_base = https://us-central1-gweb-deepblue.cloudfunctions.net/
//! ```
//!
//! Missing keys take the `DEFAULT_*` constants of the module that owns the
//! setting. [`ConfigKey`] names each setting as `section.key` for the CLI.

mod file;
mod keys;

pub use file::{
    config_directory, config_file_path, ConfigError, ConfigFile, NetworkSettings, TileSettings,
    TimelineSettings, DEFAULT_API_BASE, DEFAULT_DURATION_MS, DEFAULT_LOCATION, DEFAULT_POSITION_MS,
    DEFAULT_TIMEOUT_SECS, DEFAULT_VIEWPORT_WIDTH,
};
pub use keys::ConfigKey;
