//! Control panel configuration using Figment
//!
//! Configuration is loaded from:
//! 1. `config/panel.toml` (base configuration, optional)
//! 2. Environment variables prefixed with `ROI_PANEL_`, nested keys separated
//!    by a double underscore (`ROI_PANEL_AUTO_MASK__ROWS=8`)
//!
//! Every field has a default, so an empty or missing file yields a usable
//! configuration.
//!
//! # Example
//! ```no_run
//! use roi_tracking::config::PanelConfig;
//!
//! let config = PanelConfig::load()?;
//! println!("Application: {}", config.application.name);
//! # Ok::<(), figment::Error>(())
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::auto_mask::{DEFAULT_COLS, DEFAULT_ROWS};
use crate::geometry::FrameBounds;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/panel.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "ROI_PANEL_";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PanelConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Fallback camera settings
    pub camera: CameraConfig,
    /// Where saved ROI sets live
    pub storage: StorageConfig,
    /// Auto-mask grid defaults
    pub auto_mask: AutoMaskConfig,
    /// Load behaviour
    pub persistence: PersistenceConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "ROI Tracking Panel".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Frame size assumed when no camera driver reports one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Frame width in pixels
    pub default_width: u32,
    /// Frame height in pixels
    pub default_height: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            default_width: 1280,
            default_height: 960,
        }
    }
}

impl CameraConfig {
    /// Configured frame bounds.
    pub fn bounds(&self) -> FrameBounds {
        FrameBounds::new(self.default_width, self.default_height)
    }
}

/// Storage backend configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for saved ROI sets
    pub roi_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            roi_dir: PathBuf::from("data/rois"),
        }
    }
}

/// Grid used by the parameterless "Auto mask" action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoMaskConfig {
    /// Grid rows
    pub rows: u32,
    /// Grid columns
    pub cols: u32,
}

impl Default for AutoMaskConfig {
    fn default() -> Self {
        Self {
            rows: DEFAULT_ROWS,
            cols: DEFAULT_COLS,
        }
    }
}

/// Load behaviour for saved ROI sets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Rescale sets saved at a different resolution with the same aspect ratio
    pub allow_rescale: bool,
}

impl PanelConfig {
    /// Load configuration from `config/panel.toml` and environment variables
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, figment::Error> {
        Self::figment(path.as_ref()).extract()
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(PanelConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.camera.default_width == 0 || self.camera.default_height == 0 {
            return Err(format!(
                "Invalid camera frame {}x{}. Both dimensions must be positive",
                self.camera.default_width, self.camera.default_height
            ));
        }

        if self.auto_mask.rows == 0 || self.auto_mask.cols == 0 {
            return Err(format!(
                "Invalid auto_mask grid {}x{}. Rows and cols must be at least 1",
                self.auto_mask.rows, self.auto_mask.cols
            ));
        }

        if self.storage.roi_dir.as_os_str().is_empty() {
            return Err("storage.roi_dir cannot be empty".to_string());
        }

        Ok(())
    }
}
