use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::Deserialize;
use thiserror::Error;

use crate::extract::DEFAULT_GRID_RESOLUTION;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Application configuration loaded from TOML config file.
/// All fields have sensible defaults; the config file is optional.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Number of parallel workers. 0 = auto-detect (cores / 2, min 1).
    pub workers: usize,
    /// Grid slots per bar used for quantization (max 64).
    pub grid_resolution: u32,
    /// Analyzer thresholds.
    pub analysis: AnalysisConfig,
    /// Which optional analyses the extended builder runs.
    pub extended: ExtendedOptions,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            grid_resolution: DEFAULT_GRID_RESOLUTION,
            analysis: AnalysisConfig::default(),
            extended: ExtendedOptions::default(),
        }
    }
}

/// Thresholds shared by the pattern and performance analyzers.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Minimum Jaccard similarity for two bars to count as a similar pair.
    pub similarity_threshold: f64,
    /// Minimum share of bars a slot must be hit in to be an anchor.
    pub anchor_threshold: f64,
    /// Bars on each side used for the surrounding-density average.
    pub density_window: usize,
    /// Hit count ≥ average × this = density spike (fill candidate).
    pub spike_ratio: f64,
    /// Hit count ≤ average × this = density drop (breakdown candidate).
    pub drop_ratio: f64,
    /// Absolute hit-count difference required before a deviation is a marker.
    pub min_density_delta: f64,
    /// Standard deviations below the role mean for a ghost note.
    pub ghost_std_devs: f64,
    /// Velocities below this are ghosts when the role normally plays above it.
    pub ghost_velocity_floor: u8,
    /// Standard deviations above the role mean for an accent.
    pub accent_std_devs: f64,
    /// Velocities at or above this are accents when the role normally plays below it.
    pub accent_velocity_ceiling: u8,
    /// Mean offset (ticks) beyond which a track is laid back or pushed.
    pub feel_threshold_ticks: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.8,
            anchor_threshold: 0.8,
            density_window: 2,
            spike_ratio: 1.5,
            drop_ratio: 0.5,
            min_density_delta: 2.0,
            ghost_std_devs: 1.5,
            ghost_velocity_floor: 40,
            accent_std_devs: 1.5,
            accent_velocity_ceiling: 110,
            feel_threshold_ticks: 5.0,
        }
    }
}

/// Gates for the optional extended analyses. Pattern repetition, similarity and
/// sequence analysis always run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExtendedOptions {
    pub cross_role: bool,
    pub anchors: bool,
    pub structural: bool,
    pub performance: bool,
    /// Named anchor template to compare against (e.g. "PopRockBasic").
    pub reference: Option<String>,
}

impl Default for ExtendedOptions {
    fn default() -> Self {
        Self {
            cross_role: true,
            anchors: true,
            structural: true,
            performance: true,
            reference: None,
        }
    }
}

impl AppConfig {
    /// Load config from `~/.config/groovescan/config.toml`.
    /// Returns default config if file doesn't exist.
    /// Logs a warning if the file exists but can't be parsed.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) if path.exists() => match Self::from_path(&path) {
                Ok(config) => {
                    log::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    log::warn!("{}. Using defaults.", e);
                    Self::default()
                }
            },
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Load config from an explicit path. Unlike [`AppConfig::load`], failures are errors.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str::<AppConfig>(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Resolve worker count: 0 → auto-detect (cores / 2, min 1).
    pub fn resolve_workers(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            let cores = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2);
            (cores / 2).max(1)
        }
    }

    /// Get the config file path.
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME)
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}
