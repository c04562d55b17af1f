//! Configuration structs with defaults, validation and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tessera_lod::SectorBudget;

use crate::error::ConfigError;

/// File name inside the config directory.
pub const CONFIG_FILE_NAME: &str = "config.ron";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Budget and level selection tunables.
    pub streaming: StreamingConfig,
    /// Load worker pool.
    pub loader: LoaderConfig,
    /// Synthetic demo scene and flight.
    pub demo: DemoConfig,
    pub debug: DebugConfig,
}

/// Culling budget settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StreamingConfig {
    /// Cost cap for budgeted sectors, in bytes.
    pub max_cost_bytes: f64,
    /// Sectors closer than this are always loaded Detailed.
    pub high_detail_proximity_threshold: f32,
    /// Largest acceptable proxy quad as a fraction of viewport height.
    pub max_quad_size: f32,
    /// Share of the budget held back for Simple sectors (0.0 - 1.0, exclusive).
    pub reserved_simple_fraction: f64,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        let budget = SectorBudget::default();
        Self {
            max_cost_bytes: budget.max_cost,
            high_detail_proximity_threshold: budget.high_detail_proximity_threshold,
            max_quad_size: budget.max_quad_size,
            reserved_simple_fraction: budget.reserved_simple_fraction,
        }
    }
}

impl StreamingConfig {
    pub fn to_budget(&self) -> SectorBudget {
        SectorBudget {
            max_cost: self.max_cost_bytes,
            high_detail_proximity_threshold: self.high_detail_proximity_threshold,
            max_quad_size: self.max_quad_size,
            reserved_simple_fraction: self.reserved_simple_fraction,
        }
    }
}

/// Load worker settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoaderConfig {
    /// Number of load threads (0 = one less than the CPU count).
    pub worker_threads: usize,
}

/// Settings for the synthetic demo run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DemoConfig {
    /// Frames of the scripted camera flight.
    pub frames: u32,
    /// Subdivision depth of each synthetic octree.
    pub tree_depth: u32,
    /// Number of models placed side by side.
    pub model_count: u32,
    /// Seed for the simulated fetch latency.
    pub seed: u64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            frames: 240,
            tree_depth: 3,
            model_count: 2,
            seed: 42,
        }
    }
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Platform config directory for the streaming tools, if the platform has one.
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("tessera"))
}

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            config.validate()?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join(CONFIG_FILE_NAME);
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);
        let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
        new_config.validate()?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }

    /// Reject values the culler cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.streaming;
        if s.max_cost_bytes.is_nan() || s.max_cost_bytes < 0.0 {
            return Err(invalid("streaming.max_cost_bytes", s.max_cost_bytes, "must be >= 0"));
        }
        if !positive(s.high_detail_proximity_threshold) {
            return Err(invalid(
                "streaming.high_detail_proximity_threshold",
                s.high_detail_proximity_threshold,
                "must be > 0",
            ));
        }
        if !positive(s.max_quad_size) {
            return Err(invalid("streaming.max_quad_size", s.max_quad_size, "must be > 0"));
        }
        if !(0.0..1.0).contains(&s.reserved_simple_fraction) {
            return Err(invalid(
                "streaming.reserved_simple_fraction",
                s.reserved_simple_fraction,
                "must be in [0, 1)",
            ));
        }
        Ok(())
    }
}

fn positive(value: f32) -> bool {
    value.is_finite() && value > 0.0
}

fn invalid(field: &'static str, value: impl std::fmt::Display, rule: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: format!("{value} {rule}"),
    }
}
