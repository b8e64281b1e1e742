//! Configuration for the kf binary

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Project-local config file name
pub const LOCAL_CONFIG: &str = ".keyfetch.yml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error); `--log-level` wins over this
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Settings for `kf demo`
    #[serde(default)]
    pub demo: DemoConfig,
}

/// Knobs for the demonstration scenarios
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemoConfig {
    /// How long each simulated producer takes, in milliseconds
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    /// Number of consumers sharing a key in the fan-out scenarios
    #[serde(default = "default_consumers")]
    pub consumers: usize,

    /// Cache key used by the keyed scenarios
    #[serde(default = "default_key")]
    pub key: String,
}

fn default_delay_ms() -> u64 {
    100
}

fn default_consumers() -> usize {
    2
}

fn default_key() -> String {
    "k".to_string()
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_delay_ms(),
            consumers: default_consumers(),
            key: default_key(),
        }
    }
}

impl Config {
    /// Load config from the explicit path, the project file, the user file, or defaults
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        if let Some(config_path) = path {
            return Self::load_from_file(config_path)
                .context(format!("Failed to load config from {}", config_path.display()));
        }

        let default_paths = [
            Some(PathBuf::from(LOCAL_CONFIG)),
            dirs::config_dir().map(|p| p.join("keyfetch").join("keyfetch.yml")),
        ];

        for path in default_paths.iter().flatten() {
            if path.exists() {
                debug!(path = %path.display(), "Config::load: found config");
                return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
            }
        }

        debug!("Config::load: no config file, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_yaml()?).context(format!("Failed to write config to {}", path.display()))?;
        Ok(())
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}
