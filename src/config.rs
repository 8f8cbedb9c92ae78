//! Configuration for slate.
//!
//! Loaded from `~/.config/slate/config.toml`; a default file is generated on
//! first run if missing.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub compositor: CompositorConfig,
    pub effects: EffectsConfig,
}

impl Config {
    /// Load configuration from file, or use defaults if file doesn't exist.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            info!("Config file not found at {:?}, using defaults", config_path);
            if let Err(e) = Self::save_default(&config_path) {
                warn!("Failed to create default config file: {}", e);
            }
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path).context("Failed to read config file")?;
        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;

        info!("Configuration loaded from {:?}", config_path);
        debug!("Config: {:?}", config);

        Ok(config)
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("slate");
        Ok(config_dir.join("config.toml"))
    }

    fn save_default(path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let toml_string =
            toml::to_string_pretty(&Self::default()).context("Failed to serialize default config")?;
        fs::write(path, toml_string).context("Failed to write default config file")?;

        info!("Created default config file at {:?}", path);
        Ok(())
    }
}

/// Compositor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositorConfig {
    /// Enable compositing at startup.
    pub enabled: bool,
    /// Drop shadow mode: "none", "simple", "gaussian".
    pub shadow_mode: String,
    /// Gaussian shadow blur radius in pixels.
    pub shadow_radius: u8,
    /// Shadow color (RGBA, each 0.0-1.0).
    pub shadow_color: [f32; 4],
    /// Shadow offset from the window, in pixels.
    pub shadow_offset: [i32; 2],
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            shadow_mode: "gaussian".to_string(),
            shadow_radius: 8,
            shadow_color: [0.0, 0.0, 0.0, 0.6],
            shadow_offset: [4, 4],
        }
    }
}

/// Visual effect configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectsConfig {
    /// Master switch for all transitions.
    pub enabled: bool,
    /// Map (window appears) slide-in duration in milliseconds. 0 disables.
    pub map_duration_ms: u64,
    /// Unmap (window closes) fade-out duration in milliseconds. 0 disables.
    pub unmap_duration_ms: u64,
    /// Minimize scale-down duration in milliseconds. 0 disables.
    pub minimize_duration_ms: u64,
    /// Top-app switch cross-fade duration in milliseconds. 0 disables.
    pub transition_duration_ms: u64,
    /// Client types that animate: only "app" by default; panels, dialogs and
    /// desktops show and hide immediately.
    pub animated_types: Vec<String>,
}

impl Default for EffectsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            map_duration_ms: 200,
            unmap_duration_ms: 160,
            minimize_duration_ms: 220,
            transition_duration_ms: 250,
            animated_types: vec!["app".to_string()],
        }
    }
}
