//! Configuration for the CLI runner.
//!
//! Configuration is loaded from multiple sources in priority order:
//! 1. Environment variables (`P8X_EMU_TICKS`, `P8X_EMU_IMAGE`)
//! 2. Project-local config file (`./p8x-emu.toml`)
//! 3. User config file (`~/.config/p8x-emu/config.toml`)
//! 4. Built-in defaults
//!
//! # Config File Format
//!
//! ```toml
//! # p8x-emu.toml
//!
//! # Tick budget when --ticks is not given on the command line
//! default_ticks = 2000000
//!
//! # Image loaded when no path argument is given
//! default_image = "blink.binary"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Tick budget used when nothing is configured.
const FALLBACK_TICKS: u64 = 1_000_000;

/// Global cached configuration.
static CONFIG: OnceLock<Config> = OnceLock::new();

/// p8x-emu configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Tick budget for a run when `--ticks` is not given.
    pub default_ticks: Option<u64>,

    /// Image loaded when no path argument is given.
    pub default_image: Option<String>,
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. Project-local `p8x-emu.toml`
    /// 3. User config `~/.config/p8x-emu/config.toml`
    /// 4. Defaults
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(user_config) = Self::load_user_config() {
            config.merge(user_config);
        }

        if let Some(local_config) = Self::load_local_config() {
            config.merge(local_config);
        }

        config.apply_env_overrides();

        config
    }

    /// Get the cached global configuration.
    ///
    /// Loads configuration on first call and caches it.
    pub fn get() -> &'static Config {
        CONFIG.get_or_init(|| {
            let config = Self::load();
            log::debug!("Loaded configuration: {:?}", config);
            config
        })
    }

    /// Get the tick budget, with fallback to the built-in default.
    pub fn ticks(&self) -> u64 {
        self.default_ticks.unwrap_or(FALLBACK_TICKS)
    }

    /// Load user configuration from ~/.config/p8x-emu/config.toml
    fn load_user_config() -> Option<Self> {
        let config_dir = dirs::config_dir()?;
        let config_path = config_dir.join("p8x-emu").join("config.toml");
        Self::load_from_file(&config_path)
    }

    /// Load project-local configuration from ./p8x-emu.toml
    fn load_local_config() -> Option<Self> {
        let local_path = Path::new("p8x-emu.toml");
        if let Some(config) = Self::load_from_file(local_path) {
            return Some(config);
        }

        if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
            let project_path = Path::new(&manifest_dir).join("p8x-emu.toml");
            if let Some(config) = Self::load_from_file(&project_path) {
                return Some(config);
            }
        }

        None
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    log::info!("Loaded config from {}", path.display());
                    Some(config)
                }
                Err(e) => {
                    log::warn!("Failed to parse {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) => {
                log::warn!("Failed to read {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Merge another config into this one.
    /// Only overrides fields that are Some in the other config.
    fn merge(&mut self, other: Self) {
        if other.default_ticks.is_some() {
            self.default_ticks = other.default_ticks;
        }
        if other.default_image.is_some() {
            self.default_image = other.default_image;
        }
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(ticks) = std::env::var("P8X_EMU_TICKS") {
            match ticks.parse() {
                Ok(value) => {
                    log::info!("Using P8X_EMU_TICKS from environment: {value}");
                    self.default_ticks = Some(value);
                }
                Err(_) => log::warn!("Ignoring unparsable P8X_EMU_TICKS: {ticks}"),
            }
        }
        if let Ok(path) = std::env::var("P8X_EMU_IMAGE") {
            log::info!("Using P8X_EMU_IMAGE from environment: {path}");
            self.default_image = Some(path);
        }
    }

    /// Get the path to the user config file (for display/creation).
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("p8x-emu").join("config.toml"))
    }
}
