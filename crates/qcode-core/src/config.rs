//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/qcode/config.toml)
//! 3. Environment variables (QCODE_* prefix)
//!
//! Environment variables take precedence over config file values.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::exclusivity::CoordinatorConfig;
use crate::history::EditHistory;
use crate::models::Color;
use crate::overlay::{StyleOptions, StylePalette};

/// Environment variable prefix
const ENV_PREFIX: &str = "QCODE";

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Maximum undo depth per document (unbounded when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_limit: Option<usize>,

    /// Overlay rendering
    #[serde(default)]
    pub style: StyleConfig,

    /// Edit-lock protocol timing
    #[serde(default)]
    pub coordinator: CoordinatorSettings,
}

/// `[style]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleConfig {
    #[serde(default = "default_show_colors")]
    pub show_colors: bool,
    #[serde(default = "default_fill_alpha")]
    pub fill_alpha: f32,
    #[serde(default = "default_highlight_alpha")]
    pub highlight_alpha: f32,
    #[serde(default = "default_search_current")]
    pub search_current: Color,
    #[serde(default = "default_search_other")]
    pub search_other: Color,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            show_colors: default_show_colors(),
            fill_alpha: default_fill_alpha(),
            highlight_alpha: default_highlight_alpha(),
            search_current: default_search_current(),
            search_other: default_search_other(),
        }
    }
}

/// `[coordinator]` section, in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorSettings {
    #[serde(default = "default_query_window_ms")]
    pub query_window_ms: u64,
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "default_stale_threshold_ms")]
    pub stale_threshold_ms: u64,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            query_window_ms: default_query_window_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            stale_threshold_ms: default_stale_threshold_ms(),
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (QCODE_SHOW_COLORS, QCODE_QUERY_WINDOW_MS, ...)
    /// 2. Config file (~/.config/qcode/config.toml or QCODE_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration, preferring a path given on the command line
    pub fn load_with_cli_override(cli_path: Option<&PathBuf>) -> Result<Self> {
        match cli_path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        // QCODE_SHOW_COLORS
        if let Ok(val) = std::env::var(format!("{}_SHOW_COLORS", ENV_PREFIX)) {
            self.style.show_colors = val.eq_ignore_ascii_case("true") || val == "1";
        }

        if let Some(ms) = env_millis("QUERY_WINDOW_MS")? {
            self.coordinator.query_window_ms = ms;
        }
        if let Some(ms) = env_millis("HEARTBEAT_MS")? {
            self.coordinator.heartbeat_interval_ms = ms;
        }
        if let Some(ms) = env_millis("STALE_MS")? {
            self.coordinator.stale_threshold_ms = ms;
        }

        // QCODE_HISTORY_LIMIT, empty clears it
        if let Ok(val) = std::env::var(format!("{}_HISTORY_LIMIT", ENV_PREFIX)) {
            self.history_limit = if val.is_empty() {
                None
            } else {
                Some(
                    val.parse()
                        .with_context(|| format!("Invalid {}_HISTORY_LIMIT: {}", ENV_PREFIX, val))?,
                )
            };
        }
        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, config_path: &PathBuf) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with QCODE_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("qcode")
            .join("config.toml")
    }

    /// Style resolver options with nothing selected
    pub fn style_options(&self) -> StyleOptions {
        StyleOptions {
            show_colors: self.style.show_colors,
            active_segment: None,
            active_match_start: None,
            palette: StylePalette {
                fill_alpha: self.style.fill_alpha,
                highlight_alpha: self.style.highlight_alpha,
                search_current: self.style.search_current,
                search_other: self.style.search_other,
            },
        }
    }

    /// Edit coordinator timing
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            query_window: Duration::from_millis(self.coordinator.query_window_ms),
            heartbeat_interval: Duration::from_millis(self.coordinator.heartbeat_interval_ms),
            stale_threshold: Duration::from_millis(self.coordinator.stale_threshold_ms),
        }
    }

    /// A fresh edit history honoring `history_limit`
    pub fn new_history(&self) -> EditHistory {
        match self.history_limit {
            Some(limit) => EditHistory::with_limit(limit),
            None => EditHistory::new(),
        }
    }
}

fn env_millis(suffix: &str) -> Result<Option<u64>> {
    let name = format!("{}_{}", ENV_PREFIX, suffix);
    match std::env::var(&name) {
        Ok(val) => val
            .parse()
            .map(Some)
            .with_context(|| format!("Invalid {}: {}", name, val)),
        Err(_) => Ok(None),
    }
}

fn default_show_colors() -> bool {
    true
}

fn default_fill_alpha() -> f32 {
    StylePalette::default().fill_alpha
}

fn default_highlight_alpha() -> f32 {
    StylePalette::default().highlight_alpha
}

fn default_search_current() -> Color {
    StylePalette::default().search_current
}

fn default_search_other() -> Color {
    StylePalette::default().search_other
}

fn default_query_window_ms() -> u64 {
    100
}

fn default_heartbeat_interval_ms() -> u64 {
    3_000
}

fn default_stale_threshold_ms() -> u64 {
    10_000
}
