//! Configuration loader plus strongly typed settings structures.
//!
//! Settings live in `config.toml` inside the data directory
//! (`~/.starlapse`, or `STARLAPSE_DIR`). The shipped default is embedded at
//! compile time and written out on first run. Missing keys fall back to the
//! same defaults, so older config files keep working.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::state::OverlayMode;
use crate::theme::GalaxyTheme;

// Embed default configuration at compile time
const DEFAULT_CONFIG: &str = include_str!("../defaults/config.toml");

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub extractor: ExtractorConfig,
    #[serde(default)]
    pub effects: EffectsConfig,
    #[serde(default)]
    pub popup: PopupConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_mode")]
    pub mode: OverlayMode,
    /// Delay before restoring a remembered overlay after page load
    #[serde(default = "default_restore_delay_ms")]
    pub restore_delay_ms: u64,
    #[serde(default)]
    pub default_theme: GalaxyTheme,
}

fn default_mode() -> OverlayMode {
    OverlayMode::Galactic
}

fn default_restore_delay_ms() -> u64 {
    1000
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            restore_delay_ms: default_restore_delay_ms(),
            default_theme: GalaxyTheme::default(),
        }
    }
}

impl AgentConfig {
    pub fn restore_delay(&self) -> Duration {
        Duration::from_millis(self.restore_delay_ms)
    }
}

/// Text length thresholds for the content extractor (in characters)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// A selector match must have more text than this
    #[serde(default = "default_selector_min_chars")]
    pub selector_min_chars: usize,
    /// The largest-block fallback must have more text than this
    #[serde(default = "default_density_min_chars")]
    pub density_min_chars: usize,
    /// Below this, the placeholder document is shown instead
    #[serde(default = "default_placeholder_min_chars")]
    pub placeholder_min_chars: usize,
}

fn default_selector_min_chars() -> usize {
    300
}

fn default_density_min_chars() -> usize {
    500
}

fn default_placeholder_min_chars() -> usize {
    200
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            selector_min_chars: default_selector_min_chars(),
            density_min_chars: default_density_min_chars(),
            placeholder_min_chars: default_placeholder_min_chars(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectsConfig {
    #[serde(default = "default_twinkle_interval_ms")]
    pub twinkle_interval_ms: u64,
    #[serde(default = "default_shooting_star_interval_ms")]
    pub shooting_star_interval_ms: u64,
    /// How often the reading stopwatch reports elapsed time
    #[serde(default = "default_stopwatch_tick_ms")]
    pub stopwatch_tick_ms: u64,
    #[serde(default = "default_effect_duration_ms")]
    pub cosmic_event_duration_ms: u64,
    #[serde(default = "default_effect_duration_ms")]
    pub suck_in_duration_ms: u64,
    /// Scroll progress percentages that fire a milestone effect
    #[serde(default = "default_milestones")]
    pub milestones: Vec<u8>,
    /// Ambient hum while the reader is open (needs the `sound` feature)
    #[serde(default)]
    pub ambient_audio: bool,
    #[serde(default = "default_ambient_volume")]
    pub ambient_volume: f32,
}

fn default_twinkle_interval_ms() -> u64 {
    2000
}

fn default_shooting_star_interval_ms() -> u64 {
    8000
}

fn default_stopwatch_tick_ms() -> u64 {
    1000
}

fn default_effect_duration_ms() -> u64 {
    3000
}

fn default_milestones() -> Vec<u8> {
    vec![25, 50, 75, 100]
}

fn default_ambient_volume() -> f32 {
    0.05
}

impl Default for EffectsConfig {
    fn default() -> Self {
        Self {
            twinkle_interval_ms: default_twinkle_interval_ms(),
            shooting_star_interval_ms: default_shooting_star_interval_ms(),
            stopwatch_tick_ms: default_stopwatch_tick_ms(),
            cosmic_event_duration_ms: default_effect_duration_ms(),
            suck_in_duration_ms: default_effect_duration_ms(),
            milestones: default_milestones(),
            ambient_audio: false,
            ambient_volume: default_ambient_volume(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopupConfig {
    /// Pause between the staged status messages while activating
    #[serde(default = "default_stage_delay_ms")]
    pub stage_delay_ms: u64,
}

fn default_stage_delay_ms() -> u64 {
    1000
}

impl Default for PopupConfig {
    fn default() -> Self {
        Self {
            stage_delay_ms: default_stage_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// File name of the key-value store inside the data directory
    #[serde(default = "default_storage_file")]
    pub file: String,
}

fn default_storage_file() -> String {
    "storage.json".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            file: default_storage_file(),
        }
    }
}

impl Config {
    /// Load `config.toml` from the data directory, writing the default first
    /// if it does not exist yet
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            Self::extract_default(&path)?;
        }
        Self::load_from_path(&path)
    }

    /// Load config from a custom file path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents =
            fs::read_to_string(path).context(format!("Failed to read config file: {:?}", path))?;
        Self::parse(&contents).context(format!("Failed to parse config file: {:?}", path))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, contents).context(format!("Failed to write config file: {:?}", path))?;
        Ok(())
    }

    fn extract_default(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .context(format!("Failed to create data directory: {:?}", parent))?;
        }
        fs::write(path, DEFAULT_CONFIG)
            .context(format!("Failed to write default config: {:?}", path))?;
        tracing::info!("Wrote default config to {:?}", path);
        Ok(())
    }

    /// Data directory: `STARLAPSE_DIR` if set, else `~/.starlapse`
    pub fn base_dir() -> Result<PathBuf> {
        if let Ok(custom_dir) = std::env::var("STARLAPSE_DIR") {
            return Ok(PathBuf::from(custom_dir));
        }

        let home = dirs::home_dir().context("Could not find home directory")?;
        Ok(home.join(".starlapse"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::base_dir()?.join("config.toml"))
    }

    pub fn get_log_path() -> Result<PathBuf> {
        Ok(Self::base_dir()?.join("debug.log"))
    }

    pub fn storage_path(&self) -> Result<PathBuf> {
        Ok(Self::base_dir()?.join(&self.storage.file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_default_matches_code_defaults() {
        let parsed = Config::parse(DEFAULT_CONFIG).expect("embedded config parses");
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let parsed = Config::parse("").unwrap();
        assert_eq!(parsed.agent.mode, OverlayMode::Galactic);
        assert_eq!(parsed.agent.restore_delay(), Duration::from_millis(1000));
        assert_eq!(parsed.extractor.selector_min_chars, 300);
        assert_eq!(parsed.effects.milestones, vec![25, 50, 75, 100]);
    }

    #[test]
    fn test_partial_config_overrides() {
        let parsed = Config::parse(
            r#"
            [agent]
            mode = "dark"
            default_theme = "andromeda"

            [extractor]
            density_min_chars = 800
            "#,
        )
        .unwrap();
        assert_eq!(parsed.agent.mode, OverlayMode::Dark);
        assert_eq!(parsed.agent.default_theme, GalaxyTheme::Andromeda);
        assert_eq!(parsed.agent.restore_delay_ms, 1000);
        assert_eq!(parsed.extractor.density_min_chars, 800);
        assert_eq!(parsed.extractor.selector_min_chars, 300);
    }

    #[test]
    fn test_unknown_mode_is_rejected() {
        assert!(Config::parse("[agent]\nmode = \"sepia\"").is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.popup.stage_delay_ms = 0;
        config.effects.ambient_audio = true;
        config.save(&path).unwrap();

        let reloaded = Config::load_from_path(&path).unwrap();
        assert_eq!(reloaded, config);
    }
}
