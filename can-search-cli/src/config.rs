//! Configuration loading and parsing

use anyhow::{Context, Result};
use can_search_core::{CaptureConfig, FilterConfig, ReplayConfig, SearchConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Main application configuration (loaded from config.toml)
///
/// Every section is optional; command line flags override file values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub interface: InterfaceConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub replay: ReplayConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub search: SearchSection,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InterfaceConfig {
    /// SocketCAN interface name
    #[serde(default = "default_interface")]
    pub name: String,
    /// Use the in-memory loopback source instead of SocketCAN
    #[serde(default)]
    pub loopback: bool,
}

fn default_interface() -> String {
    "can0".to_string()
}

impl Default for InterfaceConfig {
    fn default() -> Self {
        Self {
            name: default_interface(),
            loopback: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SearchSection {
    pub shuffle_seed: Option<u64>,
}

impl AppConfig {
    /// Search settings combining `[replay]` and `[search]`
    pub fn search_config(&self) -> SearchConfig {
        let config = SearchConfig::new().with_replay(self.replay.clone());
        match self.search.shuffle_seed {
            Some(seed) => config.with_shuffle_seed(seed),
            None => config,
        }
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    if config.interface.name.trim().is_empty() {
        anyhow::bail!("Config file {:?}: interface name must not be empty", path);
    }
    config
        .capture
        .validate()
        .with_context(|| format!("Invalid [capture] section in {:?}", path))?;
    config
        .replay
        .validate()
        .with_context(|| format!("Invalid [replay] section in {:?}", path))?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use can_search_core::MatchMode;
    use std::time::Duration;

    #[test]
    fn test_config_deserialization() {
        let toml_content = r#"
            [interface]
            name = "vcan0"

            [capture]
            poll_timeout_ms = 50

            [replay]
            frame_gap_ms = 2.5

            [filter]
            match_mode = "id_only"
            noise_seconds = 10

            [search]
            shuffle_seed = 7
        "#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.interface.name, "vcan0");
        assert!(!config.interface.loopback);
        assert_eq!(config.capture.poll_timeout(), Duration::from_millis(50));
        assert_eq!(config.capture.channel_capacity, CaptureConfig::default().channel_capacity);
        assert_eq!(config.filter.match_mode, MatchMode::IdOnly);
        assert_eq!(config.filter.samples, 2);

        let search = config.search_config();
        assert_eq!(search.shuffle_seed, Some(7));
        assert_eq!(search.replay.frame_gap_ms, 2.5);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.interface.name, "can0");
        assert_eq!(config.search_config(), SearchConfig::default());
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[interface]\nloopback = true\n").unwrap();

        let config = load_config(&path).unwrap();
        assert!(config.interface.loopback);

        fs::write(&path, "[interface]\nname = \"\"\n").unwrap();
        assert!(load_config(&path).is_err());

        fs::write(&path, "[capture]\nchannel_capacity = 0\n").unwrap();
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_load_config_rejects_huge_gap() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[replay]\nframe_gap_ms = 1e300\n").unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("frame_gap_ms"));

        fs::write(&path, "[replay]\nframe_gap_ms = 250.0\n").unwrap();
        assert_eq!(load_config(&path).unwrap().replay.frame_gap(), Duration::from_millis(250));
    }
}
