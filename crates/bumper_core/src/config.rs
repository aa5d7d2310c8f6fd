//! Game configuration
//!
//! Initial values for the game cells, loadable from TOML:
//!
//! ```toml
//! width = 800
//! height = 600
//! initial_state = "2"
//! ```
//!
//! Missing keys fall back to [`GameConfig::default`].

use crate::error::{BridgeError, Result};
use crate::game_state::StateKey;
use serde::Deserialize;
use std::path::Path;

/// Initial values for a [`GameState`](crate::game_state::GameState)
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Canvas width in pixels
    pub width: f32,
    /// Canvas height in pixels
    pub height: f32,
    /// State key active at startup
    pub initial_state: StateKey,
    /// Original camera z position
    pub orig_camera_pos_z: f32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            width: 500.0,
            height: 500.0,
            initial_state: StateKey::new("1"),
            orig_camera_pos_z: 0.0,
        }
    }
}

impl GameConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| BridgeError::Config(e.to_string()))
    }

    /// Read and parse a TOML configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!("loaded game config from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GameConfig::default();
        assert_eq!(config.width, 500.0);
        assert_eq!(config.height, 500.0);
        assert_eq!(config.initial_state, StateKey::new("1"));
        assert_eq!(config.orig_camera_pos_z, 0.0);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = GameConfig::from_toml_str("width = 800.0\ninitial_state = \"2\"\n").unwrap();
        assert_eq!(config.width, 800.0);
        assert_eq!(config.height, 500.0);
        assert_eq!(config.initial_state.as_str(), "2");
    }

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(GameConfig::from_toml_str("").unwrap(), GameConfig::default());
    }

    #[test]
    fn test_invalid_toml() {
        let err = GameConfig::from_toml_str("width = \"wide\"").unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = GameConfig::load("/nonexistent/bumper/game.toml").unwrap_err();
        assert!(matches!(err, BridgeError::Io(_)));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("bumper_config_{}.toml", std::process::id()));
        std::fs::write(&path, "height = 720.0\norig_camera_pos_z = 12.5\n").unwrap();

        let config = GameConfig::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.height, 720.0);
        assert_eq!(config.orig_camera_pos_z, 12.5);
    }
}
