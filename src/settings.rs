//! Runtime settings
//!
//! Read from a JSON file; every field is optional and missing ones take
//! their defaults. Command-line flags override what the file says.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::*;
use crate::sim::{CharacterKind, HitShapeLibrary, SimConfig};

/// Errors reading a settings file
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed settings: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// World seed shared by every peer
    pub seed: u64,
    /// Chebyshev radius of loaded chunks
    pub load_radius: i32,
    pub character: CharacterKind,
    /// Polygon hit-region data
    pub collision_path: PathBuf,
    /// Coordinator address for `play`, bind address for `serve`
    pub server_addr: String,
    pub snapshot_hz: u32,
    pub max_enemies: usize,
    pub hit_stop_ms: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            seed: 0,
            load_radius: LOAD_RADIUS,
            character: CharacterKind::default(),
            collision_path: PathBuf::from("collision_data.json"),
            server_addr: format!("127.0.0.1:{}", DEFAULT_PORT),
            snapshot_hz: SNAPSHOT_HZ,
            max_enemies: MAX_ENEMIES,
            hit_stop_ms: HIT_STOP_MS,
        }
    }
}

impl Settings {
    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Load settings, falling back to defaults
    pub fn load(path: &Path) -> Self {
        match Self::from_file(path) {
            Ok(settings) => {
                log::info!("Loaded settings from {}", path.display());
                settings
            }
            Err(SettingsError::Io(e)) => {
                log::info!("No settings at {} ({}), using defaults", path.display(), e);
                Self::default()
            }
            Err(e) => {
                log::warn!("{} ({}), using defaults", e, path.display());
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        log::info!("Settings saved to {}", path.display());
        Ok(())
    }

    /// Simulation parameters, with collision data loaded from disk
    pub fn sim_config(&self) -> SimConfig {
        SimConfig {
            seed: self.seed,
            load_radius: self.load_radius.max(0),
            character: self.character,
            max_enemies: self.max_enemies,
            hit_stop_ms: self.hit_stop_ms.max(0.0),
            hit_shapes: HitShapeLibrary::load_or_default(&self.collision_path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_default() {
        let s = Settings::from_json(r#"{"seed": 42, "character": "female"}"#).unwrap();
        assert_eq!(s.seed, 42);
        assert_eq!(s.character, CharacterKind::Female);
        assert_eq!(s.load_radius, LOAD_RADIUS);
        assert_eq!(s.snapshot_hz, 30);
        assert_eq!(s.server_addr, "127.0.0.1:5555");
    }

    #[test]
    fn test_missing_file_is_default() {
        let s = Settings::load(Path::new("/nonexistent/survivor/settings.json"));
        assert_eq!(s, Settings::default());
    }

    #[test]
    fn test_malformed_file_is_default() {
        let path = std::env::temp_dir().join(format!("survivor-settings-{}.json", std::process::id()));
        std::fs::write(&path, "{ seed: nope").unwrap();
        assert!(matches!(Settings::from_file(&path), Err(SettingsError::Parse(_))));
        assert_eq!(Settings::load(&path), Settings::default());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_save_then_load() {
        let path = std::env::temp_dir().join(format!("survivor-save-{}.json", std::process::id()));
        let settings = Settings {
            seed: 9,
            load_radius: 1,
            ..Settings::default()
        };
        settings.save(&path).unwrap();
        assert_eq!(Settings::load(&path), settings);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_sim_config_clamps() {
        let settings = Settings {
            load_radius: -2,
            hit_stop_ms: -1.0,
            collision_path: PathBuf::from("/nonexistent/collision.json"),
            ..Settings::default()
        };
        let config = settings.sim_config();
        assert_eq!(config.load_radius, 0);
        assert_eq!(config.hit_stop_ms, 0.0);
        assert!(config.hit_shapes.is_empty());
    }
}
