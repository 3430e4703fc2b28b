//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\tonearm\config.toml
//! - macOS: ~/Library/Application Support/tonearm/config.toml
//! - Linux: ~/.config/tonearm/config.toml
//!
//! The config file is human-readable and editable. Settings are loaded at
//! startup; a missing or unparseable file falls back to defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::player::mpv::MpvConfig;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Library location settings
    pub library: LibrarySection,

    /// mpv process settings
    pub mpv: MpvSection,

    /// Audio playback settings
    pub audio: AudioSection,
}

impl Config {
    /// Build the mpv process configuration from this config.
    pub fn mpv_config(&self) -> MpvConfig {
        MpvConfig {
            binary: self.mpv.binary.clone(),
            extra_args: self.mpv.extra_args.clone(),
        }
    }
}

/// Library location settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LibrarySection {
    /// Library root folder (None = platform default data dir)
    pub root: Option<PathBuf>,
}

/// mpv process settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MpvSection {
    /// Path to the mpv binary (None = search PATH and common locations)
    pub binary: Option<PathBuf>,

    /// Extra arguments appended to every spawned mpv process
    pub extra_args: Vec<String>,
}

/// Audio playback settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSection {
    /// Startup volume on the mpv scale (0.0 - 100.0)
    pub volume: f64,
}

impl Default for AudioSection {
    fn default() -> Self {
        Self { volume: 100.0 }
    }
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("tonearm"))
}

/// Get the full path to the config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load configuration from disk
///
/// Returns default config if file doesn't exist or can't be parsed.
/// Logs warnings but doesn't fail - we always return a usable config.
pub fn load() -> Config {
    let Some(path) = config_path() else {
        tracing::warn!("Could not determine config directory, using defaults");
        return Config::default();
    };

    if !path.exists() {
        tracing::debug!("No config file found at {:?}, using defaults", path);
        return Config::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => {
                tracing::info!("Loaded config from {:?}", path);
                config
            }
            Err(e) => {
                tracing::error!("Failed to parse config file {:?}: {}", path, e);
                tracing::warn!("Using default configuration");
                Config::default()
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file {:?}: {}", path, e);
            Config::default()
        }
    }
}

/// Save configuration to disk
///
/// Creates the config directory if it doesn't exist.
pub fn save(config: &Config) -> Result<(), ConfigError> {
    let dir = config_dir().ok_or(ConfigError::NoConfigDir)?;
    let path = dir.join("config.toml");

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::CreateDir(dir.clone(), e))?;

    let contents = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;

    // Write atomically (write to temp, then rename)
    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &contents).map_err(|e| ConfigError::Write(temp_path.clone(), e))?;
    std::fs::rename(&temp_path, &path)
        .map_err(|e| ConfigError::Rename(temp_path, path.clone(), e))?;

    tracing::info!("Saved config to {:?}", path);
    Ok(())
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to create config directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),

    #[error("Failed to write config to {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("Failed to rename temp file {0} to {1}: {2}")]
    Rename(PathBuf, PathBuf, std::io::Error),
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[library]"));
        assert!(toml.contains("[mpv]"));
        assert!(toml.contains("[audio]"));
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = Config::default();
        config.library.root = Some(PathBuf::from("/music/library"));
        config.mpv.binary = Some(PathBuf::from("/usr/local/bin/mpv"));
        config.mpv.extra_args = vec!["--audio-display=no".to_string()];
        config.audio.volume = 65.0;

        let toml = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml).unwrap();

        assert_eq!(parsed.library.root, Some(PathBuf::from("/music/library")));
        assert_eq!(parsed.mpv.extra_args, vec!["--audio-display=no"]);
        assert_eq!(parsed.audio.volume, 65.0);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let toml = r#"
[library]
root = "/srv/music"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.library.root, Some(PathBuf::from("/srv/music")));
        // Other fields use defaults
        assert!(config.mpv.binary.is_none());
        assert_eq!(config.audio.volume, 100.0);
    }

    #[test]
    fn test_mpv_config_projection() {
        let mut config = Config::default();
        config.mpv.extra_args = vec!["--gapless-audio=yes".to_string()];
        let mpv = config.mpv_config();
        assert!(mpv.binary.is_none());
        assert_eq!(mpv.extra_args.len(), 1);
    }
}
