//! Configuration file structures for particles-bridge.
//!
//! This module defines structures for TOML configuration files:
//! - [`BridgeConfigFile`]: Top-level configuration file structure
//! - [`ModuleConfig`]: Where the module bytes come from and how they are verified
//! - [`RenderConfig`]: Render loop settings for the CLI

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::RawSimulationConfig;

/// Top-level configuration file structure.
///
/// # Example
///
/// ```toml
/// [module]
/// path = "./particles.wasm"
/// build_id = "v1.2.3"
/// dev_mode = false
///
/// [simulation]
/// n_particles = 80
/// max_edge_len = 150.0
/// collision_enabled = true
///
/// [render]
/// frames = 300
/// fps = 60
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BridgeConfigFile {
    /// Module source and version settings.
    #[serde(default)]
    pub module: ModuleConfig,

    /// Simulation configuration (partial; normalized at construction).
    #[serde(default)]
    pub simulation: RawSimulationConfig,

    /// Render loop settings.
    #[serde(default)]
    pub render: RenderConfig,
}

impl BridgeConfigFile {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigFileError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigFileError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;

        debug!(path = %path.as_ref().display(), "Loading configuration file");
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string cannot be parsed as TOML.
    pub fn from_toml(content: &str) -> Result<Self, ConfigFileError> {
        toml::from_str(content).map_err(|e| ConfigFileError::Parse {
            message: e.to_string(),
        })
    }
}

/// Module source and version guard settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ModuleConfig {
    /// Path to the WebAssembly module file.
    pub path: Option<String>,

    /// URL to fetch the module from, used when no path is given.
    pub url: Option<String>,

    /// Build identifier exchanged with the module at initialization.
    ///
    /// Defaults to the crate version when absent.
    pub build_id: Option<String>,

    /// Append the development marker to the build identifier, which
    /// bypasses the version guard.
    #[serde(default)]
    pub dev_mode: bool,
}

impl ModuleConfig {
    /// The effective build identifier, with the development marker applied.
    pub fn effective_build_id(&self, fallback: &str) -> String {
        let base = self.build_id.as_deref().unwrap_or(fallback);
        if self.dev_mode {
            format!("{base}-development")
        } else {
            base.to_string()
        }
    }
}

/// Render loop settings for the CLI.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RenderConfig {
    /// Number of frames to drive before stopping.
    #[serde(default = "defaults::frames")]
    pub frames: u64,

    /// Target frames per second for the pacing ticker.
    #[serde(default = "defaults::fps")]
    pub fps: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            frames: defaults::frames(),
            fps: defaults::fps(),
        }
    }
}

/// Configuration file errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse configuration file.
    #[error("Failed to parse config file: {message}")]
    Parse { message: String },
}

/// Default value functions for serde.
mod defaults {
    pub const fn frames() -> u64 {
        300
    }

    pub const fn fps() -> u32 {
        60
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_file() {
        let config = BridgeConfigFile::default();

        assert!(config.module.path.is_none());
        assert!(config.module.url.is_none());
        assert!(!config.module.dev_mode);
        assert_eq!(config.render.frames, 300);
        assert_eq!(config.render.fps, 60);
    }

    #[test]
    fn test_parse_minimal_config() {
        let toml = r#"
            [module]
            path = "./particles.wasm"
        "#;

        let config = BridgeConfigFile::from_toml(toml).unwrap();

        assert_eq!(config.module.path.as_deref(), Some("./particles.wasm"));
        // Defaults applied
        assert_eq!(config.render.frames, 300);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [module]
            path = "./particles.wasm"
            build_id = "v2.0.0"
            dev_mode = true

            [simulation]
            n_particles = 80
            max_edge_len = 150.0
            collision_enabled = true

            [render]
            frames = 120
            fps = 30
        "#;

        let config = BridgeConfigFile::from_toml(toml).unwrap();

        assert_eq!(config.module.build_id.as_deref(), Some("v2.0.0"));
        assert!(config.module.dev_mode);
        assert_eq!(config.simulation.n_particles, Some(80.0));
        assert_eq!(config.simulation.collision_enabled, Some(true));
        assert_eq!(config.render.frames, 120);
        assert_eq!(config.render.fps, 30);
    }

    #[test]
    fn test_effective_build_id() {
        let module = ModuleConfig {
            build_id: Some("v1.2.3".into()),
            ..Default::default()
        };
        assert_eq!(module.effective_build_id("v0"), "v1.2.3");

        let module = ModuleConfig {
            build_id: Some("v1.2.3".into()),
            dev_mode: true,
            ..Default::default()
        };
        assert_eq!(module.effective_build_id("v0"), "v1.2.3-development");

        let module = ModuleConfig::default();
        assert_eq!(module.effective_build_id("v0.1.0"), "v0.1.0");
    }

    #[test]
    fn test_parse_invalid_toml() {
        let invalid = "this is not valid toml [";
        let result = BridgeConfigFile::from_toml(invalid);
        assert!(result.is_err());
    }
}
