//! # Renderer Configuration
//!
//! Configuration structures for the deferred pipeline. All settings are
//! serializable so applications can ship a TOML file next to the binary and
//! tweak the renderer without recompiling.
//!
//! ## Configuration Categories
//!
//! - **Viewport**: initial render-target dimensions and clear color
//! - **Shaders**: where the per-variant shader sources live on disk
//! - **Lighting**: cutoff threshold for light-volume sizing
//! - **Shadows**: shadow-map resolution

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors produced while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path that failed to load
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// The configuration file could not be parsed as TOML
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// Path that failed to parse
        path: PathBuf,
        /// Underlying TOML error
        source: toml::de::Error,
    },

    /// A configuration value failed validation
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Shader source locations for one program variant
///
/// The geometry stage is optional; most variants are a vertex/fragment pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShaderConfig {
    /// Path to the vertex shader source
    pub vertex_path: PathBuf,
    /// Path to the optional geometry shader source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry_path: Option<PathBuf>,
    /// Path to the fragment shader source
    pub fragment_path: PathBuf,
}

impl ShaderConfig {
    /// Create a vertex/fragment shader configuration
    pub fn pair(vertex: impl Into<PathBuf>, fragment: impl Into<PathBuf>) -> Self {
        Self {
            vertex_path: vertex.into(),
            geometry_path: None,
            fragment_path: fragment.into(),
        }
    }

    /// All stage paths, in pipeline order
    pub fn stage_paths(&self) -> Vec<&Path> {
        let mut paths = vec![self.vertex_path.as_path()];
        if let Some(geometry) = &self.geometry_path {
            paths.push(geometry.as_path());
        }
        paths.push(self.fragment_path.as_path());
        paths
    }
}

/// Top-level renderer configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RendererConfig {
    /// Initial viewport width in pixels
    pub width: u32,
    /// Initial viewport height in pixels
    pub height: u32,
    /// Clear color for the geometry pass (RGBA)
    pub clear_color: [f32; 4],
    /// Directory containing the pipeline's shader sources
    pub shader_dir: PathBuf,
    /// Intensity fraction below which a light's contribution is ignored
    ///
    /// Drives the cutoff-radius solve for point and spot lights. The default
    /// of 1/256 corresponds to one 8-bit color step.
    pub light_cutoff_threshold: f32,
    /// Shadow-map resolution (square), in texels
    pub shadow_map_size: u32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            shader_dir: PathBuf::from("shaders"),
            light_cutoff_threshold: 1.0 / 256.0,
            shadow_map_size: 1024,
        }
    }
}

impl RendererConfig {
    /// Load a configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "viewport must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if !(self.light_cutoff_threshold > 0.0 && self.light_cutoff_threshold < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "light_cutoff_threshold must be in (0, 1), got {}",
                self.light_cutoff_threshold
            )));
        }
        if self.shadow_map_size == 0 {
            return Err(ConfigError::Invalid(
                "shadow_map_size must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
