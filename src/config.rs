//! Configuration types for the background-removal service

use crate::error::{CutoutError, Result};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Server configuration shared by the request handlers and the worker
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the HTTP server binds to
    pub bind_addr: SocketAddr,
    /// Directory where completed result rasters are persisted as PNG files
    pub results_dir: PathBuf,
    /// Rasters whose larger dimension exceeds this are downscaled before inference
    pub max_dimension: u32,
    /// Path to the ONNX segmentation model
    pub model_path: PathBuf,
}

impl ServerConfig {
    /// Create a new server configuration builder
    #[must_use]
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::new()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8000)),
            results_dir: PathBuf::from("results"),
            max_dimension: 2048,
            model_path: PathBuf::from("model.onnx"),
        }
    }
}

/// Builder for [`ServerConfig`] with validation
#[derive(Debug, Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bind address
    #[must_use]
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.config.bind_addr = addr;
        self
    }

    /// Set the results directory
    #[must_use]
    pub fn results_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.results_dir = dir.into();
        self
    }

    /// Set the downscale threshold (larger dimension bound, in pixels)
    #[must_use]
    pub fn max_dimension(mut self, max_dimension: u32) -> Self {
        self.config.max_dimension = max_dimension;
        self
    }

    /// Set the segmentation model path
    #[must_use]
    pub fn model_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.model_path = path.into();
        self
    }

    /// Build the configuration, validating parameter ranges
    ///
    /// # Errors
    ///
    /// Returns `CutoutError::InvalidConfig` when the downscale threshold is
    /// zero or the results directory is empty.
    pub fn build(self) -> Result<ServerConfig> {
        if self.config.max_dimension == 0 {
            return Err(CutoutError::invalid_config(
                "max_dimension must be non-zero",
            ));
        }
        if self.config.results_dir.as_os_str().is_empty() {
            return Err(CutoutError::invalid_config(
                "results_dir must not be empty",
            ));
        }
        Ok(self.config)
    }
}
