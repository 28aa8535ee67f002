//! Host configuration
//!
//! Read from an optional `config.toml` under the platform config directory
//! (`~/.config/visionide/` on Linux). Every field has a default, so a
//! missing file or a partial one is fine.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Development endpoint served by the renderer dev server.
pub const DEFAULT_DEV_ENDPOINT: &str = "http://localhost:5173";

/// Packaged renderer entry, relative to the install directory.
pub const DEFAULT_ASSET_PATH: &str = "renderer/main_window/index.html";

/// Window geometry and title
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: f64,
    pub height: f64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "VisionIDE".to_string(),
            width: 1280.0,
            height: 800.0,
        }
    }
}

/// Retry policy for window content that fails to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoadPolicy {
    /// Reloads attempted before the error page is shown
    pub max_retries: u32,
    /// Base delay, multiplied by the attempt number
    pub backoff_ms: u64,
}

impl LoadPolicy {
    /// Delay before the reload that follows failed attempt `attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_ms.saturating_mul(u64::from(attempt.max(1))))
    }
}

impl Default for LoadPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_ms: 500,
        }
    }
}

/// Complete host configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub window: WindowConfig,
    /// Dev server URL used when `VISIONIDE_ENV=development`
    pub dev_endpoint: String,
    /// Packaged renderer entry, relative to the install directory
    pub asset_path: PathBuf,
    pub load: LoadPolicy,
    /// Give up on a pending camera request after this long
    pub camera_timeout_ms: Option<u64>,
    /// Keep running with zero windows. Defaults to the platform convention.
    pub persist_without_windows: Option<bool>,
    /// Restarts allowed per crashed worker kind
    pub max_worker_respawns: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            dev_endpoint: DEFAULT_DEV_ENDPOINT.to_string(),
            asset_path: PathBuf::from(DEFAULT_ASSET_PATH),
            load: LoadPolicy::default(),
            camera_timeout_ms: None,
            persist_without_windows: None,
            max_worker_respawns: 3,
        }
    }
}

impl HostConfig {
    /// Location of the user config file, if the platform has a config dir.
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("visionide").join("config.toml"))
    }

    /// Load the user config, falling back to defaults when there is none.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load and validate a config file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Parse and validate TOML text.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.dev_url()?;
        if self.asset_path.as_os_str().is_empty() || self.asset_path.is_absolute() {
            return Err(ConfigError::AssetPathNotRelative(self.asset_path.clone()));
        }
        if self.window.width <= 0.0 || self.window.height <= 0.0 {
            return Err(ConfigError::WindowSize);
        }
        Ok(())
    }

    /// Parsed development endpoint.
    pub fn dev_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.dev_endpoint).map_err(|err| {
            ConfigError::InvalidEndpoint(format!("{}: {}", self.dev_endpoint, err))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidEndpoint(format!(
                "{}: unsupported scheme '{}'",
                self.dev_endpoint,
                url.scheme()
            )));
        }
        if url.host_str().is_none() {
            return Err(ConfigError::InvalidEndpoint(format!(
                "{}: missing host",
                self.dev_endpoint
            )));
        }
        Ok(url)
    }

    pub fn camera_timeout(&self) -> Option<Duration> {
        self.camera_timeout_ms.map(Duration::from_millis)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid development endpoint {0}")]
    InvalidEndpoint(String),

    #[error("Asset path must be relative to the install directory: {0}")]
    AssetPathNotRelative(PathBuf),

    #[error("Window size must be positive")]
    WindowSize,
}
