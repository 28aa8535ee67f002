//! Run mode selection.

use crate::config::{ConfigError, HostConfig};
use std::fmt;
use std::path::{Path, PathBuf};
use url::Url;

/// Environment variable that selects the run mode.
pub const MODE_FLAG: &str = "VISIONIDE_ENV";

/// Where a window's content comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadSource {
    /// Live dev server
    Endpoint(Url),
    /// Packaged renderer entry, relative to the install directory
    Packaged(PathBuf),
}

impl LoadSource {
    /// Packaged entry resolved against an install directory.
    pub fn resolve(&self, install_dir: &Path) -> Option<PathBuf> {
        match self {
            Self::Endpoint(_) => None,
            Self::Packaged(path) => Some(install_dir.join(path)),
        }
    }
}

impl fmt::Display for LoadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Endpoint(url) => write!(f, "{}", url),
            Self::Packaged(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Development or production.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    Development { endpoint: Url },
    Production { asset_path: PathBuf },
}

impl RunMode {
    /// Read the mode from `VISIONIDE_ENV`.
    pub fn from_env(config: &HostConfig) -> Result<Self, ConfigError> {
        let flag = std::env::var(MODE_FLAG).ok();
        Self::from_flag(flag.as_deref(), config)
    }

    /// `development` selects development mode; anything else, or no flag,
    /// selects production.
    pub fn from_flag(flag: Option<&str>, config: &HostConfig) -> Result<Self, ConfigError> {
        match flag {
            Some("development") => Ok(Self::Development {
                endpoint: config.dev_url()?,
            }),
            _ => Ok(Self::Production {
                asset_path: config.asset_path.clone(),
            }),
        }
    }

    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development { .. })
    }

    /// The inspector is only available in development.
    pub fn inspector(&self) -> bool {
        self.is_development()
    }

    pub fn load_source(&self) -> LoadSource {
        match self {
            Self::Development { endpoint } => LoadSource::Endpoint(endpoint.clone()),
            Self::Production { asset_path } => LoadSource::Packaged(asset_path.clone()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Development { .. } => "development",
            Self::Production { .. } => "production",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_development_flag() {
        let mode = RunMode::from_flag(Some("development"), &HostConfig::default()).unwrap();
        assert!(mode.is_development());
        assert!(mode.inspector());
        assert_eq!(
            mode.load_source(),
            LoadSource::Endpoint(Url::parse("http://localhost:5173").unwrap())
        );
    }

    #[test]
    fn test_anything_else_is_production() {
        let config = HostConfig::default();
        for flag in [None, Some(""), Some("production"), Some("Development"), Some("dev")] {
            let mode = RunMode::from_flag(flag, &config).unwrap();
            assert_eq!(mode.name(), "production", "flag {flag:?}");
            assert!(!mode.inspector());
        }
    }

    #[test]
    fn test_packaged_source_resolves_under_install_dir() {
        let mode = RunMode::from_flag(None, &HostConfig::default()).unwrap();
        let resolved = mode.load_source().resolve(Path::new("/opt/visionide")).unwrap();
        assert_eq!(
            resolved,
            PathBuf::from("/opt/visionide/renderer/main_window/index.html")
        );
    }
}
