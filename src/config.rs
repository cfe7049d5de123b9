use std::{
    env, fs,
    path::{Path, PathBuf},
};

use clap::ValueEnum;
use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CONFIG_ENV: &str = "SHEET_ANALYTICS_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "sheet-analytics.yml";
pub const DEFAULT_STORE_DIR: &str = ".sheet-analytics";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Reading config {path:?} failed: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Writing config {path:?} failed: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Config {path:?} is not valid YAML: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("Serializing config failed: {0}")]
    Serialize(#[from] serde_yaml::Error),
    #[error("No user is signed in. Run `session login` first")]
    NotSignedIn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
#[value(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub uid: String,
    pub email: String,
    pub display_name: String,
}

impl SessionUser {
    /// Display name falls back to the local part of the email address.
    pub fn new(uid: &str, email: &str, display_name: Option<&str>) -> Self {
        let display_name = display_name
            .map(str::to_string)
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());
        Self {
            uid: uid.to_string(),
            email: email.to_string(),
            display_name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub theme: Theme,
    pub user: Option<SessionUser>,
    pub store_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            theme: Theme::default(),
            user: None,
            store_dir: PathBuf::from(DEFAULT_STORE_DIR),
        }
    }
}

impl AppConfig {
    /// Explicit path, then the environment variable, then the default name.
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        explicit
            .map(Path::to_path_buf)
            .or_else(|| env::var_os(CONFIG_ENV).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    /// A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!("No config at {path:?}; using defaults");
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let serialized = serde_yaml::to_string(self)?;
        fs::write(path, serialized).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn sign_in(&mut self, user: SessionUser) {
        self.user = Some(user);
    }

    /// Teardown: forgets the signed-in user.
    pub fn clear_session(&mut self) {
        self.user = None;
    }

    pub fn require_user(&self) -> Result<&SessionUser, ConfigError> {
        self.user.as_ref().ok_or(ConfigError::NotSignedIn)
    }
}
