//! Configuration file
//!
//! A JSON document with one section per concern. Every field has a default,
//! so an empty object is a valid (if not very useful) configuration:
//!
//! ```json
//! {
//!   "lidar": { "host": "192.168.1.20", "username": "halo", "password": "..." },
//!   "instrument": { "latitude": 41.7, "longitude": -87.99 },
//!   "trigger": { "max_distance_m": 5000, "az_width": 30 },
//!   "scan": { "elevation_speed": 0.5 },
//!   "paths": { "data_root": "/C:/Lidar/Data/Proc" }
//! }
//! ```
//!
//! The password may be left out of the file and supplied through
//! `HALO_STEER_PASSWORD` instead.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use halo_steer_core::protocol::halo::{DATA_ROOT, DEFAULT_FILE_NAME};
use halo_steer_core::transport::{Credentials, RemotePaths};
use halo_steer_core::{Connectivity, InstrumentLocation, ScanMotion, TriggerConfig};
use serde::{Deserialize, Serialize};

/// Environment variable that overrides `lidar.password`
pub const PASSWORD_ENV: &str = "HALO_STEER_PASSWORD";

/// File name inside the platform config directory
pub const CONFIG_FILE_NAME: &str = "config.json";

const DEFAULT_SSH_PORT: u16 = 22;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

// =============================================================================
// Sections
// =============================================================================

/// How to reach the instrument
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LidarConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub connect_timeout_secs: u64,
}

impl Default for LidarConfig {
    fn default() -> Self {
        LidarConfig {
            host: String::new(),
            port: DEFAULT_SSH_PORT,
            username: String::new(),
            password: String::new(),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }
}

impl fmt::Debug for LidarConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LidarConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

impl LidarConfig {
    pub fn credentials(&self) -> Credentials {
        Credentials {
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Region and gate policy, plus where the scan file goes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerSection {
    pub area_threshold: usize,
    pub connectivity: Connectivity,
    pub max_distance_m: f64,
    pub az_width: f64,
    pub az_res: f64,
    pub file_name: String,
    pub dynamic: bool,
}

impl Default for TriggerSection {
    fn default() -> Self {
        let defaults = TriggerConfig::default();
        TriggerSection {
            area_threshold: defaults.area_threshold,
            connectivity: defaults.connectivity,
            max_distance_m: defaults.max_distance_m,
            az_width: defaults.az_width,
            az_res: defaults.az_res,
            file_name: DEFAULT_FILE_NAME.to_string(),
            dynamic: defaults.dynamic,
        }
    }
}

/// Remote directories on the instrument
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    #[serde(flatten)]
    pub scans: RemotePaths,
    /// Root of the processed data tree
    pub data_root: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        PathsConfig {
            scans: RemotePaths::default(),
            data_root: DATA_ROOT.to_string(),
        }
    }
}

// =============================================================================
// Config
// =============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub lidar: LidarConfig,
    /// Instrument position; required for trigger commands
    pub instrument: Option<InstrumentLocation>,
    pub trigger: TriggerSection,
    pub scan: ScanMotion,
    pub paths: PathsConfig,
}

impl Config {
    /// `<platform config dir>/halo-steer/config.json`, if the platform has one
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "halo-steer").map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("Invalid configuration")
    }

    /// Read and parse a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read config file {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("In config file {}", path.display()))
    }

    /// Load `explicit` if given, else the default path if it exists, else
    /// built-in defaults. The password environment override is applied last.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::load(&path)?,
                Some(path) => {
                    log::debug!("No config at {}, using defaults", path.display());
                    Config::default()
                }
                None => Config::default(),
            },
        };
        config.override_password(std::env::var(PASSWORD_ENV).ok());
        Ok(config)
    }

    /// Replace the configured password with a non-empty override
    pub fn override_password(&mut self, password: Option<String>) {
        if let Some(password) = password.filter(|p| !p.is_empty()) {
            log::debug!("Using lidar password from {}", PASSWORD_ENV);
            self.lidar.password = password;
        }
    }

    /// Trigger settings for the core pipeline
    pub fn trigger_config(&self) -> TriggerConfig {
        TriggerConfig {
            area_threshold: self.trigger.area_threshold,
            connectivity: self.trigger.connectivity,
            max_distance_m: self.trigger.max_distance_m,
            az_width: self.trigger.az_width,
            az_res: self.trigger.az_res,
            motion: self.scan,
            file_name: self.trigger.file_name.clone(),
            dynamic: self.trigger.dynamic,
        }
    }
}
