// Configuration loading

use crate::backends::process::socket_mapper::DEFAULT_PROC_ROOT;
use crate::interfaces::default_prefixes;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_DIR: &str = "pidflow";
const CONFIG_FILE: &str = "config.json";

/// How interfaces are captured within one measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    /// One capture thread per interface under a shared deadline
    #[default]
    Concurrent,
    /// One interface after another
    Sequential,
}

/// Capture handle and window settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Bytes buffered per read (snapshot length)
    pub snaplen: usize,
    pub read_timeout_ms: u64,
    pub promiscuous: bool,
    /// Capture on an interface stops once its window spans this long
    pub window_ms: u64,
    /// Hard stop for a capture, bounding silent interfaces
    pub deadline_ms: u64,
    pub mode: CaptureMode,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            snaplen: 65536,
            read_timeout_ms: 50,
            promiscuous: true,
            window_ms: 1000,
            deadline_ms: 3000,
            mode: CaptureMode::Concurrent,
        }
    }
}

impl CaptureConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

/// Configuration file structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Root of the proc filesystem to read process and socket tables from
    #[serde(default = "default_proc_root")]
    pub proc_root: PathBuf,

    /// Preferred socket mapper backend
    #[serde(default)]
    pub socket_mapper: Option<String>,

    /// Interfaces to capture on: None = discover physical interfaces
    #[serde(default)]
    pub interfaces: Option<Vec<String>>,

    /// Name prefixes that mark an interface as physical
    #[serde(default = "default_prefixes")]
    pub interface_prefixes: Vec<String>,

    /// Number of busiest processes to measure when no PIDs are given
    #[serde(default = "default_top")]
    pub top: usize,

    #[serde(default)]
    pub capture: CaptureConfig,
}

fn default_proc_root() -> PathBuf {
    PathBuf::from(DEFAULT_PROC_ROOT)
}

fn default_top() -> usize {
    5
}

impl Default for Config {
    fn default() -> Self {
        Self {
            proc_root: default_proc_root(),
            socket_mapper: None,
            interfaces: None,
            interface_prefixes: default_prefixes(),
            top: default_top(),
            capture: CaptureConfig::default(),
        }
    }
}

impl Config {
    /// Default config file path
    pub fn config_path() -> Result<PathBuf> {
        let dir = dirs::config_dir().context("No configuration directory for this user")?;
        Ok(dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Load from `path`, or from the default path.
    ///
    /// A missing default file yields defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let default_path = Self::config_path()?;
                if !default_path.exists() {
                    log::debug!("Config file not found, using defaults");
                    return Ok(Config::default());
                }
                default_path
            }
        };

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config = Self::from_json(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        Ok(serde_json::from_str(contents)?)
    }
}
