//! Runtime settings shared by the fetch commands
//!
//! Precedence is flag > environment > config file > default. Flags and
//! environment are resolved by clap (`env = "BWR_*"`); the file is
//! `$BWR_CONFIG`, else `./bwr.toml`, else `<config dir>/bwr/config.toml`.

use crate::error::{CliError, Result};
use bwr_fetch::ftp::FtpConfig;
use bwr_fetch::rest::RestConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

// ============================================================================
// Defaults
// ============================================================================

pub const DEFAULT_CONCURRENCY: usize = bwr_fetch::bounded::DEFAULT_WIDTH;
pub const DEFAULT_RETRIES: u32 = bwr_fetch::ftp::DEFAULT_RETRIES;
pub const DEFAULT_TIMEOUT_SECS: u64 = bwr_fetch::rest::DEFAULT_TIMEOUT_SECS;
pub const DEFAULT_REQS_PER_SEC: u32 = bwr_fetch::rest::DEFAULT_REQS_PER_SEC;

pub const CONFIG_ENV: &str = "BWR_CONFIG";
pub const CONFIG_FILE: &str = "bwr.toml";

/// Contents of `bwr.toml`; every key is optional
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub concurrency: Option<usize>,
    pub retries: Option<u32>,
    pub timeout_secs: Option<u64>,
    pub reqs_per_sec: Option<u32>,
    pub ftp_username: Option<String>,
    pub ftp_password: Option<String>,
}

impl FileConfig {
    pub fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    /// The first config file that exists, if any
    pub fn locate() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }
        let local = PathBuf::from(CONFIG_FILE);
        if local.is_file() {
            return Some(local);
        }
        dirs::config_dir()
            .map(|dir| dir.join("bwr").join("config.toml"))
            .filter(|path| path.is_file())
    }

    pub fn load() -> Result<Self> {
        match Self::locate() {
            Some(path) => {
                debug!(path = %path.display(), "Loading config file");
                Self::read(&path)
            },
            None => Ok(Self::default()),
        }
    }
}

/// Values given on the command line or through `BWR_*` variables
#[derive(Debug, Clone, Copy, Default)]
pub struct Overrides {
    pub concurrency: Option<usize>,
    pub retries: Option<u32>,
    pub timeout_secs: Option<u64>,
    pub reqs_per_sec: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub concurrency: usize,
    pub retries: u32,
    pub timeout: Duration,
    pub reqs_per_sec: u32,
    pub ftp_username: String,
    pub ftp_password: String,
}

impl Config {
    pub fn resolve(overrides: Overrides, file: FileConfig) -> Result<Self> {
        let concurrency = overrides
            .concurrency
            .or(file.concurrency)
            .unwrap_or(DEFAULT_CONCURRENCY);
        if concurrency == 0 {
            return Err(CliError::config("concurrency must be at least 1"));
        }
        let reqs_per_sec = overrides
            .reqs_per_sec
            .or(file.reqs_per_sec)
            .unwrap_or(DEFAULT_REQS_PER_SEC);
        if reqs_per_sec == 0 {
            return Err(CliError::config("reqs_per_sec must be at least 1"));
        }
        let anonymous = FtpConfig::default();
        Ok(Self {
            concurrency,
            retries: overrides.retries.or(file.retries).unwrap_or(DEFAULT_RETRIES),
            timeout: Duration::from_secs(
                overrides
                    .timeout_secs
                    .or(file.timeout_secs)
                    .unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
            reqs_per_sec,
            ftp_username: file.ftp_username.unwrap_or(anonymous.username),
            ftp_password: file.ftp_password.unwrap_or(anonymous.password),
        })
    }

    /// Resolve against the config file found on disk
    pub fn load(overrides: Overrides) -> Result<Self> {
        Self::resolve(overrides, FileConfig::load()?)
    }

    pub fn rest(&self) -> RestConfig {
        RestConfig {
            reqs_per_sec: self.reqs_per_sec,
            retries: self.retries,
            timeout: self.timeout,
        }
    }

    pub fn ftp(&self, host: &str) -> FtpConfig {
        FtpConfig {
            host: host.to_string(),
            username: self.ftp_username.clone(),
            password: self.ftp_password.clone(),
            timeout: self.timeout,
            retries: self.retries,
            ..FtpConfig::anonymous(host)
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let anonymous = FtpConfig::default();
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            retries: DEFAULT_RETRIES,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            reqs_per_sec: DEFAULT_REQS_PER_SEC,
            ftp_username: anonymous.username,
            ftp_password: anonymous.password,
        }
    }
}
