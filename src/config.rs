//! Configuration management for cf-ip-guard.
//!
//! Settings come from an optional YAML file and are then overridden by
//! command-line flags. Every field has a default, so running without a file
//! is the common case.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::daemon::DaemonSettings;
use crate::enforcer::{SetNames, DEFAULT_IPSET_BIN};
use crate::fetcher::{DEFAULT_API_URL, DEFAULT_TIMEOUT_SECS};
use crate::logging::{parse_level, LogFormat};
use crate::validation::{parse_interval, validate_api_url, validate_set_name};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Update interval (e.g. "10m", "1h")
    pub interval: String,

    /// ipset name for the IPv4 ranges
    pub ipset4: String,

    /// ipset name for the IPv6 ranges
    pub ipset6: String,

    /// Cloudflare IP ranges API URL
    pub api_url: String,

    /// Run a single fetch-and-update cycle and exit
    pub once: bool,

    /// Log level (debug, info, warn, error)
    pub log_level: String,

    /// Log format (text, json)
    pub log_format: LogFormat,

    /// ipset program to run
    pub ipset_bin: String,

    /// HTTP request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval: "30m".to_string(),
            ipset4: "cloudflare4".to_string(),
            ipset6: "cloudflare6".to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            once: false,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            ipset_bin: DEFAULT_IPSET_BIN.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Load configuration from YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))?;

        config.validate()?;

        Ok(config)
    }

    /// Load from `path` if given, otherwise start from defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        parse_interval(&self.interval).context("Invalid interval")?;

        validate_set_name(&self.ipset4).context("Invalid ipset4")?;
        validate_set_name(&self.ipset6).context("Invalid ipset6")?;
        if self.ipset4 == self.ipset6 {
            bail!(
                "ipset4 and ipset6 must be different sets (both are '{}')",
                self.ipset4
            );
        }

        validate_api_url(&self.api_url)?;
        parse_level(&self.log_level)?;

        if self.ipset_bin.trim().is_empty() {
            bail!("ipset_bin cannot be empty");
        }
        if self.timeout_secs == 0 {
            bail!("timeout_secs must be greater than 0");
        }

        Ok(())
    }

    pub fn interval(&self) -> Result<Duration> {
        parse_interval(&self.interval)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn set_names(&self) -> SetNames {
        SetNames::new(self.ipset4.clone(), self.ipset6.clone())
    }

    /// Settings for the reconciliation loop
    pub fn daemon_settings(&self) -> Result<DaemonSettings> {
        Ok(DaemonSettings {
            sets: self.set_names(),
            interval: self.interval()?,
            once: self.once,
        })
    }
}
