//! CLI argument parsing with clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Config;
use crate::logging::LogFormat;

#[derive(Parser)]
#[command(name = "cf-ip-guard")]
#[command(author, version, about = "Keep ipsets in sync with Cloudflare IP ranges")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional YAML config file (flags override its values)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level: debug, info, warn, error
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log format
    #[arg(long, value_enum, global = true)]
    pub log_format: Option<LogFormat>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run cf-ip-guard in daemon mode
    Daemon(DaemonArgs),

    /// Check that ipset is available and usable, then exit
    Check {
        /// ipset program to run
        #[arg(long)]
        ipset_bin: Option<String>,
    },

    /// Show version
    Version,
}

/// Flags of the `daemon` command; unset flags keep the config value
#[derive(Args, Debug, Default, Clone)]
pub struct DaemonArgs {
    /// Update interval, e.g. 10m, 1h
    #[arg(short, long)]
    pub interval: Option<String>,

    /// ipset name for Cloudflare IPv4 ranges
    #[arg(long)]
    pub ipset4: Option<String>,

    /// ipset name for Cloudflare IPv6 ranges
    #[arg(long)]
    pub ipset6: Option<String>,

    /// Cloudflare IP ranges API URL
    #[arg(long)]
    pub api_url: Option<String>,

    /// Run only one fetch-and-update cycle and exit
    #[arg(long)]
    pub once: bool,

    /// ipset program to run
    #[arg(long)]
    pub ipset_bin: Option<String>,

    /// HTTP request timeout in seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

impl Cli {
    /// Apply the global logging flags on top of `config`
    pub fn apply_global(&self, config: &mut Config) {
        if let Some(ref level) = self.log_level {
            config.log_level = level.clone();
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }
    }
}

impl DaemonArgs {
    /// Apply the flags that were given on top of `config`
    pub fn apply(&self, config: &mut Config) {
        if let Some(ref interval) = self.interval {
            config.interval = interval.clone();
        }
        if let Some(ref name) = self.ipset4 {
            config.ipset4 = name.clone();
        }
        if let Some(ref name) = self.ipset6 {
            config.ipset6 = name.clone();
        }
        if let Some(ref url) = self.api_url {
            config.api_url = url.clone();
        }
        if self.once {
            config.once = true;
        }
        if let Some(ref bin) = self.ipset_bin {
            config.ipset_bin = bin.clone();
        }
        if let Some(secs) = self.timeout_secs {
            config.timeout_secs = secs;
        }
    }
}
