//! # cf-ip-guard - Cloudflare IP allow-list keeper
//!
//! Keeps two ipsets (one per IP version) in sync with the ranges Cloudflare
//! publishes, so that firewall rules matching on those sets always allow
//! exactly the current Cloudflare edge.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       cf-ip-guard                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  CLI (clap) + Config (serde_yaml)                           │
//! │    └── Commands: daemon, check, version                     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Daemon (reconciliation loop)                               │
//! │    ├── preflight once, then one tick per interval           │
//! │    └── token + UpdateStats held in memory                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Fetcher (reqwest + rustls)                                 │
//! │    └── conditional GET with If-None-Match                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Enforcer (SetReplacer / PreflightCheck traits)             │
//! │    └── IpsetBackend: stage, swap, destroy                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  CommandExecutor (tokio::process)                           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use cf_ip_guard::daemon::{Daemon, DaemonSettings};
//! use cf_ip_guard::enforcer::{IpsetBackend, SetNames};
//! use cf_ip_guard::fetcher::{CloudflareFetcher, DEFAULT_API_URL};
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = DaemonSettings {
//!         sets: SetNames::new("cloudflare4", "cloudflare6"),
//!         interval: Duration::from_secs(30 * 60),
//!         once: true,
//!     };
//!     let fetcher = CloudflareFetcher::new(DEFAULT_API_URL, Duration::from_secs(10))?;
//!
//!     let mut daemon = Daemon::new(
//!         settings,
//!         Box::new(fetcher),
//!         Box::new(IpsetBackend::new("ipset")),
//!         Box::new(IpsetBackend::new("ipset")),
//!     );
//!     daemon.run(CancellationToken::new()).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`cli`] - Command-line interface definitions
//! - [`cmd_abstraction`] - Command execution trait (real + test doubles)
//! - [`commands`] - CLI command implementations
//! - [`config`] - Configuration parsing and validation
//! - [`daemon`] - Reconciliation loop
//! - [`enforcer`] - ipset replacement and preflight
//! - [`error`] - Error types
//! - [`fetcher`] - HTTP client for the published ranges
//! - [`logging`] - tracing subscriber setup
//! - [`signal`] - Graceful shutdown signal handling
//! - [`stats`] - In-memory update statistics
//! - [`validation`] - Interval, set name and URL validation

pub mod cli;
pub mod cmd_abstraction;
pub mod commands;
pub mod config;
pub mod daemon;
pub mod enforcer;
pub mod error;
pub mod fetcher;
pub mod logging;
pub mod signal;
pub mod stats;
pub mod validation;

pub use config::Config;
pub use error::GuardError;
