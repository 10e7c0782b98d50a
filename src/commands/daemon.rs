//! Daemon command implementation.

use anyhow::Result;
use tracing::info;

use crate::config::Config;
use crate::daemon::Daemon;
use crate::enforcer::IpsetBackend;
use crate::fetcher::CloudflareFetcher;
use crate::signal::shutdown_token;

/// Run the daemon command
///
/// Returns an error only when startup fails (preflight, HTTP client setup).
/// Failed updates are logged and retried on the next tick.
pub async fn run(config: &Config) -> Result<()> {
    let settings = config.daemon_settings()?;
    let fetcher = CloudflareFetcher::new(&config.api_url, config.timeout())?;
    info!(api = %fetcher.api_url(), ipset_bin = %config.ipset_bin, "range source configured");

    let mut daemon = Daemon::new(
        settings,
        Box::new(fetcher),
        Box::new(IpsetBackend::new(&config.ipset_bin)),
        Box::new(IpsetBackend::new(&config.ipset_bin)),
    );

    daemon.run(shutdown_token()).await?;
    Ok(())
}
