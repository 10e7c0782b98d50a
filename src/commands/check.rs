//! Check command implementation.

use anyhow::Result;

use crate::config::Config;
use crate::enforcer::{IpsetBackend, PreflightCheck};

/// Run the preflight check once and report the result
pub async fn run(config: &Config) -> Result<()> {
    IpsetBackend::new(&config.ipset_bin).check().await?;
    println!("[OK] {} is available and usable", config.ipset_bin);
    Ok(())
}
