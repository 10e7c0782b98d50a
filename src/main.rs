//! cf-ip-guard - keep ipset allow-lists in sync with Cloudflare IP ranges.

use anyhow::Result;
use clap::Parser;

use cf_ip_guard::cli::{Cli, Commands};
use cf_ip_guard::config::Config;
use cf_ip_guard::logging;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Config file first, then flags on top
    let mut config = Config::load_or_default(cli.config.as_deref())?;
    cli.apply_global(&mut config);
    match &cli.command {
        Commands::Daemon(args) => args.apply(&mut config),
        Commands::Check {
            ipset_bin: Some(bin),
        } => config.ipset_bin = bin.clone(),
        _ => {}
    }
    config.validate()?;

    logging::init(&config.log_level, config.log_format)?;

    match cli.command {
        Commands::Daemon(_) => cf_ip_guard::commands::daemon::run(&config).await,
        Commands::Check { .. } => cf_ip_guard::commands::check::run(&config).await,
        Commands::Version => {
            println!("cf-ip-guard {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
