//! Bridge manager service entry point

use anyhow::{Context, Result};
use bridge::{logging, BridgeManager};
use bridge_config::BridgeSettings;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use transport::IoContext;

#[derive(Parser, Debug)]
#[command(author, version, about = "Port registry for simulated devices", long_about = None)]
struct Args {
    /// Configuration file path (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter, overrides logging.level
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines
    #[arg(long)]
    json: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings = BridgeSettings::load(args.config.as_deref())
        .context("Failed to load bridge configuration")?;
    if let Some(level) = args.log_level {
        settings.logging.level = level;
    }
    settings.logging.json |= args.json;

    if args.print_config {
        println!("{}", settings.to_toml_string()?);
        return Ok(());
    }

    logging::init(&settings.logging).context("Failed to initialize logging")?;
    info!(version = env!("CARGO_PKG_VERSION"), "Starting bridge manager");

    let context = IoContext::new(settings.transport.clone())
        .context("Failed to start the I/O context")?;
    let manager =
        BridgeManager::start(context, &settings).context("Failed to start bridge manager")?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown requested");

    // Joins worker threads
    tokio::task::spawn_blocking(move || manager.shutdown())
        .await
        .context("Bridge manager shutdown panicked")?;

    Ok(())
}
