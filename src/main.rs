//! SamCore hub binary.
//!
//! Launched without arguments from the working directory: the settings
//! file is discovered at `<cwd>/SamCoreSettings.json` and the socket is
//! named after the hub. Runs until interrupted.

use anyhow::Result;
use clap::Parser;
use mimalloc::MiMalloc;
use samcore::{Hub, HubConfig};
use tokio::sync::watch;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Central message-routing hub for a local node network.
#[derive(Parser, Debug)]
#[command(name = "samcore", version, about)]
struct Cli {}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let _cli = Cli::parse();

    let config = HubConfig::load();
    log::info!(
        "Starting hub \"{}\" (socket {}, settings {})",
        config.hub_name,
        config.socket_path().display(),
        config.settings_path.display()
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Interrupt received; shutting down");
            let _ = shutdown_tx.send(true);
        }
    });

    let mut hub = Hub::new(config)?;
    hub.run(shutdown_rx).await
}
