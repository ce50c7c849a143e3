//! mptcpd - MPTCP path-management daemon
//!
//! Bridges kernel MPTCP connection/subflow lifecycle events to loaded
//! policy plugins and translates their decisions back into path-manager
//! commands.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use mptcpd_core::PathManager;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "mptcpd")]
#[command(about = "MPTCP path-management daemon", long_about = None)]
#[command(version)]
struct Cli {
    /// Directory to scan for plugin shared objects.
    #[arg(long)]
    plugin_dir: Option<PathBuf>,

    /// Plugin name to use when an event doesn't name a strategy.
    #[arg(long)]
    plugin: Option<String>,

    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
}

const FAMILY_RETRY_INTERVAL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();

    let raw = mptcpd_core::PmConfig::load(cli.config.as_deref())?;
    let config = mptcpd_core::PmConfig::resolve(raw, cli.plugin_dir, cli.plugin);

    info!(plugin_dir = %config.plugin_dir.display(), "starting path manager");
    let mut pm = PathManager::new(&config.plugin_dir, config.default_plugin).await?;

    if !pm.ready() {
        warn!("MPTCP family not present at startup, waiting for it to appear");
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                break;
            }
            result = run_iteration(&mut pm) => {
                result?;
            }
        }
    }

    pm.shutdown();
    Ok(())
}

async fn run_iteration(pm: &mut PathManager) -> anyhow::Result<()> {
    if !pm.ready() {
        pm.try_establish().await?;
        if !pm.ready() {
            tokio::time::sleep(FAMILY_RETRY_INTERVAL).await;
        }
        return Ok(());
    }

    pm.pump_event().await?;
    Ok(())
}
