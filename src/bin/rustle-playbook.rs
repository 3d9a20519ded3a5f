use anyhow::Result;
use clap::Parser;
use rustle_playbook::cli::{execute_command, RustlePlaybookCli};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = RustlePlaybookCli::parse();

    let level = if cli.verbosity > 0 {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    info!("Starting rustle-playbook v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = execute_command(cli).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
    Ok(())
}
