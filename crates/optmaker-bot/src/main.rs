//! optmaker entry point.

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Options market maker: RFQ quoting, price broadcast and market-data relay
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via OPTMAKER_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // before any TLS connection
    optmaker_ws::init_crypto();

    let args = Args::parse();
    optmaker_telemetry::init_logging()?;

    info!("Starting optmaker v{}", env!("CARGO_PKG_VERSION"));

    let config_path = optmaker_bot::AppConfig::resolve_path(args.config);
    info!(config_path = %config_path, "Loading configuration");
    let config = optmaker_bot::AppConfig::from_file(&config_path)?;
    info!(
        chain_id = config.chain_id,
        maker_id = %config.maker_id,
        backend = ?config.pricer.backend,
        options = config.options.len(),
        "Configuration loaded"
    );

    let app = optmaker_bot::Application::new(config)?;
    app.run().await?;

    Ok(())
}
