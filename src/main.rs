use anyhow::{Context, Result};
use log::{error, info};

use plc_twist_bridge::cli::{build_cli, handle_subcommands};
use plc_twist_bridge::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let matches = build_cli().get_matches();

    let default_level = if matches.get_flag("verbose") { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    info!("🖥️  PLC twist bridge v{}", plc_twist_bridge::VERSION);

    let config = Config::from_matches(&matches).context("invalid configuration")?;

    if let Err(e) = handle_subcommands(&matches, config).await {
        error!("❌ {}", e);
        return Err(e).context("bridge stopped with an error");
    }

    Ok(())
}
