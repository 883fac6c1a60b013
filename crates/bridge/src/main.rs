use anyhow::Result;
use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "bridge")]
#[command(about = "Bitbucket webhook bridge for the CI orchestrator")]
struct Cli {
    /// Path to the config file (defaults to BRIDGE_CONFIG_PATH or the
    /// built-in location).
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(config_path) = cli.config {
        std::env::set_var("BRIDGE_CONFIG_PATH", config_path);
    }

    bridge::server::run().await
}
