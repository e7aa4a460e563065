//! xh - proxy core and subscription provisioning CLI

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use xh_cli::cmd;
use xh_cli::{Cli, Commands, UpdateTarget};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // --verbose wins over RUST_LOG
    let filter = if cli.verbose {
        EnvFilter::new("debug,hyper=info,reqwest=info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Completions { shell } => {
            cmd::completions::completions(shell);
            Ok(())
        }
        Commands::Update { target } => {
            let ctx = cmd::load_context(cli.config.as_deref())?;
            match target {
                UpdateTarget::Core => cmd::update::core(&ctx).await,
                UpdateTarget::Tun2socks => cmd::update::tun2socks(&ctx).await,
                UpdateTarget::Geodata => cmd::update::geodata(&ctx).await,
                UpdateTarget::Subscribe => cmd::update::subscribe(&ctx).await,
            }
        }
        Commands::Nodes {
            file,
            json,
            outbound,
        } => {
            let config = cmd::load_config(cli.config.as_deref())?;
            let mode = match (json, outbound) {
                (_, Some(tag)) => cmd::nodes::NodesMode::Outbound(tag),
                (true, None) => cmd::nodes::NodesMode::Json,
                (false, None) => cmd::nodes::NodesMode::Table,
            };
            cmd::nodes::nodes(&config, file.as_deref(), &mode)
        }
    }
}
