#![cfg_attr(not(test), forbid(unsafe_code))]

//! Entry point for the Parley chat server.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use shared::config::server::Config;

#[derive(Parser)]
#[command(name = "parley-server")]
#[command(about = "Real-time conversation and presence backend", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the chat server
    Serve {
        /// Port to bind; overrides the config file and environment
        #[arg(long, short)]
        port: Option<u16>,

        /// Path to a TOML configuration file
        #[arg(long, short)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port, config } => {
            let resolved = Config::load(config, port)?;
            server::server::run(resolved).await
        }
    }
}
