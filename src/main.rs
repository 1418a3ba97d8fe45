mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use portfolio_chat::config::ChatConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "portfolio-chat", version, about = "Streaming RAG chat backend with in-stream citations")]
struct Cli {
    /// Path to the config file (defaults to ~/.portfolio-chat/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP chat server
    Serve,
    /// Run a recorded model response through the citation extractor
    Extract {
        /// Transcript file; reads stdin when omitted
        file: Option<PathBuf>,
        /// Characters per simulated stream fragment
        #[arg(long, default_value_t = 7)]
        chunk_size: usize,
    },
    /// Print the resolved configuration and API key status
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ChatConfig::load_from(path)?,
        None => ChatConfig::load()?,
    };

    // Log to stderr so `extract` output on stdout stays clean.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve => {
            portfolio_chat::server::serve(config).await?;
        }
        Command::Extract { file, chunk_size } => {
            cli::extract::extract(file.as_deref(), chunk_size, &config)?;
        }
        Command::Doctor => {
            cli::doctor::doctor(&config);
        }
    }

    Ok(())
}
