mod commands;
mod logging;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands::{config::ConfigArgs, start::StartArgs};

#[derive(Parser)]
#[command(author, version, about = "answerdb server CLI")]
struct Cli {
    /// Path to the configuration file. Defaults to ~/.answerdb/config.toml
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the answerdb server
    Start(StartArgs),
    /// Display or update system configuration
    Config(ConfigArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let Cli { config, command } = Cli::parse();

    match command {
        Commands::Start(args) => commands::start::execute(config, args).await?,
        Commands::Config(args) => commands::config::execute(config, args)?,
    }

    Ok(())
}
