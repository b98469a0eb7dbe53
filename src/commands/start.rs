use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::logging;

use answerdb::{
    config::{ConfigUpdate, load_or_default},
    server,
};

#[derive(Args, Clone)]
pub struct StartArgs {
    /// Override the configured server port
    #[arg(long)]
    pub port: Option<u16>,

    /// Override the configured data directory
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}

pub async fn execute(config_path: Option<PathBuf>, args: StartArgs) -> Result<()> {
    let (mut config, config_path) = load_or_default(config_path)?;

    let update = ConfigUpdate {
        port: args.port,
        data_dir: args.data_dir,
        ..ConfigUpdate::default()
    };
    if !update.is_empty() {
        config.apply_update(update);
        config.save(&config_path)?;
    }

    config.ensure_data_dir()?;
    logging::init(&config.logs_path())?;

    server::run(config).await?;
    Ok(())
}
