use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use answerdb::config::{ConfigUpdate, load_or_default};

#[derive(Args)]
pub struct ConfigArgs {
    /// Update the server port
    #[arg(long)]
    pub port: Option<u16>,

    /// Update the data directory
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Update the default page size returned by listings
    #[arg(long)]
    pub list_page_size: Option<usize>,

    /// Update the maximum page size accepted by listings
    #[arg(long)]
    pub page_limit: Option<usize>,
}

pub fn execute(config_path: Option<PathBuf>, args: ConfigArgs) -> Result<()> {
    let (mut config, path) = load_or_default(config_path)?;

    let update = ConfigUpdate {
        port: args.port,
        data_dir: args.data_dir,
        list_page_size: args.list_page_size,
        page_limit: args.page_limit,
    };

    if update.is_empty() {
        print!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    config.apply_update(update);
    config.save(&path)?;
    println!("configuration updated at {}", path.display());
    Ok(())
}
