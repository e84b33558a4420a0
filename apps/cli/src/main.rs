//! `micloud-upload` entry point.

mod app;
mod config;

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "micloud-upload", version, about = "Upload a file to MiCloud drive")]
struct Cli {
    /// Path to the file to upload
    file: PathBuf,

    /// Destination folder id. Defaults to `parent_id` from the config file.
    #[arg(long)]
    parent: Option<String>,

    /// Alternative configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => config::config_path()?,
    };
    let config = config::Config::load_from(&config_path)?;
    tracing::debug!(path = %config_path.display(), "configuration loaded");

    let parent = cli.parent.unwrap_or_else(|| config.parent_id.clone());

    let rt = tokio::runtime::Runtime::new()?;
    let result = rt.block_on(app::run(&config, &cli.file, &parent))?;

    println!("{}", result.file_id);
    Ok(())
}
