#![warn(clippy::all, clippy::pedantic)]

use anyhow::Result;
use clap::Parser;
use confwarden::app::dispatch::dispatch;
use confwarden::{Cli, Config};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = Config::load(cli.config.as_deref())?;
    dispatch(cli, config).await
}
