#![recursion_limit = "256"]

mod application;
mod cli;
mod config;
mod data;
mod domain;
mod infra;
mod ml;
mod server;

use anyhow::Result;
use clap::Parser;
use cli::Cli;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rossmann_forecast=info,tower_http=info".into()),
        )
        .init();

    let cli = Cli::parse();
    cli.run()
}
