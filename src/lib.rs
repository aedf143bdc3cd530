mod cli;
mod commands;
pub mod config;
mod pipeline;
pub mod session;

use anyhow::{Context, Result};
use clap::Parser;

pub use config::{ScannerConfig, SourceConfig};
pub use pipeline::{CommandReply, Pipeline, SessionEvent};
pub use session::{Command, Session, SessionSnapshot};

pub fn run() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "decklist_scanner_lib=debug,card_capture=debug,card_vision=debug,card_match=debug,card_state=info"
                    .into()
            }),
        )
        .init();

    let args = cli::Args::parse();
    let runtime = tokio::runtime::Runtime::new().context("Failed to start the async runtime")?;
    runtime.block_on(cli::run(args))
}
