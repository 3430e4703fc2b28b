//! Tonearm - a personal music library manager.
//!
//! Keeps playlists in a per-library SQLite store and plays them through an
//! mpv process controlled over JSON IPC. All functionality is exposed via
//! CLI subcommands.

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod library;
pub mod paths;
pub mod player;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(EnvFilter::from_default_env().add_directive("tonearm=info".parse().unwrap()))
        .init();

    cli::run_command(&args)
}
