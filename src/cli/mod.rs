//! Command-line interface for tonearm.
//!
//! This module provides CLI commands for managing playlists in the library
//! store and playing them through mpv.

mod commands;

pub use commands::{Cli, Commands, run_command};
