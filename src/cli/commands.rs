//! CLI command definitions and handlers.
//!
//! Each subcommand is implemented as a function that takes the parsed
//! arguments and returns an `anyhow::Result<()>`.

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

use crate::config::{self, Config};
use crate::library::Library;
use crate::player::audio::AudioPlayer;
use crate::player::mpv::MpvPlayer;
use crate::player::{self, PlayerEvent};
use crate::{db, paths};

/// Tonearm CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Library root folder (overrides the configured root)
    #[arg(short, long, global = true, env = "TONEARM_ROOT")]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// List all playlists in the library
    List,
    /// Create an empty playlist
    Create {
        /// Playlist name
        name: String,
    },
    /// Remove a playlist and all its entries
    Remove {
        /// Playlist name
        name: String,
    },
    /// Show the tracks of a playlist
    Show {
        /// Playlist name
        name: String,
    },
    /// Set the tracks of a playlist, creating it if needed
    Set {
        /// Playlist name
        name: String,
        /// Media files, in playback order
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Build a playlist from the audio files of a directory
    Import {
        /// Playlist name
        name: String,
        /// Directory to scan for audio files
        dir: PathBuf,
    },
    /// Play a playlist from start to finish
    Play {
        /// Playlist name
        name: String,
    },
    /// Play a single file through the in-process audio engine (no mpv)
    PlayFile {
        /// Media file
        file: PathBuf,
    },
    /// Print the duration of a media file
    Probe {
        /// Media file
        file: PathBuf,
    },
}

/// Run the specified CLI command.
pub fn run_command(cli: &Cli) -> anyhow::Result<()> {
    let rt = Runtime::new()?;
    let config = config::load();
    let root = resolve_root(cli, &config)?;

    match &cli.command {
        Commands::List => cmd_list(&rt, &root, &config),
        Commands::Create { name } => cmd_create(&rt, &root, &config, name),
        Commands::Remove { name } => cmd_remove(&rt, &root, &config, name),
        Commands::Show { name } => cmd_show(&rt, &root, &config, name),
        Commands::Set { name, files } => cmd_set(&rt, &root, &config, name, files),
        Commands::Import { name, dir } => cmd_import(&rt, &root, &config, name, dir),
        Commands::Play { name } => cmd_play(&rt, &root, &config, name),
        Commands::PlayFile { file } => cmd_play_file(&config, file),
        Commands::Probe { file } => cmd_probe(&rt, &config, file),
    }
}

/// Pick the library root: CLI flag, then config, then the platform default.
fn resolve_root(cli: &Cli, config: &Config) -> anyhow::Result<PathBuf> {
    if let Some(root) = &cli.root {
        return Ok(root.clone());
    }
    if let Some(root) = &config.library.root {
        return Ok(root.clone());
    }
    paths::default_root().context("could not determine a library root, pass --root")
}

// ============================================================================
// Individual command implementations
// ============================================================================

fn cmd_list(rt: &Runtime, root: &Path, config: &Config) -> anyhow::Result<()> {
    rt.block_on(async {
        let library = Library::open(root, config).await?;

        let count = db::for_each_playlist(library.pool(), |name| {
            println!("{name}");
            std::ops::ControlFlow::Continue(())
        })
        .await?;

        if count == 0 {
            println!("(no playlists)");
        }
        library.close().await;
        Ok(())
    })
}

fn cmd_create(rt: &Runtime, root: &Path, config: &Config, name: &str) -> anyhow::Result<()> {
    paths::validate_playlist_name(name)?;
    rt.block_on(async {
        let library = Library::open(root, config).await?;
        db::create_playlist(library.pool(), name).await?;
        println!("Created playlist {name:?}");
        library.close().await;
        Ok(())
    })
}

fn cmd_remove(rt: &Runtime, root: &Path, config: &Config, name: &str) -> anyhow::Result<()> {
    rt.block_on(async {
        let library = Library::open(root, config).await?;
        let removed = db::remove_playlist(library.pool(), name).await?;
        library.close().await;
        if !removed {
            bail!("no such playlist: {name:?}");
        }
        println!("Removed playlist {name:?}");
        Ok(())
    })
}

fn cmd_show(rt: &Runtime, root: &Path, config: &Config, name: &str) -> anyhow::Result<()> {
    rt.block_on(async {
        let library = Library::open(root, config).await?;
        let items = db::playlist_items(library.pool(), name).await?;
        library.close().await;

        let Some(items) = items else {
            bail!("no such playlist: {name:?}");
        };
        for (index, item) in items.iter().enumerate() {
            println!("{:3}  {}", index + 1, item.display());
        }
        println!("{} track(s)", items.len());
        Ok(())
    })
}

fn cmd_set(
    rt: &Runtime,
    root: &Path,
    config: &Config,
    name: &str,
    files: &[PathBuf],
) -> anyhow::Result<()> {
    paths::validate_playlist_name(name)?;

    // Store absolute paths so playback works from any working directory.
    let mut items = Vec::with_capacity(files.len());
    for file in files {
        let absolute = file
            .canonicalize()
            .with_context(|| format!("cannot access {}", file.display()))?;
        items.push(absolute);
    }

    rt.block_on(async {
        let library = Library::open(root, config).await?;
        db::create_playlist(library.pool(), name).await?;
        db::set_playlist_items(library.pool(), name, &items).await?;
        println!("Set {} track(s) on {name:?}", items.len());
        library.close().await;
        Ok(())
    })
}

fn cmd_import(
    rt: &Runtime,
    root: &Path,
    config: &Config,
    name: &str,
    dir: &Path,
) -> anyhow::Result<()> {
    paths::validate_playlist_name(name)?;

    let dir = dir
        .canonicalize()
        .with_context(|| format!("cannot access {}", dir.display()))?;
    let items = paths::scan_media(&dir);
    if items.is_empty() {
        bail!("no audio files found under {}", dir.display());
    }
    info!(count = items.len(), dir = %dir.display(), "importing tracks");

    rt.block_on(async {
        let library = Library::open(root, config).await?;
        db::create_playlist(library.pool(), name).await?;
        db::set_playlist_items(library.pool(), name, &items).await?;
        println!("Imported {} track(s) into {name:?}", items.len());
        library.close().await;
        Ok(())
    })
}

fn cmd_play(rt: &Runtime, root: &Path, config: &Config, name: &str) -> anyhow::Result<()> {
    rt.block_on(async {
        let library = Library::open(root, config).await?;

        let result = play_playlist(&library, config, name).await;
        library.close().await;
        result
    })
}

async fn play_playlist(library: &Library, config: &Config, name: &str) -> anyhow::Result<()> {
    let player = library.player();
    player.start().await?;
    player.set_volume(config.audio.volume).await?;

    let queued = library.queue_playlist(name).await?;
    println!("Playing {name:?} ({queued} tracks)");

    let events = player
        .events()
        .context("player started without an event stream")?;
    player.set_pause(false).await?;

    // The engine reports idle once on startup before anything is queued;
    // only an idle after playback started means the playlist finished.
    let mut started = false;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\nInterrupted");
                break;
            }
            event = events.recv() => {
                let Ok(event) = event else {
                    warn!("player event stream closed");
                    break;
                };
                match event {
                    PlayerEvent::TrackStarted => {
                        started = true;
                        if let Ok(Some(path)) = player.current_path().await {
                            println!("-> {}", path.display());
                        }
                    }
                    PlayerEvent::TrackEnded { reason } => {
                        debug!(?reason, "track ended");
                    }
                    PlayerEvent::Idle if started => {
                        println!("Playlist finished");
                        break;
                    }
                    PlayerEvent::ShuttingDown => {
                        warn!("player shut down unexpectedly");
                        break;
                    }
                    PlayerEvent::Error { message } => {
                        warn!("player error: {message}");
                    }
                    _ => {}
                }
            }
        }
    }
    Ok(())
}

fn cmd_play_file(config: &Config, file: &Path) -> anyhow::Result<()> {
    let file = file
        .canonicalize()
        .with_context(|| format!("cannot access {}", file.display()))?;

    // Runs entirely in-process; the rodio engine needs no runtime.
    let audio = AudioPlayer::new()?;
    // Config volume is on the 0-100 mpv scale, rodio takes 0.0-1.0.
    audio.set_volume((config.audio.volume / 100.0) as f32)?;
    let events = audio.events();
    audio.load(&file)?;

    loop {
        match events.recv() {
            Ok(PlayerEvent::TrackLoaded) => {
                println!("-> {}", file.display());
                audio.play()?;
            }
            Ok(PlayerEvent::TrackEnded { .. }) => {
                println!("Done");
                break;
            }
            Ok(PlayerEvent::Error { message }) => {
                bail!("playback failed: {message}");
            }
            Ok(_) => {}
            Err(_) => bail!("audio engine stopped unexpectedly"),
        }
    }
    Ok(())
}

fn cmd_probe(rt: &Runtime, config: &Config, file: &Path) -> anyhow::Result<()> {
    let file = file
        .canonicalize()
        .with_context(|| format!("cannot access {}", file.display()))?;

    rt.block_on(async {
        let duration = MpvPlayer::probe_duration(&file, &config.mpv_config()).await?;
        println!("{}", player::format_duration(duration));
        Ok(())
    })
}
