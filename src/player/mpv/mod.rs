//! Wrapper around an mpv process controlled over JSON IPC.
//!
//! [`MpvPlayer`] owns the spawned process and its IPC connection. Every
//! method forwards to an mpv command or property; no playback logic lives
//! here. Native events are translated into typed [`PlayerEvent`]s, with
//! [`PlaybackStatus`] transitions synthesized from the observed `pause` and
//! `playlist-count` properties.

mod ipc;
mod process;
mod protocol;

pub use ipc::IpcError;
pub use process::{ProcessError, find_mpv};
pub use protocol::{LoadMode, PropertyValue};

use std::path::{Path, PathBuf};
use std::process::Child;
use std::sync::Arc;
use std::time::Duration;

use async_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::{EndReason, PlaybackStatus, PlayerEvent};
use ipc::MpvIpc;
use protocol::{MpvCommand, MpvEvent};

/// Observer IDs for the properties driving status derivation.
const OBSERVE_PAUSE: i64 = 1;
const OBSERVE_PLAYLIST_COUNT: i64 = 2;

/// Upper bound for a duration probe, including process startup.
const PROBE_TIMEOUT: Duration = Duration::from_secs(15);

/// mpv wrapper errors.
#[derive(Debug, thiserror::Error)]
pub enum MpvError {
    #[error("process error: {0}")]
    Process(#[from] ProcessError),
    #[error("IPC error: {0}")]
    Ipc(#[from] IpcError),
    #[error("mpv command failed: {0}")]
    CommandFailed(String),
    #[error("player not started")]
    NotStarted,
    #[error("probe failed for {path}: {message}")]
    Probe { path: PathBuf, message: String },
}

/// How to spawn mpv.
#[derive(Debug, Clone, Default)]
pub struct MpvConfig {
    /// Path to the mpv binary (None = search PATH and common locations)
    pub binary: Option<PathBuf>,
    /// Extra arguments appended to the spawn command
    pub extra_args: Vec<String>,
}

/// Handle-owning wrapper over one mpv process.
///
/// Created idle; [`MpvPlayer::start`] spawns the process and connects.
/// [`MpvPlayer::shutdown`] must be called to tear the process down.
pub struct MpvPlayer {
    config: MpvConfig,
    socket: String,
    process: Mutex<Option<Child>>,
    ipc: Mutex<Option<Arc<MpvIpc>>>,
    events: Mutex<Option<Receiver<PlayerEvent>>>,
    forwarder: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl MpvPlayer {
    /// Create an unstarted player with a per-process socket path.
    pub fn new(config: MpvConfig) -> Self {
        Self::with_socket(config, process::default_socket())
    }

    fn with_socket(config: MpvConfig, socket: String) -> Self {
        Self {
            config,
            socket,
            process: Mutex::new(None),
            ipc: Mutex::new(None),
            events: Mutex::new(None),
            forwarder: Mutex::new(None),
        }
    }

    /// Spawn mpv and connect to its IPC socket.
    pub async fn start(&self) -> Result<(), MpvError> {
        process::remove_stale_socket(&self.socket);

        let child = process::spawn(&self.config, &self.socket)?;
        *self.process.lock() = Some(child);

        // Give mpv a moment to create the socket before the retry loop.
        tokio::time::sleep(Duration::from_millis(500)).await;
        let ipc = Arc::new(MpvIpc::connect(&self.socket, 10).await?);
        *self.ipc.lock() = Some(Arc::clone(&ipc));

        let (event_tx, event_rx) = async_channel::unbounded();
        let handle = tokio::spawn(forward_events(ipc.events(), event_tx));
        *self.events.lock() = Some(event_rx);
        *self.forwarder.lock() = Some(handle);

        // Status derivation inputs.
        self.send(MpvCommand::observe_property(OBSERVE_PAUSE, "pause"))
            .await?;
        self.send(MpvCommand::observe_property(
            OBSERVE_PLAYLIST_COUNT,
            "playlist-count",
        ))
        .await?;

        info!(socket = %self.socket, "mpv player started");
        Ok(())
    }

    /// Quit mpv, kill the process and clean the socket up.
    pub async fn shutdown(&self) {
        if let Ok(ipc) = self.get_ipc() {
            let _ = ipc.send_command(MpvCommand::quit()).await;
        }

        if let Some(handle) = self.forwarder.lock().take() {
            handle.abort();
        }
        self.events.lock().take();

        if let Some(ipc) = self.ipc.lock().take() {
            ipc.close();
        }

        let child = self.process.lock().take();
        if let Some(mut child) = child {
            debug!(pid = child.id(), "killing mpv process");
            let result = tokio::task::spawn_blocking(move || {
                let _ = child.kill();
                child.wait()
            })
            .await;
            match result {
                Ok(Ok(status)) => debug!(%status, "mpv process exited"),
                Ok(Err(e)) => warn!("failed to wait for mpv: {e}"),
                Err(e) => warn!("mpv cleanup task panicked: {e}"),
            }
        }

        process::remove_stale_socket(&self.socket);
        info!("mpv player stopped");
    }

    /// Whether the player has a live IPC connection.
    pub fn is_running(&self) -> bool {
        self.ipc.lock().is_some()
    }

    /// Typed event stream; `None` before [`MpvPlayer::start`].
    pub fn events(&self) -> Option<Receiver<PlayerEvent>> {
        self.events.lock().clone()
    }

    // ------------------------------------------------------------------
    // Playlist control
    // ------------------------------------------------------------------

    /// Set `media` as the only entry of the playlist.
    pub async fn load(&self, media: &Path) -> Result<(), MpvError> {
        self.send(MpvCommand::loadfile(
            &media.to_string_lossy(),
            LoadMode::Replace,
        ))
        .await
    }

    /// Append `media` to the end of the playlist.
    ///
    /// With `play` set, playback jumps to the appended entry. Appending to
    /// an empty playlist is a plain load.
    pub async fn append(&self, media: &Path, play: bool) -> Result<(), MpvError> {
        let count = self.playlist_count().await?;
        let mode = if count == 0 {
            LoadMode::Replace
        } else if play {
            LoadMode::AppendPlay
        } else {
            LoadMode::Append
        };
        self.send(MpvCommand::loadfile(&media.to_string_lossy(), mode))
            .await
    }

    /// Clear the playlist and pause playback.
    pub async fn stop_playback(&self) -> Result<(), MpvError> {
        self.send(MpvCommand::playlist_clear()).await?;
        // Fails when nothing is loaded; that is fine.
        if let Err(e) = self.send(MpvCommand::playlist_remove_current()).await {
            debug!("playlist-remove: {e}");
        }
        self.set_pause(true).await
    }

    /// Index of the playing playlist entry, `-1` when none is playing.
    pub async fn playlist_pos(&self) -> Result<i64, MpvError> {
        self.get_i64("playlist-pos").await
    }

    /// Jump to the playlist entry at `index`.
    pub async fn set_playlist_pos(&self, index: i64) -> Result<(), MpvError> {
        self.send(MpvCommand::set_property("playlist-pos", index))
            .await
    }

    /// Number of playlist entries.
    pub async fn playlist_count(&self) -> Result<i64, MpvError> {
        self.get_i64("playlist-count").await
    }

    /// Equivalent to `playlist_count() == 0`.
    pub async fn playlist_empty(&self) -> Result<bool, MpvError> {
        Ok(self.playlist_count().await? <= 0)
    }

    // ------------------------------------------------------------------
    // Playback control
    // ------------------------------------------------------------------

    pub async fn set_pause(&self, paused: bool) -> Result<(), MpvError> {
        self.send(MpvCommand::set_property("pause", paused)).await
    }

    pub async fn is_paused(&self) -> Result<bool, MpvError> {
        self.get_bool("pause").await
    }

    /// Set the volume on the mpv scale (clamped to 0.0 - 100.0).
    pub async fn set_volume(&self, volume: f64) -> Result<(), MpvError> {
        self.send(MpvCommand::set_property("volume", volume.clamp(0.0, 100.0)))
            .await
    }

    /// Mute the player (this does NOT change the volume).
    pub async fn set_mute(&self, mute: bool) -> Result<(), MpvError> {
        self.send(MpvCommand::set_property("mute", mute)).await
    }

    /// Position relative to the start of the current file.
    pub async fn position(&self) -> Result<Duration, MpvError> {
        let secs = self.get_f64("playback-time").await?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }

    /// Seek relative to the start of the current file.
    pub async fn seek(&self, position: Duration) -> Result<(), MpvError> {
        self.send(MpvCommand::seek(position.as_secs_f64())).await
    }

    /// Length of the current file.
    pub async fn duration(&self) -> Result<Duration, MpvError> {
        let secs = self.get_f64("duration").await?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }

    /// Path of the currently loaded file, if any.
    pub async fn current_path(&self) -> Result<Option<PathBuf>, MpvError> {
        match self.get_property("path").await {
            Ok(value) => Ok(value.as_str().map(PathBuf::from)),
            // Unavailable while idle.
            Err(MpvError::CommandFailed(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Derive the playback status from engine state.
    pub async fn status(&self) -> Result<PlaybackStatus, MpvError> {
        let paused = self.is_paused().await?;
        let count = self.playlist_count().await?;
        Ok(derive_status(paused, count))
    }

    // ------------------------------------------------------------------
    // Probing
    // ------------------------------------------------------------------

    /// Query the duration of a media file with a private one-shot instance.
    ///
    /// Loads the file paused and muted, waits for it to load, reads the
    /// `duration` property and tears the instance down.
    pub async fn probe_duration(media: &Path, config: &MpvConfig) -> Result<Duration, MpvError> {
        let player = MpvPlayer::with_socket(config.clone(), process::probe_socket());

        // Tear down on every exit path; a failed IPC connect still leaves a
        // spawned process behind otherwise.
        let result = match player.start().await {
            Ok(()) => {
                match tokio::time::timeout(PROBE_TIMEOUT, probe_inner(&player, media)).await {
                    Ok(result) => result,
                    Err(_) => Err(MpvError::Probe {
                        path: media.to_path_buf(),
                        message: "timed out waiting for the file to load".into(),
                    }),
                }
            }
            Err(e) => Err(e),
        };

        player.shutdown().await;
        result
    }

    // ------------------------------------------------------------------
    // Plumbing
    // ------------------------------------------------------------------

    fn get_ipc(&self) -> Result<Arc<MpvIpc>, MpvError> {
        self.ipc.lock().clone().ok_or(MpvError::NotStarted)
    }

    async fn send(&self, cmd: MpvCommand) -> Result<(), MpvError> {
        self.request(cmd).await.map(drop)
    }

    async fn request(&self, cmd: MpvCommand) -> Result<protocol::MpvResponse, MpvError> {
        let ipc = self.get_ipc()?;
        let response = ipc.send_command(cmd).await?;
        if !response.is_success() {
            return Err(MpvError::CommandFailed(response.error));
        }
        Ok(response)
    }

    /// Get a property value.
    pub async fn get_property(&self, name: &str) -> Result<PropertyValue, MpvError> {
        let response = self.request(MpvCommand::get_property(name)).await?;
        Ok(response
            .data
            .map(PropertyValue::from)
            .unwrap_or(PropertyValue::Null))
    }

    async fn get_f64(&self, name: &str) -> Result<f64, MpvError> {
        let value = self.get_property(name).await?;
        value
            .as_f64()
            .ok_or_else(|| MpvError::CommandFailed(format!("unexpected value for {name}: {value:?}")))
    }

    async fn get_i64(&self, name: &str) -> Result<i64, MpvError> {
        let value = self.get_property(name).await?;
        value
            .as_i64()
            .ok_or_else(|| MpvError::CommandFailed(format!("unexpected value for {name}: {value:?}")))
    }

    async fn get_bool(&self, name: &str) -> Result<bool, MpvError> {
        let value = self.get_property(name).await?;
        value
            .as_bool()
            .ok_or_else(|| MpvError::CommandFailed(format!("unexpected value for {name}: {value:?}")))
    }
}

async fn probe_inner(player: &MpvPlayer, media: &Path) -> Result<Duration, MpvError> {
    let events = player.events().ok_or(MpvError::NotStarted)?;
    player.set_mute(true).await?;
    player.load(media).await?;

    loop {
        match events.recv().await {
            Ok(PlayerEvent::TrackLoaded) => return player.duration().await,
            Ok(PlayerEvent::TrackEnded { reason }) => {
                return Err(MpvError::Probe {
                    path: media.to_path_buf(),
                    message: format!("playback ended before loading ({reason:?})"),
                });
            }
            Ok(_) => continue,
            Err(_) => return Err(MpvError::Ipc(IpcError::Disconnected)),
        }
    }
}

/// The status contract: playing whenever unpaused; paused only with a
/// non-empty playlist.
fn derive_status(paused: bool, playlist_count: i64) -> PlaybackStatus {
    if !paused {
        PlaybackStatus::Playing
    } else if playlist_count > 0 {
        PlaybackStatus::Paused
    } else {
        PlaybackStatus::Stopped
    }
}

/// Translate native events into [`PlayerEvent`]s and synthesize
/// `StatusChanged` transitions from observed properties.
async fn forward_events(raw: Receiver<MpvEvent>, tx: Sender<PlayerEvent>) {
    // mpv starts paused with an empty playlist.
    let mut paused = true;
    let mut count: i64 = 0;
    let mut status = PlaybackStatus::Stopped;

    while let Ok(event) = raw.recv().await {
        let shutdown = event.event == "shutdown";

        let _ = tx.send(translate(&event)).await;

        if event.event == "property-change" {
            match event.name.as_deref() {
                Some("pause") => {
                    paused = event
                        .data
                        .as_ref()
                        .and_then(serde_json::Value::as_bool)
                        .unwrap_or(paused);
                }
                Some("playlist-count") => {
                    count = event
                        .data
                        .as_ref()
                        .and_then(serde_json::Value::as_i64)
                        .unwrap_or(count);
                }
                _ => {}
            }
            let next = derive_status(paused, count);
            if next != status {
                let _ = tx
                    .send(PlayerEvent::StatusChanged {
                        from: status,
                        to: next,
                    })
                    .await;
                status = next;
            }
        }

        if shutdown {
            break;
        }
    }
    debug!("mpv event forwarder exiting");
}

fn translate(event: &MpvEvent) -> PlayerEvent {
    match event.event.as_str() {
        "start-file" => PlayerEvent::TrackStarted,
        "file-loaded" => PlayerEvent::TrackLoaded,
        "end-file" => PlayerEvent::TrackEnded {
            reason: EndReason::from_mpv(event.reason.as_deref().unwrap_or("")),
        },
        "seek" => PlayerEvent::Seeked,
        "playback-restart" => PlayerEvent::PlaybackRestarted,
        "idle" => PlayerEvent::Idle,
        "shutdown" => PlayerEvent::ShuttingDown,
        "log-message" => PlayerEvent::Log {
            level: event.level.clone().unwrap_or_default(),
            text: event.text.clone().unwrap_or_default(),
        },
        "property-change" => PlayerEvent::PropertyChanged {
            name: event.name.clone().unwrap_or_default(),
            value: event
                .data
                .clone()
                .map(PropertyValue::from)
                .unwrap_or(PropertyValue::Null),
        },
        other => PlayerEvent::Other {
            name: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_status() {
        assert_eq!(derive_status(true, 0), PlaybackStatus::Stopped);
        assert_eq!(derive_status(true, 3), PlaybackStatus::Paused);
        assert_eq!(derive_status(false, 3), PlaybackStatus::Playing);
        // Unpaused always reads as playing, matching the engine contract.
        assert_eq!(derive_status(false, 0), PlaybackStatus::Playing);
    }

    #[test]
    fn test_translate_end_file() {
        let event = MpvEvent {
            event: "end-file".into(),
            id: None,
            name: None,
            data: None,
            reason: Some("eof".into()),
            level: None,
            text: None,
        };
        match translate(&event) {
            PlayerEvent::TrackEnded { reason } => assert_eq!(reason, EndReason::Eof),
            other => panic!("unexpected translation: {other:?}"),
        }
    }

    #[test]
    fn test_translate_unknown_event() {
        let event = MpvEvent {
            event: "video-reconfig".into(),
            id: None,
            name: None,
            data: None,
            reason: None,
            level: None,
            text: None,
        };
        match translate(&event) {
            PlayerEvent::Other { name } => assert_eq!(name, "video-reconfig"),
            other => panic!("unexpected translation: {other:?}"),
        }
    }

    // /bin/cat spawns fine but never serves the IPC socket, so the connect
    // retries are exhausted and start() fails after the process is running.
    #[cfg(unix)]
    fn deaf_binary_config() -> MpvConfig {
        MpvConfig {
            binary: Some(PathBuf::from("/bin/cat")),
            extra_args: Vec::new(),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shutdown_reaps_process_after_failed_connect() {
        let player = MpvPlayer::with_socket(deaf_binary_config(), process::probe_socket());
        assert!(player.start().await.is_err());
        assert!(player.process.lock().is_some());

        player.shutdown().await;
        assert!(player.process.lock().is_none());
        assert!(!player.is_running());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_probe_fails_cleanly_without_ipc_server() {
        let err = MpvPlayer::probe_duration(Path::new("/no/such/track.mp3"), &deaf_binary_config())
            .await
            .unwrap_err();
        assert!(matches!(err, MpvError::Ipc(_)));
    }
}
