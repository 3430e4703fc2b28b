//! Thin wrapper over the rodio playback engine.
//!
//! A dedicated worker thread owns the output stream and the current sink;
//! the [`AudioPlayer`] handle sends commands over a bounded channel and
//! reads a shared state snapshot. Engine happenings (end of stream, decode
//! failures) are re-emitted as [`PlayerEvent`]s.
//!
//! State contract (mirrored by the mpv wrapper):
//! - `load` requires `Stopped` and moves to `Paused`
//! - `play` / `pause` toggle between `Paused` and `Playing`
//! - `stop` detaches the source and returns to `Stopped`

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use parking_lot::RwLock;
use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink, Source};
use tracing::{debug, warn};

use super::{EndReason, PlaybackStatus, PlayerEvent};

/// How often the worker wakes up to refresh position and detect stream end.
const TICK: Duration = Duration::from_millis(50);

/// Audio wrapper errors.
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("audio output initialization failed: {0}")]
    OutputInit(String),

    #[error("operation requires the {required} state, player is {actual}")]
    WrongState {
        required: PlaybackStatus,
        actual: PlaybackStatus,
    },

    #[error("audio thread is gone")]
    ChannelClosed,
}

/// Snapshot of the wrapper state, shared with the worker thread.
#[derive(Debug, Clone)]
pub struct AudioState {
    pub status: PlaybackStatus,
    /// File set by the last successful `load`
    pub current: Option<PathBuf>,
    pub position: Duration,
    /// `None` until a source reports its length
    pub duration: Option<Duration>,
    /// Volume level (0.0 - 1.0); unaffected by mute
    pub volume: f32,
    pub muted: bool,
}

impl Default for AudioState {
    fn default() -> Self {
        Self {
            status: PlaybackStatus::Stopped,
            current: None,
            position: Duration::ZERO,
            duration: None,
            volume: 1.0,
            muted: false,
        }
    }
}

enum AudioCommand {
    Load(PathBuf),
    Play,
    Pause,
    Stop,
    Seek(Duration),
    SetVolume(f32),
    SetMute(bool),
    Shutdown,
}

/// Non-blocking audio player for local files.
///
/// Dropping the handle shuts the worker thread down.
pub struct AudioPlayer {
    state: Arc<RwLock<AudioState>>,
    command_tx: Sender<AudioCommand>,
    event_rx: Receiver<PlayerEvent>,
    worker: Option<JoinHandle<()>>,
}

impl AudioPlayer {
    /// Create the player and open the default output device.
    ///
    /// Fails when no output device is available.
    pub fn new() -> Result<Self, AudioError> {
        let state = Arc::new(RwLock::new(AudioState::default()));
        let (command_tx, command_rx) = bounded(32);
        let (event_tx, event_rx) = bounded(64);
        let (ready_tx, ready_rx) = bounded(1);

        let shared = Arc::clone(&state);
        let worker = thread::Builder::new()
            .name("tonearm-audio".to_string())
            .spawn(move || worker_main(shared, command_rx, event_tx, ready_tx))
            .map_err(|e| AudioError::OutputInit(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                state,
                command_tx,
                event_rx,
                worker: Some(worker),
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(AudioError::ChannelClosed),
        }
    }

    /// Set the audio source. The player must be `Stopped`.
    ///
    /// Decode failures surface as [`PlayerEvent::Error`]; the player then
    /// stays `Stopped`.
    pub fn load(&self, path: &Path) -> Result<(), AudioError> {
        check_can_load(self.state.read().status)?;
        self.send(AudioCommand::Load(path.to_path_buf()))
    }

    /// Resume or start playback of the loaded source.
    pub fn play(&self) -> Result<(), AudioError> {
        self.send(AudioCommand::Play)
    }

    /// Pause playback.
    pub fn pause(&self) -> Result<(), AudioError> {
        self.send(AudioCommand::Pause)
    }

    /// Detach the current source and return to `Stopped`.
    pub fn stop(&self) -> Result<(), AudioError> {
        self.send(AudioCommand::Stop)
    }

    /// Seek relative to the start of the current source.
    pub fn seek(&self, position: Duration) -> Result<(), AudioError> {
        check_can_seek(self.state.read().status)?;
        self.send(AudioCommand::Seek(position))
    }

    /// Set the volume level (clamped to 0.0 - 1.0).
    pub fn set_volume(&self, volume: f32) -> Result<(), AudioError> {
        self.send(AudioCommand::SetVolume(volume.clamp(0.0, 1.0)))
    }

    /// Mute the output. This does NOT change the stored volume.
    pub fn set_mute(&self, mute: bool) -> Result<(), AudioError> {
        self.send(AudioCommand::SetMute(mute))
    }

    /// Get a snapshot of the player state.
    pub fn state(&self) -> AudioState {
        self.state.read().clone()
    }

    /// Event stream (end of stream, status transitions, failures).
    pub fn events(&self) -> Receiver<PlayerEvent> {
        self.event_rx.clone()
    }

    fn send(&self, cmd: AudioCommand) -> Result<(), AudioError> {
        self.command_tx
            .send(cmd)
            .map_err(|_| AudioError::ChannelClosed)
    }
}

impl Drop for AudioPlayer {
    fn drop(&mut self) {
        let _ = self.command_tx.send(AudioCommand::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

// ============================================================================
// Worker thread
// ============================================================================

fn worker_main(
    state: Arc<RwLock<AudioState>>,
    command_rx: Receiver<AudioCommand>,
    event_tx: Sender<PlayerEvent>,
    ready_tx: Sender<Result<(), AudioError>>,
) {
    // The output stream is created on this thread and owned by it.
    let stream = match OutputStreamBuilder::open_default_stream() {
        Ok(stream) => {
            let _ = ready_tx.send(Ok(()));
            stream
        }
        Err(e) => {
            let _ = ready_tx.send(Err(AudioError::OutputInit(e.to_string())));
            return;
        }
    };

    let mut sink: Option<Sink> = None;

    loop {
        match command_rx.recv_timeout(TICK) {
            Ok(AudioCommand::Shutdown) => break,
            Ok(cmd) => handle_command(cmd, &stream, &mut sink, &state, &event_tx),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        tick(&mut sink, &state, &event_tx);
    }

    if let Some(sink) = sink.take() {
        sink.stop();
    }
    debug!("audio worker exiting");
}

fn handle_command(
    cmd: AudioCommand,
    stream: &OutputStream,
    sink: &mut Option<Sink>,
    state: &Arc<RwLock<AudioState>>,
    event_tx: &Sender<PlayerEvent>,
) {
    match cmd {
        AudioCommand::Load(path) => {
            let (volume, muted) = {
                let s = state.read();
                (s.volume, s.muted)
            };
            match open_source(&path) {
                Ok((source, duration)) => {
                    let new_sink = Sink::connect_new(stream.mixer());
                    new_sink.append(source);
                    new_sink.set_volume(if muted { 0.0 } else { volume });
                    new_sink.pause();
                    *sink = Some(new_sink);

                    {
                        let mut s = state.write();
                        s.current = Some(path);
                        s.duration = duration;
                        s.position = Duration::ZERO;
                        s.status = PlaybackStatus::Paused;
                    }
                    emit(event_tx, PlayerEvent::TrackLoaded);
                    emit_transition(event_tx, PlaybackStatus::Stopped, PlaybackStatus::Paused);
                }
                Err(message) => {
                    warn!(path = %path.display(), %message, "failed to load audio source");
                    emit(event_tx, PlayerEvent::Error { message });
                }
            }
        }
        AudioCommand::Play => {
            let status = state.read().status;
            if let (Some(sink), PlaybackStatus::Paused) = (sink.as_ref(), status) {
                sink.play();
                state.write().status = PlaybackStatus::Playing;
                emit(event_tx, PlayerEvent::TrackStarted);
                emit_transition(event_tx, status, PlaybackStatus::Playing);
            }
        }
        AudioCommand::Pause => {
            let status = state.read().status;
            if let (Some(sink), PlaybackStatus::Playing) = (sink.as_ref(), status) {
                sink.pause();
                state.write().status = PlaybackStatus::Paused;
                emit_transition(event_tx, status, PlaybackStatus::Paused);
            }
        }
        AudioCommand::Stop => {
            if let Some(sink) = sink.take() {
                sink.stop();
            }
            let previous = {
                let mut s = state.write();
                let previous = s.status;
                s.status = PlaybackStatus::Stopped;
                s.current = None;
                s.duration = None;
                s.position = Duration::ZERO;
                previous
            };
            if previous != PlaybackStatus::Stopped {
                emit_transition(event_tx, previous, PlaybackStatus::Stopped);
            }
        }
        AudioCommand::Seek(position) => {
            if let Some(sink) = sink.as_ref() {
                match sink.try_seek(position) {
                    Ok(()) => {
                        state.write().position = position;
                        emit(event_tx, PlayerEvent::Seeked);
                    }
                    Err(e) => {
                        warn!(?position, "seek failed: {e}");
                        emit(
                            event_tx,
                            PlayerEvent::Error {
                                message: format!("seek failed: {e}"),
                            },
                        );
                    }
                }
            }
        }
        AudioCommand::SetVolume(volume) => {
            let muted = store_volume(state, volume);
            if let (Some(sink), false) = (sink.as_ref(), muted) {
                sink.set_volume(volume);
            }
        }
        AudioCommand::SetMute(mute) => {
            let volume = store_mute(state, mute);
            if let Some(sink) = sink.as_ref() {
                sink.set_volume(if mute { 0.0 } else { volume });
            }
        }
        AudioCommand::Shutdown => unreachable!("handled by the worker loop"),
    }
}

/// Refresh the position snapshot and detect the end of the stream.
fn tick(sink: &mut Option<Sink>, state: &Arc<RwLock<AudioState>>, event_tx: &Sender<PlayerEvent>) {
    let Some(current) = sink.as_ref() else {
        return;
    };

    let status = state.read().status;
    if status == PlaybackStatus::Playing && current.empty() {
        // The source ran out; rodio keeps the sink alive but silent.
        sink.take();
        {
            let mut s = state.write();
            s.status = PlaybackStatus::Stopped;
            s.position = Duration::ZERO;
            s.duration = None;
        }
        emit(
            event_tx,
            PlayerEvent::TrackEnded {
                reason: EndReason::Eof,
            },
        );
        emit_transition(event_tx, PlaybackStatus::Playing, PlaybackStatus::Stopped);
        return;
    }

    if status != PlaybackStatus::Stopped {
        state.write().position = current.get_pos();
    }
}

/// `load` replaces the current source, so it is only legal from `Stopped`.
fn check_can_load(actual: PlaybackStatus) -> Result<(), AudioError> {
    if actual != PlaybackStatus::Stopped {
        return Err(AudioError::WrongState {
            required: PlaybackStatus::Stopped,
            actual,
        });
    }
    Ok(())
}

/// `seek` needs a loaded source, so it is rejected in `Stopped`.
fn check_can_seek(actual: PlaybackStatus) -> Result<(), AudioError> {
    if actual == PlaybackStatus::Stopped {
        return Err(AudioError::WrongState {
            required: PlaybackStatus::Paused,
            actual,
        });
    }
    Ok(())
}

/// Record the new volume, returning whether output is currently muted.
fn store_volume(state: &RwLock<AudioState>, volume: f32) -> bool {
    let mut s = state.write();
    s.volume = volume;
    s.muted
}

/// Record the mute flag. The stored volume is left untouched; it is
/// returned so the caller can restore it on unmute.
fn store_mute(state: &RwLock<AudioState>, mute: bool) -> f32 {
    let mut s = state.write();
    s.muted = mute;
    s.volume
}

fn open_source(
    path: &Path,
) -> Result<(Decoder<BufReader<File>>, Option<Duration>), String> {
    let file = File::open(path).map_err(|e| format!("failed to open {}: {e}", path.display()))?;
    let source = Decoder::new(BufReader::new(file))
        .map_err(|e| format!("failed to decode {}: {e}", path.display()))?;
    let duration = source.total_duration();
    Ok((source, duration))
}

fn emit(event_tx: &Sender<PlayerEvent>, event: PlayerEvent) {
    // A full buffer means nobody is listening; dropping is fine.
    let _ = event_tx.try_send(event);
}

fn emit_transition(event_tx: &Sender<PlayerEvent>, from: PlaybackStatus, to: PlaybackStatus) {
    emit(event_tx, PlayerEvent::StatusChanged { from, to });
}
