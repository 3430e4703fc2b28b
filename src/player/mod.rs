//! Playback wrappers around external engines.
//!
//! Two thin wrappers share the types in this module:
//! - [`mpv::MpvPlayer`] drives an mpv process over its JSON IPC protocol and
//!   re-emits its native events as typed [`PlayerEvent`]s.
//! - [`audio::AudioPlayer`] wraps the rodio output engine behind a command
//!   channel and a dedicated worker thread.
//!
//! Neither wrapper decodes or renders media itself; they forward calls and
//! translate engine state into [`PlaybackStatus`].

pub mod audio;
pub mod mpv;

use std::fmt;
use std::time::Duration;

/// Current playback status.
///
/// `Stopped` means no media is tracked; `Paused` means media is tracked but
/// not playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackStatus {
    #[default]
    Stopped,
    Paused,
    Playing,
}

impl fmt::Display for PlaybackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PlaybackStatus::Stopped => "stopped",
            PlaybackStatus::Paused => "paused",
            PlaybackStatus::Playing => "playing",
        };
        f.write_str(s)
    }
}

/// Why playback of a file ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// Reached the end of the file
    Eof,
    /// Stopped by an explicit command
    Stop,
    /// The player is shutting down
    Quit,
    /// Loading or decoding failed
    Error,
    /// The entry redirected to another one
    Redirect,
    /// Anything the engine did not classify
    Unknown,
}

impl EndReason {
    /// Map an mpv `end-file` reason string.
    pub(crate) fn from_mpv(reason: &str) -> Self {
        match reason {
            "eof" => EndReason::Eof,
            "stop" => EndReason::Stop,
            "quit" => EndReason::Quit,
            "error" => EndReason::Error,
            "redirect" => EndReason::Redirect,
            _ => EndReason::Unknown,
        }
    }
}

/// Typed playback events re-emitted by the wrappers.
///
/// Mpv's native events map 1:1 onto these; `StatusChanged` is synthesized
/// from observed engine state transitions.
#[derive(Debug, Clone)]
pub enum PlayerEvent {
    /// Playback of a playlist entry started (the file may still be loading)
    TrackStarted,
    /// The current file finished loading and its metadata is available
    TrackLoaded,
    /// Playback of the current entry ended
    TrackEnded { reason: EndReason },
    /// Derived status transition
    StatusChanged {
        from: PlaybackStatus,
        to: PlaybackStatus,
    },
    /// A seek started
    Seeked,
    /// Playback resumed after a seek or load
    PlaybackRestarted,
    /// The engine became idle (empty playlist)
    Idle,
    /// The engine is shutting down
    ShuttingDown,
    /// Engine log output
    Log { level: String, text: String },
    /// A property we observe changed
    PropertyChanged {
        name: String,
        value: mpv::PropertyValue,
    },
    /// An engine-side failure outside a command call
    Error { message: String },
    /// Any native event without a dedicated variant
    Other { name: String },
}

/// Format a duration as MM:SS or HH:MM:SS.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    let hours = secs / 3600;
    let mins = (secs % 3600) / 60;
    let secs = secs % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, mins, secs)
    } else {
        format!("{}:{:02}", mins, secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(0)), "0:00");
        assert_eq!(format_duration(Duration::from_secs(65)), "1:05");
        assert_eq!(format_duration(Duration::from_secs(3661)), "1:01:01");
    }

    #[test]
    fn test_end_reason_mapping() {
        assert_eq!(EndReason::from_mpv("eof"), EndReason::Eof);
        assert_eq!(EndReason::from_mpv("quit"), EndReason::Quit);
        assert_eq!(EndReason::from_mpv("???"), EndReason::Unknown);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(PlaybackStatus::Paused.to_string(), "paused");
    }
}
