//! Application-wide error types.
//!
//! Library modules use specific error types via `thiserror`, while the CLI
//! uses `anyhow` for convenient error propagation. This module provides the
//! top-level [`Error`] that aggregates the subsystem errors.

use std::path::PathBuf;

use crate::config::ConfigError;
use crate::player::audio::AudioError;
use crate::player::mpv::MpvError;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level application error.
///
/// Aggregates errors from all subsystems for unified handling.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// mpv player error
    #[error("Player error: {0}")]
    Player(#[from] MpvError),

    /// Audio output error
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Name not usable as a playlist (and therefore directory) name
    #[error("Forbidden playlist name: {0:?}")]
    InvalidName(String),

    /// Playlist does not exist in the store
    #[error("No such playlist: {0:?}")]
    UnknownPlaylist(String),

    /// Media file not found
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create an invalid name error.
    pub fn invalid_name(name: impl Into<String>) -> Self {
        Self::InvalidName(name.into())
    }

    /// Create an unknown playlist error.
    pub fn unknown_playlist(name: impl Into<String>) -> Self {
        Self::UnknownPlaylist(name.into())
    }

    /// Create a not found error.
    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        Self::NotFound(path.into())
    }

    /// Add context to an error.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Io(e).context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, sqlx::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Database(e).context(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::not_found("/music/song.mp3");
        assert!(err.to_string().contains("/music/song.mp3"));
    }

    #[test]
    fn test_error_with_context() {
        let err = Error::unknown_playlist("road trip").context("while queueing");
        let msg = err.to_string();
        assert!(msg.contains("while queueing"));
    }

    #[test]
    fn test_result_ext() {
        let result: Result<()> = Err(Error::invalid_name("CON"));
        let with_ctx = result.with_context("creating playlist");
        assert!(
            with_ctx
                .unwrap_err()
                .to_string()
                .contains("creating playlist")
        );
    }
}
