//! Top-level handle tying the playlist store and the player together.

use std::path::{Path, PathBuf};

use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::config::Config;
use crate::db;
use crate::error::{Error, Result, ResultExt};
use crate::paths;
use crate::player::mpv::MpvPlayer;

/// An opened music library.
///
/// Owns the database pool and the player for one library root. Dropping a
/// `Library` without calling [`Library::close`] leaves a player process
/// behind, so commands should always close it on their way out.
pub struct Library {
    root: PathBuf,
    pool: SqlitePool,
    player: MpvPlayer,
}

impl Library {
    /// Open the library rooted at `root`, creating the on-disk layout and
    /// database if needed. The player is created unstarted.
    pub async fn open(root: &Path, config: &Config) -> Result<Self> {
        paths::ensure_layout(root).with_context(format!("preparing {}", root.display()))?;

        let url = db::db_url(&paths::db_path(root));
        let pool = db::init_db(&url)
            .await
            .with_context(format!("opening database {url}"))?;

        info!(root = %root.display(), "library opened");
        Ok(Self {
            root: root.to_path_buf(),
            pool,
            player: MpvPlayer::new(config.mpv_config()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn player(&self) -> &MpvPlayer {
        &self.player
    }

    /// Replace the player's queue with the entries of the named playlist.
    ///
    /// Returns the number of queued tracks. The player must already be
    /// started; playback state (pause, volume) is left untouched.
    pub async fn queue_playlist(&self, name: &str) -> Result<usize> {
        let items = db::playlist_items(&self.pool, name)
            .await?
            .ok_or_else(|| Error::unknown_playlist(name))?;

        self.player.stop_playback().await?;
        let mut queued = 0;
        for item in &items {
            self.player.append(item, false).await?;
            queued += 1;
        }

        debug!(playlist = name, tracks = queued, "playlist queued");
        Ok(queued)
    }

    /// Close the database pool and tear the player down.
    pub async fn close(self) {
        self.player.shutdown().await;
        self.pool.close().await;
        debug!("library closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_creates_layout() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("library");

        let library = Library::open(&root, &Config::default()).await.unwrap();
        assert!(paths::db_path(&root).exists());
        assert!(paths::playlists_dir(&root).is_dir());
        assert!(!library.player().is_running());
        library.close().await;
    }

    #[tokio::test]
    async fn test_queue_unknown_playlist() {
        let dir = TempDir::new().unwrap();
        let library = Library::open(dir.path(), &Config::default()).await.unwrap();

        let err = library.queue_playlist("missing").await.unwrap_err();
        assert!(matches!(err, Error::UnknownPlaylist(_)));
        library.close().await;
    }
}
