//! Playlist persistence over embedded SQLite.
//!
//! Uses SQLx with SQLite for lightweight, embedded storage. A playlist is a
//! named, ordered list of absolute media file paths:
//! - `playlists(id, name)` with a unique name
//! - `entries(playlist_id, position, path)` holding the ordered paths
//!
//! All mutating operations are transactional; a failed replace or remove
//! leaves the stored list unchanged.
//!
//! # Example
//!
//! ```ignore
//! use crate::db::{init_db, create_playlist, set_playlist_items};
//!
//! let pool = init_db("sqlite:tonearm.db").await?;
//! create_playlist(&pool, "road trip").await?;
//! set_playlist_items(&pool, "road trip", &paths).await?;
//! ```

use std::ops::ControlFlow;
use std::path::PathBuf;

use futures::TryStreamExt;
use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::debug;

/// Build a SQLite database URL from a path.
pub fn db_url(path: &std::path::Path) -> String {
    format!("sqlite:{}", path.display())
}

/// Initialize the database connection pool and run migrations.
///
/// Creates the database file if it doesn't exist, establishes a connection
/// pool with up to 5 connections, and runs all pending migrations.
///
/// # Errors
///
/// Returns an error if:
/// - Database creation fails
/// - Connection cannot be established
/// - Migration fails
pub async fn init_db(db_url: &str) -> Result<SqlitePool, sqlx::Error> {
    if !sqlx::Sqlite::database_exists(db_url).await.unwrap_or(false) {
        sqlx::Sqlite::create_database(db_url).await?;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// Create a playlist, returning its database ID.
///
/// Idempotent: creating a playlist that already exists succeeds and returns
/// the existing ID.
pub async fn create_playlist(pool: &SqlitePool, name: &str) -> sqlx::Result<i64> {
    sqlx::query("INSERT INTO playlists (name) VALUES (?) ON CONFLICT(name) DO NOTHING")
        .bind(name)
        .execute(pool)
        .await?;

    let (id,): (i64,) = sqlx::query_as("SELECT id FROM playlists WHERE name = ?")
        .bind(name)
        .fetch_one(pool)
        .await?;
    debug!(playlist = name, id, "playlist ensured");
    Ok(id)
}

/// Remove a playlist and all of its entries.
///
/// Returns `false` (and changes nothing) when the playlist does not exist.
pub async fn remove_playlist(pool: &SqlitePool, name: &str) -> sqlx::Result<bool> {
    let mut tx = pool.begin().await?;

    let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM playlists WHERE name = ?")
        .bind(name)
        .fetch_optional(&mut *tx)
        .await?;
    let Some((id,)) = row else {
        return Ok(false);
    };

    sqlx::query("DELETE FROM entries WHERE playlist_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM playlists WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    debug!(playlist = name, "playlist removed");
    Ok(true)
}

/// Get the names of all saved playlists in stored order.
pub async fn playlist_names(pool: &SqlitePool) -> sqlx::Result<Vec<String>> {
    sqlx::query_scalar("SELECT name FROM playlists ORDER BY id")
        .fetch_all(pool)
        .await
}

/// Visit playlist names in stored order, with early stop.
///
/// The callback may return [`ControlFlow::Break`] to stop half-way. Returns
/// the number of names visited.
pub async fn for_each_playlist<F>(pool: &SqlitePool, mut callback: F) -> sqlx::Result<usize>
where
    F: FnMut(&str) -> ControlFlow<()>,
{
    let mut rows =
        sqlx::query_scalar::<_, String>("SELECT name FROM playlists ORDER BY id").fetch(pool);

    let mut visited = 0;
    while let Some(name) = rows.try_next().await? {
        visited += 1;
        if callback(&name).is_break() {
            break;
        }
    }
    Ok(visited)
}

/// Get the media paths of a playlist in stored playing order.
///
/// Returns `None` when the playlist does not exist; an existing playlist
/// with no entries yields `Some(vec![])`.
pub async fn playlist_items(pool: &SqlitePool, name: &str) -> sqlx::Result<Option<Vec<PathBuf>>> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM playlists WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await?;
    let Some((id,)) = row else {
        return Ok(None);
    };

    let paths: Vec<String> = sqlx::query_scalar(
        "SELECT path FROM entries WHERE playlist_id = ? ORDER BY position ASC",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    Ok(Some(paths.into_iter().map(PathBuf::from).collect()))
}

/// Visit the media paths of a playlist in stored order, with early stop.
///
/// Returns `None` when the playlist does not exist, otherwise the number of
/// paths visited.
pub async fn for_each_item<F>(
    pool: &SqlitePool,
    name: &str,
    mut callback: F,
) -> sqlx::Result<Option<usize>>
where
    F: FnMut(PathBuf) -> ControlFlow<()>,
{
    let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM playlists WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await?;
    let Some((id,)) = row else {
        return Ok(None);
    };

    let mut rows = sqlx::query_scalar::<_, String>(
        "SELECT path FROM entries WHERE playlist_id = ? ORDER BY position ASC",
    )
    .bind(id)
    .fetch(pool);

    let mut visited = 0;
    while let Some(path) = rows.try_next().await? {
        visited += 1;
        if callback(PathBuf::from(path)).is_break() {
            break;
        }
    }
    Ok(Some(visited))
}

/// Replace a playlist's entries with `items`, preserving order.
///
/// Returns `false` (and changes nothing) when the playlist does not exist.
/// The whole replace runs in one transaction.
pub async fn set_playlist_items(
    pool: &SqlitePool,
    name: &str,
    items: &[PathBuf],
) -> sqlx::Result<bool> {
    let mut tx = pool.begin().await?;

    let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM playlists WHERE name = ?")
        .bind(name)
        .fetch_optional(&mut *tx)
        .await?;
    let Some((id,)) = row else {
        return Ok(false);
    };

    sqlx::query("DELETE FROM entries WHERE playlist_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    for (position, path) in items.iter().enumerate() {
        sqlx::query("INSERT INTO entries (playlist_id, position, path) VALUES (?, ?, ?)")
            .bind(id)
            .bind(position as i64)
            .bind(path.to_string_lossy().as_ref())
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    debug!(playlist = name, count = items.len(), "playlist entries replaced");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn temp_pool() -> (tempfile::TempDir, SqlitePool) {
        let dir = tempfile::tempdir().unwrap();
        let url = db_url(&dir.path().join("test.db"));
        let pool = init_db(&url).await.expect("Failed to init db");
        (dir, pool)
    }

    #[tokio::test]
    async fn test_init_db_creates_database() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let pool = init_db(&db_url(&db_path)).await.expect("Failed to init db");
        assert!(db_path.exists());

        let names = playlist_names(&pool).await.unwrap();
        assert!(names.is_empty());
    }

    #[tokio::test]
    async fn test_create_playlist_is_idempotent() {
        let (_dir, pool) = temp_pool().await;

        let id1 = create_playlist(&pool, "road trip").await.unwrap();
        let id2 = create_playlist(&pool, "road trip").await.unwrap();
        assert_eq!(id1, id2);

        let id3 = create_playlist(&pool, "focus").await.unwrap();
        assert_ne!(id1, id3);

        let names = playlist_names(&pool).await.unwrap();
        assert_eq!(names, vec!["road trip", "focus"]);
    }

    #[tokio::test]
    async fn test_remove_playlist() {
        let (_dir, pool) = temp_pool().await;

        assert!(!remove_playlist(&pool, "missing").await.unwrap());

        create_playlist(&pool, "doomed").await.unwrap();
        set_playlist_items(&pool, "doomed", &[PathBuf::from("/m/a.mp3")])
            .await
            .unwrap();

        assert!(remove_playlist(&pool, "doomed").await.unwrap());
        assert!(playlist_names(&pool).await.unwrap().is_empty());
        assert!(playlist_items(&pool, "doomed").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_and_get_items_preserves_order() {
        let (_dir, pool) = temp_pool().await;
        create_playlist(&pool, "mix").await.unwrap();

        let items = vec![
            PathBuf::from("/music/z.mp3"),
            PathBuf::from("/music/a.flac"),
            PathBuf::from("/music/m.ogg"),
        ];
        assert!(set_playlist_items(&pool, "mix", &items).await.unwrap());

        // Stored order, not lexical order.
        let stored = playlist_items(&pool, "mix").await.unwrap().unwrap();
        assert_eq!(stored, items);

        // Replacing drops the old entries entirely.
        let shorter = vec![PathBuf::from("/music/only.mp3")];
        assert!(set_playlist_items(&pool, "mix", &shorter).await.unwrap());
        let stored = playlist_items(&pool, "mix").await.unwrap().unwrap();
        assert_eq!(stored, shorter);
    }

    #[tokio::test]
    async fn test_set_items_on_missing_playlist() {
        let (_dir, pool) = temp_pool().await;
        let changed = set_playlist_items(&pool, "nope", &[PathBuf::from("/x.mp3")])
            .await
            .unwrap();
        assert!(!changed);
    }

    #[tokio::test]
    async fn test_empty_playlist_is_some_empty() {
        let (_dir, pool) = temp_pool().await;
        create_playlist(&pool, "fresh").await.unwrap();
        let items = playlist_items(&pool, "fresh").await.unwrap();
        assert_eq!(items, Some(vec![]));
    }

    #[tokio::test]
    async fn test_for_each_playlist_early_stop() {
        let (_dir, pool) = temp_pool().await;
        for name in ["one", "two", "three"] {
            create_playlist(&pool, name).await.unwrap();
        }

        let mut seen = Vec::new();
        let visited = for_each_playlist(&pool, |name| {
            seen.push(name.to_string());
            if seen.len() == 2 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .await
        .unwrap();

        assert_eq!(visited, 2);
        assert_eq!(seen, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_for_each_item() {
        let (_dir, pool) = temp_pool().await;

        assert!(
            for_each_item(&pool, "missing", |_| ControlFlow::Continue(()))
                .await
                .unwrap()
                .is_none()
        );

        create_playlist(&pool, "mix").await.unwrap();
        let items = vec![PathBuf::from("/a.mp3"), PathBuf::from("/b.mp3")];
        set_playlist_items(&pool, "mix", &items).await.unwrap();

        let mut seen = Vec::new();
        let visited = for_each_item(&pool, "mix", |path| {
            seen.push(path);
            ControlFlow::Continue(())
        })
        .await
        .unwrap();

        assert_eq!(visited, Some(2));
        assert_eq!(seen, items);
    }
}
