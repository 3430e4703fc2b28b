//! Filesystem utilities: library layout and portable filename validation.
//!
//! A library root folder contains the SQLite database file and a `Playlists/`
//! directory for managed media. Playlist names double as directory names
//! under `Playlists/`, so they are validated against the union of characters
//! and device names that are forbidden somewhere across Windows, macOS and
//! Linux.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{Error, Result};

/// The database file name inside a library root.
pub const DB_FILE: &str = "tonearm.db";

/// Directory (inside the root) holding the managed media directories.
pub const PLAYLISTS_DIR: &str = "Playlists";

/// Media file extensions picked up by [`scan_media`] (lowercase).
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "ogg", "opus", "wav", "m4a"];

// Windows reserved device names; any extension, case-insensitive.
const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "CONIN$", "CONOUT$", "COM1", "COM2", "COM3", "COM4", "COM5",
    "COM6", "COM7", "COM8", "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7",
    "LPT8", "LPT9",
];

const FORBIDDEN_CHARS: &str = "<>:\"/\\|?*";

/// Default library root when neither the CLI flag nor the config names one.
pub fn default_root() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("tonearm"))
}

/// Full path of the database file for a library root.
pub fn db_path(root: &Path) -> PathBuf {
    root.join(DB_FILE)
}

/// Full path of the managed-media directory for a library root.
pub fn playlists_dir(root: &Path) -> PathBuf {
    root.join(PLAYLISTS_DIR)
}

/// Create the library directory layout if it does not exist yet.
pub fn ensure_layout(root: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(root)?;
    std::fs::create_dir_all(playlists_dir(root))
}

/// Returns `true` when `name` cannot be used as a file or directory name on
/// at least one supported platform.
///
/// Rejects empty names, `.` and `..`, Windows device names (any extension),
/// trailing spaces or dots, control characters and `<>:"/\|?*`.
pub fn is_filename_forbidden(name: &str) -> bool {
    if name.is_empty() || name == "." || name == ".." {
        return true;
    }

    let stem = Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name);
    if RESERVED_NAMES.iter().any(|r| r.eq_ignore_ascii_case(stem)) {
        return true;
    }

    if name.ends_with(' ') || name.ends_with('.') {
        return true;
    }

    name.chars()
        .any(|c| (c as u32) <= 31 || FORBIDDEN_CHARS.contains(c))
}

/// Validate a playlist name, which must also be usable as a directory name.
pub fn validate_playlist_name(name: &str) -> Result<()> {
    if is_filename_forbidden(name) {
        return Err(Error::invalid_name(name));
    }
    Ok(())
}

/// Recursively collect media files under `dir`, sorted for determinism.
///
/// Matches by extension (case-insensitive), see [`AUDIO_EXTENSIONS`].
pub fn scan_media(dir: &Path) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .and_then(|s| s.to_str())
                .map(|ext| AUDIO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    found.sort();
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::fs::File;
    use tempfile::tempdir;

    #[test]
    fn test_reserved_device_names() {
        assert!(is_filename_forbidden("CON"));
        assert!(is_filename_forbidden("con"));
        assert!(is_filename_forbidden("con.mp3"));
        assert!(is_filename_forbidden("Lpt9.txt"));
        // A second extension unreserves the stem, same as the original table.
        assert!(!is_filename_forbidden("con.tar.gz"));
    }

    #[test]
    fn test_special_and_empty_names() {
        assert!(is_filename_forbidden(""));
        assert!(is_filename_forbidden("."));
        assert!(is_filename_forbidden(".."));
        assert!(is_filename_forbidden("trailing "));
        assert!(is_filename_forbidden("trailing."));
        assert!(is_filename_forbidden("tab\there"));
    }

    #[test]
    fn test_forbidden_characters() {
        for c in FORBIDDEN_CHARS.chars() {
            assert!(is_filename_forbidden(&format!("a{c}b")), "char {c:?}");
        }
        assert!(!is_filename_forbidden("Road Trip 2024"));
        assert!(!is_filename_forbidden("lo-fi.flac"));
    }

    #[test]
    fn test_validate_playlist_name() {
        assert!(validate_playlist_name("morning mix").is_ok());
        assert!(matches!(
            validate_playlist_name("a/b"),
            Err(Error::InvalidName(_))
        ));
    }

    proptest! {
        #[test]
        fn names_with_forbidden_chars_rejected(
            prefix in "[a-z]{0,8}",
            c in proptest::sample::select(FORBIDDEN_CHARS.chars().collect::<Vec<_>>()),
            suffix in "[a-z]{0,8}",
        ) {
            let name = format!("{prefix}{c}{suffix}");
            prop_assert!(is_filename_forbidden(&name));
        }

        #[test]
        fn plain_alphanumeric_names_allowed(name in "[a-z0-9][a-z0-9 _-]{0,20}[a-z0-9]") {
            let stem = Path::new(&name)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(&name);
            prop_assume!(!RESERVED_NAMES.iter().any(|r| r.eq_ignore_ascii_case(stem)));
            prop_assert!(!is_filename_forbidden(&name));
        }
    }

    #[test]
    fn test_layout_helpers() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("lib");
        ensure_layout(&root).unwrap();
        assert!(root.is_dir());
        assert!(playlists_dir(&root).is_dir());
        assert_eq!(db_path(&root), root.join(DB_FILE));
        // idempotent
        ensure_layout(&root).unwrap();
    }

    #[test]
    fn test_scan_media() {
        let dir = tempdir().unwrap();
        let root = dir.path();

        File::create(root.join("song.mp3")).unwrap();
        File::create(root.join("UPPER.FLAC")).unwrap();
        File::create(root.join("notes.txt")).unwrap();
        let sub = root.join("sub");
        std::fs::create_dir(&sub).unwrap();
        File::create(sub.join("track.ogg")).unwrap();

        let found = scan_media(root);
        assert_eq!(found.len(), 3);
        // sorted output
        let mut sorted = found.clone();
        sorted.sort();
        assert_eq!(found, sorted);
        assert!(found.iter().all(|p| p.extension().is_some()));
        assert!(!found.iter().any(|p| p.ends_with("notes.txt")));
    }
}
