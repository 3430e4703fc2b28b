//! mpv process detection and spawning.

use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info};

use super::MpvConfig;

static PROBE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Process handling errors.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("mpv executable not found")]
    NotFound,
    #[error("failed to spawn mpv: {0}")]
    SpawnFailed(#[from] std::io::Error),
}

/// Build an IPC socket/pipe path for the given instance tag.
pub(crate) fn socket_path(tag: &str) -> String {
    #[cfg(windows)]
    {
        format!(r"\\.\pipe\tonearm-{tag}")
    }
    #[cfg(not(windows))]
    {
        std::env::temp_dir()
            .join(format!("tonearm-{tag}.sock"))
            .display()
            .to_string()
    }
}

/// Socket path for the main player of this process.
pub(crate) fn default_socket() -> String {
    socket_path(&std::process::id().to_string())
}

/// Unique socket path for a one-shot probe instance.
pub(crate) fn probe_socket() -> String {
    let seq = PROBE_SEQ.fetch_add(1, Ordering::Relaxed);
    socket_path(&format!("probe-{}-{seq}", std::process::id()))
}

/// Find the mpv executable on PATH or in common install locations.
pub fn find_mpv() -> Option<PathBuf> {
    if let Ok(path) = which::which("mpv") {
        return Some(path);
    }

    #[cfg(windows)]
    let common_paths: &[&str] = &[
        r"C:\Program Files\mpv\mpv.exe",
        r"C:\Program Files (x86)\mpv\mpv.exe",
    ];
    #[cfg(target_os = "macos")]
    let common_paths: &[&str] = &[
        "/usr/local/bin/mpv",
        "/opt/homebrew/bin/mpv",
        "/Applications/mpv.app/Contents/MacOS/mpv",
    ];
    #[cfg(all(unix, not(target_os = "macos")))]
    let common_paths: &[&str] = &["/usr/bin/mpv", "/usr/local/bin/mpv"];

    common_paths
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}

/// Arguments for an mpv instance serving JSON IPC on `socket`.
///
/// The instance starts idle, paused, without video or terminal output.
/// `keep-open=no` makes mpv unload the last playlist entry at its EOF, so
/// the `end-file` and `idle` events mark the end of the playlist.
fn spawn_args(socket: &str, extra_args: &[String]) -> Vec<String> {
    let mut args = vec![
        format!("--input-ipc-server={socket}"),
        "--idle=yes".to_string(),
        "--pause".to_string(),
        "--no-video".to_string(),
        "--no-terminal".to_string(),
        "--no-config".to_string(),
        "--keep-open=no".to_string(),
    ];
    args.extend(extra_args.iter().cloned());
    args
}

/// Spawn an mpv process serving JSON IPC on `socket`.
pub(crate) fn spawn(config: &MpvConfig, socket: &str) -> Result<Child, ProcessError> {
    let binary = config
        .binary
        .clone()
        .or_else(find_mpv)
        .ok_or(ProcessError::NotFound)?;

    info!(binary = %binary.display(), socket, "spawning mpv");
    if !config.extra_args.is_empty() {
        debug!(args = ?config.extra_args, "extra mpv arguments");
    }

    let child = Command::new(&binary)
        .args(spawn_args(socket, &config.extra_args))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;

    Ok(child)
}

/// Remove a stale socket file left behind by a crashed instance.
pub(crate) fn remove_stale_socket(socket: &str) {
    #[cfg(not(windows))]
    {
        let _ = std::fs::remove_file(socket);
    }
    // Windows named pipes are cleaned up automatically
    #[cfg(windows)]
    let _ = socket;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_paths_are_distinct() {
        assert_ne!(socket_path("a"), socket_path("b"));
        assert_ne!(probe_socket(), probe_socket());
    }

    #[test]
    fn test_default_socket_contains_pid() {
        assert!(default_socket().contains(&std::process::id().to_string()));
    }

    #[test]
    fn test_spawn_args() {
        let args = spawn_args("/tmp/t.sock", &["--gapless-audio=yes".to_string()]);
        assert!(args.contains(&"--input-ipc-server=/tmp/t.sock".to_string()));
        assert!(args.contains(&"--idle=yes".to_string()));
        assert!(args.contains(&"--pause".to_string()));
        // The last entry must unload at EOF, otherwise neither end-file nor
        // idle fires for the final track and playback never reports done.
        assert!(args.contains(&"--keep-open=no".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("--gapless-audio=yes"));
    }
}
