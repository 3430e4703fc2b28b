//! Async IPC connection to an mpv process.
//!
//! Line-delimited JSON over a Unix socket (Windows named pipe). A reader
//! task correlates responses to pending requests by `request_id` and fans
//! native events out on a channel; a writer task serializes outgoing
//! commands.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

use super::protocol::{MpvCommand, MpvEvent, MpvMessage, MpvResponse};

/// How long to wait for mpv to answer a single command.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// IPC errors.
#[derive(Debug, thiserror::Error)]
pub enum IpcError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("write failed: {0}")]
    WriteFailed(#[from] std::io::Error),
    #[error("command timeout")]
    Timeout,
    #[error("disconnected")]
    Disconnected,
}

/// Pending request waiting for its response.
type PendingRequest = oneshot::Sender<Result<MpvResponse, IpcError>>;

struct IpcState {
    pending: HashMap<i64, PendingRequest>,
}

enum WriteMessage {
    Command(Vec<u8>),
    Close,
}

/// An established mpv IPC connection.
pub struct MpvIpc {
    state: Arc<Mutex<IpcState>>,
    write_tx: Sender<WriteMessage>,
    event_rx: Receiver<MpvEvent>,
    _reader_handle: JoinHandle<()>,
    _writer_handle: JoinHandle<()>,
}

impl MpvIpc {
    /// Connect to the mpv IPC socket/pipe, retrying with backoff.
    pub async fn connect(path: &str, retry_count: u32) -> Result<Self, IpcError> {
        let mut last_error = None;

        for attempt in 0..retry_count {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(100 * (attempt as u64 + 1))).await;
            }

            match Self::try_connect(path).await {
                Ok(ipc) => return Ok(ipc),
                Err(e) => {
                    debug!(attempt = attempt + 1, "IPC connect attempt failed: {e}");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| IpcError::ConnectionFailed("no attempts made".into())))
    }

    #[cfg(windows)]
    async fn try_connect(path: &str) -> Result<Self, IpcError> {
        use tokio::net::windows::named_pipe::ClientOptions;

        let client = ClientOptions::new()
            .open(path)
            .map_err(|e| IpcError::ConnectionFailed(format!("failed to open pipe: {e}")))?;

        let (reader, writer) = tokio::io::split(client);
        Ok(Self::setup(reader, writer))
    }

    #[cfg(not(windows))]
    async fn try_connect(path: &str) -> Result<Self, IpcError> {
        use tokio::net::UnixStream;

        let stream = UnixStream::connect(path)
            .await
            .map_err(|e| IpcError::ConnectionFailed(e.to_string()))?;

        let (reader, writer) = tokio::io::split(stream);
        Ok(Self::setup(reader, writer))
    }

    fn setup<R, W>(reader: R, writer: W) -> Self
    where
        R: tokio::io::AsyncRead + Send + Unpin + 'static,
        W: tokio::io::AsyncWrite + Send + Unpin + 'static,
    {
        let state = Arc::new(Mutex::new(IpcState {
            pending: HashMap::new(),
        }));

        let (event_tx, event_rx) = async_channel::unbounded();
        let (write_tx, write_rx) = async_channel::unbounded::<WriteMessage>();

        let reader_state = state.clone();
        let reader_handle = tokio::spawn(async move {
            Self::reader_loop(reader, reader_state, event_tx).await;
        });

        let writer_handle = tokio::spawn(async move {
            Self::writer_loop(writer, write_rx).await;
        });

        Self {
            state,
            write_tx,
            event_rx,
            _reader_handle: reader_handle,
            _writer_handle: writer_handle,
        }
    }

    async fn reader_loop<R: tokio::io::AsyncRead + Unpin>(
        reader: R,
        state: Arc<Mutex<IpcState>>,
        event_tx: Sender<MpvEvent>,
    ) {
        debug!("mpv IPC reader loop started");
        let mut buf_reader = BufReader::new(reader);
        let mut line = String::new();

        loop {
            line.clear();
            match buf_reader.read_line(&mut line).await {
                Ok(0) => {
                    debug!("mpv IPC connection closed");
                    break;
                }
                Ok(_) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }

                    match MpvMessage::parse(trimmed) {
                        Ok(MpvMessage::Response(response)) => {
                            trace!(request_id = response.request_id, "received response");
                            let mut state = state.lock();
                            if let Some(tx) = state.pending.remove(&response.request_id) {
                                let _ = tx.send(Ok(response));
                            }
                        }
                        Ok(MpvMessage::Event(event)) => {
                            trace!(event = %event.event, "received event");
                            let _ = event_tx.send(event).await;
                        }
                        Err(e) => {
                            warn!("failed to parse mpv message: {e} - {trimmed}");
                        }
                    }
                }
                Err(e) => {
                    error!("mpv IPC read error: {e}");
                    break;
                }
            }
        }
    }

    async fn writer_loop<W: tokio::io::AsyncWrite + Unpin>(
        mut writer: W,
        write_rx: Receiver<WriteMessage>,
    ) {
        debug!("mpv IPC writer loop started");

        while let Ok(msg) = write_rx.recv().await {
            match msg {
                WriteMessage::Command(data) => {
                    if let Err(e) = writer.write_all(&data).await {
                        error!("mpv IPC write error: {e}");
                        break;
                    }
                    if let Err(e) = writer.write_all(b"\n").await {
                        error!("mpv IPC write error: {e}");
                        break;
                    }
                    if let Err(e) = writer.flush().await {
                        error!("mpv IPC flush error: {e}");
                        break;
                    }
                }
                WriteMessage::Close => {
                    debug!("mpv IPC writer closing");
                    break;
                }
            }
        }
    }

    /// Send a command to mpv and wait for its response.
    pub async fn send_command(&self, cmd: MpvCommand) -> Result<MpvResponse, IpcError> {
        let request_id = cmd.request_id;

        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.state.lock();
            state.pending.insert(request_id, tx);
        }

        let json = serde_json::to_string(&cmd).map_err(|e| IpcError::WriteFailed(e.into()))?;
        trace!(%json, "sending mpv command");

        if self
            .write_tx
            .send(WriteMessage::Command(json.into_bytes()))
            .await
            .is_err()
        {
            // No response will ever arrive; drop the pending slot.
            self.state.lock().pending.remove(&request_id);
            return Err(IpcError::Disconnected);
        }

        match tokio::time::timeout(COMMAND_TIMEOUT, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => {
                error!("mpv IPC channel closed unexpectedly");
                Err(IpcError::Disconnected)
            }
            Err(_) => {
                warn!(request_id, "mpv command timed out");
                let mut state = self.state.lock();
                state.pending.remove(&request_id);
                Err(IpcError::Timeout)
            }
        }
    }

    /// Get the receiver for native mpv events.
    pub fn events(&self) -> Receiver<MpvEvent> {
        self.event_rx.clone()
    }

    /// Close the connection.
    pub fn close(&self) {
        let _ = self.write_tx.send_blocking(WriteMessage::Close);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn pipe_ipc() -> (MpvIpc, tokio::io::DuplexStream) {
        let (client, server) = tokio::io::duplex(1024);
        let (reader, writer) = tokio::io::split(client);
        (MpvIpc::setup(reader, writer), server)
    }

    #[tokio::test]
    async fn test_send_command_roundtrip() {
        let (ipc, server) = pipe_ipc();
        let (server_read, mut server_write) = tokio::io::split(server);

        tokio::spawn(async move {
            let mut reader = BufReader::new(server_read);
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            let cmd: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
            let id = cmd["request_id"].as_i64().unwrap();
            let reply = format!("{{\"error\":\"success\",\"request_id\":{id}}}\n");
            server_write.write_all(reply.as_bytes()).await.unwrap();
            server_write.flush().await.unwrap();
        });

        let response = ipc
            .send_command(MpvCommand::get_property("pause"))
            .await
            .unwrap();
        assert!(response.is_success());
        assert!(ipc.state.lock().pending.is_empty());
    }

    #[tokio::test]
    async fn test_event_fan_out() {
        let (ipc, server) = pipe_ipc();
        let (_server_read, mut server_write) = tokio::io::split(server);

        server_write
            .write_all(b"{\"event\":\"idle\"}\n")
            .await
            .unwrap();
        server_write.flush().await.unwrap();

        let event = ipc.events().recv().await.unwrap();
        assert_eq!(event.event, "idle");
    }

    #[tokio::test]
    async fn test_send_after_close_leaves_no_pending() {
        let (ipc, mut server) = pipe_ipc();
        ipc.close();

        // Drain until the writer task has exited and dropped its receiver.
        let mut scratch = [0u8; 64];
        loop {
            if ipc.write_tx.is_closed() {
                break;
            }
            tokio::select! {
                _ = server.read(&mut scratch) => {}
                _ = tokio::time::sleep(Duration::from_millis(10)) => {}
            }
        }

        let err = ipc
            .send_command(MpvCommand::get_property("pause"))
            .await
            .unwrap_err();
        assert!(matches!(err, IpcError::Disconnected));
        assert!(ipc.state.lock().pending.is_empty());
    }
}
