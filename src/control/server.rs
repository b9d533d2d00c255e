//! Host side of the control channel.
//!
//! ```text
//!                        ┌──────────────────────────────┐
//!  controller ──socket──>│ connection task (per client) │──spawn──> command task ──> engine
//!                        │   read loop ─> dispatch      │                 │
//!                        │   writer queue <─────────────┼──reply──────────┘
//!                        │   status broadcast <─────────┼── poller
//!                        └──────────────────────────────┘
//! ```
//!
//! Each connection has its own receive buffer and a single writer queue, so
//! the lines it is sent never interleave. Commands run on their own task so
//! a long end-meeting run does not block `getStatus` or further commands.

use std::os::unix::net::UnixListener as StdUnixListener;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::io::BufReader;
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, watch, Notify};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::error::{ControlError, ControlResult};
use super::framing::{read_line, write_line};
use super::protocol::{
    decode_request, encode_status, unknown_command_reply, CommandVerb, Inbound, StatusSnapshot,
};
use crate::automation::AutomationEngine;
use crate::telemetry::{self, AuditEvent};

/// Default socket path.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/rapidscontrol.sock";

/// Depth of each connection's writer queue.
const REPLY_QUEUE_DEPTH: usize = 64;

/// State shared by every connection.
struct Shared {
    engine: Arc<AutomationEngine>,
    status_tx: broadcast::Sender<StatusSnapshot>,
    resample: Arc<Notify>,
}

/// Accepts controller connections and dispatches their commands.
///
/// The socket file is removed when the server is stopped or dropped.
pub struct CommandServer {
    socket_path: PathBuf,
    shutdown_tx: watch::Sender<bool>,
    accept_task: Option<JoinHandle<()>>,
}

impl CommandServer {
    /// Bind `socket_path` and start accepting connections.
    ///
    /// A stale socket file from an unclean previous run is removed first.
    /// Status changes published on `status_tx` are forwarded to every
    /// connection; `resample` is notified after each command completes.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<P: AsRef<Path>>(
        socket_path: P,
        engine: Arc<AutomationEngine>,
        status_tx: broadcast::Sender<StatusSnapshot>,
        resample: Arc<Notify>,
    ) -> ControlResult<Self> {
        let socket_path = socket_path.as_ref().to_path_buf();
        let bind_err = |source| ControlError::Bind {
            path: socket_path.clone(),
            source,
        };

        if socket_path.exists() {
            debug!("Removing stale socket file {:?}", socket_path);
            std::fs::remove_file(&socket_path).map_err(bind_err)?;
        }

        let std_listener = StdUnixListener::bind(&socket_path).map_err(bind_err)?;
        std_listener.set_nonblocking(true).map_err(bind_err)?;
        let listener = UnixListener::from_std(std_listener).map_err(bind_err)?;
        info!("Command server listening on {:?}", socket_path);

        telemetry::record(AuditEvent::ServerStart {
            socket_path: socket_path.display().to_string(),
            pid: std::process::id(),
        });

        let shared = Arc::new(Shared {
            engine,
            status_tx,
            resample,
        });
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let accept_task = tokio::spawn(accept_loop(listener, shared, shutdown_rx));

        Ok(Self {
            socket_path,
            shutdown_tx,
            accept_task: Some(accept_task),
        })
    }

    /// Get the socket path.
    pub fn path(&self) -> &Path {
        &self.socket_path
    }

    /// Close every connection, stop accepting and remove the socket file.
    pub async fn stop(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.accept_task.take()
            && let Err(e) = task.await
        {
            error!("Accept loop ended abnormally: {}", e);
        }
        info!("Command server stopped");
        // Drop removes the socket file.
    }
}

impl Drop for CommandServer {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);

        if self.socket_path.exists()
            && let Err(e) = std::fs::remove_file(&self.socket_path)
        {
            warn!("Failed to remove socket file: {}", e);
        }

        telemetry::record(AuditEvent::ServerStop {
            socket_path: self.socket_path.display().to_string(),
        });
    }
}

async fn accept_loop(
    listener: UnixListener,
    shared: Arc<Shared>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, _addr)) => {
                    let id = Uuid::new_v4();
                    info!("Controller {} connected", id);
                    connections.spawn(handle_connection(
                        stream,
                        id,
                        shared.clone(),
                        shutdown_rx.clone(),
                    ));
                }
                Err(e) => warn!("Failed to accept connection: {}", e),
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            _ = shutdown_rx.changed() => {
                debug!("Accept loop received shutdown signal");
                break;
            }
        }
    }

    // Connection tasks observe the same shutdown signal.
    while connections.join_next().await.is_some() {}
}

async fn handle_connection(
    stream: UnixStream,
    id: Uuid,
    shared: Arc<Shared>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    telemetry::record(AuditEvent::ClientConnected { connection: id });

    let (read_half, write_half) = stream.into_split();
    let (reply_tx, reply_rx) = mpsc::channel::<String>(REPLY_QUEUE_DEPTH);
    let writer = tokio::spawn(async move {
        if let Err(e) = write_replies(write_half, reply_rx).await {
            debug!("Controller {} writer finished: {}", id, e);
        }
    });

    let mut status_rx = shared.status_tx.subscribe();
    let mut reader = BufReader::new(read_half);
    let mut buf = Vec::new();

    let reason = loop {
        tokio::select! {
            read = read_line(&mut reader, &mut buf) => match read {
                Ok(()) => {
                    let dispatched = dispatch(&shared, id, &buf, &reply_tx);
                    buf.clear();
                    if let Err(e) = dispatched {
                        break Some(e);
                    }
                }
                Err(e) => break Some(e),
            },
            status = status_rx.recv() => match status {
                Ok(snapshot) => {
                    if let Err(e) = enqueue(&reply_tx, encode_status(&snapshot)) {
                        break Some(e);
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    debug!("Controller {} missed {} status updates", id, missed);
                }
                Err(RecvError::Closed) => break None,
            },
            _ = shutdown_rx.changed() => break None,
        }
    };

    let reason = match reason {
        Some(ControlError::ConnectionClosed) => {
            // Let in-flight command replies drain; the writer ends with the
            // last sender.
            "closed by peer".to_string()
        }
        Some(e) => {
            warn!("Dropping controller {}: {}", id, e);
            writer.abort();
            e.to_string()
        }
        None => {
            writer.abort();
            "server shutdown".to_string()
        }
    };

    info!("Controller {} disconnected ({})", id, reason);
    telemetry::record(AuditEvent::ClientDisconnected {
        connection: id,
        reason,
    });
}

async fn write_replies(
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::Receiver<String>,
) -> ControlResult<()> {
    while let Some(line) = rx.recv().await {
        write_line(&mut writer, &line).await?;
    }
    Ok(())
}

/// Queue a line for the connection's writer without waiting.
///
/// The read loop must never block on a peer that does not read, or it would
/// stop observing shutdown.
fn enqueue(reply_tx: &mpsc::Sender<String>, line: String) -> ControlResult<()> {
    reply_tx.try_send(line).map_err(|e| match e {
        TrySendError::Full(_) => ControlError::QueueFull,
        TrySendError::Closed(_) => ControlError::ConnectionClosed,
    })
}

fn dispatch(
    shared: &Arc<Shared>,
    id: Uuid,
    line: &[u8],
    reply_tx: &mpsc::Sender<String>,
) -> ControlResult<()> {
    match decode_request(line) {
        Ok(Inbound::GetStatus) => {
            let snapshot = shared.engine.snapshot();
            debug!("Controller {} requested status: {}", id, snapshot);
            enqueue(reply_tx, encode_status(&snapshot))
        }
        Ok(Inbound::Command(verb)) => {
            info!("Controller {} sent {}", id, verb);
            telemetry::record(AuditEvent::CommandReceived {
                connection: id,
                verb,
            });
            tokio::spawn(run_command(shared.clone(), id, verb, reply_tx.clone()));
            Ok(())
        }
        Ok(Inbound::UnknownCommand(value)) => {
            warn!("Controller {} sent unknown command '{}'", id, value);
            telemetry::record(AuditEvent::UnknownCommand {
                connection: id,
                value: value.clone(),
            });
            enqueue(reply_tx, unknown_command_reply(&value))
        }
        Err(e) => {
            warn!("Discarding line from controller {}: {}", id, e);
            Ok(())
        }
    }
}

async fn run_command(
    shared: Arc<Shared>,
    id: Uuid,
    verb: CommandVerb,
    reply_tx: mpsc::Sender<String>,
) {
    let started = Instant::now();
    match shared.engine.execute(verb).await {
        Ok(outcome) => {
            telemetry::record(AuditEvent::CommandCompleted {
                connection: id,
                verb,
                outcome,
                duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            });
        }
        Err(e) => {
            warn!("Command {} from controller {} failed: {}", verb, id, e);
            telemetry::record(AuditEvent::CommandFailed {
                connection: id,
                verb,
                error: e.to_string(),
            });
        }
    }

    shared.resample.notify_one();
    if let Err(e) = enqueue(&reply_tx, encode_status(&shared.engine.snapshot())) {
        debug!("Reply to controller {} dropped: {}", id, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::{AutomationSettings, ControlLabels, SimulatedProvider};
    use crate::control::protocol::{decode_server_line, AudioStatus, ServerLine};
    use std::time::Duration;
    use tempfile::tempdir;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, Lines};
    use tokio::net::unix::OwnedReadHalf;

    struct Harness {
        server: CommandServer,
        sim: Arc<SimulatedProvider>,
        _dir: tempfile::TempDir,
    }

    fn start_server() -> Harness {
        let dir = tempdir().unwrap();
        let sim = Arc::new(SimulatedProvider::meeting(
            &ControlLabels::default(),
            "Zoom Meeting",
        ));
        let engine = Arc::new(AutomationEngine::new(
            sim.clone(),
            AutomationSettings::default(),
        ));
        let (status_tx, _) = broadcast::channel(16);
        let server = CommandServer::start(
            dir.path().join("test.sock"),
            engine,
            status_tx,
            Arc::new(Notify::new()),
        )
        .unwrap();
        Harness {
            server,
            sim,
            _dir: dir,
        }
    }

    async fn connect(path: &Path) -> (Lines<BufReader<OwnedReadHalf>>, OwnedWriteHalf) {
        let stream = UnixStream::connect(path).await.unwrap();
        let (r, w) = stream.into_split();
        (BufReader::new(r).lines(), w)
    }

    async fn next_line(lines: &mut Lines<BufReader<OwnedReadHalf>>) -> String {
        tokio::time::timeout(Duration::from_secs(5), lines.next_line())
            .await
            .unwrap()
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_get_status() {
        let h = start_server();
        let (mut lines, mut w) = connect(h.server.path()).await;

        w.write_all(b"{\"type\":\"getStatus\"}\n").await.unwrap();
        assert_eq!(
            next_line(&mut lines).await,
            r#"{"type":"status","audioStatus":"unmuted","videoStatus":"on","meetingActive":true}"#
        );
    }

    #[tokio::test]
    async fn test_command_replies_with_fresh_status() {
        let h = start_server();
        let (mut lines, mut w) = connect(h.server.path()).await;

        w.write_all(b"{\"type\":\"command\",\"command\":\"mute\"}\n")
            .await
            .unwrap();
        let ServerLine::Status(status) = decode_server_line(next_line(&mut lines).await.as_bytes())
            .unwrap()
        else {
            unreachable!("Expected status");
        };
        assert_eq!(status.audio_status, AudioStatus::Muted);
        assert_eq!(h.sim.action_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_command_reply() {
        let h = start_server();
        let (mut lines, mut w) = connect(h.server.path()).await;

        w.write_all(b"{\"type\":\"command\",\"command\":\"dance\"}\n")
            .await
            .unwrap();
        assert_eq!(next_line(&mut lines).await, "unknown command: dance");
        assert_eq!(h.sim.action_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_lines_keep_connection_open() {
        let h = start_server();
        let (mut lines, mut w) = connect(h.server.path()).await;

        w.write_all(b"garbage\n{\"type\":\"reboot\"}\n{\"type\":\"command\"}\n")
            .await
            .unwrap();
        w.write_all(b"{\"type\":\"getStatus\"}\n").await.unwrap();

        let line = next_line(&mut lines).await;
        assert!(line.starts_with("{\"type\":\"status\""));
    }

    #[tokio::test]
    async fn test_partial_line_is_buffered() {
        let h = start_server();
        let (mut lines, mut w) = connect(h.server.path()).await;

        w.write_all(b"{\"type\":\"get").await.unwrap();
        w.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        w.write_all(b"Status\"}\r\n").await.unwrap();

        let line = next_line(&mut lines).await;
        assert!(line.starts_with("{\"type\":\"status\""));
    }

    #[tokio::test]
    async fn test_long_line_drops_connection() {
        let h = start_server();
        let (mut lines, mut w) = connect(h.server.path()).await;

        let long = vec![b'x'; crate::control::protocol::MAX_LINE_LEN + 1];
        // The server may close before the whole buffer is written.
        let _ = w.write_all(&long).await;

        let eof = tokio::time::timeout(Duration::from_secs(5), lines.next_line())
            .await
            .unwrap();
        assert!(matches!(eof, Ok(None) | Err(_)));
    }

    #[tokio::test]
    async fn test_stop_with_controller_that_never_reads() {
        let Harness { server, _dir, .. } = start_server();
        let (_lines, mut w) = connect(server.path()).await;

        let flood = tokio::spawn(async move {
            for _ in 0..20_000 {
                if w.write_all(b"{\"type\":\"getStatus\"}\n").await.is_err() {
                    break;
                }
            }
        });
        // Let the replies back up into the socket and the writer queue.
        tokio::time::sleep(Duration::from_millis(200)).await;

        let stopped = tokio::time::timeout(Duration::from_secs(5), server.stop()).await;
        assert!(stopped.is_ok(), "stop() must not wait on a stalled controller");
        flood.abort();
    }

    #[test]
    fn test_enqueue_reports_full_queue() {
        let (tx, rx) = mpsc::channel(1);
        enqueue(&tx, "a".to_string()).unwrap();
        assert!(matches!(
            enqueue(&tx, "b".to_string()),
            Err(ControlError::QueueFull)
        ));

        drop(rx);
        assert!(matches!(
            enqueue(&tx, "c".to_string()),
            Err(ControlError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_stale_socket_replaced_and_removed_on_stop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stale.sock");
        std::fs::write(&path, b"stale").unwrap();

        let sim = Arc::new(SimulatedProvider::new());
        let engine = Arc::new(AutomationEngine::new(sim, AutomationSettings::default()));
        let (status_tx, _) = broadcast::channel(16);
        let server =
            CommandServer::start(&path, engine, status_tx, Arc::new(Notify::new())).unwrap();

        assert!(UnixStream::connect(&path).await.is_ok());

        server.stop().await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_bind_failure() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("test.sock");

        let sim = Arc::new(SimulatedProvider::new());
        let engine = Arc::new(AutomationEngine::new(sim, AutomationSettings::default()));
        let (status_tx, _) = broadcast::channel(16);
        let result = CommandServer::start(&path, engine, status_tx, Arc::new(Notify::new()));

        assert!(matches!(result, Err(ControlError::Bind { .. })));
    }
}
