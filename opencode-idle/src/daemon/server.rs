//! Unix socket server for the daemon.

use crate::common::config::BridgeConfig;
use crate::common::debug::debug_log;
use crate::daemon::hooks::handle_host_event;
use crate::daemon::notifier::schedule_idle_notification;
use crate::daemon::state::SessionTracker;
use crate::ipc::messages::{get_pid_file_path, get_socket_path, DaemonCommand, DaemonResponse};
use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{Mutex, Notify};

/// Daemon server owning the session tracker for its lifetime
pub struct DaemonServer {
    tracker: Arc<Mutex<SessionTracker>>,
    config: Arc<BridgeConfig>,
    socket_path: PathBuf,
    pid_path: PathBuf,
    start_time: Instant,
    shutdown: Arc<Notify>,
}

/// Per-connection view of the shared daemon state
#[derive(Clone)]
struct Shared {
    tracker: Arc<Mutex<SessionTracker>>,
    config: Arc<BridgeConfig>,
    start_time: Instant,
    shutdown: Arc<Notify>,
}

impl DaemonServer {
    pub fn new(config: BridgeConfig) -> Self {
        Self::with_paths(config, get_socket_path(), get_pid_file_path())
    }

    pub fn with_paths(config: BridgeConfig, socket_path: PathBuf, pid_path: PathBuf) -> Self {
        Self {
            tracker: Arc::new(Mutex::new(SessionTracker::new())),
            config: Arc::new(config),
            socket_path,
            pid_path,
            start_time: Instant::now(),
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Run until a `Shutdown` command or Ctrl-C
    pub async fn run(&self) -> Result<()> {
        let socket_path = &self.socket_path;

        // Ensure socket directory exists
        if let Some(parent) = socket_path.parent() {
            fs::create_dir_all(parent).context("Failed to create socket directory")?;
        }

        // Remove stale socket file
        if socket_path.exists() {
            fs::remove_file(socket_path).context("Failed to remove existing socket")?;
        }

        fs::write(&self.pid_path, std::process::id().to_string())
            .context("Failed to write PID file")?;

        let cleanup_socket = self.socket_path.clone();
        let cleanup_pid = self.pid_path.clone();
        scopeguard::defer! {
            let _ = fs::remove_file(&cleanup_socket);
            let _ = fs::remove_file(&cleanup_pid);
        }

        let listener = UnixListener::bind(socket_path).context("Failed to bind to socket")?;
        eprintln!("Daemon listening on {:?}", socket_path);
        debug_log(&format!("DAEMON: listening on {}", socket_path.display()));

        let shared = Shared {
            tracker: self.tracker.clone(),
            config: self.config.clone(),
            start_time: self.start_time,
            shutdown: self.shutdown.clone(),
        };

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, _) = accepted.context("Failed to accept connection")?;
                    let shared = shared.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, shared).await {
                            debug_log(&format!("DAEMON: connection error: {}", e));
                        }
                    });
                }
                _ = self.shutdown.notified() => {
                    eprintln!("Shutdown requested, exiting...");
                    break;
                }
                _ = tokio::signal::ctrl_c() => {
                    eprintln!("Interrupted, exiting...");
                    break;
                }
            }
        }

        debug_log("DAEMON: stopped");
        Ok(())
    }
}

/// Handle a single client connection
async fn handle_connection(stream: UnixStream, shared: Shared) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    // Read commands line by line (newline-delimited JSON)
    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            break; // Connection closed
        }

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let command: DaemonCommand = match serde_json::from_str(line) {
            Ok(cmd) => cmd,
            Err(e) => {
                let response = DaemonResponse::Error {
                    message: format!("Invalid command: {}", e),
                };
                send_response(&mut writer, &response).await?;
                continue;
            }
        };

        let shutting_down = matches!(command, DaemonCommand::Shutdown);
        let response = handle_command(command, &shared).await;
        send_response(&mut writer, &response).await?;

        if shutting_down {
            shared.shutdown.notify_one();
            break;
        }
    }

    Ok(())
}

/// Handle a single command and return a response
async fn handle_command(command: DaemonCommand, shared: &Shared) -> DaemonResponse {
    match command {
        DaemonCommand::Event(event) => {
            // Decide under the lock, notify after releasing it
            let notify_for = {
                let mut tracker = shared.tracker.lock().await;
                handle_host_event(&mut tracker, event)
            };

            match notify_for {
                Some(session_id) => {
                    schedule_idle_notification(&shared.config, &session_id);
                    DaemonResponse::Notified { session_id }
                }
                None => DaemonResponse::Ok,
            }
        }

        DaemonCommand::GetState => {
            let tracker = shared.tracker.lock().await;
            DaemonResponse::State {
                sessions: tracker.snapshot(),
            }
        }

        DaemonCommand::Status => {
            let tracker = shared.tracker.lock().await;
            DaemonResponse::Status {
                running: true,
                session_count: tracker.len(),
                uptime_secs: shared.start_time.elapsed().as_secs(),
            }
        }

        DaemonCommand::Shutdown => DaemonResponse::Ok,

        DaemonCommand::Ping => DaemonResponse::Pong,
    }
}

/// Send a response to a client
async fn send_response(
    writer: &mut tokio::net::unix::OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<()> {
    let json = serde_json::to_string(response)?;
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::messages::{SessionRecord, SessionStatus};
    use serde_json::json;
    use std::time::Duration;
    use std::path::Path;
    use tempfile::TempDir;

    struct TestDaemon {
        dir: TempDir,
        handle: tokio::task::JoinHandle<Result<()>>,
    }

    impl TestDaemon {
        async fn start() -> Self {
            let dir = TempDir::new().unwrap();
            let config = BridgeConfig {
                notifier_path: dir.path().join("no-notifier"),
                ..BridgeConfig::default()
            };
            let server = DaemonServer::with_paths(
                config,
                dir.path().join("daemon.sock"),
                dir.path().join("daemon.pid"),
            );
            let handle = tokio::spawn(async move { server.run().await });

            let socket = dir.path().join("daemon.sock");
            for _ in 0..100 {
                if socket.exists() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            Self { dir, handle }
        }

        fn socket(&self) -> PathBuf {
            self.dir.path().join("daemon.sock")
        }
    }

    struct Conn {
        reader: BufReader<tokio::net::unix::OwnedReadHalf>,
        writer: tokio::net::unix::OwnedWriteHalf,
    }

    impl Conn {
        async fn open(path: &Path) -> Self {
            let stream = UnixStream::connect(path).await.unwrap();
            let (reader, writer) = stream.into_split();
            Self {
                reader: BufReader::new(reader),
                writer,
            }
        }

        async fn send_raw(&mut self, line: &str) -> DaemonResponse {
            self.writer.write_all(line.as_bytes()).await.unwrap();
            self.writer.write_all(b"\n").await.unwrap();
            let mut response = String::new();
            self.reader.read_line(&mut response).await.unwrap();
            serde_json::from_str(&response).unwrap()
        }

        async fn send(&mut self, command: &DaemonCommand) -> DaemonResponse {
            let line = serde_json::to_string(command).unwrap();
            self.send_raw(&line).await
        }
    }

    fn idle(id: &str) -> DaemonCommand {
        DaemonCommand::Event(json!({ "type": "session.idle", "properties": { "sessionID": id } }))
    }

    fn busy(id: &str) -> DaemonCommand {
        DaemonCommand::Event(json!({
            "type": "session.status",
            "properties": { "sessionID": id, "status": { "type": "busy" } }
        }))
    }

    #[tokio::test]
    async fn test_ping_and_shutdown_cleans_up() {
        let daemon = TestDaemon::start().await;
        assert!(daemon.dir.path().join("daemon.pid").exists());

        let mut conn = Conn::open(&daemon.socket()).await;
        assert_eq!(conn.send(&DaemonCommand::Ping).await, DaemonResponse::Pong);
        assert_eq!(conn.send(&DaemonCommand::Shutdown).await, DaemonResponse::Ok);

        let result = tokio::time::timeout(Duration::from_secs(5), daemon.handle).await;
        assert!(matches!(result, Ok(Ok(Ok(())))));
        assert!(!daemon.dir.path().join("daemon.sock").exists());
        assert!(!daemon.dir.path().join("daemon.pid").exists());
    }

    #[tokio::test]
    async fn test_idle_debounce_over_socket() {
        let daemon = TestDaemon::start().await;
        let mut conn = Conn::open(&daemon.socket()).await;

        assert_eq!(conn.send(&busy("S1")).await, DaemonResponse::Ok);
        assert_eq!(
            conn.send(&idle("S1")).await,
            DaemonResponse::Notified {
                session_id: "S1".to_string()
            }
        );
        assert_eq!(conn.send(&idle("S1")).await, DaemonResponse::Ok);
        assert_eq!(conn.send(&busy("S1")).await, DaemonResponse::Ok);
        assert!(matches!(conn.send(&idle("S1")).await, DaemonResponse::Notified { .. }));

        conn.send(&DaemonCommand::Shutdown).await;
    }

    #[tokio::test]
    async fn test_state_shared_across_connections() {
        let daemon = TestDaemon::start().await;

        let mut first = Conn::open(&daemon.socket()).await;
        assert!(matches!(first.send(&idle("a")).await, DaemonResponse::Notified { .. }));
        drop(first);

        let mut second = Conn::open(&daemon.socket()).await;
        assert_eq!(second.send(&idle("a")).await, DaemonResponse::Ok);
        second.send(&busy("b")).await;

        assert_eq!(
            second.send(&DaemonCommand::GetState).await,
            DaemonResponse::State {
                sessions: vec![
                    SessionRecord {
                        session_id: "a".to_string(),
                        last_status: SessionStatus::Idle,
                    },
                    SessionRecord {
                        session_id: "b".to_string(),
                        last_status: SessionStatus::Active("busy".to_string()),
                    },
                ]
            }
        );
        match second.send(&DaemonCommand::Status).await {
            DaemonResponse::Status {
                running,
                session_count,
                ..
            } => {
                assert!(running);
                assert_eq!(session_count, 2);
            }
            other => panic!("unexpected: {:?}", other),
        }

        second.send(&DaemonCommand::Shutdown).await;
    }

    #[tokio::test]
    async fn test_bad_lines_keep_connection_open() {
        let daemon = TestDaemon::start().await;
        let mut conn = Conn::open(&daemon.socket()).await;

        assert!(matches!(
            conn.send_raw("not json").await,
            DaemonResponse::Error { .. }
        ));
        let malformed = DaemonCommand::Event(json!({ "type": "session.status", "properties": {} }));
        assert_eq!(conn.send(&malformed).await, DaemonResponse::Ok);
        assert_eq!(conn.send(&DaemonCommand::Ping).await, DaemonResponse::Pong);

        conn.send(&DaemonCommand::Shutdown).await;
    }
}
