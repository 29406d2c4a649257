//! Client side of the daemon socket, used by the CLI subcommands.

use crate::ipc::messages::{DaemonCommand, DaemonResponse};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;

/// Client for communicating with the daemon
pub struct DaemonClient {
    stream: UnixStream,
}

impl DaemonClient {
    /// Connect to the daemon, or `None` when it is not running
    pub fn connect(socket_path: &Path) -> Option<Self> {
        if !socket_path.exists() {
            return None;
        }
        let stream = UnixStream::connect(socket_path).ok()?;
        let _ = stream.set_read_timeout(Some(Duration::from_millis(2000)));
        let _ = stream.set_write_timeout(Some(Duration::from_millis(1000)));
        Some(Self { stream })
    }

    /// Send a command and receive a response
    pub fn send_command(&mut self, command: &DaemonCommand) -> Option<DaemonResponse> {
        let json = serde_json::to_string(command).ok()?;
        writeln!(self.stream, "{}", json).ok()?;
        self.stream.flush().ok()?;

        let mut reader = BufReader::new(self.stream.try_clone().ok()?);
        let mut line = String::new();
        reader.read_line(&mut line).ok()?;

        serde_json::from_str(&line).ok()
    }
}

/// Check if the daemon answers on its socket
pub fn is_daemon_running(socket_path: &Path) -> bool {
    DaemonClient::connect(socket_path)
        .and_then(|mut client| client.send_command(&DaemonCommand::Ping))
        .is_some_and(|response| response == DaemonResponse::Pong)
}
