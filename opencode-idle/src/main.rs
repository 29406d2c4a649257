use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::future::Future;
use std::io::Read;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

mod client;
mod common;
mod daemon;
mod ipc;

use client::{is_daemon_running, DaemonClient};
use common::config::{default_notifier_path, BridgeConfig, PLACEHOLDER_MESSAGE};
use common::debug::{debug_log, init_debug};
use common::tmux::DEFAULT_TITLE;
use daemon::hooks::handle_host_line;
use daemon::notifier::schedule_idle_notification;
use daemon::server::DaemonServer;
use daemon::state::SessionTracker;
use ipc::messages::{get_socket_path, DaemonCommand, DaemonResponse};

#[derive(Parser, Debug)]
#[command(name = "opencode-idle")]
#[command(about = "Desktop notifications when an OpenCode session goes idle")]
struct Args {
    /// Notifier executable run on every idle transition
    #[arg(long, global = true, env = "OPENCODE_NOTIFY_PATH")]
    notifier: Option<PathBuf>,

    /// Notification title when tmux cannot provide one
    #[arg(long, global = true, default_value = DEFAULT_TITLE)]
    fallback_title: String,

    /// Append debug lines to the debug log in the cache directory
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Run the daemon (default)
    Serve,
    /// Read host events from stdin, one JSON object per line, without a daemon
    Watch,
    /// Forward one host event to the daemon (argument, or stdin when omitted)
    Event {
        /// Event JSON
        json: Option<String>,
    },
    /// Show daemon status
    Status,
    /// List tracked sessions and their last status
    Sessions,
    /// Stop the daemon
    Stop,
}

impl Args {
    fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            notifier_path: self.notifier.clone().unwrap_or_else(default_notifier_path),
            fallback_title: self.fallback_title.clone(),
            message: PLACEHOLDER_MESSAGE.to_string(),
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_debug(args.debug);

    let config = args.bridge_config();
    let socket_path = get_socket_path();

    match args.command.unwrap_or(Cmd::Serve) {
        Cmd::Serve => {
            if is_daemon_running(&socket_path) {
                eprintln!("Daemon already running on {:?}", socket_path);
                return Ok(());
            }
            let runtime = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
            runtime.block_on(DaemonServer::new(config).run())
        }
        Cmd::Watch => {
            let runtime = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
            let result = runtime.block_on(async {
                let stdin = BufReader::new(tokio::io::stdin());
                watch_lines(stdin, config, tokio::signal::ctrl_c()).await
            });
            // The blocking stdin read cannot be cancelled; don't wait for it
            runtime.shutdown_background();
            result.map(|notified| debug_log(&format!("WATCH: done, {} notifications", notified)))
        }
        Cmd::Event { json } => forward_event(json, &socket_path),
        Cmd::Status => {
            print_status(&socket_path);
            Ok(())
        }
        Cmd::Sessions => {
            print_sessions(&socket_path);
            Ok(())
        }
        Cmd::Stop => {
            stop_daemon(&socket_path);
            Ok(())
        }
    }
}

/// In-process tracking of a piped host event stream.
///
/// Runs until the stream ends or `interrupt` completes. Returns the number
/// of idle notifications scheduled.
async fn watch_lines<R, F>(reader: R, config: BridgeConfig, interrupt: F) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
    F: Future,
{
    let mut tracker = SessionTracker::new();
    let mut lines = reader.lines();
    let mut pending = Vec::new();
    let mut notified = 0;
    tokio::pin!(interrupt);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read host events")? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                if let Some(session_id) = handle_host_line(&mut tracker, &line) {
                    pending.retain(|task: &tokio::task::JoinHandle<_>| !task.is_finished());
                    pending.push(schedule_idle_notification(&config, &session_id));
                    notified += 1;
                }
            }
            _ = &mut interrupt => break,
        }
    }

    if tracker.is_empty() {
        debug_log("WATCH: stream ended before any session event");
    }

    // Let scheduled dispatches start their notifier before the runtime goes away
    for task in pending {
        let _ = task.await;
    }
    Ok(notified)
}

fn forward_event(json: Option<String>, socket_path: &Path) -> Result<()> {
    let raw = match json {
        Some(raw) => raw,
        None => {
            let mut raw = String::new();
            std::io::stdin()
                .read_to_string(&mut raw)
                .context("Failed to read event from stdin")?;
            raw
        }
    };

    let event: serde_json::Value = match serde_json::from_str(raw.trim()) {
        Ok(event) => event,
        Err(e) => {
            debug_log(&format!("EVENT: dropping unparseable event: {}", e));
            return Ok(());
        }
    };

    let Some(mut client) = DaemonClient::connect(socket_path) else {
        debug_log("EVENT: daemon not running, dropping event");
        return Ok(());
    };

    match client.send_command(&DaemonCommand::Event(event)) {
        Some(response) => debug_log(&format!("EVENT: daemon replied {:?}", response)),
        None => debug_log("EVENT: no reply from daemon"),
    }
    Ok(())
}

fn print_status(socket_path: &Path) {
    let response = DaemonClient::connect(socket_path)
        .and_then(|mut client| client.send_command(&DaemonCommand::Status));

    match response {
        Some(DaemonResponse::Status {
            session_count,
            uptime_secs,
            ..
        }) => {
            println!("Daemon running on {:?}", socket_path);
            println!("  sessions tracked: {}", session_count);
            println!("  uptime: {}s", uptime_secs);
        }
        _ => println!("Daemon not running"),
    }
}

fn print_sessions(socket_path: &Path) {
    let response = DaemonClient::connect(socket_path)
        .and_then(|mut client| client.send_command(&DaemonCommand::GetState));

    match response {
        Some(DaemonResponse::State { sessions }) if sessions.is_empty() => {
            println!("No sessions tracked");
        }
        Some(DaemonResponse::State { sessions }) => {
            for record in sessions {
                println!("{}\t{}", record.session_id, record.last_status);
            }
        }
        _ => println!("Daemon not running"),
    }
}

fn stop_daemon(socket_path: &Path) {
    let response = DaemonClient::connect(socket_path)
        .and_then(|mut client| client.send_command(&DaemonCommand::Shutdown));

    match response {
        Some(DaemonResponse::Ok) => println!("Daemon stopped"),
        _ => println!("Daemon not running"),
    }
}
