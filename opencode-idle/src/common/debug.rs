//! Debug logging utilities.

use crate::ipc::messages::get_runtime_dir;
use chrono::Utc;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::OnceLock;

static DEBUG_ENABLED: OnceLock<bool> = OnceLock::new();

/// Initialize debug logging for this process.
///
/// Only the first call takes effect. The log file is appended to, since
/// short-lived `event` invocations share it with a running daemon.
pub fn init_debug(enabled: bool) {
    let _ = DEBUG_ENABLED.set(enabled);
    if enabled {
        if let Some(parent) = debug_log_path().parent() {
            let _ = fs::create_dir_all(parent);
        }
    }
}

/// Get the path to the debug log file
pub fn debug_log_path() -> PathBuf {
    get_runtime_dir().join("debug.log")
}

pub fn is_debug_enabled() -> bool {
    *DEBUG_ENABLED.get().unwrap_or(&false)
}

/// Write a debug log message
pub fn debug_log(msg: &str) {
    if !is_debug_enabled() {
        return;
    }
    if let Ok(mut file) = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(debug_log_path())
    {
        let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3f");
        let _ = writeln!(file, "[{}] [{}] {}", timestamp, std::process::id(), msg);
    }
}
