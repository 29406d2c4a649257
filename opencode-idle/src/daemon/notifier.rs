//! Hands idle notifications to the external notifier executable.

use crate::common::config::BridgeConfig;
use crate::common::debug::debug_log;
use crate::common::tmux::TitleResolver;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Notifier missing or could not be started
    Skipped,
    /// Notifier started; its result is never observed
    Spawned,
}

/// Launches the notifier executable, if installed
#[derive(Debug, Clone)]
pub struct Dispatcher {
    notifier_path: PathBuf,
}

impl Dispatcher {
    pub fn new(notifier_path: impl Into<PathBuf>) -> Self {
        Self {
            notifier_path: notifier_path.into(),
        }
    }

    pub fn notifier_path(&self) -> &Path {
        &self.notifier_path
    }

    pub fn is_available(&self) -> bool {
        is_executable(&self.notifier_path)
    }

    /// Start the notifier with `--title` and `--message` and return at once.
    ///
    /// The child is reaped by a detached task and its exit status dropped.
    /// Must be called from within a tokio runtime.
    pub fn dispatch(&self, title: &str, message: &str) -> DispatchOutcome {
        if !self.is_available() {
            debug_log(&format!(
                "DISPATCH: {} not installed, skipping",
                self.notifier_path.display()
            ));
            return DispatchOutcome::Skipped;
        }

        let spawned = Command::new(&self.notifier_path)
            .arg("--title")
            .arg(title)
            .arg("--message")
            .arg(message)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        match spawned {
            Ok(mut child) => {
                debug_log(&format!("DISPATCH: notifier started for {:?}", title));
                tokio::spawn(async move {
                    let _ = child.wait().await;
                });
                DispatchOutcome::Spawned
            }
            Err(e) => {
                debug_log(&format!(
                    "DISPATCH: failed to start {}: {}",
                    self.notifier_path.display(),
                    e
                ));
                DispatchOutcome::Skipped
            }
        }
    }
}

/// Regular file with at least one execute bit set
fn is_executable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Resolve the heading and dispatch one idle notification.
///
/// The notifier check comes first so a missing notifier never costs a
/// tmux query.
pub async fn notify_idle(
    resolver: TitleResolver,
    dispatcher: Dispatcher,
    message: String,
) -> DispatchOutcome {
    if !dispatcher.is_available() {
        debug_log(&format!(
            "DISPATCH: {} not installed, skipping",
            dispatcher.notifier_path().display()
        ));
        return DispatchOutcome::Skipped;
    }

    let fallback = resolver.fallback().to_string();
    // tmux is queried with a blocking std::process call
    let title = tokio::task::spawn_blocking(move || resolver.resolve_title())
        .await
        .unwrap_or(fallback);

    dispatcher.dispatch(&title, &message)
}

/// Fire-and-forget: schedule an idle notification and return immediately.
///
/// Once scheduled it cannot be withdrawn. The handle only tells when the
/// notifier has been started, never how it ended.
pub fn schedule_idle_notification(
    config: &BridgeConfig,
    session_id: &str,
) -> JoinHandle<DispatchOutcome> {
    debug_log(&format!("NOTIFY: session {} went idle", session_id));
    let resolver = config.title_resolver();
    let dispatcher = config.dispatcher();
    let message = config.message.clone();
    tokio::spawn(notify_idle(resolver, dispatcher, message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Notifier stub that records its argv, one per line
    fn install_recording_notifier(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("opencode-notify");
        let script = "#!/bin/sh\n\
                      out=\"$(dirname \"$0\")\"\n\
                      printf '%s\\n' \"$@\" > \"$out/args.tmp\" && mv \"$out/args.tmp\" \"$out/args.txt\"\n";
        fs::write(&path, script).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    async fn wait_for_file(path: &Path) -> Option<String> {
        for _ in 0..100 {
            if let Ok(content) = fs::read_to_string(path) {
                return Some(content);
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        None
    }

    #[tokio::test]
    async fn test_missing_notifier_is_skipped() {
        let dir = TempDir::new().unwrap();
        let dispatcher = Dispatcher::new(dir.path().join("does-not-exist"));
        assert!(!dispatcher.is_available());
        assert_eq!(dispatcher.dispatch("t", " "), DispatchOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_non_executable_notifier_is_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("opencode-notify");
        fs::write(&path, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
        assert_eq!(Dispatcher::new(path).dispatch("t", " "), DispatchOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_directory_is_not_a_notifier() {
        let dir = TempDir::new().unwrap();
        assert!(!Dispatcher::new(dir.path()).is_available());
    }

    #[tokio::test]
    async fn test_dispatch_passes_title_and_message() {
        let dir = TempDir::new().unwrap();
        let dispatcher = Dispatcher::new(install_recording_notifier(&dir));

        // ETXTBSY is possible while a concurrent fork still holds the script's write fd
        let mut outcome = DispatchOutcome::Skipped;
        for _ in 0..5 {
            outcome = dispatcher.dispatch("3 api", " ");
            if outcome == DispatchOutcome::Spawned {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(outcome, DispatchOutcome::Spawned);

        let args = wait_for_file(&dir.path().join("args.txt")).await;
        assert_eq!(args.as_deref(), Some("--title\n3 api\n--message\n \n"));
    }

    #[tokio::test]
    async fn test_notify_idle_without_notifier_is_skipped() {
        let dir = TempDir::new().unwrap();
        let outcome = notify_idle(
            TitleResolver::default(),
            Dispatcher::new(dir.path().join("missing")),
            " ".to_string(),
        )
        .await;
        assert_eq!(outcome, DispatchOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_notify_idle_uses_fallback_title_without_tmux() {
        let dir = TempDir::new().unwrap();
        let dispatcher = Dispatcher::new(install_recording_notifier(&dir));
        let resolver = TitleResolver::new("OpenCode").with_program("opencode-idle-no-such-tmux");

        let mut outcome = DispatchOutcome::Skipped;
        for _ in 0..5 {
            outcome = notify_idle(resolver.clone(), dispatcher.clone(), " ".to_string()).await;
            if outcome == DispatchOutcome::Spawned {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(outcome, DispatchOutcome::Spawned);

        let args = wait_for_file(&dir.path().join("args.txt")).await;
        assert_eq!(args.as_deref(), Some("--title\nOpenCode\n--message\n \n"));
    }
}
