//! Bridge configuration, built once from CLI flags and passed down.

use crate::common::tmux::{TitleResolver, DEFAULT_TITLE};
use crate::daemon::notifier::Dispatcher;
use std::path::PathBuf;

/// Body passed to the notifier. The helper needs a value, the user does not.
pub const PLACEHOLDER_MESSAGE: &str = " ";

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Notifier executable; dispatch is skipped when it is missing
    pub notifier_path: PathBuf,
    /// Title used when tmux cannot provide one
    pub fallback_title: String,
    /// Notification body
    pub message: String,
}

impl BridgeConfig {
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.notifier_path.clone())
    }

    pub fn title_resolver(&self) -> TitleResolver {
        TitleResolver::new(self.fallback_title.clone())
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            notifier_path: default_notifier_path(),
            fallback_title: DEFAULT_TITLE.to_string(),
            message: PLACEHOLDER_MESSAGE.to_string(),
        }
    }
}

/// `~/.local/bin/opencode-notify`
pub fn default_notifier_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_default()
        .join(".local")
        .join("bin")
        .join("opencode-notify")
}
