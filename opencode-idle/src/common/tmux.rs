//! tmux queries for the notification heading.

use crate::common::debug::debug_log;
use std::process::Command;

/// Heading used when tmux has nothing to offer
pub const DEFAULT_TITLE: &str = "OpenCode";

const WINDOW_FORMAT: &str = "#{window_index} #{window_name}";

/// Resolves the notification title from the active tmux window
#[derive(Debug, Clone)]
pub struct TitleResolver {
    program: String,
    fallback: String,
}

impl TitleResolver {
    pub fn new(fallback: impl Into<String>) -> Self {
        Self {
            program: "tmux".to_string(),
            fallback: fallback.into(),
        }
    }

    /// Use a different tmux binary
    #[cfg(test)]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    /// Window index and name of the current tmux window, e.g. `"2 api"`.
    ///
    /// Never fails: a missing tmux, a failed query, or an empty answer all
    /// yield the fallback label.
    pub fn resolve_title(&self) -> String {
        let output = Command::new(&self.program)
            .args(["display-message", "-p", WINDOW_FORMAT])
            .output();

        match output {
            Ok(o) if o.status.success() => {
                title_or_fallback(&String::from_utf8_lossy(&o.stdout), &self.fallback)
            }
            Ok(o) => {
                debug_log(&format!(
                    "TITLE: {} exited with {}, using fallback",
                    self.program, o.status
                ));
                self.fallback.clone()
            }
            Err(e) => {
                debug_log(&format!("TITLE: {} unavailable ({}), using fallback", self.program, e));
                self.fallback.clone()
            }
        }
    }
}

impl Default for TitleResolver {
    fn default() -> Self {
        Self::new(DEFAULT_TITLE)
    }
}

fn title_or_fallback(output: &str, fallback: &str) -> String {
    let title = output.trim();
    if title.is_empty() {
        fallback.to_string()
    } else {
        title.to_string()
    }
}
