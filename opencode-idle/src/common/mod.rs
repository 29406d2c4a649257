//! Shared helpers for the daemon and the CLI subcommands.

pub mod config;
pub mod debug;
pub mod tmux;
