//! Inter-process messages between the host, the CLI and the daemon.

pub mod messages;
