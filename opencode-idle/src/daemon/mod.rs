//! Background daemon tracking session status and dispatching idle notifications.

pub mod hooks;
pub mod notifier;
pub mod server;
pub mod state;
