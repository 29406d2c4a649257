//! OS notification seam: permission state, delivery, sound.

use std::process::{Command, Stdio};
use tokio::sync::{mpsc, Mutex};

pub const DEFAULT_TITLE: &str = "OpenCode";
pub const DEFAULT_MESSAGE: &str = "Notification";
pub const DEFAULT_SOUND: &str = "Glass";

/// Notification authorization as reported by the OS, queried fresh each run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    /// The user has not been asked yet
    Undetermined,
    Authorized,
    /// Delivery allowed without an explicit grant
    Provisional,
    Denied,
}

impl PermissionState {
    pub fn allows_delivery(self) -> bool {
        matches!(self, PermissionState::Authorized | PermissionState::Provisional)
    }
}

/// One notification to show. Built once per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRequest {
    pub title: String,
    pub message: String,
    pub sound: String,
}

impl Default for NotificationRequest {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            message: DEFAULT_MESSAGE.to_string(),
            sound: DEFAULT_SOUND.to_string(),
        }
    }
}

/// User-visible activity on a submitted notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interaction {
    /// Taken over by a server that reports no clicks
    Presented,
    Clicked,
    Dismissed,
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("notification server rejected the request: {0}")]
    Rejected(String),
    #[error("notification worker failed: {0}")]
    Worker(String),
}

/// Operations the helper needs from the platform notification service.
///
/// `authorization_status` and `request_authorization` are the suspension
/// points before the delivery path is chosen.
#[allow(async_fn_in_trait)]
pub trait NotificationCenter {
    async fn authorization_status(&self) -> PermissionState;

    /// Ask the user for permission; `true` when granted
    async fn request_authorization(&self) -> bool;

    async fn submit(&self, request: &NotificationRequest) -> Result<(), DeliveryError>;

    /// Next interaction with the submitted notification. Pending forever
    /// when the platform reports none.
    async fn next_interaction(&self) -> Option<Interaction>;

    /// Start playing a named system sound without waiting for it
    fn play_sound(&self, name: &str);
}

/// Desktop notification service backed by notify-rust
pub struct DesktopCenter {
    app_name: String,
    interactions_tx: mpsc::UnboundedSender<Interaction>,
    interactions_rx: Mutex<mpsc::UnboundedReceiver<Interaction>>,
}

impl DesktopCenter {
    pub fn new(app_name: impl Into<String>) -> Self {
        let (interactions_tx, interactions_rx) = mpsc::unbounded_channel();
        Self {
            app_name: app_name.into(),
            interactions_tx,
            interactions_rx: Mutex::new(interactions_rx),
        }
    }
}

impl NotificationCenter for DesktopCenter {
    async fn authorization_status(&self) -> PermissionState {
        tokio::task::spawn_blocking(platform::authorization_status)
            .await
            .unwrap_or(PermissionState::Denied)
    }

    async fn request_authorization(&self) -> bool {
        tokio::task::spawn_blocking(platform::request_authorization)
            .await
            .unwrap_or(false)
    }

    async fn submit(&self, request: &NotificationRequest) -> Result<(), DeliveryError> {
        let app_name = self.app_name.clone();
        let request = request.clone();
        let interactions = self.interactions_tx.clone();
        tokio::task::spawn_blocking(move || platform::show(&app_name, &request, interactions))
            .await
            .map_err(|e| DeliveryError::Worker(e.to_string()))?
    }

    async fn next_interaction(&self) -> Option<Interaction> {
        self.interactions_rx.lock().await.recv().await
    }

    fn play_sound(&self, name: &str) {
        let _ = sound_command(name)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
    }
}

#[cfg(target_os = "macos")]
fn sound_command(name: &str) -> Command {
    let mut command = Command::new("afplay");
    command.arg(format!("/System/Library/Sounds/{}.aiff", name));
    command
}

#[cfg(not(target_os = "macos"))]
fn sound_command(name: &str) -> Command {
    let mut command = Command::new("canberra-gtk-play");
    command.args(["-i", name]);
    command
}

/// freedesktop notification servers have no consent prompt. A server that
/// answers is authorized; one that cannot report clicks only provisionally.
#[cfg(all(unix, not(target_os = "macos")))]
mod platform {
    use super::{DeliveryError, Interaction, NotificationRequest, PermissionState};
    use notify_rust::{Notification, Urgency};
    use tokio::sync::mpsc::UnboundedSender;

    const ACTIONS_CAPABILITY: &str = "actions";

    pub fn permission_from_capabilities(capabilities: Option<&[String]>) -> PermissionState {
        match capabilities {
            Some(caps) if caps.iter().any(|c| c == ACTIONS_CAPABILITY) => {
                PermissionState::Authorized
            }
            Some(_) => PermissionState::Provisional,
            // No server on the bus yet
            None => PermissionState::Undetermined,
        }
    }

    pub fn authorization_status() -> PermissionState {
        permission_from_capabilities(notify_rust::get_capabilities().ok().as_deref())
    }

    /// Asking for server information lets the bus activate a notification
    /// daemon on demand
    pub fn request_authorization() -> bool {
        notify_rust::get_server_information().is_ok()
    }

    pub fn show(
        app_name: &str,
        request: &NotificationRequest,
        interactions: UnboundedSender<Interaction>,
    ) -> Result<(), DeliveryError> {
        let handle = Notification::new()
            .appname(app_name)
            .summary(&request.title)
            .body(&request.message)
            .urgency(Urgency::Critical)
            .action("default", "Open")
            .show()
            .map_err(|e| DeliveryError::Rejected(e.to_string()))?;

        let reports_clicks = authorization_status() == PermissionState::Authorized;
        if !reports_clicks {
            let _ = interactions.send(Interaction::Presented);
            return Ok(());
        }

        // Blocks until the notification is clicked or closed
        std::thread::spawn(move || {
            handle.wait_for_action(|action| {
                let interaction = match action {
                    "__closed" => Interaction::Dismissed,
                    _ => Interaction::Clicked,
                };
                let _ = interactions.send(interaction);
            });
        });
        Ok(())
    }
}

/// Platforms where notify-rust cannot report authorization: delivery is
/// attempted and failures surface as delivery errors.
#[cfg(not(all(unix, not(target_os = "macos"))))]
mod platform {
    use super::{DeliveryError, Interaction, NotificationRequest, PermissionState};
    use notify_rust::Notification;
    use tokio::sync::mpsc::UnboundedSender;

    pub fn authorization_status() -> PermissionState {
        PermissionState::Provisional
    }

    pub fn request_authorization() -> bool {
        true
    }

    pub fn show(
        app_name: &str,
        request: &NotificationRequest,
        _interactions: UnboundedSender<Interaction>,
    ) -> Result<(), DeliveryError> {
        Notification::new()
            .appname(app_name)
            .summary(&request.title)
            .body(&request.message)
            .show()
            .map(|_| ())
            .map_err(|e| DeliveryError::Rejected(e.to_string()))
    }
}
