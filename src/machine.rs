//! Permission and delivery state machine for a single helper run.
//!
//! ```text
//! Start -> QuerySettings -> Send -> Linger -> Terminate
//!               |                ^
//!               +-> RequestAuthorization (undetermined)
//!               |        +-> Terminate (refused)
//!               +-> Terminate (denied)
//! ```
//!
//! [`transition`] is pure; [`run`] performs the effect of each state and
//! feeds the result back in.

use crate::center::{Interaction, NotificationCenter, NotificationRequest, PermissionState};
use colored::*;
use std::time::Duration;

/// How long to stay alive after submitting, so the OS can present it
pub const LINGER: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Submitted and the linger delay ran out
    Delivered,
    /// Submitted and the user interacted before the linger ended
    Interacted,
    /// The OS refused the notification; the sound was still played
    DeliveryFailed,
    /// Notifications are disabled for this helper
    Denied,
    /// The user declined the permission prompt
    Refused,
}

impl Outcome {
    pub fn exit_code(self) -> i32 {
        match self {
            // A delivery error still ends the run normally, after the sound
            Outcome::Delivered | Outcome::Interacted | Outcome::DeliveryFailed => 0,
            Outcome::Denied | Outcome::Refused => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Start,
    QuerySettings,
    RequestAuthorization,
    Send,
    Linger { delivered: bool },
    Terminate(Outcome),
}

/// Result of the effect performed in the current state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    Launched,
    Settings(PermissionState),
    AuthorizationAnswered { granted: bool },
    Submitted { delivered: bool },
    LingerElapsed,
    Interaction(Interaction),
}

pub fn transition(state: State, input: Input) -> State {
    match (state, input) {
        (State::Start, Input::Launched) => State::QuerySettings,

        (State::QuerySettings, Input::Settings(permission)) => match permission {
            p if p.allows_delivery() => State::Send,
            PermissionState::Undetermined => State::RequestAuthorization,
            _ => State::Terminate(Outcome::Denied),
        },

        (State::RequestAuthorization, Input::AuthorizationAnswered { granted: true }) => State::Send,
        (State::RequestAuthorization, Input::AuthorizationAnswered { granted: false }) => {
            State::Terminate(Outcome::Refused)
        }

        (State::Send, Input::Submitted { delivered }) => State::Linger { delivered },

        (State::Linger { delivered: false }, Input::LingerElapsed | Input::Interaction(_)) => {
            State::Terminate(Outcome::DeliveryFailed)
        }
        (State::Linger { delivered: true }, Input::LingerElapsed) => {
            State::Terminate(Outcome::Delivered)
        }
        (State::Linger { delivered: true }, Input::Interaction(_)) => {
            State::Terminate(Outcome::Interacted)
        }

        // Inputs that do not belong to the current state are ignored
        (state, _) => state,
    }
}

/// Drive one helper run to completion.
///
/// Always terminates: the only open-ended wait is the linger, which is
/// bounded by `linger`.
pub async fn run<C: NotificationCenter>(
    center: &C,
    request: &NotificationRequest,
    linger: Duration,
) -> Outcome {
    let mut state = State::Start;

    loop {
        let input = match state {
            State::Start => Input::Launched,

            State::QuerySettings => Input::Settings(center.authorization_status().await),

            State::RequestAuthorization => Input::AuthorizationAnswered {
                granted: center.request_authorization().await,
            },

            State::Send => {
                let result = center.submit(request).await;
                if let Err(e) = &result {
                    eprintln!("{} {}", "Error sending notification:".red(), e);
                }
                center.play_sound(&request.sound);
                Input::Submitted {
                    delivered: result.is_ok(),
                }
            }

            State::Linger { .. } => {
                tokio::select! {
                    _ = tokio::time::sleep(linger) => Input::LingerElapsed,
                    Some(interaction) = center.next_interaction() => Input::Interaction(interaction),
                }
            }

            State::Terminate(outcome) => {
                if outcome == Outcome::Denied {
                    eprintln!(
                        "{} Notifications disabled. Enable them in your system notification settings for opencode-notify",
                        "Error:".red()
                    );
                }
                return outcome;
            }
        };

        state = transition(state, input);
    }
}
