//! Host event handling: normalize, then feed the tracker.

use crate::common::debug::debug_log;
use crate::daemon::state::{Decision, SessionTracker};
use crate::ipc::messages::HostEvent;
use serde_json::Value;

/// Handle a raw host event and return the session id to notify for, if any.
///
/// Unknown event types and malformed payloads are skipped without
/// touching the tracker.
pub fn handle_host_event(tracker: &mut SessionTracker, event: Value) -> Option<String> {
    route(tracker, HostEvent::normalize(event))
}

/// Same as [`handle_host_event`] for a raw JSON line
pub fn handle_host_line(tracker: &mut SessionTracker, line: &str) -> Option<String> {
    route(tracker, HostEvent::parse(line))
}

fn route(tracker: &mut SessionTracker, event: HostEvent) -> Option<String> {
    match event {
        HostEvent::Update(update) => {
            let decision = tracker.on_event(&update.session_id, update.status.clone());
            debug_log(&format!(
                "EVENT: {} -> {} ({:?})",
                update.session_id, update.status, decision
            ));
            match decision {
                Decision::Notify => Some(update.session_id),
                Decision::Quiet => None,
            }
        }
        HostEvent::Ignored { kind } => {
            debug_log(&format!("EVENT: ignoring {}", kind));
            None
        }
        HostEvent::Malformed { reason } => {
            debug_log(&format!("EVENT: skipped malformed event: {}", reason));
            None
        }
    }
}
