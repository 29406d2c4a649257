//! Per-session status tracking with idle debounce.

use crate::ipc::messages::{SessionRecord, SessionStatus};
use std::collections::HashMap;

/// What the caller should do after an event was recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Session just transitioned into idle
    Notify,
    /// Nothing to surface
    Quiet,
}

/// Last observed status of every session seen by this process.
///
/// Created empty, owned by whoever drives the event stream, and dropped
/// with it. Entries are never evicted.
#[derive(Debug, Default)]
pub struct SessionTracker {
    sessions: HashMap<String, SessionStatus>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event and decide whether it is a notify-worthy idle edge.
    ///
    /// A repeated idle leaves the map untouched. Any other status always
    /// overwrites the previous one.
    pub fn on_event(&mut self, session_id: &str, status: SessionStatus) -> Decision {
        if status.is_idle() {
            if self.last_status(session_id).is_some_and(SessionStatus::is_idle) {
                return Decision::Quiet;
            }
            self.sessions.insert(session_id.to_string(), SessionStatus::Idle);
            return Decision::Notify;
        }

        self.sessions.insert(session_id.to_string(), status);
        Decision::Quiet
    }

    pub fn last_status(&self, session_id: &str) -> Option<&SessionStatus> {
        self.sessions.get(session_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// All records, sorted by session id
    pub fn snapshot(&self) -> Vec<SessionRecord> {
        let mut records: Vec<SessionRecord> = self
            .sessions
            .iter()
            .map(|(id, status)| SessionRecord {
                session_id: id.clone(),
                last_status: status.clone(),
            })
            .collect();
        records.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        records
    }
}
