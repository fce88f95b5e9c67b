//! Audit trail of agenda activity.
//!
//! Every reservation lifecycle change and store access is recorded as an
//! [`AuditEvent`]; the in-memory sink keeps a bounded window of them.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::session::SessionId;
use crate::util::clock::now_ms;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Reservations loaded from the store.
    Load,
    /// Reservations written to the store.
    Store,
    /// Past reservations dropped before storing.
    Purge,
    /// Reservation added.
    Add,
    /// Reservation removed.
    Remove,
    /// Reservation session started.
    Activate,
    /// Reservation session ended normally.
    Complete,
    /// Reservation session failed to start or ended in error.
    Fail,
    /// Reservation period ended before activation.
    Miss,
}

impl AuditAction {
    /// Lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::Store => "store",
            Self::Purge => "purge",
            Self::Add => "add",
            Self::Remove => "remove",
            Self::Activate => "activate",
            Self::Complete => "complete",
            Self::Fail => "fail",
            Self::Miss => "miss",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit event structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Event identifier.
    pub event_id: String,
    /// Related reservation.
    pub reservation_id: Option<i32>,
    /// Related session.
    pub session_id: Option<SessionId>,
    /// Action taken.
    pub action: AuditAction,
    /// Timestamp milliseconds.
    pub created_at_ms: u128,
    /// Additional context.
    pub payload: Option<String>,
}

/// Audit sink abstraction.
pub trait AuditSink: Send {
    /// Record an audit event.
    fn record(&mut self, event: AuditEvent);
}

/// Bounded in-memory sink; the oldest events are dropped first.
#[derive(Debug, Clone)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<VecDeque<AuditEvent>>>,
    max_events: usize,
}

impl InMemoryAuditSink {
    /// Sink keeping at most `max_events` events.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::with_capacity(max_events.min(4096)))),
            max_events,
        }
    }

    /// Snapshot of stored events, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// Stored events with the given action.
    #[must_use]
    pub fn events_with(&self, action: AuditAction) -> Vec<AuditEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.action == action)
            .cloned()
            .collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&mut self, event: AuditEvent) {
        if self.max_events == 0 {
            return;
        }
        let mut events = self.events.lock();
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(event);
    }
}

/// Build an audit event stamped with a fresh id and the current time.
#[must_use]
pub fn build_audit_event(
    action: AuditAction,
    reservation_id: Option<i32>,
    session_id: Option<SessionId>,
    payload: Option<String>,
) -> AuditEvent {
    AuditEvent {
        event_id: Uuid::new_v4().to_string(),
        reservation_id,
        session_id,
        action,
        created_at_ms: now_ms(),
        payload,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_is_bounded() {
        let mut sink = InMemoryAuditSink::new(2);
        let reader = sink.clone();
        for id in 1..=3 {
            sink.record(build_audit_event(AuditAction::Add, Some(id), None, None));
        }
        let ids: Vec<_> = reader.events().iter().filter_map(|e| e.reservation_id).collect();
        assert_eq!(ids, vec![2, 3]);
        assert_eq!(reader.events_with(AuditAction::Add).len(), 2);
        assert!(reader.events_with(AuditAction::Miss).is_empty());
    }

    #[test]
    fn test_zero_capacity_drops_everything() {
        let mut sink = InMemoryAuditSink::new(0);
        sink.record(build_audit_event(AuditAction::Load, None, None, None));
        assert!(sink.events().is_empty());
    }
}
