//! Connection bookkeeping for one watched ride.
//!
//! `RideStatusMonitor` is synchronous: the watcher task feeds it signals and
//! acts on what it returns.
//!
//! Actions issued while the channel is down wait in an unbounded queue. On
//! reconnect, entries older than the TTL are dropped and the rest are handed
//! back in the order they were queued.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info};
use uuid::Uuid;

use super::events::StreamEvent;
use super::feedback::{Feedback, feedback_for};
use crate::core::action::Action;
use crate::core::ride::RideStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    Connected,
    #[default]
    Connecting,
    Reconnecting,
    Disconnected,
}

impl ConnectionState {
    pub fn label(self) -> &'static str {
        match self {
            ConnectionState::Connected => "connected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Disconnected => "disconnected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingKind {
    Cancel { reason: String },
    Refresh,
}

impl PendingKind {
    pub fn into_action(self, ride_id: &str) -> Action {
        match self {
            PendingKind::Cancel { reason } => Action::CancelRide {
                ride_id: ride_id.to_string(),
                reason,
            },
            PendingKind::Refresh => Action::RefreshRide {
                ride_id: ride_id.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingAction {
    pub id: Uuid,
    pub kind: PendingKind,
    pub queued_at: DateTime<Utc>,
}

/// What the watcher should do about a status event.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReaction {
    pub status: RideStatus,
    pub feedback: Option<Feedback>,
    pub terminal: bool,
}

#[derive(Debug)]
pub struct RideStatusMonitor {
    ride_id: String,
    state: ConnectionState,
    pending: VecDeque<PendingAction>,
    ttl: Duration,
    last_status: Option<RideStatus>,
}

impl RideStatusMonitor {
    pub fn new(ride_id: &str, ttl: Duration) -> Self {
        Self {
            ride_id: ride_id.to_string(),
            state: ConnectionState::Connecting,
            pending: VecDeque::new(),
            ttl,
            last_status: None,
        }
    }

    pub fn ride_id(&self) -> &str {
        &self.ride_id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn pending(&self) -> &VecDeque<PendingAction> {
        &self.pending
    }

    pub fn last_status(&self) -> Option<RideStatus> {
        self.last_status
    }

    /// A (re)connect attempt is starting.
    pub fn begin_attempt(&mut self, retry: bool) {
        self.state = if retry {
            ConnectionState::Reconnecting
        } else {
            ConnectionState::Connecting
        };
    }

    /// The stream dropped and a retry will follow.
    pub fn on_dropped(&mut self) {
        self.state = ConnectionState::Reconnecting;
    }

    /// No further attempts will be made.
    pub fn on_disconnected(&mut self) {
        self.state = ConnectionState::Disconnected;
    }

    /// Returns the action to send now, or `None` if it was queued.
    pub fn submit(&mut self, kind: PendingKind, now: DateTime<Utc>) -> Option<PendingKind> {
        if self.state == ConnectionState::Connected {
            return Some(kind);
        }
        debug!("Queueing {:?} for {} while {}", kind, self.ride_id, self.state.label());
        self.pending.push_back(PendingAction {
            id: Uuid::new_v4(),
            kind,
            queued_at: now,
        });
        None
    }

    /// Marks the channel connected and returns the queued actions still
    /// within the TTL, oldest first. Stale entries are dropped.
    pub fn on_connected(&mut self, now: DateTime<Utc>) -> Vec<PendingAction> {
        self.state = ConnectionState::Connected;
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::MAX);
        let (fresh, stale): (Vec<_>, Vec<_>) = self
            .pending
            .drain(..)
            .partition(|p| now.signed_duration_since(p.queued_at) <= ttl);
        if !stale.is_empty() {
            info!("Dropped {} stale pending actions for {}", stale.len(), self.ride_id);
        }
        fresh
    }

    /// Status events for this ride that change the status produce a reaction.
    pub fn handle_event(&mut self, event: &StreamEvent) -> Option<StatusReaction> {
        let StreamEvent::RideStatus { ride_id, status } = event else {
            return None;
        };
        if ride_id != &self.ride_id || *status == RideStatus::Unknown {
            return None;
        }
        if self.last_status == Some(*status) {
            debug!("Duplicate status {:?} for {}", status, ride_id);
            return None;
        }
        self.last_status = Some(*status);
        Some(StatusReaction {
            status: *status,
            feedback: feedback_for(*status),
            terminal: status.is_terminal(),
        })
    }
}
