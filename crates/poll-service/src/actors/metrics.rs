//! Session actor metrics and mailbox monitoring.
//!
//! | Mailbox depth | Level    |
//! |---------------|----------|
//! | <= 100        | Normal   |
//! | 101-500       | Warning  |
//! | > 500         | Critical |
//!
//! Counters here are in-process atomics, mirrored to Prometheus through
//! `crate::observability::metrics`. The actor logs the mailbox peak and level
//! when it stops.

use crate::observability::metrics as prom;

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Mailbox depth above which the session actor is considered busy.
pub const SESSION_MAILBOX_NORMAL: usize = 100;
/// Mailbox depth above which the session actor is considered overloaded.
pub const SESSION_MAILBOX_WARNING: usize = 500;

/// Mailbox depth level for alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxLevel {
    /// At or below the normal threshold.
    Normal,
    /// Between the normal and warning thresholds.
    Warning,
    /// Above the warning threshold.
    Critical,
}

/// Tracks the session actor's queue depth.
#[derive(Debug)]
pub struct MailboxMonitor {
    session_id: String,
    depth: AtomicUsize,
    peak_depth: AtomicUsize,
    messages_processed: AtomicU64,
}

impl MailboxMonitor {
    #[must_use]
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            depth: AtomicUsize::new(0),
            peak_depth: AtomicUsize::new(0),
            messages_processed: AtomicU64::new(0),
        }
    }

    /// Record a message being added to the mailbox.
    pub fn record_enqueue(&self) {
        let new_depth = self.depth.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak_depth.fetch_max(new_depth, Ordering::Relaxed);

        match level_for_depth(new_depth) {
            MailboxLevel::Critical => warn!(
                target: "poll.actor.mailbox",
                session_id = %self.session_id,
                depth = new_depth,
                threshold = SESSION_MAILBOX_WARNING,
                "Mailbox depth critical"
            ),
            MailboxLevel::Warning if new_depth == SESSION_MAILBOX_NORMAL + 1 => debug!(
                target: "poll.actor.mailbox",
                session_id = %self.session_id,
                depth = new_depth,
                "Mailbox depth elevated"
            ),
            _ => {}
        }

        prom::set_actor_mailbox_depth(new_depth);
    }

    /// Record a message being taken off the mailbox.
    pub fn record_dequeue(&self) {
        // Saturate: a failed send after enqueue may race a dequeue
        let previous = self
            .depth
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |d| {
                Some(d.saturating_sub(1))
            })
            .unwrap_or(0);
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
        prom::set_actor_mailbox_depth(previous.saturating_sub(1));
    }

    /// Undo an enqueue whose send failed.
    pub fn record_send_failure(&self) {
        let _ = self
            .depth
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |d| {
                Some(d.saturating_sub(1))
            });
    }

    #[must_use]
    pub fn current_depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn peak_depth(&self) -> usize {
        self.peak_depth.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn messages_processed(&self) -> u64 {
        self.messages_processed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn current_level(&self) -> MailboxLevel {
        level_for_depth(self.current_depth())
    }
}

fn level_for_depth(depth: usize) -> MailboxLevel {
    if depth > SESSION_MAILBOX_WARNING {
        MailboxLevel::Critical
    } else if depth > SESSION_MAILBOX_NORMAL {
        MailboxLevel::Warning
    } else {
        MailboxLevel::Normal
    }
}

/// Session-level counters shared between the actor and observers.
///
/// Every update is mirrored to the Prometheus recorder.
#[derive(Debug, Default)]
pub struct SessionMetrics {
    participants: AtomicUsize,
    rounds_started: AtomicU64,
    votes_accepted: AtomicU64,
    votes_rejected: AtomicU64,
    rounds_finalized: AtomicU64,
}

/// Point-in-time copy of [`SessionMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionMetricsSnapshot {
    pub participants: usize,
    pub rounds_started: u64,
    pub votes_accepted: u64,
    pub votes_rejected: u64,
    pub rounds_finalized: u64,
}

impl SessionMetrics {
    /// Create a new shared metrics instance.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_participants(&self, count: usize) {
        self.participants.store(count, Ordering::SeqCst);
        prom::set_participants_active(count);
    }

    pub fn round_started(&self) {
        self.rounds_started.fetch_add(1, Ordering::SeqCst);
        prom::record_round_started();
    }

    /// Count a vote outcome under its metric label.
    pub fn vote(&self, outcome: &'static str) {
        if outcome == "accepted" {
            self.votes_accepted.fetch_add(1, Ordering::SeqCst);
        } else {
            self.votes_rejected.fetch_add(1, Ordering::SeqCst);
        }
        prom::record_vote(outcome);
    }

    pub fn round_finalized(&self, trigger: &'static str) {
        self.rounds_finalized.fetch_add(1, Ordering::SeqCst);
        prom::record_round_finalized(trigger);
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionMetricsSnapshot {
        SessionMetricsSnapshot {
            participants: self.participants.load(Ordering::SeqCst),
            rounds_started: self.rounds_started.load(Ordering::SeqCst),
            votes_accepted: self.votes_accepted.load(Ordering::SeqCst),
            votes_rejected: self.votes_rejected.load(Ordering::SeqCst),
            rounds_finalized: self.rounds_finalized.load(Ordering::SeqCst),
        }
    }
}
