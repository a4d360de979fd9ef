//! Message types for the session actor.
//!
//! Inbound requests travel over `tokio::sync::mpsc` with `tokio::sync::oneshot`
//! reply channels. Outbound notifications are published on a
//! `tokio::sync::broadcast` channel and carry their intended audience.

use crate::errors::PollError;
use crate::session::{
    JoinedParticipant, LeaveReceipt, Percentages, PresenceEntry, ResultView, Round, RoundSpec,
    VoteReceipt,
};

use chrono::{DateTime, Utc};
use common::types::{ParticipantId, RoundId};
use serde::Serialize;
use tokio::sync::{broadcast, oneshot};

/// Messages sent to `SessionActor`.
#[derive(Debug)]
pub enum SessionMessage {
    /// Moderator starts (or replaces) the round.
    StartRound {
        spec: RoundSpec,
        /// Response channel for the accepted round or `InvalidRoundSpec`.
        respond_to: oneshot::Sender<Result<RoundStartedReceipt, PollError>>,
    },

    /// A connection registers a display name.
    Join {
        participant_id: ParticipantId,
        name: String,
        /// Response channel for the assigned name.
        respond_to: oneshot::Sender<Result<JoinedParticipant, PollError>>,
    },

    /// A connection went away.
    Leave {
        participant_id: ParticipantId,
        /// Response channel for the departure outcome.
        respond_to: oneshot::Sender<Result<LeaveReceipt, PollError>>,
    },

    /// A participant votes for an option.
    CastVote {
        participant_id: ParticipantId,
        option: String,
        /// Response channel for the vote outcome.
        respond_to: oneshot::Sender<Result<VoteReceipt, PollError>>,
    },

    /// The timer armed for `round_id` fired.
    TimerExpired { round_id: RoundId },

    /// Get current session state (for late joiners and health).
    GetState {
        /// Response channel for the snapshot.
        respond_to: oneshot::Sender<SessionSnapshot>,
    },

    /// Subscribe to notifications and take a snapshot in the same step.
    ///
    /// The receiver only sees events published after the snapshot.
    Attach {
        /// Response channel for the snapshot and the new subscription.
        respond_to: oneshot::Sender<Attached>,
    },
}

impl SessionMessage {
    /// Bounded label for latency metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            SessionMessage::StartRound { .. } => "start_round",
            SessionMessage::Join { .. } => "join",
            SessionMessage::Leave { .. } => "leave",
            SessionMessage::CastVote { .. } => "cast_vote",
            SessionMessage::TimerExpired { .. } => "timer_expired",
            SessionMessage::GetState { .. } => "get_state",
            SessionMessage::Attach { .. } => "attach",
        }
    }
}

// ----------------------------------------------------------------------------
// Supporting Types
// ----------------------------------------------------------------------------

/// A new observer: the state it starts from and the events that follow it.
#[derive(Debug)]
pub struct Attached {
    pub snapshot: SessionSnapshot,
    pub notifications: broadcast::Receiver<Notification>,
}

/// Result of a successful round start, returned to the moderator only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundStartedReceipt {
    pub round_id: RoundId,
    pub prompt: String,
    /// Normalized option labels.
    pub options: Vec<String>,
    pub timer_seconds: u64,
    /// Withheld from the `round_started` broadcast.
    pub correct_option: Option<String>,
}

/// Read-only view of the active round.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundSnapshot {
    pub round_id: RoundId,
    pub prompt: String,
    pub options: Vec<String>,
    pub timer_seconds: u64,
    pub started_at: DateTime<Utc>,
    pub is_finalized: bool,
    /// Final view once finalized; a non-final view (no correct option) before.
    pub results: ResultView,
}

impl RoundSnapshot {
    pub(crate) fn of(round: &Round) -> Self {
        Self {
            round_id: round.id(),
            prompt: round.prompt().to_string(),
            options: round.labels().map(ToString::to_string).collect(),
            timer_seconds: round.timer_seconds(),
            started_at: round.started_at(),
            is_finalized: round.is_finalized(),
            results: crate::session::projector::project(round, round.is_finalized()),
        }
    }

    /// Whole seconds left on the round timer at `now`, rounded up.
    ///
    /// Zero once the round is finalized.
    #[must_use]
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> u64 {
        if self.is_finalized {
            return 0;
        }
        let elapsed_ms = u64::try_from((now - self.started_at).num_milliseconds()).unwrap_or(0);
        let remaining_ms = self.timer_seconds.saturating_mul(1000).saturating_sub(elapsed_ms);
        remaining_ms.div_ceil(1000)
    }
}

/// State of the session actor.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub round: Option<RoundSnapshot>,
    pub participants: Vec<PresenceEntry>,
    pub mailbox_depth: usize,
    pub is_shutting_down: bool,
}

impl SessionSnapshot {
    /// Events that bring a newly connected observer up to date.
    ///
    /// The active round (if any), its final results if it already finished,
    /// and the current presence list. `round_started` carries the time left
    /// on the timer at `now` rather than the full length.
    #[must_use]
    pub fn catch_up_events(&self, now: DateTime<Utc>) -> Vec<OutboundEvent> {
        let mut events = Vec::with_capacity(3);

        if let Some(round) = &self.round {
            events.push(OutboundEvent::RoundStarted {
                round_id: round.round_id,
                prompt: round.prompt.clone(),
                options: round.options.clone(),
                timer_seconds: round.remaining_seconds(now),
            });
            if round.is_finalized {
                events.push(OutboundEvent::final_result(&round.results));
            }
        }

        events.push(OutboundEvent::Presence {
            participants: self.participants.clone(),
        });

        events
    }
}

/// Who a notification is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// Every connected observer.
    Everyone,
    /// A single participant.
    Participant(ParticipantId),
}

impl Audience {
    /// Whether an observer bound to `participant_id` should receive it.
    #[must_use]
    pub fn includes(&self, participant_id: ParticipantId) -> bool {
        match self {
            Audience::Everyone => true,
            Audience::Participant(id) => *id == participant_id,
        }
    }
}

/// Outbound notification for the external broadcaster.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub audience: Audience,
    pub event: OutboundEvent,
}

/// Outbound event payloads.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    /// A round started. Never carries the correct option.
    RoundStarted {
        round_id: RoundId,
        prompt: String,
        options: Vec<String>,
        timer_seconds: u64,
    },

    /// Presence and vote status changed.
    Presence { participants: Vec<PresenceEntry> },

    /// Voter's personal view right after their vote.
    PartialResult {
        round_id: RoundId,
        options: Percentages,
    },

    /// Final results, once per round.
    FinalResult {
        round_id: RoundId,
        options: Percentages,
        #[serde(skip_serializing_if = "Option::is_none")]
        correct_option: Option<String>,
    },
}

impl OutboundEvent {
    #[must_use]
    pub fn partial_result(view: &ResultView) -> Self {
        OutboundEvent::PartialResult {
            round_id: view.round_id,
            options: view.percentages(),
        }
    }

    #[must_use]
    pub fn final_result(view: &ResultView) -> Self {
        OutboundEvent::FinalResult {
            round_id: view.round_id,
            options: view.percentages(),
            correct_option: view.correct_option.clone(),
        }
    }

    /// Event name as it appears in the `type` field.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            OutboundEvent::RoundStarted { .. } => "round_started",
            OutboundEvent::Presence { .. } => "presence",
            OutboundEvent::PartialResult { .. } => "partial_result",
            OutboundEvent::FinalResult { .. } => "final_result",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::session::OptionResult;

    fn view(is_final: bool) -> ResultView {
        ResultView {
            round_id: RoundId(3),
            options: vec![
                OptionResult {
                    option: "Red".to_string(),
                    votes: 2,
                    percent: 100.0,
                },
                OptionResult {
                    option: "Blue".to_string(),
                    votes: 0,
                    percent: 0.0,
                },
            ],
            total_votes: 2,
            is_final,
            correct_option: is_final.then(|| "Blue".to_string()),
        }
    }

    #[test]
    fn test_audience_filtering() {
        let me = ParticipantId::new();
        let other = ParticipantId::new();

        assert!(Audience::Everyone.includes(me));
        assert!(Audience::Participant(me).includes(me));
        assert!(!Audience::Participant(other).includes(me));
    }

    #[test]
    fn test_final_result_wire_format() {
        let json = serde_json::to_value(OutboundEvent::final_result(&view(true))).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "type": "final_result",
                "round_id": 3,
                "options": {"Red": 100.0, "Blue": 0.0},
                "correct_option": "Blue",
            })
        );
    }

    #[test]
    fn test_partial_result_omits_correct_option() {
        let json = serde_json::to_value(OutboundEvent::partial_result(&view(false))).unwrap();

        assert_eq!(json["type"], "partial_result");
        assert!(json.get("correct_option").is_none());
        assert_eq!(json["options"]["Red"], 100.0);
    }

    #[test]
    fn test_round_started_wire_format() {
        let event = OutboundEvent::RoundStarted {
            round_id: RoundId(1),
            prompt: "Favorite color?".to_string(),
            options: vec!["Red".to_string(), "Blue".to_string()],
            timer_seconds: 30,
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "round_started");
        assert_eq!(json["timer_seconds"], 30);
        assert_eq!(json["options"], serde_json::json!(["Red", "Blue"]));
        assert_eq!(event.kind(), "round_started");
    }

    #[test]
    fn test_catch_up_events_for_finished_round() {
        let snapshot = SessionSnapshot {
            session_id: "poll-test".to_string(),
            round: Some(RoundSnapshot {
                round_id: RoundId(3),
                prompt: "Favorite color?".to_string(),
                options: vec!["Red".to_string(), "Blue".to_string()],
                timer_seconds: 30,
                started_at: Utc::now(),
                is_finalized: true,
                results: view(true),
            }),
            participants: Vec::new(),
            mailbox_depth: 0,
            is_shutting_down: false,
        };

        let kinds: Vec<_> = snapshot
            .catch_up_events(Utc::now())
            .iter()
            .map(OutboundEvent::kind)
            .collect();
        assert_eq!(kinds, vec!["round_started", "final_result", "presence"]);
    }

    #[test]
    fn test_catch_up_events_without_round() {
        let snapshot = SessionSnapshot {
            session_id: "poll-test".to_string(),
            round: None,
            participants: Vec::new(),
            mailbox_depth: 0,
            is_shutting_down: false,
        };

        let events = snapshot.catch_up_events(Utc::now());
        assert_eq!(events.len(), 1);
        assert_eq!(events.first().map(OutboundEvent::kind), Some("presence"));
    }

    fn collecting_round(timer_seconds: u64, started_at: DateTime<Utc>) -> RoundSnapshot {
        RoundSnapshot {
            round_id: RoundId(1),
            prompt: "Favorite color?".to_string(),
            options: vec!["Red".to_string(), "Blue".to_string()],
            timer_seconds,
            started_at,
            is_finalized: false,
            results: view(false),
        }
    }

    #[test]
    fn test_remaining_seconds_counts_down() {
        let started = Utc::now();
        let round = collecting_round(30, started);

        assert_eq!(round.remaining_seconds(started), 30);
        assert_eq!(
            round.remaining_seconds(started + chrono::Duration::milliseconds(12_400)),
            18
        );
        assert_eq!(
            round.remaining_seconds(started + chrono::Duration::seconds(45)),
            0
        );
        // Clock skew before the start never adds time
        assert_eq!(
            round.remaining_seconds(started - chrono::Duration::seconds(5)),
            30
        );
    }

    #[test]
    fn test_catch_up_round_started_carries_time_left() {
        let started = Utc::now();
        let snapshot = SessionSnapshot {
            session_id: "poll-test".to_string(),
            round: Some(collecting_round(30, started)),
            participants: Vec::new(),
            mailbox_depth: 0,
            is_shutting_down: false,
        };

        let events = snapshot.catch_up_events(started + chrono::Duration::seconds(20));

        assert_eq!(events.len(), 2);
        match events.first() {
            Some(OutboundEvent::RoundStarted { timer_seconds, .. }) => {
                assert_eq!(*timer_seconds, 10);
            }
            other => panic!("expected round_started, got {other:?}"),
        }
    }
}
