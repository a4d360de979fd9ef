//! `VoteCoordinator` - the round state machine.
//!
//! ```text
//!              cast / leave / timeout
//!  Collecting ────────────────────────▶ Finalized (terminal)
//! ```
//!
//! Three triggers race to finalize a round: the last vote, the departure of
//! the last non-voter, and the round timer. All of them go through
//! one completion check that only finalizes a collecting
//! round, so whichever trigger arrives first wins and the rest are no-ops.
//! Callers must serialize access (the session actor owns the coordinator).

use crate::config::{CompletionPolicy, SessionLimits};
use crate::errors::{PollError, RejectReason};

use super::projector::{self, ResultView};
use super::registry::{JoinedParticipant, Participant, ParticipantRegistry};
use super::round::{RoundSpec, SessionState};

use common::types::{ParticipantId, RoundId};

/// What caused a round to finalize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeTrigger {
    /// Every counted participant voted.
    AllVoted,
    /// The round timer expired.
    Timer,
    /// The last participant who had not voted left.
    Departure,
}

impl FinalizeTrigger {
    /// Returns the trigger as a string for metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            FinalizeTrigger::AllVoted => "all_voted",
            FinalizeTrigger::Timer => "timer",
            FinalizeTrigger::Departure => "departure",
        }
    }
}

/// A round reaching its terminal state.
#[derive(Debug, Clone, PartialEq)]
pub struct Finalization {
    pub trigger: FinalizeTrigger,
    /// Final view, including the correct option if one was set.
    pub view: ResultView,
}

/// Outcome of an accepted vote.
#[derive(Debug, Clone, PartialEq)]
pub struct VoteReceipt {
    pub round_id: RoundId,
    /// Voter's personal view, taken after the vote was counted.
    pub partial: ResultView,
    /// Set when this vote completed the round.
    pub finalized: Option<Finalization>,
}

/// Outcome of a departure.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaveReceipt {
    /// The participant that was removed.
    pub participant: Participant,
    /// Set when the departure completed the round.
    pub finalized: Option<Finalization>,
}

/// Owns the registry and the round, and applies every transition.
#[derive(Debug)]
pub struct VoteCoordinator {
    registry: ParticipantRegistry,
    state: SessionState,
    policy: CompletionPolicy,
}

impl VoteCoordinator {
    #[must_use]
    pub fn new(limits: SessionLimits) -> Self {
        Self {
            registry: ParticipantRegistry::new(limits.max_name_length),
            state: SessionState::new(limits),
            policy: limits.completion_policy,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &ParticipantRegistry {
        &self.registry
    }

    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    #[must_use]
    pub fn policy(&self) -> CompletionPolicy {
        self.policy
    }

    /// Replace the active round and reset every participant's vote flag.
    ///
    /// An invalid spec changes nothing.
    pub fn start_round(&mut self, spec: RoundSpec) -> Result<RoundId, PollError> {
        let round_id = self.state.start_round(spec)?;
        self.registry.reset_votes();
        Ok(round_id)
    }

    /// Register a participant. Joining never completes a round.
    pub fn join(&mut self, id: ParticipantId, name: &str) -> JoinedParticipant {
        self.registry.join(id, name)
    }

    /// Apply `participant`'s vote for `option`.
    ///
    /// # Errors
    ///
    /// - `Rejected` without a collecting round, for an unknown option, or for
    ///   an unknown participant. Nothing changes.
    /// - `AlreadyVoted` if the participant already voted this round.
    pub fn cast_vote(
        &mut self,
        participant: ParticipantId,
        option: &str,
    ) -> Result<VoteReceipt, PollError> {
        let round = self.state.current().ok_or(RejectReason::NoActiveRound)?;
        if round.is_finalized() {
            return Err(RejectReason::RoundFinalized.into());
        }
        if !round.has_option(option) {
            return Err(RejectReason::UnknownOption.into());
        }
        let round_id = round.id();

        if !self.registry.contains(participant) {
            return Err(RejectReason::UnknownParticipant.into());
        }
        if !self.registry.mark_voted(participant) {
            return Err(PollError::AlreadyVoted);
        }
        if !self.state.record_vote(option) {
            // Unreachable: round and option were validated above
            return Err(PollError::Internal(
                "tally refused a validated vote".to_string(),
            ));
        }

        let finalized = self.try_complete(FinalizeTrigger::AllVoted);

        let round = self
            .state
            .current()
            .ok_or_else(|| PollError::Internal("round vanished during vote".to_string()))?;
        let partial = projector::project(round, round.is_finalized());

        Ok(VoteReceipt {
            round_id,
            partial,
            finalized,
        })
    }

    /// Handle expiry of the timer armed for `round_id`.
    ///
    /// No-op if that round was replaced or already finalized.
    pub fn on_timer_expired(&mut self, round_id: RoundId) -> Option<Finalization> {
        if self.state.current_id() != Some(round_id) || !self.state.is_collecting() {
            return None;
        }

        let view = self.state.finalize()?;
        Some(Finalization {
            trigger: FinalizeTrigger::Timer,
            view,
        })
    }

    /// Remove a participant and re-evaluate completion with the smaller count.
    ///
    /// # Errors
    ///
    /// `Rejected(UnknownParticipant)` if `id` is not registered.
    pub fn leave(&mut self, id: ParticipantId) -> Result<LeaveReceipt, PollError> {
        let participant = self
            .registry
            .leave(id)
            .ok_or(RejectReason::UnknownParticipant)?;

        let finalized = self.try_complete(FinalizeTrigger::Departure);

        Ok(LeaveReceipt {
            participant,
            finalized,
        })
    }

    /// Finalize if the round is collecting and the registry is complete.
    fn try_complete(&mut self, trigger: FinalizeTrigger) -> Option<Finalization> {
        if !self.state.is_collecting() || !self.registry.is_complete(self.policy) {
            return None;
        }

        let view = self.state.finalize()?;
        Some(Finalization { trigger, view })
    }
}
