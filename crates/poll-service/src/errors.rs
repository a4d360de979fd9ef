//! Live Poll error types.
//!
//! Error types map to stable numeric codes for client responses.
//! Internal details are logged server-side but not exposed to clients.

use thiserror::Error;

/// Why a vote (or a departure) was rejected without touching session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// No round has been started yet.
    NoActiveRound,
    /// The current round has already been finalized.
    RoundFinalized,
    /// The option is not one of the current round's labels.
    UnknownOption,
    /// The participant is not registered in the session.
    UnknownParticipant,
}

impl RejectReason {
    /// Returns the reason as a string for metric labels and logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            RejectReason::NoActiveRound => "no_active_round",
            RejectReason::RoundFinalized => "round_finalized",
            RejectReason::UnknownOption => "unknown_option",
            RejectReason::UnknownParticipant => "unknown_participant",
        }
    }
}

/// Live Poll error type.
///
/// Maps to client error codes:
/// - `InvalidRoundSpec`: `INVALID_ARGUMENT` (3)
/// - `Rejected`: `REJECTED` (4)
/// - `AlreadyVoted`: `CONFLICT` (5)
/// - `Draining`: `UNAVAILABLE` (7)
/// - `Internal`: `INTERNAL_ERROR` (6)
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PollError {
    /// Round could not be started (bad prompt, options or timer).
    #[error("Invalid round spec: {0}")]
    InvalidRoundSpec(String),

    /// Vote or departure was not applicable to the current state.
    #[error("Rejected: {}", .0.as_str())]
    Rejected(RejectReason),

    /// Participant already voted in this round.
    #[error("Participant already voted in this round")]
    AlreadyVoted,

    /// Session actor is shutting down.
    #[error("Session is draining")]
    Draining,

    /// Internal error (mailbox closed, response dropped).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PollError {
    /// Returns the client error code for this error.
    #[must_use]
    pub fn error_code(&self) -> i32 {
        match self {
            PollError::InvalidRoundSpec(_) => 3, // INVALID_ARGUMENT
            PollError::Rejected(_) => 4,         // REJECTED
            PollError::AlreadyVoted => 5,        // CONFLICT
            PollError::Internal(_) => 6,         // INTERNAL_ERROR
            PollError::Draining => 7,            // UNAVAILABLE
        }
    }

    /// Returns a client-safe error message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            PollError::InvalidRoundSpec(msg) => msg.clone(),
            PollError::Rejected(_) => "Vote not accepted".to_string(),
            PollError::AlreadyVoted => "You have already voted in this round".to_string(),
            PollError::Draining => "Server is shutting down, please reconnect".to_string(),
            PollError::Internal(_) => "An internal error occurred".to_string(),
        }
    }

    /// Whether the engine drops this error silently (no broadcast, no reply).
    #[must_use]
    pub fn is_silent(&self) -> bool {
        matches!(self, PollError::Rejected(_) | PollError::AlreadyVoted)
    }
}

impl From<RejectReason> for PollError {
    fn from(reason: RejectReason) -> Self {
        PollError::Rejected(reason)
    }
}
