//! Session coordination engine.
//!
//! Synchronous, transport-free state for the single polling session:
//!
//! ```text
//! VoteCoordinator (round state machine)
//! ├── ParticipantRegistry (presence, names, vote flags)
//! └── SessionState (active round, tally, finalized flag)
//!         └── ResultProjector (percentages)
//! ```
//!
//! Nothing here locks or spawns. The session actor owns the coordinator and
//! feeds it one event at a time.
//!
//! # Modules
//!
//! - [`registry`] - participants, name de-duplication, one-vote gate
//! - [`round`] - round validation, counters, finalization
//! - [`projector`] - partial and final percentage views
//! - [`coordinator`] - transitions and the finalization race

pub mod coordinator;
pub mod projector;
pub mod registry;
pub mod round;

pub use coordinator::{
    FinalizeTrigger, Finalization, LeaveReceipt, VoteCoordinator, VoteReceipt,
};
pub use projector::{OptionResult, Percentages, ResultView};
pub use registry::{JoinedParticipant, Participant, ParticipantRegistry, PresenceEntry};
pub use round::{OptionCount, Round, RoundSpec, SessionState};
