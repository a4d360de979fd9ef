//! Live Poll Service Library
//!
//! Coordinates a single live-polling session: a moderator starts rounds
//! (prompt, options, timer, optional correct answer), participants join and
//! vote once per round, and everyone receives presence and result updates in
//! real time over WebSockets.
//!
//! # Architecture
//!
//! ```text
//! WebSocket gateway (one task per connection)
//! └── SessionActorHandle (mpsc + oneshot)
//!     └── SessionActor (single writer)
//!         ├── VoteCoordinator
//!         │   ├── SessionState (round lifecycle, tally)
//!         │   └── ParticipantRegistry (names, has_voted)
//!         ├── round timer task (posts TimerExpired into the mailbox)
//!         └── broadcast::Sender<Notification> (fan-out to connections)
//! ```
//!
//! # Key Design Decisions
//!
//! - **One writer**: every mutation goes through the actor mailbox, so votes,
//!   departures and timer expiry are totally ordered
//! - **Pure core**: [`session`] has no async or I/O and is tested directly
//! - **Audience-tagged fan-out**: a single broadcast channel carries both
//!   session-wide events and per-voter partial results
//!
//! # Modules
//!
//! - [`actors`] - Session actor, handle, messages and actor metrics
//! - [`config`] - Service configuration from environment
//! - [`errors`] - Error types with client-facing codes
//! - [`gateway`] - WebSocket frame handling
//! - [`observability`] - Health endpoints and Prometheus metrics
//! - [`session`] - Round lifecycle, participant registry and result projection

pub mod actors;
pub mod config;
pub mod errors;
pub mod gateway;
pub mod observability;
pub mod session;
