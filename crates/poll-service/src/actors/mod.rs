//! Actor layer for the polling session.
//!
//! ```text
//! SessionActorHandle (cloned into every gateway connection)
//! └── SessionActor (one per process, owns the VoteCoordinator)
//!     └── round timer task (one per armed round, child CancellationToken)
//! ```
//!
//! # Key Design Decisions
//!
//! - **Single writer**: every mutation goes through one `tokio::sync::mpsc` mailbox
//! - **Timers as messages**: expiry re-enters the mailbox as `TimerExpired { round_id }`
//! - **Audience-tagged fan-out**: notifications go out on one `tokio::sync::broadcast`
//!   channel; observers filter by `Audience`
//!
//! # Modules
//!
//! - [`session`] - `SessionActor` and its handle
//! - [`messages`] - mailbox messages, receipts and outbound events
//! - [`metrics`] - mailbox monitoring and session counters

pub mod messages;
pub mod metrics;
pub mod session;

// Re-export primary types
pub use messages::*;
pub use metrics::{MailboxMonitor, SessionMetrics, SessionMetricsSnapshot};
pub use session::{SessionActor, SessionActorHandle};
