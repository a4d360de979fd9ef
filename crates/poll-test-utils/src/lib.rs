//! # Poll Test Utilities
//!
//! Shared test utilities for the Live Poll service.
//!
//! ## Modules
//!
//! - `fixtures` - Round specs and participants with sensible defaults
//! - `collector` - Drains session notifications for assertions
//! - `session` - Spawns a session actor that cancels itself on drop
//!
//! ## Usage
//!
//! ```rust,ignore
//! use poll_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let session = TestSession::spawn();
//!     let mut events = session.collector();
//!
//!     let ana = TestParticipant::new("Ana");
//!     session.join(&ana).await;
//!     session.start(TestRound::new().with_options(&["Red", "Blue"])).await;
//!
//!     assert_eq!(events.kinds(), vec!["presence", "round_started", "presence"]);
//! }
//! ```

pub mod collector;
pub mod fixtures;
pub mod session;

pub use collector::NotificationCollector;
pub use fixtures::{TestParticipant, TestRound};
pub use session::TestSession;
