//! Common data types for Live Poll components.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a connected participant.
///
/// Connection-scoped: the transport assigns one per connection, and the same
/// id re-registering updates the existing participant instead of adding one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParticipantId(pub Uuid);

impl ParticipantId {
    /// Create a new random participant ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ParticipantId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier for a polling round.
///
/// Monotonic generation counter: every started round gets the next value, so
/// a timer armed for an earlier round can detect that it is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoundId(pub u64);

impl RoundId {
    /// The first round of a session.
    pub const FIRST: RoundId = RoundId(1);

    /// The round that follows this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_participant_ids_are_unique() {
        assert_ne!(ParticipantId::new(), ParticipantId::new());
    }

    #[test]
    fn test_round_id_next() {
        assert_eq!(RoundId::FIRST.next(), RoundId(2));
        assert_eq!(RoundId(u64::MAX).next(), RoundId(u64::MAX));
    }

    #[test]
    fn test_round_id_serializes_as_number() {
        let json = serde_json::to_string(&RoundId(7)).unwrap();
        assert_eq!(json, "7");
    }
}
