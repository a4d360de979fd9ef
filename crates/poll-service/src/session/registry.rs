//! `ParticipantRegistry` - connected participants and their per-round vote status.
//!
//! The registry is the only place `has_voted` changes, which makes
//! [`ParticipantRegistry::mark_voted`] the single enforcement point for
//! one vote per participant per round.

use crate::config::CompletionPolicy;

use common::types::ParticipantId;
use serde::Serialize;

/// Name given to participants who join with a blank name.
pub const DEFAULT_DISPLAY_NAME: &str = "Participant";

/// A connected participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    id: ParticipantId,
    name: String,
    has_voted: bool,
    /// Connected when the current round started.
    on_roster: bool,
}

impl Participant {
    #[must_use]
    pub fn id(&self) -> ParticipantId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn has_voted(&self) -> bool {
        self.has_voted
    }

    #[must_use]
    pub fn on_roster(&self) -> bool {
        self.on_roster
    }

    fn presence(&self) -> PresenceEntry {
        PresenceEntry {
            participant_id: self.id,
            name: self.name.clone(),
            voted: self.has_voted,
        }
    }
}

/// Presence entry broadcast to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresenceEntry {
    /// Connection-scoped id; never sent to clients.
    #[serde(skip)]
    pub participant_id: ParticipantId,
    /// Display name (unique within the session).
    pub name: String,
    /// Whether the participant has voted in the current round.
    pub voted: bool,
}

/// Result of a join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinedParticipant {
    pub participant_id: ParticipantId,
    /// Display name after de-duplication.
    pub name: String,
    /// True if the id was already registered and only the name was updated.
    pub rejoined: bool,
}

/// Connected participants in join order.
#[derive(Debug)]
pub struct ParticipantRegistry {
    participants: Vec<Participant>,
    max_name_length: usize,
}

impl ParticipantRegistry {
    #[must_use]
    pub fn new(max_name_length: usize) -> Self {
        Self {
            participants: Vec::new(),
            max_name_length,
        }
    }

    /// Register `id` under `name`, suffixing `" (1)"`, `" (2)"`, ... on collision.
    ///
    /// Re-registering an existing id renames it in place and keeps its vote
    /// status, so a second join cannot be used to vote twice.
    pub fn join(&mut self, id: ParticipantId, name: &str) -> JoinedParticipant {
        let name = self.unique_name(id, name);

        if let Some(existing) = self.participants.iter_mut().find(|p| p.id == id) {
            existing.name.clone_from(&name);
            return JoinedParticipant {
                participant_id: id,
                name,
                rejoined: true,
            };
        }

        self.participants.push(Participant {
            id,
            name: name.clone(),
            has_voted: false,
            on_roster: false,
        });

        JoinedParticipant {
            participant_id: id,
            name,
            rejoined: false,
        }
    }

    /// Remove a participant, returning it if it was registered.
    pub fn leave(&mut self, id: ParticipantId) -> Option<Participant> {
        let position = self.participants.iter().position(|p| p.id == id)?;
        Some(self.participants.remove(position))
    }

    /// Mark `id` as having voted.
    ///
    /// Returns true only when the mark is newly applied; false if the
    /// participant already voted or is unknown.
    pub fn mark_voted(&mut self, id: ParticipantId) -> bool {
        match self.participants.iter_mut().find(|p| p.id == id) {
            Some(participant) if !participant.has_voted => {
                participant.has_voted = true;
                true
            }
            _ => false,
        }
    }

    /// Clear every vote flag and take the roster for a new round.
    pub fn reset_votes(&mut self) {
        for participant in &mut self.participants {
            participant.has_voted = false;
            participant.on_roster = true;
        }
    }

    /// Ordered presence view.
    #[must_use]
    pub fn snapshot(&self) -> Vec<PresenceEntry> {
        self.participants.iter().map(Participant::presence).collect()
    }

    #[must_use]
    pub fn get(&self, id: ParticipantId) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }

    #[must_use]
    pub fn contains(&self, id: ParticipantId) -> bool {
        self.get(id).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    #[must_use]
    pub fn voted_count(&self) -> usize {
        self.participants.iter().filter(|p| p.has_voted).count()
    }

    /// Whether everyone counted under `policy` has voted.
    ///
    /// Never true when nobody is counted.
    #[must_use]
    pub fn is_complete(&self, policy: CompletionPolicy) -> bool {
        let mut counted = self.participants.iter().filter(|p| match policy {
            CompletionPolicy::AllConnected => true,
            CompletionPolicy::RoundRoster => p.on_roster,
        });

        let Some(first) = counted.next() else {
            return false;
        };
        first.has_voted && counted.all(|p| p.has_voted)
    }

    fn unique_name(&self, id: ParticipantId, requested: &str) -> String {
        let trimmed: String = requested.trim().chars().take(self.max_name_length).collect();
        let base = if trimmed.is_empty() {
            DEFAULT_DISPLAY_NAME.to_string()
        } else {
            trimmed
        };

        let taken = |candidate: &str| {
            self.participants
                .iter()
                .any(|p| p.id != id && p.name == candidate)
        };

        let mut candidate = base.clone();
        let mut counter: u32 = 1;
        while taken(&candidate) {
            candidate = format!("{base} ({counter})");
            counter += 1;
        }
        candidate
    }
}
