//! `SessionState` - owner of the single active round.
//!
//! A round is replaced wholesale when the moderator starts the next one and
//! is finalized at most once. Whether a participant may vote is decided by
//! the registry; this module only guards the counters themselves.

use crate::config::SessionLimits;
use crate::errors::PollError;

use super::projector::{self, ResultView};

use chrono::{DateTime, Utc};
use common::types::RoundId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Moderator's request to start a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundSpec {
    /// Question text.
    pub prompt: String,
    /// Ordered option labels.
    pub options: Vec<String>,
    /// Vote-collection window.
    pub timer_seconds: u64,
    /// Designated correct option, revealed with the final results.
    #[serde(default)]
    pub correct_option: Option<String>,
}

impl RoundSpec {
    /// Trim text fields and check the spec against `limits`.
    ///
    /// Returns the normalized spec; labels are stored and matched trimmed.
    pub fn normalize(self, limits: &SessionLimits) -> Result<RoundSpec, PollError> {
        let prompt = self.prompt.trim().to_string();
        if prompt.is_empty() {
            return Err(PollError::InvalidRoundSpec(
                "prompt must not be empty".to_string(),
            ));
        }

        if self.options.len() < 2 {
            return Err(PollError::InvalidRoundSpec(
                "at least two options are required".to_string(),
            ));
        }
        if self.options.len() > limits.max_options {
            return Err(PollError::InvalidRoundSpec(format!(
                "at most {} options are allowed",
                limits.max_options
            )));
        }

        let options: Vec<String> = self
            .options
            .iter()
            .map(|option| option.trim().to_string())
            .collect();
        if options.iter().any(String::is_empty) {
            return Err(PollError::InvalidRoundSpec(
                "options must not be empty".to_string(),
            ));
        }
        let mut seen = HashSet::with_capacity(options.len());
        if !options.iter().all(|option| seen.insert(option.as_str())) {
            return Err(PollError::InvalidRoundSpec(
                "options must be distinct".to_string(),
            ));
        }

        if self.timer_seconds == 0 || self.timer_seconds > limits.max_timer_seconds {
            return Err(PollError::InvalidRoundSpec(format!(
                "timer must be between 1 and {} seconds",
                limits.max_timer_seconds
            )));
        }

        let correct_option = match self.correct_option {
            Some(correct) => {
                let correct = correct.trim().to_string();
                if !options.contains(&correct) {
                    return Err(PollError::InvalidRoundSpec(
                        "correct option must be one of the options".to_string(),
                    ));
                }
                Some(correct)
            }
            None => None,
        };

        Ok(RoundSpec {
            prompt,
            options,
            timer_seconds: self.timer_seconds,
            correct_option,
        })
    }
}

/// Vote counter for one option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionCount {
    /// Option label.
    pub label: String,
    /// Votes recorded for this option.
    pub votes: u64,
}

/// The active question.
#[derive(Debug, Clone)]
pub struct Round {
    id: RoundId,
    prompt: String,
    tally: Vec<OptionCount>,
    correct_option: Option<String>,
    timer_seconds: u64,
    finalized: bool,
    started_at: DateTime<Utc>,
}

impl Round {
    fn new(id: RoundId, spec: RoundSpec) -> Self {
        Self {
            id,
            prompt: spec.prompt,
            tally: spec
                .options
                .into_iter()
                .map(|label| OptionCount { label, votes: 0 })
                .collect(),
            correct_option: spec.correct_option,
            timer_seconds: spec.timer_seconds,
            finalized: false,
            started_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn id(&self) -> RoundId {
        self.id
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Option labels in moderator order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.tally.iter().map(|count| count.label.as_str())
    }

    /// Per-option counters in moderator order.
    #[must_use]
    pub fn tally(&self) -> &[OptionCount] {
        &self.tally
    }

    /// Sum of all counters.
    #[must_use]
    pub fn total_votes(&self) -> u64 {
        self.tally.iter().map(|count| count.votes).sum()
    }

    #[must_use]
    pub fn has_option(&self, label: &str) -> bool {
        self.tally.iter().any(|count| count.label == label)
    }

    #[must_use]
    pub fn correct_option(&self) -> Option<&str> {
        self.correct_option.as_deref()
    }

    #[must_use]
    pub fn timer_seconds(&self) -> u64 {
        self.timer_seconds
    }

    #[must_use]
    pub fn timer(&self) -> Duration {
        Duration::from_secs(self.timer_seconds)
    }

    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

/// Holds the current round, if any.
#[derive(Debug)]
pub struct SessionState {
    current: Option<Round>,
    next_id: RoundId,
    limits: SessionLimits,
}

impl SessionState {
    #[must_use]
    pub fn new(limits: SessionLimits) -> Self {
        Self {
            current: None,
            next_id: RoundId::FIRST,
            limits,
        }
    }

    /// Validate `spec` and replace the active round with a fresh one.
    ///
    /// On error nothing changes, including the next round id.
    pub fn start_round(&mut self, spec: RoundSpec) -> Result<RoundId, PollError> {
        let spec = spec.normalize(&self.limits)?;

        let id = self.next_id;
        self.next_id = id.next();
        self.current = Some(Round::new(id, spec));

        Ok(id)
    }

    /// Increment the counter for `option`.
    ///
    /// Returns false (no-op) without an active, collecting round or for an
    /// unknown label. Does not check who is voting.
    pub fn record_vote(&mut self, option: &str) -> bool {
        let Some(round) = self.current.as_mut() else {
            return false;
        };
        if round.finalized {
            return false;
        }

        match round.tally.iter_mut().find(|count| count.label == option) {
            Some(count) => {
                count.votes += 1;
                true
            }
            None => false,
        }
    }

    /// Mark the round finalized and return its final view.
    ///
    /// Idempotent: a second call leaves the round as is and returns the same view.
    pub fn finalize(&mut self) -> Option<ResultView> {
        let round = self.current.as_mut()?;
        round.finalized = true;
        Some(projector::project(round, true))
    }

    #[must_use]
    pub fn current(&self) -> Option<&Round> {
        self.current.as_ref()
    }

    #[must_use]
    pub fn current_id(&self) -> Option<RoundId> {
        self.current.as_ref().map(Round::id)
    }

    /// True while a round exists and still accepts votes.
    #[must_use]
    pub fn is_collecting(&self) -> bool {
        self.current.as_ref().is_some_and(|round| !round.finalized)
    }

    #[must_use]
    pub fn limits(&self) -> &SessionLimits {
        &self.limits
    }
}
