//! Pre-configured test data fixtures for session testing.

use common::types::ParticipantId;
use poll_service::session::RoundSpec;

/// Test round fixture.
///
/// Defaults to a two-option question with a 30 second timer and no correct
/// option.
#[derive(Debug, Clone)]
pub struct TestRound {
    /// Question text.
    pub prompt: String,
    /// Option labels, in order.
    pub options: Vec<String>,
    /// Timer length in seconds.
    pub timer_seconds: u64,
    /// Designated correct option.
    pub correct_option: Option<String>,
}

impl Default for TestRound {
    fn default() -> Self {
        Self::new()
    }
}

impl TestRound {
    /// Create the default test round.
    #[must_use]
    pub fn new() -> Self {
        Self {
            prompt: "Favourite colour?".to_string(),
            options: vec!["Red".to_string(), "Blue".to_string()],
            timer_seconds: 30,
            correct_option: None,
        }
    }

    /// Set the prompt.
    #[must_use]
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// Set the option labels.
    #[must_use]
    pub fn with_options(mut self, options: &[&str]) -> Self {
        self.options = options.iter().map(|o| (*o).to_string()).collect();
        self
    }

    /// Set the timer.
    #[must_use]
    pub fn with_timer_seconds(mut self, timer_seconds: u64) -> Self {
        self.timer_seconds = timer_seconds;
        self
    }

    /// Designate the correct option.
    #[must_use]
    pub fn with_correct_option(mut self, option: impl Into<String>) -> Self {
        self.correct_option = Some(option.into());
        self
    }

    /// Build the spec sent to the session.
    #[must_use]
    pub fn build(&self) -> RoundSpec {
        RoundSpec {
            prompt: self.prompt.clone(),
            options: self.options.clone(),
            timer_seconds: self.timer_seconds,
            correct_option: self.correct_option.clone(),
        }
    }
}

impl From<TestRound> for RoundSpec {
    fn from(round: TestRound) -> Self {
        round.build()
    }
}

/// Test participant fixture.
#[derive(Debug, Clone)]
pub struct TestParticipant {
    /// Connection-scoped participant ID.
    pub id: ParticipantId,
    /// Requested display name.
    pub name: String,
}

impl TestParticipant {
    /// Create a new test participant with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ParticipantId::new(),
            name: name.into(),
        }
    }

    /// Create `count` participants named "Participant 1", "Participant 2", ...
    #[must_use]
    pub fn many(count: usize) -> Vec<Self> {
        (1..=count)
            .map(|n| Self::new(format!("Participant {n}")))
            .collect()
    }
}
