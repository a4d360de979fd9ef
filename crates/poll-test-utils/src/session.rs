//! Session actor harness.

use crate::collector::NotificationCollector;
use crate::fixtures::{TestParticipant, TestRound};

use common::types::RoundId;
use poll_service::actors::{SessionActor, SessionActorHandle, SessionMetrics};
use poll_service::config::SessionLimits;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Notification buffer used by test sessions.
pub const TEST_NOTIFICATION_BUFFER: usize = 256;

/// A spawned session actor that is cancelled when dropped.
#[derive(Debug)]
pub struct TestSession {
    pub handle: SessionActorHandle,
    pub metrics: Arc<SessionMetrics>,
    task: Option<JoinHandle<()>>,
}

impl TestSession {
    /// Spawn with default limits.
    #[must_use]
    pub fn spawn() -> Self {
        Self::spawn_with(SessionLimits::default())
    }

    /// Spawn with custom limits.
    #[must_use]
    pub fn spawn_with(limits: SessionLimits) -> Self {
        let metrics = SessionMetrics::new();
        let (handle, task) = SessionActor::spawn(
            "poll-test-session".to_string(),
            limits,
            TEST_NOTIFICATION_BUFFER,
            CancellationToken::new(),
            Arc::clone(&metrics),
        );
        Self {
            handle,
            metrics,
            task: Some(task),
        }
    }

    /// Subscribe a collector to the session's notifications.
    #[must_use]
    pub fn collector(&self) -> NotificationCollector {
        NotificationCollector::new(self.handle.subscribe())
    }

    /// Join and return the assigned display name.
    ///
    /// # Panics
    ///
    /// Panics if the join fails.
    pub async fn join(&self, participant: &TestParticipant) -> String {
        self.handle
            .join(participant.id, participant.name.clone())
            .await
            .expect("join should succeed")
            .name
    }

    /// Start a round and return its id.
    ///
    /// # Panics
    ///
    /// Panics if the round is refused.
    pub async fn start(&self, round: TestRound) -> RoundId {
        self.handle
            .start_round(round.build())
            .await
            .expect("round should start")
            .round_id
    }

    /// Cancel the actor and wait for it to exit.
    ///
    /// # Panics
    ///
    /// Panics if the actor task panicked.
    pub async fn shutdown(mut self) {
        self.handle.cancel();
        if let Some(task) = self.task.take() {
            task.await.expect("session actor should exit cleanly");
        }
    }
}

impl Drop for TestSession {
    fn drop(&mut self) {
        self.handle.cancel();
    }
}
