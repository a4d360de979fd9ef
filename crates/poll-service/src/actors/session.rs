//! `SessionActor` - the single writer for the polling session.
//!
//! The actor owns the [`VoteCoordinator`] and processes one mailbox message
//! at a time. Round timers run as separate tasks that post
//! `TimerExpired { round_id }` back into the same mailbox, so expiry is
//! serialized with votes and departures.
//!
//! # Notification Order
//!
//! | Event        | Emitted                                                      |
//! |--------------|--------------------------------------------------------------|
//! | start round  | `round_started`, `presence`                                  |
//! | vote         | `presence`, `partial_result` (voter), `final_result` if done  |
//! | join         | `presence`                                                   |
//! | leave        | `presence`, `final_result` if done                           |
//! | timer        | `final_result` if the round was still collecting             |
//!
//! Rejected votes emit nothing. All notifications for a message are published
//! before the reply is sent and before the next message is dequeued.

use crate::config::SessionLimits;
use crate::errors::PollError;
use crate::observability::metrics as prom;
use crate::session::{
    Finalization, JoinedParticipant, LeaveReceipt, RoundSpec, VoteCoordinator, VoteReceipt,
};

use super::messages::{
    Attached, Audience, Notification, OutboundEvent, RoundSnapshot, RoundStartedReceipt,
    SessionMessage, SessionSnapshot,
};
use super::metrics::{MailboxMonitor, SessionMetrics};

use common::types::{ParticipantId, RoundId};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Default channel buffer size for the session mailbox.
const SESSION_CHANNEL_BUFFER: usize = 500;

/// Handle to the `SessionActor`.
#[derive(Clone, Debug)]
pub struct SessionActorHandle {
    sender: mpsc::Sender<SessionMessage>,
    cancel_token: CancellationToken,
    session_id: String,
    notifications: broadcast::Sender<Notification>,
    mailbox: Arc<MailboxMonitor>,
}

impl SessionActorHandle {
    /// Get the session ID.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Subscribe to outbound notifications.
    ///
    /// Only notifications published after this call are received. Observers
    /// that also need the current state should use [`attach`](Self::attach).
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    /// Start a new round, replacing the current one.
    ///
    /// # Errors
    ///
    /// `InvalidRoundSpec` if the spec fails validation (nothing changes),
    /// `Draining` during shutdown, `Internal` if the actor is gone.
    pub async fn start_round(&self, spec: RoundSpec) -> Result<RoundStartedReceipt, PollError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionMessage::StartRound {
            spec,
            respond_to: tx,
        })
        .await?;

        rx.await
            .map_err(|e| PollError::Internal(format!("response receive failed: {e}")))?
    }

    /// Register a participant under a display name.
    pub async fn join(
        &self,
        participant_id: ParticipantId,
        name: String,
    ) -> Result<JoinedParticipant, PollError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionMessage::Join {
            participant_id,
            name,
            respond_to: tx,
        })
        .await?;

        rx.await
            .map_err(|e| PollError::Internal(format!("response receive failed: {e}")))?
    }

    /// Remove a participant.
    pub async fn leave(&self, participant_id: ParticipantId) -> Result<LeaveReceipt, PollError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionMessage::Leave {
            participant_id,
            respond_to: tx,
        })
        .await?;

        rx.await
            .map_err(|e| PollError::Internal(format!("response receive failed: {e}")))?
    }

    /// Cast a vote.
    ///
    /// # Errors
    ///
    /// `Rejected` or `AlreadyVoted` when the vote is not counted. The actor
    /// publishes nothing in either case.
    pub async fn cast_vote(
        &self,
        participant_id: ParticipantId,
        option: String,
    ) -> Result<VoteReceipt, PollError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionMessage::CastVote {
            participant_id,
            option,
            respond_to: tx,
        })
        .await?;

        rx.await
            .map_err(|e| PollError::Internal(format!("response receive failed: {e}")))?
    }

    /// Get current session state.
    pub async fn get_state(&self) -> Result<SessionSnapshot, PollError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionMessage::GetState { respond_to: tx })
            .await?;

        rx.await
            .map_err(|e| PollError::Internal(format!("response receive failed: {e}")))
    }

    /// Snapshot the session and subscribe to notifications in one step.
    ///
    /// Every event published before the snapshot is reflected in it, and
    /// every event after it arrives on the receiver, each exactly once.
    ///
    /// # Errors
    ///
    /// `Draining` during shutdown, `Internal` if the actor is gone.
    pub async fn attach(&self) -> Result<Attached, PollError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionMessage::Attach { respond_to: tx }).await?;

        rx.await
            .map_err(|e| PollError::Internal(format!("response receive failed: {e}")))
    }

    /// Current mailbox depth.
    #[must_use]
    pub fn mailbox_depth(&self) -> usize {
        self.mailbox.current_depth()
    }

    /// Cancel the session actor and any armed round timer.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Get a child token for tasks that should stop with the session.
    #[must_use]
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }

    async fn send(&self, message: SessionMessage) -> Result<(), PollError> {
        if self.cancel_token.is_cancelled() {
            return Err(PollError::Draining);
        }

        self.mailbox.record_enqueue();
        if let Err(e) = self.sender.send(message).await {
            self.mailbox.record_send_failure();
            return Err(PollError::Internal(format!("channel send failed: {e}")));
        }
        Ok(())
    }
}

/// The `SessionActor` implementation.
pub struct SessionActor {
    /// Session ID.
    session_id: String,
    /// Message receiver.
    receiver: mpsc::Receiver<SessionMessage>,
    /// Posts timer expiry without keeping the mailbox open.
    timer_sender: mpsc::WeakSender<SessionMessage>,
    /// Cancellation token (parent of every round timer).
    cancel_token: CancellationToken,
    /// Round state machine.
    coordinator: VoteCoordinator,
    /// Outbound notifications.
    notifications: broadcast::Sender<Notification>,
    /// Token of the armed round timer, if any.
    round_timer: Option<CancellationToken>,
    /// Whether the session is shutting down.
    is_shutting_down: bool,
    /// Shared session counters.
    metrics: Arc<SessionMetrics>,
    /// Mailbox monitor (shared with handles).
    mailbox: Arc<MailboxMonitor>,
}

impl SessionActor {
    /// Spawn the session actor.
    ///
    /// Returns a handle and the task join handle.
    ///
    /// # Arguments
    ///
    /// * `session_id` - Session identifier used in logs and snapshots
    /// * `limits` - Round and participant limits, including completion policy
    /// * `notification_buffer` - Capacity of the outbound broadcast channel
    /// * `cancel_token` - Cancellation token (stops the actor and its timers)
    /// * `metrics` - Shared session counters
    pub fn spawn(
        session_id: String,
        limits: SessionLimits,
        notification_buffer: usize,
        cancel_token: CancellationToken,
        metrics: Arc<SessionMetrics>,
    ) -> (SessionActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(SESSION_CHANNEL_BUFFER);
        let (notifications, _) = broadcast::channel(notification_buffer.max(1));
        let mailbox = Arc::new(MailboxMonitor::new(session_id.clone()));

        let actor = Self {
            session_id: session_id.clone(),
            receiver,
            timer_sender: sender.downgrade(),
            cancel_token: cancel_token.clone(),
            coordinator: VoteCoordinator::new(limits),
            notifications: notifications.clone(),
            round_timer: None,
            is_shutting_down: false,
            metrics,
            mailbox: Arc::clone(&mailbox),
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = SessionActorHandle {
            sender,
            cancel_token,
            session_id,
            notifications,
            mailbox,
        };

        (handle, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "poll.actor.session", fields(session_id = %self.session_id))]
    async fn run(mut self) {
        info!(
            target: "poll.actor.session",
            session_id = %self.session_id,
            policy = self.coordinator.policy().as_str(),
            "SessionActor started"
        );

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "poll.actor.session",
                        session_id = %self.session_id,
                        "SessionActor received cancellation signal"
                    );
                    self.shutdown();
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.mailbox.record_dequeue();
                            let kind = message.kind();
                            let started = Instant::now();
                            self.handle_message(message);
                            prom::record_message_latency(kind, started.elapsed());
                        }
                        None => {
                            info!(
                                target: "poll.actor.session",
                                session_id = %self.session_id,
                                "SessionActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "poll.actor.session",
            session_id = %self.session_id,
            participants = self.coordinator.registry().len(),
            messages_processed = self.mailbox.messages_processed(),
            peak_mailbox_depth = self.mailbox.peak_depth(),
            mailbox_level = ?self.mailbox.current_level(),
            "SessionActor stopped"
        );
    }

    /// Handle a single message.
    fn handle_message(&mut self, message: SessionMessage) {
        match message {
            SessionMessage::StartRound { spec, respond_to } => {
                let result = self.handle_start_round(spec);
                let _ = respond_to.send(result);
            }

            SessionMessage::Join {
                participant_id,
                name,
                respond_to,
            } => {
                let result = self.handle_join(participant_id, &name);
                let _ = respond_to.send(result);
            }

            SessionMessage::Leave {
                participant_id,
                respond_to,
            } => {
                let result = self.handle_leave(participant_id);
                let _ = respond_to.send(result);
            }

            SessionMessage::CastVote {
                participant_id,
                option,
                respond_to,
            } => {
                let result = self.handle_cast_vote(participant_id, &option);
                let _ = respond_to.send(result);
            }

            SessionMessage::TimerExpired { round_id } => {
                self.handle_timer_expired(round_id);
            }

            SessionMessage::GetState { respond_to } => {
                let _ = respond_to.send(self.get_state());
            }

            SessionMessage::Attach { respond_to } => {
                // Only this actor publishes, so nothing can slip in between
                let attached = Attached {
                    snapshot: self.get_state(),
                    notifications: self.notifications.subscribe(),
                };
                let _ = respond_to.send(attached);
            }
        }
    }

    fn handle_start_round(&mut self, spec: RoundSpec) -> Result<RoundStartedReceipt, PollError> {
        if self.is_shutting_down {
            return Err(PollError::Draining);
        }

        let round_id = self.coordinator.start_round(spec).inspect_err(|e| {
            debug!(
                target: "poll.actor.session",
                session_id = %self.session_id,
                error = %e,
                "Round spec refused"
            );
        })?;

        let round = self
            .coordinator
            .state()
            .current()
            .ok_or_else(|| PollError::Internal("round missing after start".to_string()))?;
        let receipt = RoundStartedReceipt {
            round_id,
            prompt: round.prompt().to_string(),
            options: round.labels().map(ToString::to_string).collect(),
            timer_seconds: round.timer_seconds(),
            correct_option: round.correct_option().map(ToString::to_string),
        };
        let timer = round.timer();

        self.arm_timer(round_id, timer);
        self.metrics.round_started();

        info!(
            target: "poll.actor.session",
            session_id = %self.session_id,
            round_id = %round_id,
            options = receipt.options.len(),
            timer_seconds = receipt.timer_seconds,
            participants = self.coordinator.registry().len(),
            "Round started"
        );

        self.publish(
            Audience::Everyone,
            OutboundEvent::RoundStarted {
                round_id,
                prompt: receipt.prompt.clone(),
                options: receipt.options.clone(),
                timer_seconds: receipt.timer_seconds,
            },
        );
        self.publish_presence();

        Ok(receipt)
    }

    fn handle_join(
        &mut self,
        participant_id: ParticipantId,
        name: &str,
    ) -> Result<JoinedParticipant, PollError> {
        if self.is_shutting_down {
            return Err(PollError::Draining);
        }

        let joined = self.coordinator.join(participant_id, name);
        self.metrics
            .set_participants(self.coordinator.registry().len());

        debug!(
            target: "poll.actor.session",
            session_id = %self.session_id,
            participant_id = %participant_id,
            rejoined = joined.rejoined,
            "Participant joined"
        );

        self.publish_presence();
        Ok(joined)
    }

    fn handle_leave(&mut self, participant_id: ParticipantId) -> Result<LeaveReceipt, PollError> {
        let receipt = self.coordinator.leave(participant_id).inspect_err(|e| {
            debug!(
                target: "poll.actor.session",
                session_id = %self.session_id,
                error = %e,
                "Leave ignored"
            );
        })?;
        self.metrics
            .set_participants(self.coordinator.registry().len());

        debug!(
            target: "poll.actor.session",
            session_id = %self.session_id,
            participant_id = %participant_id,
            remaining = self.coordinator.registry().len(),
            "Participant left"
        );

        self.publish_presence();
        if let Some(finalization) = &receipt.finalized {
            self.on_finalized(finalization);
        }

        Ok(receipt)
    }

    fn handle_cast_vote(
        &mut self,
        participant_id: ParticipantId,
        option: &str,
    ) -> Result<VoteReceipt, PollError> {
        let receipt = match self.coordinator.cast_vote(participant_id, option) {
            Ok(receipt) => receipt,
            Err(e) => {
                let outcome = if e == PollError::AlreadyVoted {
                    "already_voted"
                } else {
                    "rejected"
                };
                self.metrics.vote(outcome);
                debug!(
                    target: "poll.actor.session",
                    session_id = %self.session_id,
                    participant_id = %participant_id,
                    error = %e,
                    "Vote dropped"
                );
                return Err(e);
            }
        };

        self.metrics.vote("accepted");
        self.publish_presence();
        self.publish(
            Audience::Participant(participant_id),
            OutboundEvent::partial_result(&receipt.partial),
        );
        if let Some(finalization) = &receipt.finalized {
            self.on_finalized(finalization);
        }

        Ok(receipt)
    }

    fn handle_timer_expired(&mut self, round_id: RoundId) {
        match self.coordinator.on_timer_expired(round_id) {
            Some(finalization) => self.on_finalized(&finalization),
            None => {
                debug!(
                    target: "poll.actor.session",
                    session_id = %self.session_id,
                    round_id = %round_id,
                    "Timer expired for a replaced or finished round"
                );
            }
        }
    }

    fn on_finalized(&mut self, finalization: &Finalization) {
        self.disarm_timer();
        self.metrics.round_finalized(finalization.trigger.as_str());

        info!(
            target: "poll.actor.session",
            session_id = %self.session_id,
            round_id = %finalization.view.round_id,
            trigger = finalization.trigger.as_str(),
            total_votes = finalization.view.total_votes,
            "Round finalized"
        );

        self.publish(
            Audience::Everyone,
            OutboundEvent::final_result(&finalization.view),
        );
    }

    /// Arm the timer for `round_id`, cancelling any previous one.
    fn arm_timer(&mut self, round_id: RoundId, duration: Duration) {
        self.disarm_timer();

        let token = self.cancel_token.child_token();
        self.round_timer = Some(token.clone());

        let sender = self.timer_sender.clone();
        let mailbox = Arc::clone(&self.mailbox);
        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = tokio::time::sleep(duration) => {
                    let Some(sender) = sender.upgrade() else {
                        return;
                    };
                    mailbox.record_enqueue();
                    if sender
                        .send(SessionMessage::TimerExpired { round_id })
                        .await
                        .is_err()
                    {
                        mailbox.record_send_failure();
                    }
                }
            }
        });
    }

    fn disarm_timer(&mut self) {
        if let Some(token) = self.round_timer.take() {
            token.cancel();
        }
    }

    fn get_state(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id.clone(),
            round: self.coordinator.state().current().map(RoundSnapshot::of),
            participants: self.coordinator.registry().snapshot(),
            mailbox_depth: self.mailbox.current_depth(),
            is_shutting_down: self.is_shutting_down,
        }
    }

    fn publish_presence(&self) {
        self.publish(
            Audience::Everyone,
            OutboundEvent::Presence {
                participants: self.coordinator.registry().snapshot(),
            },
        );
    }

    fn publish(&self, audience: Audience, event: OutboundEvent) {
        let kind = event.kind();
        // No subscribers is normal before the gateway accepts a connection
        if self.notifications.send(Notification { audience, event }).is_err() {
            debug!(
                target: "poll.actor.session",
                session_id = %self.session_id,
                event = kind,
                "No notification subscribers"
            );
        }
    }

    fn shutdown(&mut self) {
        self.is_shutting_down = true;
        self.disarm_timer();

        if self.coordinator.state().is_collecting() {
            warn!(
                target: "poll.actor.session",
                session_id = %self.session_id,
                round_id = ?self.coordinator.state().current_id(),
                "Shutting down with a round still collecting votes"
            );
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;
    use crate::errors::RejectReason;
    use crate::session::FinalizeTrigger;
    use tokio::sync::broadcast::error::TryRecvError;

    fn spawn_session() -> (SessionActorHandle, Arc<SessionMetrics>) {
        let metrics = SessionMetrics::new();
        let (handle, _task) = SessionActor::spawn(
            "poll-test".to_string(),
            SessionLimits::default(),
            64,
            CancellationToken::new(),
            Arc::clone(&metrics),
        );
        (handle, metrics)
    }

    fn spec(options: &[&str], timer_seconds: u64) -> RoundSpec {
        RoundSpec {
            prompt: "Favorite color?".to_string(),
            options: options.iter().map(ToString::to_string).collect(),
            timer_seconds,
            correct_option: None,
        }
    }

    fn drain(rx: &mut broadcast::Receiver<Notification>) -> Vec<Notification> {
        let mut out = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(notification) => out.push(notification),
                Err(TryRecvError::Empty | TryRecvError::Closed) => return out,
                Err(TryRecvError::Lagged(_)) => {}
            }
        }
    }

    fn kinds(notifications: &[Notification]) -> Vec<&'static str> {
        notifications.iter().map(|n| n.event.kind()).collect()
    }

    async fn join_many(handle: &SessionActorHandle, count: usize) -> Vec<ParticipantId> {
        let mut ids = Vec::with_capacity(count);
        for i in 0..count {
            let id = ParticipantId::new();
            handle.join(id, format!("Student {i}")).await.unwrap();
            ids.push(id);
        }
        ids
    }

    #[tokio::test]
    async fn test_session_actor_spawn() {
        let (handle, _metrics) = spawn_session();

        assert_eq!(handle.session_id(), "poll-test");
        assert!(!handle.is_cancelled());

        handle.cancel();
        assert!(handle.is_cancelled());
    }

    #[tokio::test]
    async fn test_start_round_withholds_correct_option_from_broadcast() {
        let (handle, metrics) = spawn_session();
        let mut rx = handle.subscribe();

        let receipt = handle
            .start_round(RoundSpec {
                correct_option: Some("Blue".to_string()),
                ..spec(&["Red", "Blue"], 30)
            })
            .await
            .unwrap();

        assert_eq!(receipt.round_id, RoundId::FIRST);
        assert_eq!(receipt.correct_option.as_deref(), Some("Blue"));

        let notifications = drain(&mut rx);
        assert_eq!(kinds(&notifications), vec!["round_started", "presence"]);
        let json = serde_json::to_string(&notifications[0].event).unwrap();
        assert!(!json.contains("correct_option"));
        assert_eq!(metrics.snapshot().rounds_started, 1);

        handle.cancel();
    }

    #[tokio::test]
    async fn test_invalid_round_emits_nothing() {
        let (handle, _metrics) = spawn_session();
        let mut rx = handle.subscribe();

        let result = handle.start_round(spec(&["A", "A"], 30)).await;

        assert!(matches!(result, Err(PollError::InvalidRoundSpec(_))));
        assert!(drain(&mut rx).is_empty());
        assert!(handle.get_state().await.unwrap().round.is_none());

        handle.cancel();
    }

    #[tokio::test]
    async fn test_all_voted_finalizes_with_unicast_partials() {
        let (handle, metrics) = spawn_session();
        let ids = join_many(&handle, 2).await;
        handle.start_round(spec(&["Red", "Blue"], 30)).await.unwrap();
        let mut rx = handle.subscribe();

        handle.cast_vote(ids[0], "Red".to_string()).await.unwrap();
        let notifications = drain(&mut rx);
        assert_eq!(kinds(&notifications), vec!["presence", "partial_result"]);
        assert_eq!(notifications[1].audience, Audience::Participant(ids[0]));

        let receipt = handle.cast_vote(ids[1], "Red".to_string()).await.unwrap();
        assert_eq!(
            receipt.finalized.map(|f| f.trigger),
            Some(FinalizeTrigger::AllVoted)
        );

        let notifications = drain(&mut rx);
        assert_eq!(
            kinds(&notifications),
            vec!["presence", "partial_result", "final_result"]
        );
        assert_eq!(notifications[2].audience, Audience::Everyone);
        let OutboundEvent::FinalResult { options, .. } = &notifications[2].event else {
            panic!("expected final_result");
        };
        assert_eq!(options.get("Red"), Some(100.0));
        assert_eq!(options.get("Blue"), Some(0.0));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.votes_accepted, 2);
        assert_eq!(snapshot.rounds_finalized, 1);

        handle.cancel();
    }

    #[tokio::test]
    async fn test_rejected_votes_emit_nothing() {
        let (handle, metrics) = spawn_session();
        let ids = join_many(&handle, 2).await;
        let mut rx = handle.subscribe();

        let result = handle.cast_vote(ids[0], "Red".to_string()).await;
        assert_eq!(
            result.map(|_| ()),
            Err(PollError::Rejected(RejectReason::NoActiveRound))
        );

        handle.start_round(spec(&["Red", "Blue"], 30)).await.unwrap();
        drain(&mut rx);

        handle.cast_vote(ids[0], "Red".to_string()).await.unwrap();
        drain(&mut rx);

        let result = handle.cast_vote(ids[0], "Blue".to_string()).await;
        assert_eq!(result.map(|_| ()), Err(PollError::AlreadyVoted));
        assert!(drain(&mut rx).is_empty());
        assert_eq!(metrics.snapshot().votes_rejected, 2);

        handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_finalizes_partial_turnout() {
        let (handle, _metrics) = spawn_session();
        let ids = join_many(&handle, 3).await;
        handle.start_round(spec(&["Red", "Blue"], 30)).await.unwrap();
        handle.cast_vote(ids[0], "Red".to_string()).await.unwrap();
        handle.cast_vote(ids[1], "Blue".to_string()).await.unwrap();
        let mut rx = handle.subscribe();

        tokio::time::advance(Duration::from_secs(29)).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(drain(&mut rx).is_empty(), "timer fired early");

        tokio::time::advance(Duration::from_secs(2)).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        let notifications = drain(&mut rx);
        assert_eq!(kinds(&notifications), vec!["final_result"]);

        let state = handle.get_state().await.unwrap();
        let round = state.round.unwrap();
        assert!(round.is_finalized);
        assert_eq!(round.results.total_votes, 2);

        let late = handle.cast_vote(ids[2], "Red".to_string()).await;
        assert_eq!(
            late.map(|_| ()),
            Err(PollError::Rejected(RejectReason::RoundFinalized))
        );

        handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_round_cancels_previous_timer() {
        let (handle, _metrics) = spawn_session();
        join_many(&handle, 2).await;
        handle.start_round(spec(&["Red", "Blue"], 10)).await.unwrap();
        let second = handle.start_round(spec(&["Yes", "No"], 60)).await.unwrap();
        let mut rx = handle.subscribe();

        tokio::time::advance(Duration::from_secs(15)).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(drain(&mut rx).is_empty());
        let state = handle.get_state().await.unwrap();
        let round = state.round.unwrap();
        assert_eq!(round.round_id, second.round_id);
        assert!(!round.is_finalized);

        tokio::time::advance(Duration::from_secs(50)).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(kinds(&drain(&mut rx)), vec!["final_result"]);

        handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_final_result_emitted_once_when_timer_loses_race() {
        let (handle, metrics) = spawn_session();
        let ids = join_many(&handle, 2).await;
        handle.start_round(spec(&["Red", "Blue"], 5)).await.unwrap();
        let mut rx = handle.subscribe();

        handle.cast_vote(ids[0], "Red".to_string()).await.unwrap();
        handle.cast_vote(ids[1], "Blue".to_string()).await.unwrap();

        tokio::time::advance(Duration::from_secs(10)).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        let finals = drain(&mut rx)
            .into_iter()
            .filter(|n| n.event.kind() == "final_result")
            .count();
        assert_eq!(finals, 1);
        assert_eq!(metrics.snapshot().rounds_finalized, 1);

        handle.cancel();
    }

    #[tokio::test]
    async fn test_last_non_voter_leaving_finalizes() {
        let (handle, _metrics) = spawn_session();
        let ids = join_many(&handle, 2).await;
        handle.start_round(spec(&["Red", "Blue"], 30)).await.unwrap();
        handle.cast_vote(ids[0], "Blue".to_string()).await.unwrap();
        let mut rx = handle.subscribe();

        let receipt = handle.leave(ids[1]).await.unwrap();

        assert_eq!(
            receipt.finalized.map(|f| f.trigger),
            Some(FinalizeTrigger::Departure)
        );
        assert_eq!(kinds(&drain(&mut rx)), vec!["presence", "final_result"]);

        handle.cancel();
    }

    #[tokio::test]
    async fn test_join_dedupes_names_and_publishes_presence() {
        let (handle, metrics) = spawn_session();
        let mut rx = handle.subscribe();

        let first = handle.join(ParticipantId::new(), "Ana".to_string()).await.unwrap();
        let second = handle.join(ParticipantId::new(), "Ana".to_string()).await.unwrap();

        assert_eq!(first.name, "Ana");
        assert_eq!(second.name, "Ana (1)");
        assert_eq!(kinds(&drain(&mut rx)), vec!["presence", "presence"]);
        assert_eq!(metrics.snapshot().participants, 2);

        handle.cancel();
    }

    #[tokio::test]
    async fn test_get_state_reports_round_and_presence() {
        let (handle, _metrics) = spawn_session();
        let ids = join_many(&handle, 2).await;
        handle.start_round(spec(&["Red", "Blue"], 30)).await.unwrap();
        handle.cast_vote(ids[0], "Red".to_string()).await.unwrap();

        let state = handle.get_state().await.unwrap();

        assert_eq!(state.session_id, "poll-test");
        assert!(!state.is_shutting_down);
        assert_eq!(state.participants.len(), 2);
        assert!(state.participants[0].voted);
        let round = state.round.unwrap();
        assert!(!round.is_finalized);
        assert!(round.results.correct_option.is_none());
        assert_eq!(round.results.total_votes, 1);

        handle.cancel();
    }

    #[tokio::test]
    async fn test_cancelled_handle_returns_draining() {
        let (handle, _metrics) = spawn_session();
        handle.cancel();

        let result = handle.join(ParticipantId::new(), "Ana".to_string()).await;
        assert_eq!(result.map(|_| ()), Err(PollError::Draining));
    }

    #[tokio::test]
    async fn test_actor_exits_on_cancel() {
        let metrics = SessionMetrics::new();
        let cancel_token = CancellationToken::new();
        let (handle, task) = SessionActor::spawn(
            "poll-cancel".to_string(),
            SessionLimits::default(),
            16,
            cancel_token.clone(),
            metrics,
        );
        handle.start_round(spec(&["Red", "Blue"], 30)).await.unwrap();

        cancel_token.cancel();

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("actor should stop")
            .expect("actor should not panic");
    }

    fn final_count(events: &[OutboundEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, OutboundEvent::FinalResult { .. }))
            .count()
    }

    #[tokio::test]
    async fn test_attach_after_finalize_sends_final_result_once() {
        let (handle, _metrics) = spawn_session();
        let ids = join_many(&handle, 1).await;
        handle.start_round(spec(&["Red", "Blue"], 30)).await.unwrap();
        handle.cast_vote(ids[0], "Red".to_string()).await.unwrap();

        let Attached {
            snapshot,
            mut notifications,
        } = handle.attach().await.unwrap();

        let catch_up = snapshot.catch_up_events(chrono::Utc::now());
        assert_eq!(final_count(&catch_up), 1);
        assert!(drain(&mut notifications).is_empty());

        handle.cancel();
    }

    #[tokio::test]
    async fn test_attach_racing_finalizing_vote_sees_one_final_result() {
        for _ in 0..20 {
            let (handle, _metrics) = spawn_session();
            let ids = join_many(&handle, 1).await;
            handle.start_round(spec(&["Red", "Blue"], 30)).await.unwrap();

            let (vote, attached) = tokio::join!(
                handle.cast_vote(ids[0], "Red".to_string()),
                handle.attach()
            );
            vote.unwrap();
            let Attached {
                snapshot,
                mut notifications,
            } = attached.unwrap();

            let mut seen = snapshot.catch_up_events(chrono::Utc::now());
            seen.extend(drain(&mut notifications).into_iter().map(|n| n.event));
            assert_eq!(final_count(&seen), 1, "events: {seen:?}");

            handle.cancel();
        }
    }

    #[tokio::test]
    async fn test_attach_after_cancel_returns_draining() {
        let (handle, _metrics) = spawn_session();
        handle.cancel();

        assert_eq!(handle.attach().await.map(|_| ()), Err(PollError::Draining));
    }
}
