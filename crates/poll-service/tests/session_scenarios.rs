//! End-to-end session scenarios driven through `SessionActorHandle`.
//!
//! Uses tokio's paused clock so round timers fire exactly when advanced.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

use std::time::Duration;

use poll_service::actors::OutboundEvent;
use poll_service::config::{CompletionPolicy, SessionLimits};
use poll_service::errors::{PollError, RejectReason};
use poll_service::session::PresenceEntry;
use poll_test_utils::collector::{final_results, single_final_result, wire};
use poll_test_utils::{TestParticipant, TestRound, TestSession};

/// Let the timer task post into the mailbox and the actor drain it.
async fn advance(duration: Duration) {
    tokio::time::advance(duration).await;
    tokio::time::sleep(Duration::from_millis(10)).await;
}

fn names(participants: &[PresenceEntry]) -> Vec<(&str, bool)> {
    participants
        .iter()
        .map(|p| (p.name.as_str(), p.voted))
        .collect()
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_everyone_votes_same_option_finalizes_immediately() {
    let session = TestSession::spawn();
    let mut events = session.collector();
    let (ana, ben) = (TestParticipant::new("Ana"), TestParticipant::new("Ben"));
    session.join(&ana).await;
    session.join(&ben).await;
    let round_id = session
        .start(TestRound::new().with_options(&["Red", "Blue"]))
        .await;
    events.drain();

    session
        .handle
        .cast_vote(ana.id, "Red".to_string())
        .await
        .unwrap();
    let after_first = events.drain();
    assert!(final_results(&after_first).is_empty());

    session
        .handle
        .cast_vote(ben.id, "Red".to_string())
        .await
        .unwrap();
    let after_second = events.drain();

    let kinds: Vec<_> = after_second.iter().map(|n| n.event.kind()).collect();
    assert_eq!(kinds, vec!["presence", "partial_result", "final_result"]);

    let result = single_final_result(&after_second);
    assert_eq!(result.round_id, round_id);
    assert_eq!(result.options.get("Red"), Some(100.0));
    assert_eq!(result.options.get("Blue"), Some(0.0));
    assert_eq!(result.correct_option, None);

    let final_event = &after_second[2].event;
    assert_eq!(
        wire(final_event),
        serde_json::json!({
            "type": "final_result",
            "round_id": 1,
            "options": {"Red": 100.0, "Blue": 0.0}
        })
    );

    // Timer expiry after early finalization publishes nothing
    advance(Duration::from_secs(31)).await;
    assert!(events.drain().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_timer_finalizes_partial_turnout_and_rejects_late_vote() {
    let session = TestSession::spawn();
    let mut events = session.collector();
    let voters = TestParticipant::many(3);
    for voter in &voters {
        session.join(voter).await;
    }
    session
        .start(
            TestRound::new()
                .with_options(&["Red", "Blue"])
                .with_timer_seconds(30)
                .with_correct_option("Blue"),
        )
        .await;

    session
        .handle
        .cast_vote(voters[0].id, "Red".to_string())
        .await
        .unwrap();
    session
        .handle
        .cast_vote(voters[1].id, "Blue".to_string())
        .await
        .unwrap();
    events.drain();

    advance(Duration::from_secs(29)).await;
    assert!(events.drain().is_empty(), "timer must not fire early");

    advance(Duration::from_secs(2)).await;
    let fired = events.drain();
    let result = single_final_result(&fired);
    assert_eq!(result.options.get("Red"), Some(50.0));
    assert_eq!(result.options.get("Blue"), Some(50.0));
    assert_eq!(result.correct_option.as_deref(), Some("Blue"));

    let late = session
        .handle
        .cast_vote(voters[2].id, "Red".to_string())
        .await;
    assert_eq!(late, Err(PollError::Rejected(RejectReason::RoundFinalized)));
    assert!(events.drain().is_empty(), "rejected votes are silent");
}

#[tokio::test]
async fn test_duplicate_names_are_suffixed() {
    let session = TestSession::spawn();
    let mut events = session.collector();

    let first = session.join(&TestParticipant::new("Ana")).await;
    let second = session.join(&TestParticipant::new("Ana")).await;
    let third = session.join(&TestParticipant::new("Ana")).await;

    assert_eq!(first, "Ana");
    assert_eq!(second, "Ana (1)");
    assert_eq!(third, "Ana (2)");

    let last_presence = events
        .drain()
        .into_iter()
        .filter_map(|n| match n.event {
            OutboundEvent::Presence { participants } => Some(participants),
            _ => None,
        })
        .last()
        .unwrap();
    assert_eq!(
        names(&last_presence),
        vec![("Ana", false), ("Ana (1)", false), ("Ana (2)", false)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_non_voter_leaving_finalizes_round() {
    let session = TestSession::spawn();
    let mut events = session.collector();
    let (voter, idler) = (TestParticipant::new("Ana"), TestParticipant::new("Ben"));
    session.join(&voter).await;
    session.join(&idler).await;
    session.start(TestRound::new()).await;
    session
        .handle
        .cast_vote(voter.id, "Blue".to_string())
        .await
        .unwrap();
    events.drain();

    let receipt = session.handle.leave(idler.id).await.unwrap();
    assert!(receipt.finalized.is_some());

    let notifications = events.drain();
    let kinds: Vec<_> = notifications.iter().map(|n| n.event.kind()).collect();
    assert_eq!(kinds, vec!["presence", "final_result"]);
    match &notifications[0].event {
        OutboundEvent::Presence { participants } => {
            assert_eq!(names(participants), vec![("Ana", true)]);
        }
        other => panic!("expected presence, got {other:?}"),
    }
    assert_eq!(
        single_final_result(&notifications).options.get("Blue"),
        Some(100.0)
    );

    let snapshot = session.metrics.snapshot();
    assert_eq!(snapshot.participants, 1);
    assert_eq!(snapshot.rounds_finalized, 1);

    // The timer for the finished round is disarmed
    advance(Duration::from_secs(31)).await;
    assert!(events.drain().is_empty());
}

#[tokio::test]
async fn test_duplicate_options_refused_without_state_change() {
    let session = TestSession::spawn();
    let mut events = session.collector();
    let ana = TestParticipant::new("Ana");
    session.join(&ana).await;
    let first = session.start(TestRound::new()).await;
    events.drain();

    let result = session
        .handle
        .start_round(TestRound::new().with_options(&["A", "A"]).build())
        .await;
    assert!(matches!(result, Err(PollError::InvalidRoundSpec(_))));
    assert!(events.drain().is_empty());

    let state = session.handle.get_state().await.unwrap();
    let round = state.round.expect("previous round kept");
    assert_eq!(round.round_id, first);
    assert_eq!(round.options, vec!["Red", "Blue"]);
    assert!(!round.is_finalized);

    // A refused start does not consume a round id
    let next = session.start(TestRound::new()).await;
    assert_eq!(next, first.next());
}

// ============================================================================
// Round lifecycle
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_new_round_resets_votes_and_ignores_stale_timer() {
    let session = TestSession::spawn();
    let mut events = session.collector();
    let (ana, ben) = (TestParticipant::new("Ana"), TestParticipant::new("Ben"));
    session.join(&ana).await;
    session.join(&ben).await;

    session
        .start(TestRound::new().with_timer_seconds(10))
        .await;
    session
        .handle
        .cast_vote(ana.id, "Red".to_string())
        .await
        .unwrap();

    advance(Duration::from_secs(5)).await;
    let second = session
        .start(
            TestRound::new()
                .with_options(&["Yes", "No", "Maybe"])
                .with_timer_seconds(60),
        )
        .await;
    let started = events.drain();
    match &started.last().unwrap().event {
        OutboundEvent::Presence { participants } => {
            assert!(participants.iter().all(|p| !p.voted), "vote flags reset");
        }
        other => panic!("expected presence, got {other:?}"),
    }

    // Ana may vote again in the new round
    session
        .handle
        .cast_vote(ana.id, "Maybe".to_string())
        .await
        .unwrap();
    events.drain();

    // The first round's 10s timer would have fired here
    advance(Duration::from_secs(10)).await;
    assert!(events.drain().is_empty());

    advance(Duration::from_secs(50)).await;
    let result = single_final_result(&events.drain());
    assert_eq!(result.round_id, second);
    assert_eq!(result.options.get("Maybe"), Some(100.0));
    assert_eq!(result.options.get("Yes"), Some(0.0));
}

#[tokio::test]
async fn test_second_vote_is_silently_dropped() {
    let session = TestSession::spawn();
    let mut events = session.collector();
    let (ana, ben) = (TestParticipant::new("Ana"), TestParticipant::new("Ben"));
    session.join(&ana).await;
    session.join(&ben).await;
    session.start(TestRound::new()).await;

    session
        .handle
        .cast_vote(ana.id, "Red".to_string())
        .await
        .unwrap();
    events.drain();

    let again = session
        .handle
        .cast_vote(ana.id, "Blue".to_string())
        .await;
    assert_eq!(again, Err(PollError::AlreadyVoted));
    assert!(events.drain().is_empty());

    let snapshot = session.metrics.snapshot();
    assert_eq!(snapshot.votes_accepted, 1);
    assert_eq!(snapshot.votes_rejected, 1);
}

#[tokio::test]
async fn test_partial_result_goes_only_to_voter() {
    let session = TestSession::spawn();
    let mut events = session.collector();
    let voters = TestParticipant::many(3);
    for voter in &voters {
        session.join(voter).await;
    }
    session.start(TestRound::new()).await;
    events.drain();

    session
        .handle
        .cast_vote(voters[0].id, "Blue".to_string())
        .await
        .unwrap();
    let notifications = events.drain();

    let for_voter: Vec<_> = notifications
        .iter()
        .filter(|n| n.audience.includes(voters[0].id))
        .map(|n| n.event.kind())
        .collect();
    let for_other: Vec<_> = notifications
        .iter()
        .filter(|n| n.audience.includes(voters[1].id))
        .map(|n| n.event.kind())
        .collect();

    assert_eq!(for_voter, vec!["presence", "partial_result"]);
    assert_eq!(for_other, vec!["presence"]);
}

// ============================================================================
// Completion policy
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_late_joiner_blocks_completion_when_all_connected() {
    let session = TestSession::spawn();
    let mut events = session.collector();
    let ana = TestParticipant::new("Ana");
    session.join(&ana).await;
    session.start(TestRound::new()).await;

    session.join(&TestParticipant::new("Late")).await;
    session
        .handle
        .cast_vote(ana.id, "Red".to_string())
        .await
        .unwrap();
    assert!(final_results(&events.drain()).is_empty());

    advance(Duration::from_secs(31)).await;
    assert_eq!(final_results(&events.drain()).len(), 1);
}

#[tokio::test]
async fn test_late_joiner_does_not_block_round_roster() {
    let session = TestSession::spawn_with(SessionLimits {
        completion_policy: CompletionPolicy::RoundRoster,
        ..SessionLimits::default()
    });
    let mut events = session.collector();
    let ana = TestParticipant::new("Ana");
    let late = TestParticipant::new("Late");
    session.join(&ana).await;
    session.start(TestRound::new()).await;
    session.join(&late).await;
    events.drain();

    session
        .handle
        .cast_vote(ana.id, "Red".to_string())
        .await
        .unwrap();
    let result = single_final_result(&events.drain());
    assert_eq!(result.options.get("Red"), Some(100.0));

    // Finalized before the late joiner voted
    let late_vote = session
        .handle
        .cast_vote(late.id, "Blue".to_string())
        .await;
    assert_eq!(
        late_vote,
        Err(PollError::Rejected(RejectReason::RoundFinalized))
    );
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test]
async fn test_shutdown_drains_requests() {
    let session = TestSession::spawn();
    let handle = session.handle.clone();
    session.shutdown().await;

    let result = handle.join(TestParticipant::new("Ana").id, "Ana".to_string()).await;
    assert_eq!(result.map(|j| j.name), Err(PollError::Draining));
}
