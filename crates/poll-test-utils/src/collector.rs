//! Notification collector for asserting on what a session published.

use common::types::{ParticipantId, RoundId};
use poll_service::actors::{Notification, OutboundEvent};
use poll_service::session::Percentages;
use tokio::sync::broadcast::{self, error::TryRecvError};

/// Wraps a broadcast receiver and drains whatever is queued.
///
/// Session notifications are published before the request's reply is sent,
/// so draining right after an awaited handle call sees all of them.
#[derive(Debug)]
pub struct NotificationCollector {
    rx: broadcast::Receiver<Notification>,
}

impl NotificationCollector {
    #[must_use]
    pub fn new(rx: broadcast::Receiver<Notification>) -> Self {
        Self { rx }
    }

    /// Take every queued notification.
    ///
    /// # Panics
    ///
    /// Panics if the receiver lagged; tests should size the buffer so that
    /// never happens.
    pub fn drain(&mut self) -> Vec<Notification> {
        let mut out = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(notification) => out.push(notification),
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
                Err(TryRecvError::Lagged(n)) => panic!("collector lagged by {n} notifications"),
            }
        }
        out
    }

    /// Drain and return only the event kinds, in order.
    pub fn kinds(&mut self) -> Vec<&'static str> {
        self.drain().iter().map(|n| n.event.kind()).collect()
    }

    /// Drain and keep the events a given participant's connection would see.
    pub fn drain_for(&mut self, participant_id: ParticipantId) -> Vec<OutboundEvent> {
        self.drain()
            .into_iter()
            .filter(|n| n.audience.includes(participant_id))
            .map(|n| n.event)
            .collect()
    }
}

/// Final result fields pulled out of an event list.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalResult {
    pub round_id: RoundId,
    pub options: Percentages,
    pub correct_option: Option<String>,
}

/// All `final_result` events in `notifications`, in order.
#[must_use]
pub fn final_results(notifications: &[Notification]) -> Vec<FinalResult> {
    notifications
        .iter()
        .filter_map(|n| match &n.event {
            OutboundEvent::FinalResult {
                round_id,
                options,
                correct_option,
            } => Some(FinalResult {
                round_id: *round_id,
                options: options.clone(),
                correct_option: correct_option.clone(),
            }),
            _ => None,
        })
        .collect()
}

/// Exactly one `final_result` must be present.
///
/// # Panics
///
/// Panics when there are zero or several.
#[must_use]
pub fn single_final_result(notifications: &[Notification]) -> FinalResult {
    let mut finals = final_results(notifications);
    assert_eq!(
        finals.len(),
        1,
        "expected exactly one final_result, got {finals:?}"
    );
    finals.remove(0)
}

/// Serialize an event as a client would receive it.
///
/// # Panics
///
/// Panics if the event cannot be serialized.
#[must_use]
pub fn wire(event: &OutboundEvent) -> serde_json::Value {
    serde_json::to_value(event).expect("event serializes")
}
