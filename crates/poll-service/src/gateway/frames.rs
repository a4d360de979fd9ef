//! JSON frames exchanged with WebSocket clients.
//!
//! Inbound frames are `type`-tagged, snake_case:
//!
//! ```json
//! {"type":"start_round","prompt":"2+2?","options":["3","4"],"timer_seconds":30,"correct_option":"4"}
//! {"type":"join","name":"Ana"}
//! {"type":"cast_vote","option":"4"}
//! ```
//!
//! Outbound session events use [`OutboundEvent`](crate::actors::OutboundEvent);
//! the replies here are only ever sent to the requesting connection.

use crate::errors::PollError;
use crate::session::RoundSpec;

use common::types::RoundId;
use serde::{Deserialize, Serialize};

/// A frame received from a client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    /// Moderator starts a round.
    StartRound(RoundSpec),
    /// Participant votes.
    CastVote { option: String },
    /// Participant registers a display name.
    Join { name: String },
}

impl InboundFrame {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            InboundFrame::StartRound(_) => "start_round",
            InboundFrame::CastVote { .. } => "cast_vote",
            InboundFrame::Join { .. } => "join",
        }
    }
}

/// A reply addressed to the connection that sent the frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayReply {
    /// Name assigned after de-duplication.
    Joined { name: String },
    /// Round accepted; echoes the correct option back to the moderator.
    RoundAccepted {
        round_id: RoundId,
        #[serde(skip_serializing_if = "Option::is_none")]
        correct_option: Option<String>,
    },
    /// Request failed in a way the sender should see.
    Error { code: i32, message: String },
}

impl From<&PollError> for GatewayReply {
    fn from(err: &PollError) -> Self {
        GatewayReply::Error {
            code: err.error_code(),
            message: err.client_message(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_start_round() {
        let frame: InboundFrame = serde_json::from_str(
            r#"{"type":"start_round","prompt":"2+2?","options":["3","4"],"timer_seconds":30,"correct_option":"4"}"#,
        )
        .unwrap();

        assert_eq!(
            frame,
            InboundFrame::StartRound(RoundSpec {
                prompt: "2+2?".to_string(),
                options: vec!["3".to_string(), "4".to_string()],
                timer_seconds: 30,
                correct_option: Some("4".to_string()),
            })
        );
        assert_eq!(frame.kind(), "start_round");
    }

    #[test]
    fn test_parse_start_round_without_correct_option() {
        let frame: InboundFrame = serde_json::from_str(
            r#"{"type":"start_round","prompt":"Lunch?","options":["Pizza","Tacos"],"timer_seconds":45}"#,
        )
        .unwrap();

        let InboundFrame::StartRound(spec) = frame else {
            panic!("expected start_round");
        };
        assert!(spec.correct_option.is_none());
    }

    #[test]
    fn test_parse_vote_and_join() {
        let vote: InboundFrame =
            serde_json::from_str(r#"{"type":"cast_vote","option":"Red"}"#).unwrap();
        assert_eq!(
            vote,
            InboundFrame::CastVote {
                option: "Red".to_string()
            }
        );

        let join: InboundFrame = serde_json::from_str(r#"{"type":"join","name":"Ana"}"#).unwrap();
        assert_eq!(
            join,
            InboundFrame::Join {
                name: "Ana".to_string()
            }
        );
    }

    #[test]
    fn test_malformed_frames_fail_to_parse() {
        for raw in [
            r#"{"type":"shout","text":"hi"}"#,
            r#"{"type":"cast_vote"}"#,
            r#"{"type":"start_round","prompt":"x","options":["a","b"],"timer_seconds":-1}"#,
            "not json",
        ] {
            assert!(serde_json::from_str::<InboundFrame>(raw).is_err(), "{raw}");
        }
    }

    #[test]
    fn test_reply_wire_format() {
        let accepted = GatewayReply::RoundAccepted {
            round_id: RoundId(2),
            correct_option: None,
        };
        assert_eq!(
            serde_json::to_string(&accepted).unwrap(),
            r#"{"type":"round_accepted","round_id":2}"#
        );

        let error = GatewayReply::from(&PollError::InvalidRoundSpec(
            "options must be distinct".to_string(),
        ));
        assert_eq!(
            serde_json::to_string(&error).unwrap(),
            r#"{"type":"error","code":3,"message":"options must be distinct"}"#
        );
    }
}
