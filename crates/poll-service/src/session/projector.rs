//! `ResultProjector` - percentage breakdowns derived from a round's tally.
//!
//! Pure and side-effect-free. The same projection backs the voter's personal
//! partial view and the broadcast final view; only the final flag differs.

use super::round::Round;

use common::types::RoundId;
use serde::ser::{Serialize, SerializeMap, Serializer};

/// One option's share of the votes.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionResult {
    /// Option label.
    pub option: String,
    /// Raw vote count.
    pub votes: u64,
    /// Share of all votes, rounded to two decimals.
    pub percent: f64,
}

/// Projection of a round's tally.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultView {
    /// Round the view was taken from.
    pub round_id: RoundId,
    /// Per-option results in moderator order.
    pub options: Vec<OptionResult>,
    /// Votes cast so far.
    pub total_votes: u64,
    /// False for a personal view taken while the round still collects votes.
    pub is_final: bool,
    /// Only populated on final views.
    pub correct_option: Option<String>,
}

impl ResultView {
    /// Percentage for `option`, if it belongs to the round.
    #[must_use]
    pub fn percent_of(&self, option: &str) -> Option<f64> {
        self.options
            .iter()
            .find(|result| result.option == option)
            .map(|result| result.percent)
    }

    /// Ordered `{option: percent}` map for the wire.
    #[must_use]
    pub fn percentages(&self) -> Percentages {
        Percentages(
            self.options
                .iter()
                .map(|result| (result.option.clone(), result.percent))
                .collect(),
        )
    }
}

/// Option-to-percent map that serializes as a JSON object in option order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Percentages(pub Vec<(String, f64)>);

impl Percentages {
    #[must_use]
    pub fn get(&self, option: &str) -> Option<f64> {
        self.0
            .iter()
            .find(|(label, _)| label == option)
            .map(|(_, percent)| *percent)
    }
}

impl Serialize for Percentages {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (option, percent) in &self.0 {
            map.serialize_entry(option, percent)?;
        }
        map.end()
    }
}

/// Project `round` into percentages against the votes cast so far.
#[must_use]
pub fn project(round: &Round, is_final: bool) -> ResultView {
    let total_votes = round.total_votes();

    ResultView {
        round_id: round.id(),
        options: round
            .tally()
            .iter()
            .map(|count| OptionResult {
                option: count.label.clone(),
                votes: count.votes,
                percent: percentage(count.votes, total_votes),
            })
            .collect(),
        total_votes,
        is_final,
        correct_option: if is_final {
            round.correct_option().map(ToString::to_string)
        } else {
            None
        },
    }
}

/// `round(100 * count / total, 2)`, or `0.0` when nothing was cast.
#[must_use]
pub fn percentage(count: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    // Vote counts stay far below 2^53
    #[allow(clippy::cast_precision_loss)]
    let share = count as f64 * 100.0 / total as f64;
    (share * 100.0).round() / 100.0
}
