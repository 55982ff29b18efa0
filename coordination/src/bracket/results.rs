//! Append-only match records and per-direction tournament results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::elo::EloUpdate;
use crate::model::{DirectionId, ItemId};

/// Record of one match (or bye) in a bracket round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Round number (1-indexed).
    pub round: u32,
    pub item_a_id: ItemId,
    /// `None` for a bye.
    pub item_b_id: Option<ItemId>,
    pub winner_id: ItemId,
    pub reasoning: String,
    pub timestamp: DateTime<Utc>,
    pub elo_before_a: f64,
    pub elo_after_a: f64,
    pub elo_before_b: Option<f64>,
    pub elo_after_b: Option<f64>,
    /// The pre-match lower-rated item won.
    #[serde(default)]
    pub upset: bool,
    /// The comparator verdict could not be parsed and the default was used.
    #[serde(default)]
    pub low_confidence: bool,
}

impl MatchResult {
    /// A bye: the item advances without a rating change.
    pub fn bye(round: u32, item_id: &str, rating: f64) -> Self {
        Self {
            round,
            item_a_id: item_id.to_string(),
            item_b_id: None,
            winner_id: item_id.to_string(),
            reasoning: "bye".to_string(),
            timestamp: Utc::now(),
            elo_before_a: rating,
            elo_after_a: rating,
            elo_before_b: None,
            elo_after_b: None,
            upset: false,
            low_confidence: false,
        }
    }

    /// A decided match between `a` and `b`, with the applied rating update.
    pub fn decided(
        round: u32,
        item_a_id: &str,
        item_b_id: &str,
        update: &EloUpdate,
        reasoning: impl Into<String>,
        low_confidence: bool,
    ) -> Self {
        let a_won = update.winner_id == item_a_id;
        let (before_a, after_a, before_b, after_b) = if a_won {
            (
                update.winner_before,
                update.winner_after,
                update.loser_before,
                update.loser_after,
            )
        } else {
            (
                update.loser_before,
                update.loser_after,
                update.winner_before,
                update.winner_after,
            )
        };
        Self {
            round,
            item_a_id: item_a_id.to_string(),
            item_b_id: Some(item_b_id.to_string()),
            winner_id: update.winner_id.clone(),
            reasoning: reasoning.into(),
            timestamp: Utc::now(),
            elo_before_a: before_a,
            elo_after_a: after_a,
            elo_before_b: Some(before_b),
            elo_after_b: Some(after_b),
            upset: update.upset,
            low_confidence,
        }
    }

    pub fn is_bye(&self) -> bool {
        self.item_b_id.is_none()
    }

    /// The eliminated item, if this was a real match.
    pub fn loser_id(&self) -> Option<&str> {
        let b = self.item_b_id.as_deref()?;
        if self.winner_id == self.item_a_id {
            Some(b)
        } else {
            Some(self.item_a_id.as_str())
        }
    }

    /// Whether `item_id` took part in this match.
    pub fn involves(&self, item_id: &str) -> bool {
        self.item_a_id == item_id || self.item_b_id.as_deref() == Some(item_id)
    }

    /// `(before, after)` rating for `item_id`, if it played here.
    pub fn ratings_for(&self, item_id: &str) -> Option<(f64, f64)> {
        if self.item_a_id == item_id {
            Some((self.elo_before_a, self.elo_after_a))
        } else if self.item_b_id.as_deref() == Some(item_id) {
            Some((self.elo_before_b?, self.elo_after_b?))
        } else {
            None
        }
    }

    /// Rating change of `item_id` in this match.
    pub fn change_for(&self, item_id: &str) -> Option<f64> {
        self.ratings_for(item_id).map(|(before, after)| after - before)
    }
}

/// Entrants and survivors of one round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundSummary {
    pub round: u32,
    pub entrants: Vec<ItemId>,
    pub advancing: Vec<ItemId>,
    pub bye: Option<ItemId>,
}

/// Result of one bracket run for one direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TournamentResult {
    pub direction_id: DirectionId,
    /// `None` only when the bracket failed.
    pub winner_id: Option<ItemId>,
    pub total_rounds: u32,
    pub seeds: Vec<ItemId>,
    pub round_progression: Vec<RoundSummary>,
    pub all_matches: Vec<MatchResult>,
    #[serde(default)]
    pub tournament_failed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl TournamentResult {
    /// A direction whose bracket never started (no entrants survived).
    pub fn failed(direction_id: impl Into<DirectionId>, reason: impl Into<String>) -> Self {
        Self {
            direction_id: direction_id.into(),
            winner_id: None,
            total_rounds: 0,
            seeds: Vec::new(),
            round_progression: Vec::new(),
            all_matches: Vec::new(),
            tournament_failed: true,
            failure_reason: Some(reason.into()),
        }
    }

    /// Real matches only (byes excluded).
    pub fn decided_matches(&self) -> impl Iterator<Item = &MatchResult> {
        self.all_matches.iter().filter(|m| !m.is_bye())
    }

    pub fn bye_count(&self) -> usize {
        self.all_matches.iter().filter(|m| m.is_bye()).count()
    }

    /// Compact status line.
    pub fn summary_line(&self) -> String {
        match (&self.winner_id, self.tournament_failed) {
            (Some(winner), false) => format!(
                "[complete] direction={} winner={} rounds={} matches={}",
                self.direction_id,
                winner,
                self.total_rounds,
                self.all_matches.len()
            ),
            _ => format!(
                "[failed] direction={} after {} rounds: {}",
                self.direction_id,
                self.total_rounds,
                self.failure_reason.as_deref().unwrap_or("unknown")
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(winner: &str, loser: &str, upset: bool) -> EloUpdate {
        EloUpdate {
            winner_id: winner.to_string(),
            loser_id: loser.to_string(),
            winner_before: 1500.0,
            loser_before: 1520.0,
            winner_after: 1517.0,
            loser_after: 1503.0,
            delta: 17.0,
            expected: 0.47,
            upset,
        }
    }

    #[test]
    fn test_decided_maps_sides() {
        let m = MatchResult::decided(1, "a", "b", &update("b", "a", true), "b better", false);
        assert_eq!(m.winner_id, "b");
        assert_eq!(m.loser_id(), Some("a"));
        assert_eq!(m.elo_before_a, 1520.0);
        assert_eq!(m.elo_after_b, Some(1517.0));
        assert_eq!(m.change_for("a"), Some(-17.0));
        assert_eq!(m.change_for("b"), Some(17.0));
        assert!(m.upset);
    }

    #[test]
    fn test_bye_record() {
        let m = MatchResult::bye(2, "c", 1610.0);
        assert!(m.is_bye());
        assert_eq!(m.loser_id(), None);
        assert_eq!(m.change_for("c"), Some(0.0));
        assert!(m.involves("c"));
        assert!(!m.involves("a"));
    }

    #[test]
    fn test_summary_line() {
        let result = TournamentResult::failed("d1", "oracle timeout");
        assert_eq!(result.winner_id, None);
        assert!(result.summary_line().contains("[failed]"));
        assert!(result.summary_line().contains("oracle timeout"));
    }
}
