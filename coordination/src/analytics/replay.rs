//! Rating history replay: rebuild ratings from initial seeds plus the match
//! log, without contacting the oracle.
//!
//! Used to verify persisted history (the replayed ratings must match the
//! snapshot taken at the end of the run) and to recompile analytics later.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::error::{AnalyticsError, AnalyticsResult};
use crate::bracket::MatchResult;
use crate::elo::{EloTracker, RatingSnapshot};
use crate::model::ItemId;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Everything needed to reproduce a run's ratings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchHistory {
    pub k_factor: f64,
    /// Seed rating of every item, before any match.
    pub initial_ratings: BTreeMap<ItemId, f64>,
    /// Matches in the order they were applied.
    pub matches: Vec<MatchResult>,
}

/// A rating that differs between a replay and a reference snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingMismatch {
    pub item_id: ItemId,
    pub expected: Option<f64>,
    pub replayed: Option<f64>,
}

/// Default tolerance when comparing replayed ratings.
pub const REPLAY_TOLERANCE: f64 = 1e-6;

// ---------------------------------------------------------------------------
// Replay
// ---------------------------------------------------------------------------

/// Seed ratings recorded in a snapshot.
pub fn initial_ratings(snapshot: &RatingSnapshot) -> BTreeMap<ItemId, f64> {
    snapshot
        .records
        .iter()
        .map(|r| (r.item_id.clone(), r.initial_rating))
        .collect()
}

/// Rebuild a tracker from initial ratings and the match log.
///
/// Byes are skipped, so they can never move a rating.
pub fn replay_ratings(
    initial: &BTreeMap<ItemId, f64>,
    matches: &[MatchResult],
    k_factor: f64,
) -> AnalyticsResult<EloTracker> {
    let mut tracker =
        EloTracker::new(k_factor).map_err(|source| AnalyticsError::Replay { index: 0, source })?;
    for (item_id, rating) in initial {
        tracker.register_at(item_id, *rating);
    }

    for (index, result) in matches.iter().enumerate() {
        let Some(loser) = result.loser_id() else {
            continue;
        };
        for item in [result.winner_id.as_str(), loser] {
            if !tracker.contains(item) {
                return Err(AnalyticsError::MissingInitialRating {
                    index,
                    item: item.to_string(),
                });
            }
        }
        tracker
            .update(&result.winner_id, loser)
            .map_err(|source| AnalyticsError::Replay { index, source })?;
    }
    Ok(tracker)
}

/// Compare a replayed tracker against a reference snapshot.
pub fn verify_replay(
    reference: &RatingSnapshot,
    replayed: &EloTracker,
    tolerance: f64,
) -> Vec<RatingMismatch> {
    let mut mismatches = Vec::new();
    for record in &reference.records {
        let replayed_rating = replayed.rating(&record.item_id);
        let matches = replayed_rating
            .map(|r| (r - record.rating).abs() <= tolerance)
            .unwrap_or(false);
        if !matches {
            mismatches.push(RatingMismatch {
                item_id: record.item_id.clone(),
                expected: Some(record.rating),
                replayed: replayed_rating,
            });
        }
    }
    for record in replayed.records() {
        if !reference.records.iter().any(|r| r.item_id == record.item_id) {
            mismatches.push(RatingMismatch {
                item_id: record.item_id.clone(),
                expected: None,
                replayed: Some(record.rating),
            });
        }
    }
    mismatches
}

impl MatchHistory {
    /// Capture the history of a finished tracker plus its match log.
    pub fn capture(snapshot: &RatingSnapshot, matches: Vec<MatchResult>) -> Self {
        Self {
            k_factor: snapshot.k_factor,
            initial_ratings: initial_ratings(snapshot),
            matches,
        }
    }

    pub fn from_json(data: &str) -> AnalyticsResult<Self> {
        Ok(serde_json::from_str(data)?)
    }

    pub fn to_json(&self) -> AnalyticsResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn replay(&self) -> AnalyticsResult<EloTracker> {
        replay_ratings(&self.initial_ratings, &self.matches, self.k_factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CompetingItem;

    fn played_tracker() -> (EloTracker, Vec<MatchResult>) {
        let items: Vec<CompetingItem> = [("a", 90), ("b", 40), ("c", 60)]
            .iter()
            .map(|(id, q)| CompetingItem::with_id(*id, "d1", "p", "c").with_quality(*q))
            .collect();
        let mut tracker = EloTracker::default();
        tracker.initialize(&items, 0.6);

        let mut matches = Vec::new();
        let u1 = tracker.update("b", "a").unwrap();
        matches.push(MatchResult::decided(1, "a", "b", &u1, "b", false));
        matches.push(MatchResult::bye(1, "c", tracker.rating("c").unwrap()));
        let u2 = tracker.update("c", "b").unwrap();
        matches.push(MatchResult::decided(2, "b", "c", &u2, "c", false));
        (tracker, matches)
    }

    #[test]
    fn test_replay_reproduces_ratings() {
        let (tracker, matches) = played_tracker();
        let snapshot = tracker.snapshot();
        let replayed =
            replay_ratings(&initial_ratings(&snapshot), &matches, snapshot.k_factor).unwrap();
        assert!(verify_replay(&snapshot, &replayed, REPLAY_TOLERANCE).is_empty());
        assert_eq!(replayed.updates_applied(), 2);
    }

    #[test]
    fn test_replay_missing_initial_rating() {
        let (_, matches) = played_tracker();
        let mut initial = BTreeMap::new();
        initial.insert("a".to_string(), 1500.0);
        let err = replay_ratings(&initial, &matches, 32.0).unwrap_err();
        assert!(matches!(
            err,
            AnalyticsError::MissingInitialRating { index: 0, .. }
        ));
    }

    #[test]
    fn test_verify_detects_drift() {
        let (tracker, matches) = played_tracker();
        let snapshot = tracker.snapshot();
        let replayed = replay_ratings(&initial_ratings(&snapshot), &matches[..1], 32.0).unwrap();
        let mismatches = verify_replay(&snapshot, &replayed, REPLAY_TOLERANCE);
        let ids: Vec<&str> = mismatches.iter().map(|m| m.item_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn test_history_json_roundtrip_replays() {
        let (tracker, matches) = played_tracker();
        let history = MatchHistory::capture(&tracker.snapshot(), matches);
        let restored = MatchHistory::from_json(&history.to_json().unwrap()).unwrap();
        let replayed = restored.replay().unwrap();
        assert_eq!(replayed.rating("c"), tracker.rating("c"));
    }

    #[test]
    fn test_history_json_keeps_every_rating_bit() {
        let (tracker, matches) = played_tracker();
        let history = MatchHistory::capture(&tracker.snapshot(), matches);
        let restored = MatchHistory::from_json(&history.to_json().unwrap()).unwrap();
        assert_eq!(restored, history);

        let replayed = restored.replay().unwrap();
        for record in tracker.records() {
            let rating = replayed.rating(&record.item_id).unwrap();
            assert_eq!(rating.to_bits(), record.rating.to_bits(), "{}", record.item_id);
        }
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(matches!(
            MatchHistory::from_json("not json"),
            Err(AnalyticsError::JsonParse(_))
        ));
    }
}
