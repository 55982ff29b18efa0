//! Ranking & analytics compiler.
//!
//! A pure function over items, the match log and a rating snapshot. It can be
//! re-run from persisted history at any time; nothing here contacts the
//! oracle or mutates a tracker.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::bracket::MatchResult;
use crate::elo::{rating_statistics, RatingSnapshot, RatingStatistics};
use crate::model::{CompetingItem, DirectionId, ItemId};

/// How many swings to report in each direction.
pub const SWING_REPORT_SIZE: usize = 3;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Percentile band of a leaderboard position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceTier {
    Elite,
    HighPerformer,
    AboveAverage,
    Average,
    BelowAverage,
}

impl PerformanceTier {
    pub const ALL: [PerformanceTier; 5] = [
        Self::Elite,
        Self::HighPerformer,
        Self::AboveAverage,
        Self::Average,
        Self::BelowAverage,
    ];

    /// Tier for 1-based `rank` out of `total`, using `(rank - 1) / total`.
    pub fn for_rank(rank: usize, total: usize) -> Self {
        if total == 0 {
            return Self::BelowAverage;
        }
        let percentile = rank.saturating_sub(1) as f64 / total as f64;
        if percentile <= 0.10 {
            Self::Elite
        } else if percentile <= 0.25 {
            Self::HighPerformer
        } else if percentile <= 0.50 {
            Self::AboveAverage
        } else if percentile <= 0.75 {
            Self::Average
        } else {
            Self::BelowAverage
        }
    }
}

impl std::fmt::Display for PerformanceTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Elite => write!(f, "Elite"),
            Self::HighPerformer => write!(f, "High Performer"),
            Self::AboveAverage => write!(f, "Above Average"),
            Self::Average => write!(f, "Average"),
            Self::BelowAverage => write!(f, "Below Average"),
        }
    }
}

/// Derived per-item ranking row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub item_id: ItemId,
    pub direction_id: DirectionId,
    pub final_elo: f64,
    pub initial_elo: f64,
    pub elo_change: f64,
    pub wins: u32,
    pub losses: u32,
    /// `wins / (wins + losses)`, 0.0 when the item never played.
    pub win_rate: f64,
    pub performance_tier: PerformanceTier,
    /// The item won at least one match as the lower-rated side.
    pub upset_flag: bool,
    /// Population standard deviation of the item's per-match rating changes.
    pub volatility: f64,
}

/// Aggregate rating view of one direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectionStats {
    pub direction_id: DirectionId,
    pub item_count: usize,
    pub average_rating: f64,
    pub top_item_id: Option<ItemId>,
    pub top_rating: f64,
}

/// One item's rating change in one match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingSwing {
    pub item_id: ItemId,
    pub opponent_id: ItemId,
    pub round: u32,
    pub change: f64,
}

/// Full analytics output.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RankingReport {
    pub leaderboard: Vec<LeaderboardEntry>,
    pub directions: Vec<DirectionStats>,
    pub tier_distribution: BTreeMap<PerformanceTier, usize>,
    pub biggest_gains: Vec<RatingSwing>,
    pub biggest_losses: Vec<RatingSwing>,
    pub upset_count: usize,
    /// Decided matches only; byes are not counted.
    pub total_matches: usize,
    pub rating_statistics: RatingStatistics,
}

impl RankingReport {
    pub fn entry(&self, item_id: &str) -> Option<&LeaderboardEntry> {
        self.leaderboard.iter().find(|e| e.item_id == item_id)
    }

    /// Highest-ranked entry of a direction.
    pub fn top_of(&self, direction_id: &str) -> Option<&LeaderboardEntry> {
        self.leaderboard
            .iter()
            .find(|e| e.direction_id == direction_id)
    }
}

#[derive(Default)]
struct MatchTally {
    wins: u32,
    losses: u32,
    upset_win: bool,
    changes: Vec<f64>,
}

// ---------------------------------------------------------------------------
// Compiler
// ---------------------------------------------------------------------------

/// Compile the leaderboard and aggregate analytics.
///
/// Ratings come from `snapshot`; items absent from it fall back to their
/// mirrored `elo_rating` with no change.
pub fn compile_rankings(
    items: &[CompetingItem],
    matches: &[MatchResult],
    snapshot: &RatingSnapshot,
) -> RankingReport {
    let records: HashMap<&str, (f64, f64)> = snapshot
        .records
        .iter()
        .map(|r| (r.item_id.as_str(), (r.initial_rating, r.rating)))
        .collect();

    let mut tallies: HashMap<&str, MatchTally> = HashMap::new();
    let mut swings = Vec::new();
    let mut upset_count = 0;
    let mut total_matches = 0;

    for result in matches {
        let Some(loser) = result.loser_id() else {
            continue;
        };
        total_matches += 1;
        if result.upset {
            upset_count += 1;
        }
        let winner = result.winner_id.as_str();

        let tally = tallies.entry(winner).or_default();
        tally.wins += 1;
        tally.upset_win |= result.upset;
        tallies.entry(loser).or_default().losses += 1;

        for (item, opponent) in [(winner, loser), (loser, winner)] {
            if let Some(change) = result.change_for(item) {
                tallies.entry(item).or_default().changes.push(change);
                swings.push(RatingSwing {
                    item_id: item.to_string(),
                    opponent_id: opponent.to_string(),
                    round: result.round,
                    change,
                });
            }
        }
    }

    let mut rows: Vec<(&CompetingItem, f64, f64)> = items
        .iter()
        .map(|item| {
            let (initial, current) = records
                .get(item.item_id.as_str())
                .copied()
                .unwrap_or((item.elo_rating, item.elo_rating));
            (item, initial, current)
        })
        .collect();
    rows.sort_by(|a, b| {
        b.2.partial_cmp(&a.2)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.item_id.cmp(&b.0.item_id))
    });

    let total = rows.len();
    let leaderboard: Vec<LeaderboardEntry> = rows
        .iter()
        .enumerate()
        .map(|(i, (item, initial, current))| {
            let rank = i + 1;
            let tally = tallies.get(item.item_id.as_str());
            let wins = tally.map(|t| t.wins).unwrap_or(0);
            let losses = tally.map(|t| t.losses).unwrap_or(0);
            let played = wins + losses;
            LeaderboardEntry {
                rank,
                item_id: item.item_id.clone(),
                direction_id: item.direction_id.clone(),
                final_elo: *current,
                initial_elo: *initial,
                elo_change: current - initial,
                wins,
                losses,
                win_rate: if played == 0 {
                    0.0
                } else {
                    f64::from(wins) / f64::from(played)
                },
                performance_tier: PerformanceTier::for_rank(rank, total),
                upset_flag: tally.map(|t| t.upset_win).unwrap_or(false),
                volatility: tally
                    .map(|t| rating_statistics(t.changes.iter().copied()).std_dev)
                    .unwrap_or(0.0),
            }
        })
        .collect();

    let mut tier_distribution: BTreeMap<PerformanceTier, usize> =
        PerformanceTier::ALL.iter().map(|t| (*t, 0)).collect();
    for entry in &leaderboard {
        *tier_distribution.entry(entry.performance_tier).or_default() += 1;
    }

    RankingReport {
        directions: direction_stats(&leaderboard),
        tier_distribution,
        biggest_gains: top_swings(&swings, true),
        biggest_losses: top_swings(&swings, false),
        upset_count,
        total_matches,
        rating_statistics: rating_statistics(leaderboard.iter().map(|e| e.final_elo)),
        leaderboard,
    }
}

fn direction_stats(leaderboard: &[LeaderboardEntry]) -> Vec<DirectionStats> {
    let mut grouped: BTreeMap<&str, Vec<&LeaderboardEntry>> = BTreeMap::new();
    for entry in leaderboard {
        grouped
            .entry(entry.direction_id.as_str())
            .or_default()
            .push(entry);
    }
    grouped
        .into_iter()
        .map(|(direction_id, entries)| {
            // Leaderboard order already puts the best entry first.
            let top = entries.first();
            DirectionStats {
                direction_id: direction_id.to_string(),
                item_count: entries.len(),
                average_rating: entries.iter().map(|e| e.final_elo).sum::<f64>()
                    / entries.len() as f64,
                top_item_id: top.map(|e| e.item_id.clone()),
                top_rating: top.map(|e| e.final_elo).unwrap_or_default(),
            }
        })
        .collect()
}

fn top_swings(swings: &[RatingSwing], gains: bool) -> Vec<RatingSwing> {
    let mut selected: Vec<&RatingSwing> = swings
        .iter()
        .filter(|s| if gains { s.change > 0.0 } else { s.change < 0.0 })
        .collect();
    selected.sort_by(|a, b| {
        let by_size = if gains {
            b.change.partial_cmp(&a.change)
        } else {
            a.change.partial_cmp(&b.change)
        };
        by_size
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.item_id.cmp(&b.item_id))
            .then_with(|| a.round.cmp(&b.round))
    });
    selected
        .into_iter()
        .take(SWING_REPORT_SIZE)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elo::EloTracker;

    struct Fixture {
        items: Vec<CompetingItem>,
        tracker: EloTracker,
        matches: Vec<MatchResult>,
    }

    fn fixture() -> Fixture {
        let items: Vec<CompetingItem> = [
            ("a", "d1", 90),
            ("b", "d1", 40),
            ("c", "d1", 60),
            ("x", "d2", 55),
            ("y", "d2", 80),
        ]
        .iter()
        .map(|(id, d, q)| CompetingItem::with_id(*id, *d, "p", "c").with_quality(*q))
        .collect();
        let mut tracker = EloTracker::default();
        tracker.initialize(&items, 0.6);

        let mut matches = Vec::new();
        let u = tracker.update("a", "b").unwrap();
        matches.push(MatchResult::decided(1, "a", "b", &u, "", false));
        matches.push(MatchResult::bye(1, "c", tracker.rating("c").unwrap()));
        let u = tracker.update("c", "a").unwrap();
        matches.push(MatchResult::decided(2, "a", "c", &u, "", false));
        let u = tracker.update("x", "y").unwrap();
        matches.push(MatchResult::decided(1, "y", "x", &u, "", false));
        Fixture {
            items,
            tracker,
            matches,
        }
    }

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(PerformanceTier::for_rank(1, 10), PerformanceTier::Elite);
        assert_eq!(PerformanceTier::for_rank(2, 10), PerformanceTier::Elite);
        assert_eq!(PerformanceTier::for_rank(3, 10), PerformanceTier::HighPerformer);
        assert_eq!(PerformanceTier::for_rank(6, 10), PerformanceTier::AboveAverage);
        assert_eq!(PerformanceTier::for_rank(8, 10), PerformanceTier::Average);
        assert_eq!(PerformanceTier::for_rank(9, 10), PerformanceTier::BelowAverage);
        assert_eq!(PerformanceTier::for_rank(1, 1), PerformanceTier::Elite);
    }

    #[test]
    fn test_leaderboard_matches_tracker_order() {
        let f = fixture();
        let report = compile_rankings(&f.items, &f.matches, &f.tracker.snapshot());
        let ours: Vec<&str> = report.leaderboard.iter().map(|e| e.item_id.as_str()).collect();
        let tracker_order: Vec<String> =
            f.tracker.leaderboard().into_iter().map(|s| s.item_id).collect();
        assert_eq!(ours, tracker_order);
        assert_eq!(report.leaderboard[0].rank, 1);
    }

    #[test]
    fn test_wins_losses_and_upsets() {
        let f = fixture();
        let report = compile_rankings(&f.items, &f.matches, &f.tracker.snapshot());
        let a = report.entry("a").unwrap();
        assert_eq!((a.wins, a.losses), (1, 1));
        assert_eq!(a.win_rate, 0.5);

        let c = report.entry("c").unwrap();
        assert_eq!((c.wins, c.losses), (1, 0));
        assert!(c.upset_flag);

        let x = report.entry("x").unwrap();
        assert!(x.upset_flag);
        assert_eq!(report.upset_count, 2);
        assert_eq!(report.total_matches, 3);
    }

    #[test]
    fn test_elo_change_sums_to_zero() {
        let f = fixture();
        let report = compile_rankings(&f.items, &f.matches, &f.tracker.snapshot());
        let total: f64 = report.leaderboard.iter().map(|e| e.elo_change).sum();
        assert!(total.abs() < 1e-9);
    }

    #[test]
    fn test_swings_sorted_and_capped() {
        let f = fixture();
        let report = compile_rankings(&f.items, &f.matches, &f.tracker.snapshot());
        assert_eq!(report.biggest_gains.len(), 3);
        assert_eq!(report.biggest_losses.len(), 3);
        assert!(report.biggest_gains[0].change >= report.biggest_gains[1].change);
        assert!(report.biggest_losses[0].change <= report.biggest_losses[1].change);
        assert!(report.biggest_losses.iter().all(|s| s.change < 0.0));
    }

    #[test]
    fn test_direction_stats_and_tiers() {
        let f = fixture();
        let report = compile_rankings(&f.items, &f.matches, &f.tracker.snapshot());
        assert_eq!(report.directions.len(), 2);
        assert_eq!(report.directions[0].direction_id, "d1");
        assert_eq!(report.directions[0].item_count, 3);
        assert_eq!(
            report.top_of("d2").map(|e| e.item_id.as_str()),
            report.directions[1].top_item_id.as_deref()
        );
        let counted: usize = report.tier_distribution.values().sum();
        assert_eq!(counted, 5);
        assert_eq!(report.tier_distribution.len(), 5);
    }

    #[test]
    fn test_rerun_is_deterministic() {
        let f = fixture();
        let snapshot = f.tracker.snapshot();
        let first = compile_rankings(&f.items, &f.matches, &snapshot);
        let second = compile_rankings(&f.items, &f.matches, &snapshot);
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_inputs() {
        let report = compile_rankings(&[], &[], &EloTracker::default().snapshot());
        assert!(report.leaderboard.is_empty());
        assert_eq!(report.upset_count, 0);
        assert_eq!(report.rating_statistics.count, 0);
    }
}
