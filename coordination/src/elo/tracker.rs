//! Elo rating tracker: the single source of truth for ratings in a run.
//!
//! Ratings only move through [`EloTracker::update`]. Byes never reach the
//! tracker, so every recorded update is zero-sum: the winner gains exactly
//! the delta the loser gives up.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::model::{CompetingItem, ItemId, BASE_RATING, NEUTRAL_QUALITY};

/// Default Elo sensitivity constant
pub const DEFAULT_K_FACTOR: f64 = 32.0;

/// Share of the initial rating driven by reflection quality (rest is the prior)
pub const DEFAULT_QUALITY_WEIGHT: f64 = 0.6;

/// Rating points per quality point away from neutral, before weighting
pub const DEFAULT_QUALITY_SCALE: f64 = 10.0;

/// Expected score of `rating` against `opponent` (standard logistic Elo curve).
///
/// `expected_score(a, b) + expected_score(b, a) == 1` for any finite pair.
pub fn expected_score(rating: f64, opponent: f64) -> f64 {
    1.0 / (1.0 + 10f64.powf((opponent - rating) / 400.0))
}

/// Errors from tracker operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EloError {
    #[error("Unknown item: {0}")]
    UnknownItem(ItemId),

    #[error("Item {0} cannot play against itself")]
    SelfMatch(ItemId),

    #[error("Invalid k-factor: {0}")]
    InvalidKFactor(f64),
}

/// How initial ratings blend the neutral prior with reflection quality
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeedPolicy {
    /// Weight of the quality signal, 0.0-1.0
    pub quality_weight: f64,
    /// Rating points per quality point away from neutral
    pub quality_scale: f64,
}

impl Default for SeedPolicy {
    fn default() -> Self {
        Self {
            quality_weight: DEFAULT_QUALITY_WEIGHT,
            quality_scale: DEFAULT_QUALITY_SCALE,
        }
    }
}

impl SeedPolicy {
    pub fn with_weight(quality_weight: f64) -> Self {
        Self {
            quality_weight: quality_weight.clamp(0.0, 1.0),
            ..Default::default()
        }
    }

    /// `1500 + weight * (quality - 50) * scale`
    pub fn initial_rating(&self, quality: u8) -> f64 {
        let offset = f64::from(quality.min(100)) - f64::from(NEUTRAL_QUALITY);
        BASE_RATING + self.quality_weight * offset * self.quality_scale
    }
}

/// One entry in an item's rating history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingEvent {
    pub timestamp: DateTime<Utc>,
    pub rating: f64,
    pub reason: String,
}

/// Rating plus its append-only history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingRecord {
    pub item_id: ItemId,
    pub initial_rating: f64,
    pub rating: f64,
    pub history: Vec<RatingEvent>,
}

impl RatingRecord {
    fn new(item_id: ItemId, rating: f64, reason: String) -> Self {
        Self {
            item_id,
            initial_rating: rating,
            rating,
            history: vec![RatingEvent {
                timestamp: Utc::now(),
                rating,
                reason,
            }],
        }
    }

    fn push(&mut self, rating: f64, reason: String) {
        self.rating = rating;
        self.history.push(RatingEvent {
            timestamp: Utc::now(),
            rating,
            reason,
        });
    }

    /// Net change since seeding
    pub fn change(&self) -> f64 {
        self.rating - self.initial_rating
    }
}

/// Outcome of a single rating update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EloUpdate {
    pub winner_id: ItemId,
    pub loser_id: ItemId,
    pub winner_before: f64,
    pub loser_before: f64,
    pub winner_after: f64,
    pub loser_after: f64,
    /// Points moved from loser to winner
    pub delta: f64,
    /// Winner's expected score before the match
    pub expected: f64,
    /// The lower-rated item won
    pub upset: bool,
}

/// A position on the rating leaderboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingStanding {
    /// 1-based rank
    pub rank: usize,
    pub item_id: ItemId,
    pub rating: f64,
}

/// Summary statistics over current ratings
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RatingStatistics {
    pub count: usize,
    pub average: f64,
    pub min: f64,
    pub max: f64,
    /// Population standard deviation
    pub std_dev: f64,
}

/// Serializable copy of the tracker state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingSnapshot {
    pub k_factor: f64,
    pub seed_policy: SeedPolicy,
    pub records: Vec<RatingRecord>,
}

/// Holds every rating for one run
#[derive(Debug, Clone)]
pub struct EloTracker {
    k_factor: f64,
    seed_policy: SeedPolicy,
    records: BTreeMap<ItemId, RatingRecord>,
    updates_applied: u64,
}

/// Thread-safe tracker wrapper; every update goes through this lock
pub type SharedEloTracker = Arc<Mutex<EloTracker>>;

impl Default for EloTracker {
    fn default() -> Self {
        Self {
            k_factor: DEFAULT_K_FACTOR,
            seed_policy: SeedPolicy::default(),
            records: BTreeMap::new(),
            updates_applied: 0,
        }
    }
}

impl EloTracker {
    /// Create a tracker with the given k-factor.
    pub fn new(k_factor: f64) -> Result<Self, EloError> {
        if !(k_factor.is_finite() && k_factor > 0.0) {
            return Err(EloError::InvalidKFactor(k_factor));
        }
        Ok(Self {
            k_factor,
            ..Default::default()
        })
    }

    pub fn with_seed_policy(mut self, policy: SeedPolicy) -> Self {
        self.seed_policy = policy;
        self
    }

    /// Wrap into the shared single-writer handle.
    pub fn shared(self) -> SharedEloTracker {
        Arc::new(Mutex::new(self))
    }

    pub fn k_factor(&self) -> f64 {
        self.k_factor
    }

    pub fn seed_policy(&self) -> SeedPolicy {
        self.seed_policy
    }

    /// Seed ratings for a batch of items, blending quality into the prior.
    ///
    /// Items that already have a record keep it.
    pub fn initialize(&mut self, items: &[CompetingItem], quality_weight: f64) {
        self.seed_policy.quality_weight = quality_weight.clamp(0.0, 1.0);
        for item in items {
            self.register(item);
        }
    }

    /// Seed a single item using the current policy and return its rating.
    pub fn register(&mut self, item: &CompetingItem) -> f64 {
        if let Some(existing) = self.records.get(&item.item_id) {
            debug!(item = %item.item_id, "rating already seeded");
            return existing.rating;
        }
        let quality = item.effective_quality();
        let rating = self.seed_policy.initial_rating(quality);
        self.records.insert(
            item.item_id.clone(),
            RatingRecord::new(
                item.item_id.clone(),
                rating,
                format!("seeded from quality {}", quality),
            ),
        );
        rating
    }

    /// Seed a record at an explicit rating (used by replay).
    pub fn register_at(&mut self, item_id: &str, rating: f64) {
        self.records
            .entry(item_id.to_string())
            .or_insert_with(|| RatingRecord::new(item_id.to_string(), rating, "restored".into()));
    }

    pub fn contains(&self, item_id: &str) -> bool {
        self.records.contains_key(item_id)
    }

    pub fn rating(&self, item_id: &str) -> Option<f64> {
        self.records.get(item_id).map(|r| r.rating)
    }

    pub fn record(&self, item_id: &str) -> Option<&RatingRecord> {
        self.records.get(item_id)
    }

    pub fn records(&self) -> impl Iterator<Item = &RatingRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of updates applied so far
    pub fn updates_applied(&self) -> u64 {
        self.updates_applied
    }

    /// Apply one match outcome with the tracker's k-factor.
    pub fn update(&mut self, winner_id: &str, loser_id: &str) -> Result<EloUpdate, EloError> {
        self.update_with_k(winner_id, loser_id, self.k_factor)
    }

    /// Apply one match outcome with an explicit k-factor.
    ///
    /// Both ratings change atomically: on error nothing is modified.
    pub fn update_with_k(
        &mut self,
        winner_id: &str,
        loser_id: &str,
        k_factor: f64,
    ) -> Result<EloUpdate, EloError> {
        if winner_id == loser_id {
            return Err(EloError::SelfMatch(winner_id.to_string()));
        }
        if !(k_factor.is_finite() && k_factor > 0.0) {
            return Err(EloError::InvalidKFactor(k_factor));
        }
        let winner_before = self
            .rating(winner_id)
            .ok_or_else(|| EloError::UnknownItem(winner_id.to_string()))?;
        let loser_before = self
            .rating(loser_id)
            .ok_or_else(|| EloError::UnknownItem(loser_id.to_string()))?;

        let expected = expected_score(winner_before, loser_before);
        let delta = k_factor * (1.0 - expected);
        let upset = expected < 0.5;
        let winner_after = winner_before + delta;
        let loser_after = loser_before - delta;

        if let Some(record) = self.records.get_mut(winner_id) {
            record.push(winner_after, format!("beat {}", loser_id));
        }
        if let Some(record) = self.records.get_mut(loser_id) {
            record.push(loser_after, format!("lost to {}", winner_id));
        }
        self.updates_applied += 1;

        if upset {
            warn!(
                winner = winner_id,
                loser = loser_id,
                expected,
                "upset: lower-rated item won"
            );
        }

        Ok(EloUpdate {
            winner_id: winner_id.to_string(),
            loser_id: loser_id.to_string(),
            winner_before,
            loser_before,
            winner_after,
            loser_after,
            delta,
            expected,
            upset,
        })
    }

    /// Items sorted by rating (descending), ties broken by item id.
    pub fn leaderboard(&self) -> Vec<RatingStanding> {
        let mut entries: Vec<&RatingRecord> = self.records.values().collect();
        entries.sort_by(|a, b| {
            b.rating
                .partial_cmp(&a.rating)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.item_id.cmp(&b.item_id))
        });
        entries
            .into_iter()
            .enumerate()
            .map(|(i, r)| RatingStanding {
                rank: i + 1,
                item_id: r.item_id.clone(),
                rating: r.rating,
            })
            .collect()
    }

    /// Average, min, max and standard deviation of current ratings.
    pub fn statistics(&self) -> RatingStatistics {
        rating_statistics(self.records.values().map(|r| r.rating))
    }

    pub fn snapshot(&self) -> RatingSnapshot {
        RatingSnapshot {
            k_factor: self.k_factor,
            seed_policy: self.seed_policy,
            records: self.records.values().cloned().collect(),
        }
    }

    /// Rebuild a tracker from a persisted snapshot.
    pub fn from_snapshot(snapshot: RatingSnapshot) -> Result<Self, EloError> {
        let mut tracker = Self::new(snapshot.k_factor)?.with_seed_policy(snapshot.seed_policy);
        for record in snapshot.records {
            tracker.records.insert(record.item_id.clone(), record);
        }
        Ok(tracker)
    }
}

/// Statistics over an arbitrary set of ratings.
pub fn rating_statistics(ratings: impl Iterator<Item = f64>) -> RatingStatistics {
    let values: Vec<f64> = ratings.collect();
    if values.is_empty() {
        return RatingStatistics::default();
    }
    let count = values.len();
    let average = values.iter().sum::<f64>() / count as f64;
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let variance = values.iter().map(|v| (v - average).powi(2)).sum::<f64>() / count as f64;
    RatingStatistics {
        count,
        average,
        min,
        max,
        std_dev: variance.sqrt(),
    }
}
