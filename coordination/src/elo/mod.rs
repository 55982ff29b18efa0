//! Elo rating system
//!
//! ```text
//! initialize(items) ──► register ──► RatingRecord (seeded)
//!                                        │
//! match outcome ──► update(winner, loser) ┘  (only mutator, zero-sum)
//!                                        │
//!                  leaderboard / statistics / snapshot
//! ```

pub mod tracker;

pub use tracker::{
    expected_score, rating_statistics, EloError, EloTracker, EloUpdate, RatingEvent,
    RatingRecord, RatingSnapshot, RatingStanding, RatingStatistics, SeedPolicy,
    SharedEloTracker, DEFAULT_K_FACTOR, DEFAULT_QUALITY_SCALE, DEFAULT_QUALITY_WEIGHT,
};
