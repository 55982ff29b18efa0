//! Ranking analytics and rating history replay
//!
//! Both halves are pure: they read items, match logs and rating snapshots,
//! and never contact the oracle.

pub mod error;
pub mod ranking;
pub mod replay;

pub use error::{AnalyticsError, AnalyticsResult};
pub use ranking::{
    compile_rankings, DirectionStats, LeaderboardEntry, PerformanceTier, RankingReport,
    RatingSwing,
};
pub use replay::{
    initial_ratings, replay_ratings, verify_replay, MatchHistory, RatingMismatch, REPLAY_TOLERANCE,
};
