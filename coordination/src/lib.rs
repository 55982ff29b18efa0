//! Arena Coordination Library
//!
//! Deterministic core of the competitive evaluation engine. Nothing in this
//! crate performs I/O or talks to the content oracle; every structure it
//! produces is plain data a caller can inspect or persist.
//!
//! # Modules
//!
//! - `model`: directions, competing items, quality assessments
//! - `registry`: per-run item registry
//! - `elo`: the rating tracker (sole mutator of ratings)
//! - `bracket`: seeding, pairing and the single-elimination state machine
//! - `analytics`: leaderboard compilation and rating history replay
//! - `debate`: two-expert debate state, consensus resolution, guardrails
//! - `failure`: failure taxonomy collected into the run result
//!
//! # Flow
//!
//! ```text
//! items ──► EloTracker::initialize ──► Bracket (per direction)
//!                 ▲                        │ pairings
//!                 └──── update(w, l) ◄─────┘ decided by caller
//!                                          │
//!              compile_rankings ◄── TournamentResult.all_matches
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod analytics;
pub mod bracket;
pub mod debate;
pub mod elo;
pub mod failure;
pub mod model;
pub mod registry;

// Re-export key model types
pub use model::{
    CompetingItem, Confidence, Direction, DirectionId, ItemId, ItemOrigin, QualityAssessment,
    Recommendation, BASE_RATING, NEUTRAL_QUALITY,
};

// Re-export key rating types
pub use elo::{
    expected_score, EloError, EloTracker, EloUpdate, RatingRecord, RatingSnapshot,
    RatingStatistics, SeedPolicy, SharedEloTracker,
};

// Re-export key bracket types
pub use bracket::{
    seed_order, Bracket, BracketError, BracketState, MatchResult, Pairing, RoundSummary,
    TournamentResult,
};

// Re-export key analytics types
pub use analytics::{
    compile_rankings, replay_ratings, LeaderboardEntry, MatchHistory, PerformanceTier,
    RankingReport,
};

// Re-export key debate types
pub use debate::{
    DebateKind, DebateOrchestrator, DebateOutcome, DebateSignal, DebateTranscript, DebateVerdict,
    FinalistChoice, NextAction, Speaker,
};

pub use failure::{FailureKind, FailureLog, FailureRecord, Phase};
pub use registry::{ItemRegistry, RegistryError};
