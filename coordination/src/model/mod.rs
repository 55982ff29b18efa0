//! Data model shared by every phase of a run

pub mod types;

pub use types::{
    CompetingItem, Confidence, Direction, DirectionId, ItemId, ItemOrigin, QualityAssessment,
    Recommendation, BASE_RATING, NEUTRAL_QUALITY,
};
