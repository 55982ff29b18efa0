//! Structured error types for the analytics module.

use crate::elo::EloError;
use crate::model::ItemId;

/// Errors from replaying or loading persisted rating history.
#[derive(Debug, thiserror::Error)]
pub enum AnalyticsError {
    /// A match references an item with no initial rating.
    #[error("Match {index} references item {item} with no initial rating")]
    MissingInitialRating { index: usize, item: ItemId },

    /// The rating update itself was rejected.
    #[error("Replay of match {index} failed: {source}")]
    Replay { index: usize, source: EloError },

    /// Failed to parse persisted JSON history.
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),
}

/// Result type alias for analytics operations.
pub type AnalyticsResult<T> = Result<T, AnalyticsError>;
