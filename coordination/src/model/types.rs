//! Core entities for a single evaluation run
//!
//! Directions are produced upstream and never change once a run starts.
//! Competing items are created by the fan-out phase, enriched by reflection,
//! and retained for audit even after they are superseded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Unique identifier for competing items (UUIDv4 in production runs)
pub type ItemId = String;

/// Identifier of a research direction
pub type DirectionId = String;

/// Neutral quality score used whenever no reflection result exists
pub const NEUTRAL_QUALITY: u8 = 50;

/// Rating every item starts from before quality blending
pub const BASE_RATING: f64 = 1500.0;

/// A thematic angle under which competing content is generated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Direction {
    pub id: DirectionId,
    pub name: String,
    /// The assumption every item in this direction builds on
    pub core_assumption: String,
    pub focus: String,
}

impl Direction {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        core_assumption: impl Into<String>,
        focus: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            core_assumption: core_assumption.into(),
            focus: focus.into(),
        }
    }
}

/// Advancement recommendation attached by reflection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    Advance,
    #[default]
    Revise,
    Reject,
}

impl Recommendation {
    /// Match the bare keyword (case-insensitive)
    pub fn from_keyword(word: &str) -> Option<Self> {
        match word.trim().to_ascii_uppercase().as_str() {
            "ADVANCE" => Some(Self::Advance),
            "REVISE" => Some(Self::Revise),
            "REJECT" => Some(Self::Reject),
            _ => None,
        }
    }
}

impl std::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Advance => write!(f, "ADVANCE"),
            Self::Revise => write!(f, "REVISE"),
            Self::Reject => write!(f, "REJECT"),
        }
    }
}

/// How much the parsed oracle output can be trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// Every expected field was present
    High,
    /// At least one field fell back to its documented default
    Low,
}

/// Structured quality assessment for one item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityAssessment {
    /// Overall score, 0-100
    pub overall: u8,
    /// Named dimension scores, 0-100 each
    pub dimensions: BTreeMap<String, u8>,
    pub recommendation: Recommendation,
    pub confidence: Confidence,
    /// Short critique text, reused as evolution input
    pub critique: String,
}

impl QualityAssessment {
    /// Neutral fallback: score 50, REVISE, low confidence.
    pub fn neutral() -> Self {
        Self {
            overall: NEUTRAL_QUALITY,
            dimensions: BTreeMap::new(),
            recommendation: Recommendation::Revise,
            confidence: Confidence::Low,
            critique: String::new(),
        }
    }

    pub fn is_low_confidence(&self) -> bool {
        self.confidence == Confidence::Low
    }
}

/// Where an item came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemOrigin {
    /// Produced by the generation fan-out
    Generated,
    /// Produced by an evolution strategy applied to a champion
    Evolved,
}

impl std::fmt::Display for ItemOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Generated => write!(f, "generated"),
            Self::Evolved => write!(f, "evolved"),
        }
    }
}

/// One generated candidate within a direction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompetingItem {
    pub item_id: ItemId,
    pub direction_id: DirectionId,
    /// Which producer (task slot or evolution strategy) created the item
    pub producer_id: String,
    /// Opaque content blob
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// `None` until reflection has run; unscored items then record 50
    /// (see [`Self::fill_unscored_defaults`])
    pub quality_score: Option<u8>,
    #[serde(default)]
    pub quality_dimensions: BTreeMap<String, u8>,
    pub advancement_recommendation: Option<Recommendation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_confidence: Option<Confidence>,
    /// Mirror of the tracker rating; the tracker stays the source of truth
    pub elo_rating: f64,
    pub origin: ItemOrigin,
    /// Set for evolved items
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_item_id: Option<ItemId>,
}

impl CompetingItem {
    /// Create a freshly generated item with a random id.
    pub fn new(
        direction_id: impl Into<String>,
        producer_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::with_id(
            Uuid::new_v4().to_string(),
            direction_id,
            producer_id,
            content,
        )
    }

    /// Create an item with a caller-chosen id (replays, fixtures).
    pub fn with_id(
        item_id: impl Into<String>,
        direction_id: impl Into<String>,
        producer_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            item_id: item_id.into(),
            direction_id: direction_id.into(),
            producer_id: producer_id.into(),
            content: content.into(),
            created_at: Utc::now(),
            quality_score: None,
            quality_dimensions: BTreeMap::new(),
            advancement_recommendation: None,
            quality_confidence: None,
            elo_rating: BASE_RATING,
            origin: ItemOrigin::Generated,
            source_item_id: None,
        }
    }

    /// Derive an evolved variant of `source`. The source is never touched.
    pub fn evolved_from(
        source: &CompetingItem,
        producer_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let mut item = Self::new(source.direction_id.clone(), producer_id, content);
        item.origin = ItemOrigin::Evolved;
        item.source_item_id = Some(source.item_id.clone());
        item
    }

    pub fn with_quality(mut self, score: u8) -> Self {
        self.quality_score = Some(score.min(100));
        self
    }

    /// Quality used for seeding: the reflection score, or neutral 50.
    pub fn effective_quality(&self) -> u8 {
        self.quality_score.unwrap_or(NEUTRAL_QUALITY)
    }

    pub fn effective_recommendation(&self) -> Recommendation {
        self.advancement_recommendation.unwrap_or_default()
    }

    /// Copy a reflection result onto the item's quality fields.
    pub fn apply_assessment(&mut self, assessment: &QualityAssessment) {
        self.quality_score = Some(assessment.overall.min(100));
        self.quality_dimensions = assessment.dimensions.clone();
        self.advancement_recommendation = Some(assessment.recommendation);
        self.quality_confidence = Some(assessment.confidence);
    }

    /// Record the neutral defaults (50, REVISE) on an item reflection
    /// could not score. Confidence stays unset. Returns whether anything
    /// changed.
    pub fn fill_unscored_defaults(&mut self) -> bool {
        if self.quality_score.is_some() && self.advancement_recommendation.is_some() {
            return false;
        }
        self.quality_score.get_or_insert(NEUTRAL_QUALITY);
        self.advancement_recommendation
            .get_or_insert(Recommendation::default());
        true
    }

    pub fn is_evolved(&self) -> bool {
        self.origin == ItemOrigin::Evolved
    }
}
