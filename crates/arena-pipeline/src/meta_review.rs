//! Meta-review: champion statistics plus one narrative call.
//!
//! Runs last and never fails the run: zero champions gives an empty
//! summary without an oracle call, and a failed call gives an empty
//! narrative plus a task failure.

use coordination::failure::{FailureRecord, Phase};
use coordination::{CompetingItem, DirectionId, ItemId};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::{OracleError, PipelineError};
use crate::oracle::grammar::parse_insights;
use crate::oracle::{DirectionContext, OracleGate};
use crate::prompts;

/// Final champion of one direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChampionSummary {
    pub direction_id: DirectionId,
    pub item_id: ItemId,
    pub quality_score: u8,
    pub elo_rating: f64,
    pub evolved: bool,
}

impl ChampionSummary {
    pub fn from_item(item: &CompetingItem) -> Self {
        Self {
            direction_id: item.direction_id.clone(),
            item_id: item.item_id.clone(),
            quality_score: item.effective_quality(),
            elo_rating: item.elo_rating,
            evolved: item.is_evolved(),
        }
    }
}

/// Champion quality statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualitySummary {
    pub count: usize,
    pub average: f64,
    pub median: f64,
    pub min: u8,
    pub max: u8,
    pub range: u8,
}

impl QualitySummary {
    pub fn from_scores(scores: &[u8]) -> Self {
        if scores.is_empty() {
            return Self::default();
        }
        let mut sorted = scores.to_vec();
        sorted.sort_unstable();
        let count = sorted.len();
        let average = sorted.iter().map(|s| f64::from(*s)).sum::<f64>() / count as f64;
        let median = if count % 2 == 0 {
            (f64::from(sorted[count / 2 - 1]) + f64::from(sorted[count / 2])) / 2.0
        } else {
            f64::from(sorted[count / 2])
        };
        let min = sorted[0];
        let max = sorted[count - 1];
        Self {
            count,
            average,
            median,
            min,
            max,
            range: max - min,
        }
    }
}

/// Counters describing how the run went.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessStats {
    pub directions: usize,
    pub items_generated: usize,
    pub directions_completed: usize,
    pub total_matches: usize,
    pub upsets: usize,
    pub evolution_attempts: usize,
    pub evolved_winners: usize,
    pub low_confidence: usize,
    pub failures: usize,
}

impl ProcessStats {
    fn render(&self) -> String {
        format!(
            "directions: {} ({} completed)\nitems generated: {}\nmatches: {} ({} upsets)\n\
             evolution attempts: {} ({} evolved winners)\nlow-confidence parses: {}\nisolated failures: {}",
            self.directions,
            self.directions_completed,
            self.items_generated,
            self.total_matches,
            self.upsets,
            self.evolution_attempts,
            self.evolved_winners,
            self.low_confidence,
            self.failures
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetaReview {
    pub champions: Vec<ChampionSummary>,
    pub quality: QualitySummary,
    pub process: ProcessStats,
    pub narrative: String,
    pub insights: Vec<String>,
}

impl MetaReview {
    pub fn is_empty(&self) -> bool {
        self.champions.is_empty()
    }
}

/// Summarize the champions and ask the oracle for a process critique.
pub async fn synthesize(
    gate: &OracleGate,
    champions: Vec<ChampionSummary>,
    process: ProcessStats,
) -> Result<(MetaReview, Vec<FailureRecord>), PipelineError> {
    let scores: Vec<u8> = champions.iter().map(|c| c.quality_score).collect();
    let mut review = MetaReview {
        quality: QualitySummary::from_scores(&scores),
        champions,
        process,
        ..Default::default()
    };
    if review.is_empty() {
        info!("no champions, meta-review left empty");
        return Ok((review, Vec::new()));
    }

    let mut summary = review.process.render();
    summary.push_str(&format!(
        "\nchampion quality: avg {:.1}, median {:.1}, range {}-{}\n",
        review.quality.average, review.quality.median, review.quality.min, review.quality.max
    ));
    for champion in &review.champions {
        summary.push_str(&format!(
            "- {} champion {} (quality {}, rating {:.0}{})\n",
            champion.direction_id,
            champion.item_id,
            champion.quality_score,
            champion.elo_rating,
            if champion.evolved { ", evolved" } else { "" }
        ));
    }

    let context = DirectionContext::detached("meta-review", "evaluation process critique");
    let mut failures = Vec::new();
    match gate.generate(&prompts::meta_review(&summary), &context).await {
        Ok(generation) => {
            review.insights = parse_insights(&generation.content);
            review.narrative = generation.content;
            info!(insights = review.insights.len(), "meta-review written");
        }
        Err(OracleError::Cancelled) => return Err(PipelineError::Cancelled),
        Err(e) => {
            warn!(error = %e, "meta-review call failed, narrative left empty");
            failures.push(FailureRecord::task(
                Phase::MetaReview,
                "narrative",
                e.to_string(),
            ));
        }
    }
    Ok((review, failures))
}
