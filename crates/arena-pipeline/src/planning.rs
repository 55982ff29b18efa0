//! Direction planning: meta debate first, single oracle second, neutral last.
//!
//! Never returns zero directions.

use coordination::failure::{FailureRecord, Phase};
use coordination::{DebateTranscript, Direction};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::debate::DebateEngine;
use crate::errors::{OracleError, PipelineError};
use crate::oracle::grammar::parse_direction_list;
use crate::oracle::{DirectionContext, OracleGate};
use crate::prompts;

/// Which path produced the directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanSource {
    Consensus,
    SingleOracle,
    Neutral,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanningReport {
    pub directions: Vec<Direction>,
    pub source: PlanSource,
    /// The meta debate, whichever way it ended.
    pub transcript: Option<DebateTranscript>,
    pub failures: Vec<FailureRecord>,
}

/// Produce up to `count` directions for `brief`.
pub async fn plan_directions(
    gate: &OracleGate,
    brief: &str,
    count: usize,
    max_rounds: u32,
) -> Result<PlanningReport, PipelineError> {
    let count = count.max(1);
    let mut failures = Vec::new();

    let debate = DebateEngine::new(gate.clone(), max_rounds)
        .meta_debate(brief, count, Phase::Planning)
        .await?;
    failures.extend(debate.failures);
    let transcript = Some(debate.outcome.transcript.clone());

    if let Some(consensus) = &debate.outcome.consensus {
        let mut directions = parse_direction_list(&consensus.content);
        directions.truncate(count);
        if !directions.is_empty() {
            info!(directions = directions.len(), "directions agreed in debate");
            return Ok(PlanningReport {
                directions,
                source: PlanSource::Consensus,
                transcript,
                failures,
            });
        }
        warn!(chars = consensus.content.len(), "consensus statement listed no directions");
        failures.push(FailureRecord::parse(
            Phase::Planning,
            "consensus",
            "consensus statement listed no directions",
        ));
    } else {
        info!("no consensus in planning debate, falling back to single oracle");
    }

    let context = DirectionContext::detached("planning", brief);
    match gate
        .generate(&prompts::direction_generation(brief, count), &context)
        .await
    {
        Ok(generation) => {
            let mut directions = parse_direction_list(&generation.content);
            directions.truncate(count);
            if !directions.is_empty() {
                info!(directions = directions.len(), "directions from single oracle");
                return Ok(PlanningReport {
                    directions,
                    source: PlanSource::SingleOracle,
                    transcript,
                    failures,
                });
            }
            warn!(chars = generation.content.len(), "direction list unreadable");
            failures.push(FailureRecord::parse(
                Phase::Planning,
                "direction list",
                "no `name | assumption | focus` lines found",
            ));
        }
        Err(OracleError::Cancelled) => return Err(PipelineError::Cancelled),
        Err(e) => {
            warn!(error = %e, "direction generation failed");
            failures.push(FailureRecord::task(
                Phase::Planning,
                "direction list",
                e.to_string(),
            ));
        }
    }

    warn!("planning fell back to a single neutral direction");
    Ok(PlanningReport {
        directions: vec![neutral_direction(brief)],
        source: PlanSource::Neutral,
        transcript,
        failures,
    })
}

/// One direction that just restates the brief.
pub fn neutral_direction(brief: &str) -> Direction {
    Direction::new("d1", "Baseline", brief.trim(), "Most likely outcome")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{Generation, MockContentOracle};
    use std::sync::Arc;
    use std::time::Duration;

    fn gate(mock: MockContentOracle) -> OracleGate {
        OracleGate::new(Arc::new(mock), 2, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_consensus_directions_used() {
        let mut mock = MockContentOracle::new();
        mock.expect_converse().returning(|_, _| {
            Ok("CONSENSUS REACHED:\n1. Grid | storage gets cheap | utilities\n2. Policy | carbon tax | regulation".to_string())
        });
        mock.expect_generate().never();

        let report = plan_directions(&gate(mock), "energy in 2040", 2, 3)
            .await
            .unwrap();
        assert_eq!(report.source, PlanSource::Consensus);
        assert_eq!(report.directions.len(), 2);
        assert_eq!(report.directions[1].name, "Policy");
    }

    #[tokio::test]
    async fn test_no_consensus_falls_back_to_single_oracle() {
        let mut mock = MockContentOracle::new();
        mock.expect_converse()
            .returning(|_, _| Ok("Let us keep discussing.".to_string()));
        mock.expect_generate()
            .times(1)
            .returning(|_, _| Ok(Generation::new("Grid | storage gets cheap | utilities")));

        let report = plan_directions(&gate(mock), "energy", 3, 2).await.unwrap();
        assert_eq!(report.source, PlanSource::SingleOracle);
        assert_eq!(report.directions.len(), 1);
        assert!(report.transcript.is_some());
    }

    #[tokio::test]
    async fn test_everything_failing_still_yields_a_direction() {
        let mut mock = MockContentOracle::new();
        mock.expect_converse()
            .returning(|_, _| Err(OracleError::Unavailable("connection refused".into())));
        mock.expect_generate()
            .returning(|_, _| Err(OracleError::Unavailable("connection refused".into())));

        let report = plan_directions(&gate(mock), "energy", 3, 2).await.unwrap();
        assert_eq!(report.source, PlanSource::Neutral);
        assert_eq!(report.directions.len(), 1);
        assert_eq!(report.directions[0].core_assumption, "energy");
        assert_eq!(report.failures.len(), 2);
    }
}
