//! Reflection scoring: one assessment call per item.
//!
//! A failed call leaves the item on its neutral defaults (50 / REVISE) and
//! is recorded as a task failure. A response with missing fields is used
//! with its defaults and recorded as a parse failure. Neither stops the
//! phase.

use std::collections::{BTreeMap, HashMap};

use coordination::failure::{FailureRecord, Phase};
use coordination::{CompetingItem, Direction, DirectionId, ItemId, QualityAssessment};
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::errors::{OracleError, PipelineError};
use crate::oracle::{DirectionContext, OracleGate};

/// Outcome of scoring a batch of items.
#[derive(Debug, Clone, Default)]
pub struct ReflectionReport {
    /// Assessments that came back, keyed by item.
    pub assessments: BTreeMap<ItemId, QualityAssessment>,
    pub failures: Vec<FailureRecord>,
    /// Items whose assessment fell back to a default field.
    pub low_confidence: usize,
}

impl ReflectionReport {
    pub fn scored(&self) -> usize {
        self.assessments.len()
    }
}

/// Score every item concurrently.
///
/// `phase` is the phase failures are recorded under (reflection proper, or
/// the evolution phase when variants are scored).
pub async fn reflect(
    gate: &OracleGate,
    items: &[CompetingItem],
    directions: &HashMap<DirectionId, Direction>,
    project_context: Option<&str>,
    phase: Phase,
) -> Result<ReflectionReport, PipelineError> {
    info!(items = items.len(), %phase, "reflection starting");

    let mut join_set: JoinSet<(ItemId, Result<QualityAssessment, OracleError>)> = JoinSet::new();
    for item in items {
        let gate = gate.clone();
        let direction = directions
            .get(&item.direction_id)
            .cloned()
            .unwrap_or_else(|| {
                Direction::new(
                    item.direction_id.clone(),
                    item.direction_id.clone(),
                    "",
                    "",
                )
            });
        let context = DirectionContext::new(direction, project_context.map(str::to_string));
        let item_id = item.item_id.clone();
        let content = item.content.clone();
        join_set.spawn(async move {
            let result = gate.score(&content, &context).await;
            (item_id, result)
        });
    }

    let mut report = ReflectionReport::default();
    let mut cancelled = false;
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((item_id, Ok(assessment))) => {
                if assessment.is_low_confidence() {
                    report.low_confidence += 1;
                    warn!(item = %item_id, "assessment used neutral defaults");
                    report.failures.push(FailureRecord::parse(
                        phase,
                        item_id.clone(),
                        "assessment missing overall score or recommendation",
                    ));
                }
                report.assessments.insert(item_id, assessment);
            }
            Ok((item_id, Err(e))) => {
                cancelled |= e.is_cancelled();
                warn!(item = %item_id, error = %e, "reflection call failed, keeping defaults");
                report
                    .failures
                    .push(FailureRecord::task(phase, item_id, e.to_string()));
            }
            Err(e) => {
                warn!(error = %e, "reflection worker panicked");
                report
                    .failures
                    .push(FailureRecord::task(phase, "worker", e.to_string()));
            }
        }
    }

    if cancelled || gate.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }
    report.failures.sort_by(|a, b| a.subject.cmp(&b.subject));

    info!(
        scored = report.scored(),
        low_confidence = report.low_confidence,
        failed = items.len() - report.scored(),
        "reflection complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::MockContentOracle;
    use coordination::failure::FailureKind;
    use coordination::{Confidence, Recommendation};
    use std::sync::Arc;
    use std::time::Duration;

    fn gate(mock: MockContentOracle) -> OracleGate {
        OracleGate::new(Arc::new(mock), 4, Duration::from_secs(5))
    }

    fn assessment(overall: u8) -> QualityAssessment {
        QualityAssessment {
            overall,
            dimensions: BTreeMap::new(),
            recommendation: Recommendation::Advance,
            confidence: Confidence::High,
            critique: "fine".into(),
        }
    }

    #[tokio::test]
    async fn test_failures_and_low_confidence_are_isolated() {
        let mut mock = MockContentOracle::new();
        mock.expect_score().times(3).returning(|content, _| match content {
            "good" => Ok(assessment(88)),
            "vague" => Ok(QualityAssessment::neutral()),
            _ => Err(OracleError::Request("502".into())),
        });

        let items = vec![
            CompetingItem::with_id("i1", "d1", "replica-0", "good"),
            CompetingItem::with_id("i2", "d1", "replica-1", "vague"),
            CompetingItem::with_id("i3", "d1", "replica-2", "broken"),
        ];
        let report = reflect(&gate(mock), &items, &HashMap::new(), None, Phase::Reflection)
            .await
            .unwrap();

        assert_eq!(report.scored(), 2);
        assert_eq!(report.assessments["i1"].overall, 88);
        assert_eq!(report.low_confidence, 1);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].kind, FailureKind::ParseFailure);
        assert_eq!(report.failures[1].kind, FailureKind::TaskFailure);
        assert_eq!(report.failures[1].subject, "i3");
    }
}
