//! Scripted content oracle shared by the integration tests.
//!
//! Generated content carries its own score (`d1#0 score=90`), so scoring
//! and comparison are deterministic: the higher score wins, ties go to A.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use arena_pipeline::oracle::{
    Comparison, ComparisonVerdict, ContentOracle, ConversationTurn, DirectionContext, Generation,
};
use arena_pipeline::prompts::SYNTHESIZER_PREAMBLE;
use arena_pipeline::OracleError;
use async_trait::async_trait;
use coordination::{Confidence, Direction, QualityAssessment, Recommendation};
use tokio_util::sync::CancellationToken;

type ConverseFn = Box<dyn Fn(&str) -> Result<String, OracleError> + Send + Sync>;

/// Deterministic oracle driven by per-direction score tables.
pub struct ScriptedOracle {
    /// Quality per direction, indexed by replica.
    scores: HashMap<String, Vec<u8>>,
    /// Score change applied to evolved variants.
    evolution_delta: i16,
    failing_generation: Vec<String>,
    failing_comparison: Vec<String>,
    failing_scoring: Vec<String>,
    converse: ConverseFn,
    cancel_on_score: Option<CancellationToken>,
    pub generate_calls: AtomicUsize,
    pub score_calls: AtomicUsize,
    pub compare_calls: AtomicUsize,
    pub converse_calls: AtomicUsize,
}

impl ScriptedOracle {
    pub fn new(scores: &[(&str, &[u8])]) -> Self {
        Self {
            scores: scores
                .iter()
                .map(|(d, s)| (d.to_string(), s.to_vec()))
                .collect(),
            evolution_delta: -10,
            failing_generation: Vec::new(),
            failing_comparison: Vec::new(),
            failing_scoring: Vec::new(),
            converse: Box::new(|prompt| {
                if prompt.contains("FINAL VERDICT") {
                    Ok("Finalist 1 holds up better.\nFINAL VERDICT: 1".to_string())
                } else {
                    Ok("Both finalists are credible.".to_string())
                }
            }),
            cancel_on_score: None,
            generate_calls: AtomicUsize::new(0),
            score_calls: AtomicUsize::new(0),
            compare_calls: AtomicUsize::new(0),
            converse_calls: AtomicUsize::new(0),
        }
    }

    /// Evolved variants score `delta` points away from their source.
    pub fn with_evolution_delta(mut self, delta: i16) -> Self {
        self.evolution_delta = delta;
        self
    }

    /// Every generation call for `direction` fails.
    pub fn failing_generation(mut self, direction: &str) -> Self {
        self.failing_generation.push(direction.to_string());
        self
    }

    /// Every comparison involving `direction`'s items fails.
    pub fn failing_comparison(mut self, direction: &str) -> Self {
        self.failing_comparison.push(direction.to_string());
        self
    }

    /// Every score call for `direction`'s items fails.
    pub fn failing_scoring(mut self, direction: &str) -> Self {
        self.failing_scoring.push(direction.to_string());
        self
    }

    pub fn with_converse(
        mut self,
        converse: impl Fn(&str) -> Result<String, OracleError> + Send + Sync + 'static,
    ) -> Self {
        self.converse = Box::new(converse);
        self
    }

    /// Cancel `token` on the first score call.
    pub fn cancelling_on_score(mut self, token: CancellationToken) -> Self {
        self.cancel_on_score = Some(token);
        self
    }

    pub fn calls(&self, counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// Score embedded in scripted content.
pub fn score_of(content: &str) -> Option<u8> {
    content
        .rsplit("score=")
        .next()
        .filter(|_| content.contains("score="))
        .and_then(|s| s.split_whitespace().next())
        .and_then(|s| s.parse().ok())
}

/// Replica number from a fan-out task ("variant 2 of 3" is replica 1).
fn replica_of(task: &str) -> Option<usize> {
    let rest = task.split("variant ").nth(1)?;
    let n: usize = rest.split_whitespace().next()?.parse().ok()?;
    n.checked_sub(1)
}

#[async_trait]
impl ContentOracle for ScriptedOracle {
    async fn generate(
        &self,
        task: &str,
        context: &DirectionContext,
    ) -> Result<Generation, OracleError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        let direction = &context.direction.id;

        if task.starts_with(SYNTHESIZER_PREAMBLE) {
            return Ok(Generation::new(
                "Balanced run.\n- Strong seeds held their lead\n- Evolution rarely helped",
            ));
        }
        if task.contains("research directions") {
            return Ok(Generation::new(
                "Grid | storage gets cheap | utilities\nPolicy | carbon is taxed | regulation",
            ));
        }
        if self.failing_generation.contains(direction) {
            return Err(OracleError::Request(format!("{direction} generator down")));
        }
        if let Some(source_score) = score_of(task) {
            let evolved = (i16::from(source_score) + self.evolution_delta).clamp(0, 100);
            return Ok(Generation::new(format!(
                "{direction}#evolved {} score={evolved}",
                self.generate_calls.load(Ordering::SeqCst)
            )));
        }

        let replica = replica_of(task).ok_or_else(|| OracleError::Parse(task.to_string()))?;
        let score = self
            .scores
            .get(direction)
            .and_then(|s| s.get(replica))
            .copied()
            .unwrap_or(50);
        Ok(Generation::new(format!("{direction}#{replica} score={score}")))
    }

    async fn score(
        &self,
        content: &str,
        context: &DirectionContext,
    ) -> Result<QualityAssessment, OracleError> {
        self.score_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(token) = &self.cancel_on_score {
            token.cancel();
        }
        if self.failing_scoring.contains(&context.direction.id) {
            return Err(OracleError::Request("critic down".into()));
        }
        let overall = score_of(content).unwrap_or(50);
        Ok(QualityAssessment {
            overall,
            dimensions: [("PLAUSIBILITY".to_string(), overall)].into_iter().collect(),
            recommendation: if overall >= 60 {
                Recommendation::Advance
            } else {
                Recommendation::Revise
            },
            confidence: Confidence::High,
            critique: format!("scored {overall}"),
        })
    }

    async fn compare(
        &self,
        content_a: &str,
        content_b: &str,
        _context: &str,
    ) -> Result<Comparison, OracleError> {
        self.compare_calls.fetch_add(1, Ordering::SeqCst);
        if self
            .failing_comparison
            .iter()
            .any(|d| content_a.starts_with(&format!("{d}#")))
        {
            return Err(OracleError::Unavailable("judge unreachable".into()));
        }
        let a = score_of(content_a).unwrap_or(0);
        let b = score_of(content_b).unwrap_or(0);
        Ok(Comparison {
            verdict: if a >= b {
                ComparisonVerdict::A
            } else {
                ComparisonVerdict::B
            },
            reasoning: format!("{a} vs {b}"),
        })
    }

    async fn converse(
        &self,
        prompt: &str,
        _history: &[ConversationTurn],
    ) -> Result<String, OracleError> {
        self.converse_calls.fetch_add(1, Ordering::SeqCst);
        (self.converse)(prompt)
    }
}

pub fn directions(ids: &[&str]) -> Vec<Direction> {
    ids.iter()
        .map(|id| Direction::new(*id, format!("Direction {id}"), "assumption", "focus"))
        .collect()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}
