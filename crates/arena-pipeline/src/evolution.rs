//! Evolution tournament: improve each direction champion, then re-bracket.
//!
//! ```text
//! champion ──► JoinSet: generate(strategy) per strategy ──► variants (origin = evolved)
//!                                                              │ optional reflection
//!                                                              ▼
//!                        TournamentRunner::run_direction([champion, variants...])
//!                                                              │
//!                                     winner == champion ? Original : Evolved
//! ```
//!
//! A failed attempt just means one fewer variant. A failed second bracket
//! leaves the original champion in place.

use std::collections::HashMap;
use std::sync::Arc;

use coordination::failure::{FailureRecord, Phase};
use coordination::{CompetingItem, Direction, DirectionId, ItemId, TournamentResult};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::errors::{OracleError, PipelineError};
use crate::oracle::{DirectionContext, Generation, OracleGate};
use crate::prompts;
use crate::reflection::reflect;
use crate::tournament::TournamentRunner;

/// Characters of the champion's critique carried into an attempt record.
const CRITIQUE_SUMMARY_CHARS: usize = 400;

/// Closed set of improvement strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvolutionStrategy {
    Enhance,
    Refine,
    Extend,
}

impl EvolutionStrategy {
    pub const ALL: [EvolutionStrategy; 3] = [Self::Enhance, Self::Refine, Self::Extend];

    pub fn name(self) -> &'static str {
        match self {
            Self::Enhance => "enhance",
            Self::Refine => "refine",
            Self::Extend => "extend",
        }
    }

    /// Instruction fragment handed to the generator.
    pub fn instruction(self) -> &'static str {
        match self {
            Self::Enhance => {
                "Enhance the scenario: strengthen its weakest parts and make its core \
                 assumption more vivid and more consequential."
            }
            Self::Refine => {
                "Refine the scenario: fix inconsistencies, tighten the causal chain and \
                 remove anything the critique calls implausible."
            }
            Self::Extend => {
                "Extend the scenario: follow its consequences further in time and add \
                 second-order effects the original leaves out."
            }
        }
    }
}

impl std::fmt::Display for EvolutionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Whether the evolution bracket kept the champion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WinnerType {
    Original,
    Evolved,
}

/// One strategy applied to one champion. The id doubles as the variant's item id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionAttempt {
    pub attempt_id: String,
    pub source_item_id: ItemId,
    pub strategy: EvolutionStrategy,
    pub evolved_content: String,
    pub critique_summary_used: String,
}

/// Evolution outcome for one direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionResult {
    pub direction_id: DirectionId,
    pub original_champion_id: ItemId,
    pub attempts: Vec<EvolutionAttempt>,
    /// The second bracket; `None` when no attempt succeeded.
    pub bracket: Option<TournamentResult>,
    pub final_winner_id: ItemId,
    pub winner_type: WinnerType,
}

impl EvolutionResult {
    pub fn improved(&self) -> bool {
        self.winner_type == WinnerType::Evolved
    }
}

/// Everything the evolution phase produced.
#[derive(Debug, Clone, Default)]
pub struct EvolutionReport {
    pub results: Vec<EvolutionResult>,
    /// Evolved items, quality fields applied when scored.
    pub variants: Vec<CompetingItem>,
    pub failures: Vec<FailureRecord>,
    pub low_confidence: usize,
}

/// A champion and the critique its reflection produced.
#[derive(Debug, Clone)]
pub struct Champion {
    pub item: CompetingItem,
    pub critique: String,
}

#[derive(Debug, Clone)]
struct DirectionEvolution {
    result: EvolutionResult,
    variants: Vec<CompetingItem>,
    failures: Vec<FailureRecord>,
    low_confidence: usize,
}

/// Applies every configured strategy to each champion and re-brackets.
#[derive(Clone)]
pub struct EvolutionController {
    gate: OracleGate,
    runner: TournamentRunner,
    /// Strategies in configured order, duplicates removed.
    strategies: Arc<[(EvolutionStrategy, &'static str)]>,
    directions: Arc<HashMap<DirectionId, Direction>>,
    project_context: Option<String>,
    score_evolved: bool,
}

impl EvolutionController {
    pub fn new(
        gate: OracleGate,
        runner: TournamentRunner,
        strategies: &[EvolutionStrategy],
        directions: HashMap<DirectionId, Direction>,
    ) -> Self {
        let mut resolved: Vec<(EvolutionStrategy, &'static str)> = Vec::new();
        for strategy in strategies {
            if !resolved.iter().any(|(s, _)| s == strategy) {
                resolved.push((*strategy, strategy.instruction()));
            }
        }
        Self {
            gate,
            runner: runner.with_phase(Phase::EvolutionTournament),
            strategies: resolved.into(),
            directions: Arc::new(directions),
            project_context: None,
            score_evolved: true,
        }
    }

    pub fn with_project_context(mut self, project_context: Option<String>) -> Self {
        self.project_context = project_context;
        self
    }

    pub fn with_scoring(mut self, score_evolved: bool) -> Self {
        self.score_evolved = score_evolved;
        self
    }

    pub fn strategies(&self) -> Vec<EvolutionStrategy> {
        self.strategies.iter().map(|(s, _)| *s).collect()
    }

    /// Evolve every champion concurrently. Results keep input order.
    pub async fn run_all(&self, champions: Vec<Champion>) -> Result<EvolutionReport, PipelineError> {
        info!(
            champions = champions.len(),
            strategies = self.strategies.len(),
            "evolution starting"
        );

        let mut join_set: JoinSet<(usize, Result<DirectionEvolution, PipelineError>)> =
            JoinSet::new();
        for (position, champion) in champions.into_iter().enumerate() {
            let controller = self.clone();
            join_set.spawn(async move { (position, controller.evolve(champion).await) });
        }

        let mut evolved: Vec<(usize, DirectionEvolution)> = Vec::new();
        let mut cancelled = false;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((position, Ok(evolution))) => evolved.push((position, evolution)),
                Ok((_, Err(PipelineError::Cancelled))) => cancelled = true,
                Ok((_, Err(e))) => return Err(e),
                Err(e) => return Err(anyhow::anyhow!("evolution worker panicked: {e}").into()),
            }
        }
        if cancelled {
            return Err(PipelineError::Cancelled);
        }
        evolved.sort_by_key(|(position, _)| *position);

        let mut report = EvolutionReport::default();
        for (_, evolution) in evolved {
            report.low_confidence += evolution.low_confidence;
            report.failures.extend(evolution.failures);
            report.variants.extend(evolution.variants);
            report.results.push(evolution.result);
        }
        info!(
            directions = report.results.len(),
            improved = report.results.iter().filter(|r| r.improved()).count(),
            variants = report.variants.len(),
            "evolution complete"
        );
        Ok(report)
    }

    async fn evolve(&self, champion: Champion) -> Result<DirectionEvolution, PipelineError> {
        let Champion {
            item: champion,
            critique,
        } = champion;
        let direction_id = champion.direction_id.clone();
        let context = DirectionContext::new(
            self.direction(&direction_id),
            self.project_context.clone(),
        );
        let critique_summary: String = critique.trim().chars().take(CRITIQUE_SUMMARY_CHARS).collect();

        let mut join_set: JoinSet<(usize, EvolutionStrategy, Result<Generation, OracleError>)> =
            JoinSet::new();
        for (position, (strategy, instruction)) in self.strategies.iter().enumerate() {
            let gate = self.gate.clone();
            let context = context.clone();
            let prompt = prompts::evolution_task(&champion, instruction, &critique);
            let strategy = *strategy;
            join_set.spawn(async move {
                (position, strategy, gate.generate(&prompt, &context).await)
            });
        }

        let mut produced: Vec<(usize, EvolutionAttempt, CompetingItem)> = Vec::new();
        let mut failures = Vec::new();
        let mut cancelled = false;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((position, strategy, Ok(generation))) => {
                    let variant = CompetingItem::evolved_from(
                        &champion,
                        format!("evolution-{strategy}"),
                        generation.content,
                    );
                    debug!(direction = %direction_id, %strategy, variant = %variant.item_id, "variant produced");
                    let attempt = EvolutionAttempt {
                        attempt_id: variant.item_id.clone(),
                        source_item_id: champion.item_id.clone(),
                        strategy,
                        evolved_content: variant.content.clone(),
                        critique_summary_used: critique_summary.clone(),
                    };
                    produced.push((position, attempt, variant));
                }
                Ok((_, strategy, Err(e))) => {
                    cancelled |= e.is_cancelled();
                    warn!(direction = %direction_id, %strategy, error = %e, "evolution attempt failed");
                    failures.push(FailureRecord::task(
                        Phase::Evolution,
                        format!("{direction_id} {strategy}"),
                        e.to_string(),
                    ));
                }
                Err(e) => {
                    warn!(direction = %direction_id, error = %e, "evolution worker panicked");
                    failures.push(FailureRecord::task(
                        Phase::Evolution,
                        format!("{direction_id} worker"),
                        e.to_string(),
                    ));
                }
            }
        }
        if cancelled || self.gate.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        produced.sort_by_key(|(position, _, _)| *position);
        let (attempts, mut variants): (Vec<_>, Vec<_>) =
            produced.into_iter().map(|(_, a, v)| (a, v)).unzip();

        let mut low_confidence = 0;
        if self.score_evolved && !variants.is_empty() {
            let directions: HashMap<DirectionId, Direction> =
                HashMap::from([(direction_id.clone(), context.direction.clone())]);
            let scored = reflect(
                &self.gate,
                &variants,
                &directions,
                self.project_context.as_deref(),
                Phase::Evolution,
            )
            .await?;
            for variant in &mut variants {
                if let Some(assessment) = scored.assessments.get(&variant.item_id) {
                    variant.apply_assessment(assessment);
                }
            }
            low_confidence += scored.low_confidence;
            failures.extend(scored.failures);
        }

        let original_champion_id = champion.item_id.clone();
        if variants.is_empty() {
            info!(direction = %direction_id, "no variant produced, champion stands");
            return Ok(DirectionEvolution {
                result: EvolutionResult {
                    direction_id,
                    final_winner_id: original_champion_id.clone(),
                    original_champion_id,
                    attempts,
                    bracket: None,
                    winner_type: WinnerType::Original,
                },
                variants,
                failures,
                low_confidence,
            });
        }

        let mut entrants = Vec::with_capacity(variants.len() + 1);
        entrants.push(champion);
        entrants.extend(variants.iter().cloned());
        let outcome = self
            .runner
            .run_direction(direction_id.clone(), entrants)
            .await?;
        low_confidence += outcome.low_confidence;
        failures.extend(outcome.failures);

        let final_winner_id = outcome
            .result
            .winner_id
            .clone()
            .unwrap_or_else(|| original_champion_id.clone());
        let winner_type = if final_winner_id == original_champion_id {
            WinnerType::Original
        } else {
            WinnerType::Evolved
        };
        info!(
            direction = %direction_id,
            winner = %final_winner_id,
            ?winner_type,
            "evolution bracket decided"
        );

        Ok(DirectionEvolution {
            result: EvolutionResult {
                direction_id,
                original_champion_id,
                attempts,
                bracket: Some(outcome.result),
                final_winner_id,
                winner_type,
            },
            variants,
            failures,
            low_confidence,
        })
    }

    fn direction(&self, direction_id: &str) -> Direction {
        self.directions
            .get(direction_id)
            .cloned()
            .unwrap_or_else(|| Direction::new(direction_id, direction_id, "", ""))
    }
}
