//! Pipeline orchestrator: one run, start to finish.
//!
//! Owns the per-run state (item registry, shared rating tracker, failure
//! log) and passes it through the phases in order. Only
//! [`PipelineError`] escapes; everything else is recorded in
//! [`PipelineResult::failures`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use coordination::failure::Phase;
use coordination::{
    compile_rankings, CompetingItem, DebateTranscript, DebateVerdict, Direction, DirectionId,
    EloTracker, FailureLog, ItemId, ItemRegistry, LeaderboardEntry, MatchHistory,
    MatchResult, RankingReport, SeedPolicy, SharedEloTracker, TournamentResult,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::debate::DebateEngine;
use crate::errors::PipelineError;
use crate::evolution::{Champion, EvolutionController, EvolutionResult, WinnerType};
use crate::fanout::fan_out;
use crate::meta_review::{synthesize, ChampionSummary, MetaReview, ProcessStats};
use crate::oracle::{ContentOracle, DirectionContext, OracleGate};
use crate::reflection::reflect;
use crate::tournament::TournamentRunner;

/// Final champion of one direction, after evolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectionWinner {
    pub direction_id: DirectionId,
    pub item_id: ItemId,
    pub winner_type: WinnerType,
    pub elo_rating: f64,
    pub quality_score: u8,
}

/// Everything one run produced. Plain data, ready to persist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Completed directions, highest rating first.
    pub direction_winners: Vec<DirectionWinner>,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub analytics: RankingReport,
    /// Initial brackets, one per direction in input order.
    pub tournaments: Vec<TournamentResult>,
    pub evolution_results: Vec<EvolutionResult>,
    pub debate_transcript: Option<DebateTranscript>,
    pub debate_verdict: Option<DebateVerdict>,
    pub overall_champion: Option<ItemId>,
    pub meta_review: MetaReview,
    /// Every item produced in the run, superseded ones included.
    pub items: Vec<CompetingItem>,
    /// Seed ratings plus the match log; replays to the final ratings.
    pub rating_history: MatchHistory,
    pub failures: FailureLog,
}

impl PipelineResult {
    pub fn failed_directions(&self) -> Vec<&DirectionId> {
        self.tournaments
            .iter()
            .filter(|t| t.tournament_failed)
            .map(|t| &t.direction_id)
            .collect()
    }
}

/// One configured run against one oracle.
pub struct Pipeline {
    oracle: Arc<dyn ContentOracle>,
    config: PipelineConfig,
    cancel: CancellationToken,
}

impl Pipeline {
    pub fn new(oracle: Arc<dyn ContentOracle>, config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate().map_err(PipelineError::Configuration)?;
        Ok(Self {
            oracle,
            config,
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every phase over `directions`.
    pub async fn run(&self, directions: Vec<Direction>) -> Result<PipelineResult, PipelineError> {
        if directions.is_empty() {
            return Err(PipelineError::NoDirections);
        }
        let mut seen = HashSet::new();
        if let Some(dup) = directions.iter().find(|d| !seen.insert(d.id.as_str())) {
            return Err(PipelineError::Configuration(format!(
                "direction id {} appears more than once",
                dup.id
            )));
        }

        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let config = &self.config;
        info!(
            run = %run_id,
            directions = directions.len(),
            replicas = config.replica_count,
            "pipeline starting"
        );

        let gate = OracleGate::from_config(self.oracle.clone(), config)
            .with_cancellation(self.cancel.clone());
        let project_context = config.project_context.as_deref();
        let by_id: HashMap<DirectionId, Direction> = directions
            .iter()
            .map(|d| (d.id.clone(), d.clone()))
            .collect();
        let mut failures = FailureLog::new();
        let mut registry = ItemRegistry::new();
        let mut low_confidence = 0;

        // Fan-out
        let generated = fan_out(&gate, &directions, config.replica_count, project_context).await?;
        failures.extend(generated.failures);
        let items_generated = generated.items.len();
        for item in generated.items {
            registry.insert(item).map_err(anyhow::Error::new)?;
        }

        // Reflection
        self.ensure_live()?;
        let reflection = reflect(
            &gate,
            &registry.to_vec(),
            &by_id,
            project_context,
            Phase::Reflection,
        )
        .await?;
        for (item_id, assessment) in &reflection.assessments {
            registry
                .apply_assessment(item_id, assessment)
                .map_err(anyhow::Error::new)?;
        }
        let unscored = registry.fill_unscored_defaults();
        if unscored > 0 {
            warn!(items = unscored, "unscored items keep neutral 50 / REVISE");
        }
        low_confidence += reflection.low_confidence;
        failures.extend(reflection.failures);
        let critiques: HashMap<ItemId, String> = reflection
            .assessments
            .into_iter()
            .map(|(id, a)| (id, a.critique))
            .collect();

        // Ratings
        let mut tracker = EloTracker::new(config.k_factor)
            .map_err(|e| PipelineError::Configuration(e.to_string()))?
            .with_seed_policy(SeedPolicy {
                quality_weight: config.quality_weight,
                quality_scale: config.quality_scale,
            });
        tracker.initialize(&registry.to_vec(), config.quality_weight);
        let tracker: SharedEloTracker = tracker.shared();

        // Tournament
        self.ensure_live()?;
        let contexts: HashMap<DirectionId, DirectionContext> = directions
            .iter()
            .map(|d| {
                (
                    d.id.clone(),
                    DirectionContext::new(d.clone(), config.project_context.clone()),
                )
            })
            .collect();
        let runner = TournamentRunner::new(gate.clone(), tracker.clone(), contexts);
        let groups: Vec<(DirectionId, Vec<CompetingItem>)> = directions
            .iter()
            .map(|d| {
                let entrants = registry.by_direction(&d.id).into_iter().cloned().collect();
                (d.id.clone(), entrants)
            })
            .collect();
        let tournament = runner.run_all(groups).await?;
        low_confidence += tournament.low_confidence;
        failures.extend(tournament.failures.iter().cloned());
        if tournament.completed() == 0 {
            let cause = tournament
                .failures
                .first()
                .map(|f| f.cause.clone())
                .unwrap_or_else(|| "no bracket completed".into());
            return Err(PipelineError::Fatal {
                phase: Phase::Tournament,
                attempted: tournament.results.len(),
                cause,
            });
        }

        // Evolution
        self.ensure_live()?;
        let champions: Vec<Champion> = tournament
            .winners()
            .into_iter()
            .filter_map(|(_, winner)| {
                let item = registry.get(&winner)?.clone();
                let critique = critiques.get(&winner).cloned().unwrap_or_default();
                Some(Champion { item, critique })
            })
            .collect();
        let evolution = if config.evolution_strategies.is_empty() {
            info!("no evolution strategies configured, skipping evolution");
            Default::default()
        } else {
            EvolutionController::new(
                gate.clone(),
                runner.clone(),
                &config.evolution_strategies,
                by_id.clone(),
            )
            .with_project_context(config.project_context.clone())
            .with_scoring(config.score_evolved)
            .run_all(champions)
            .await?
        };
        low_confidence += evolution.low_confidence;
        failures.extend(evolution.failures);
        for variant in evolution.variants {
            registry.insert(variant).map_err(anyhow::Error::new)?;
        }
        registry.fill_unscored_defaults();

        // Rankings
        let snapshot = {
            let tracker = tracker
                .lock()
                .map_err(|_| anyhow::anyhow!("rating tracker lock poisoned"))?;
            registry.sync_ratings(&tracker);
            tracker.snapshot()
        };
        let matches: Vec<MatchResult> = tournament
            .all_matches()
            .chain(
                evolution
                    .results
                    .iter()
                    .filter_map(|r| r.bracket.as_ref())
                    .flat_map(|b| b.all_matches.iter()),
            )
            .cloned()
            .collect();
        let items = registry.to_vec();
        let analytics = compile_rankings(&items, &matches, &snapshot);

        let direction_winners = self.direction_winners(&tournament.winners(), &evolution.results, &registry);

        // Final debate
        self.ensure_live()?;
        let mut debate_transcript = None;
        let mut debate_verdict = None;
        let mut overall_champion = direction_winners.first().map(|w| w.item_id.clone());
        if config.use_debate {
            if let [first, second, ..] = direction_winners.as_slice() {
                if let (Some(first), Some(second)) =
                    (registry.get(&first.item_id), registry.get(&second.item_id))
                {
                    let debate = DebateEngine::new(gate.clone(), config.max_debate_rounds)
                        .final_debate(first, second, project_context.unwrap_or_default())
                        .await?;
                    failures.extend(debate.failures);
                    debate_verdict = debate.outcome.verdict;
                    debate_transcript = Some(debate.outcome.transcript);
                    overall_champion = Some(debate.winner_id);
                }
            }
        }

        // Meta-review
        self.ensure_live()?;
        let champion_summaries: Vec<ChampionSummary> = direction_winners
            .iter()
            .filter_map(|w| registry.get(&w.item_id))
            .map(ChampionSummary::from_item)
            .collect();
        let process = ProcessStats {
            directions: directions.len(),
            items_generated,
            directions_completed: tournament.completed(),
            total_matches: analytics.total_matches,
            upsets: analytics.upset_count,
            evolution_attempts: evolution.results.iter().map(|r| r.attempts.len()).sum(),
            evolved_winners: evolution.results.iter().filter(|r| r.improved()).count(),
            low_confidence,
            failures: failures.len(),
        };
        let (meta_review, review_failures) = synthesize(&gate, champion_summaries, process).await?;
        failures.extend(review_failures);

        info!(
            run = %run_id,
            winners = direction_winners.len(),
            champion = overall_champion.as_deref().unwrap_or("none"),
            failures = failures.len(),
            oracle_attempts = gate.attempts(),
            "pipeline complete"
        );
        if !failures.is_empty() {
            warn!(failures = failures.len(), "run finished with isolated failures");
        }

        Ok(PipelineResult {
            run_id,
            started_at,
            finished_at: Utc::now(),
            direction_winners,
            leaderboard: analytics.leaderboard.clone(),
            analytics,
            tournaments: tournament.results,
            evolution_results: evolution.results,
            debate_transcript,
            debate_verdict,
            overall_champion,
            meta_review,
            items,
            rating_history: MatchHistory::capture(&snapshot, matches),
            failures,
        })
    }

    fn ensure_live(&self) -> Result<(), PipelineError> {
        if self.cancel.is_cancelled() {
            warn!("pipeline cancelled between phases");
            return Err(PipelineError::Cancelled);
        }
        Ok(())
    }

    /// Post-evolution winners, highest rating first (ties by item id).
    fn direction_winners(
        &self,
        tournament_winners: &[(DirectionId, ItemId)],
        evolution: &[EvolutionResult],
        registry: &ItemRegistry,
    ) -> Vec<DirectionWinner> {
        let evolved: HashMap<&str, &EvolutionResult> = evolution
            .iter()
            .map(|r| (r.direction_id.as_str(), r))
            .collect();
        let mut winners: Vec<DirectionWinner> = tournament_winners
            .iter()
            .filter_map(|(direction_id, winner)| {
                let (item_id, winner_type) = match evolved.get(direction_id.as_str()) {
                    Some(result) => (result.final_winner_id.clone(), result.winner_type),
                    None => (winner.clone(), WinnerType::Original),
                };
                let item = registry.get(&item_id)?;
                Some(DirectionWinner {
                    direction_id: direction_id.clone(),
                    item_id,
                    winner_type,
                    elo_rating: item.elo_rating,
                    quality_score: item.effective_quality(),
                })
            })
            .collect();
        winners.sort_by(|a, b| {
            b.elo_rating
                .total_cmp(&a.elo_rating)
                .then_with(|| a.item_id.cmp(&b.item_id))
        });
        winners
    }
}

/// Run one pipeline: validate `config`, then every phase over `directions`.
pub async fn run_pipeline(
    oracle: Arc<dyn ContentOracle>,
    directions: Vec<Direction>,
    config: PipelineConfig,
    cancel: CancellationToken,
) -> Result<PipelineResult, PipelineError> {
    Pipeline::new(oracle, config)?
        .with_cancellation(cancel)
        .run(directions)
        .await
}
