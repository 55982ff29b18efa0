//! Tournament runner: drives one [`Bracket`] per direction against the oracle.
//!
//! # Round flow
//!
//! ```text
//! start_round ──► JoinSet: compare(a, b) per match ──► drain (round barrier)
//!                                                          │
//!               any call failed? ── yes ──► bracket.fail → DirectionFailure
//!                                  │                        (nothing committed)
//!                                  no
//!                                  ▼
//!        lock tracker, update(w, l) in pairing order ──► record_round
//! ```
//!
//! Directions run concurrently and share only the Elo tracker. A failed
//! direction keeps its completed rounds and seeds; other directions are
//! unaffected.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, MutexGuard};

use coordination::bracket::{Bracket, BracketError, Pairing};
use coordination::elo::EloError;
use coordination::failure::{FailureRecord, Phase};
use coordination::{
    CompetingItem, DirectionId, EloTracker, ItemId, MatchResult, SharedEloTracker,
    TournamentResult,
};
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::errors::{OracleError, PipelineError};
use crate::oracle::{Comparison, ComparisonVerdict, DirectionContext, OracleGate};

/// Why a direction's bracket stopped.
#[derive(Debug, Error)]
enum BracketRunError {
    #[error("comparison failed: {0}")]
    Oracle(#[from] OracleError),

    #[error("bracket error: {0}")]
    Bracket(#[from] BracketError),

    #[error("rating update failed: {0}")]
    Elo(#[from] EloError),

    #[error("rating tracker lock poisoned")]
    Poisoned,
}

/// One round's results, staged before they reach the shared tracker.
struct RoundCommit {
    results: Vec<MatchResult>,
    low_confidence: usize,
    failures: Vec<FailureRecord>,
}

/// Result of one direction's bracket run.
#[derive(Debug, Clone)]
pub struct DirectionOutcome {
    pub result: TournamentResult,
    pub failures: Vec<FailureRecord>,
    /// Matches decided by the default because the verdict was unreadable.
    pub low_confidence: usize,
}

/// Results of a set of direction brackets, in input order.
#[derive(Debug, Clone, Default)]
pub struct TournamentReport {
    pub results: Vec<TournamentResult>,
    pub failures: Vec<FailureRecord>,
    pub low_confidence: usize,
}

impl TournamentReport {
    /// `(direction, winner)` for every completed bracket.
    pub fn winners(&self) -> Vec<(DirectionId, ItemId)> {
        self.results
            .iter()
            .filter_map(|r| Some((r.direction_id.clone(), r.winner_id.clone()?)))
            .collect()
    }

    pub fn completed(&self) -> usize {
        self.results.iter().filter(|r| !r.tournament_failed).count()
    }

    pub fn all_matches(&self) -> impl Iterator<Item = &MatchResult> {
        self.results.iter().flat_map(|r| r.all_matches.iter())
    }
}

/// Runs brackets against the oracle, sharing one rating tracker.
#[derive(Clone)]
pub struct TournamentRunner {
    gate: OracleGate,
    tracker: SharedEloTracker,
    contexts: Arc<HashMap<DirectionId, DirectionContext>>,
    phase: Phase,
}

impl TournamentRunner {
    pub fn new(
        gate: OracleGate,
        tracker: SharedEloTracker,
        contexts: HashMap<DirectionId, DirectionContext>,
    ) -> Self {
        Self {
            gate,
            tracker,
            contexts: Arc::new(contexts),
            phase: Phase::Tournament,
        }
    }

    /// Phase failures are recorded under.
    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = phase;
        self
    }

    pub fn tracker(&self) -> &SharedEloTracker {
        &self.tracker
    }

    /// Run every direction's bracket concurrently.
    pub async fn run_all(
        &self,
        groups: Vec<(DirectionId, Vec<CompetingItem>)>,
    ) -> Result<TournamentReport, PipelineError> {
        info!(directions = groups.len(), phase = %self.phase, "tournament starting");

        let mut join_set: JoinSet<(usize, Result<DirectionOutcome, PipelineError>)> =
            JoinSet::new();
        for (position, (direction_id, entrants)) in groups.into_iter().enumerate() {
            let runner = self.clone();
            join_set.spawn(async move {
                (position, runner.run_direction(direction_id, entrants).await)
            });
        }

        let mut outcomes: BTreeMap<usize, DirectionOutcome> = BTreeMap::new();
        let mut cancelled = false;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((position, Ok(outcome))) => {
                    outcomes.insert(position, outcome);
                }
                Ok((_, Err(PipelineError::Cancelled))) => cancelled = true,
                Ok((_, Err(e))) => return Err(e),
                Err(e) => return Err(anyhow::anyhow!("bracket worker panicked: {e}").into()),
            }
        }
        if cancelled {
            return Err(PipelineError::Cancelled);
        }

        let mut report = TournamentReport::default();
        for outcome in outcomes.into_values() {
            report.low_confidence += outcome.low_confidence;
            report.failures.extend(outcome.failures);
            report.results.push(outcome.result);
        }
        info!(
            completed = report.completed(),
            failed = report.results.len() - report.completed(),
            low_confidence = report.low_confidence,
            "tournament complete"
        );
        Ok(report)
    }

    /// Run one direction's bracket to completion or failure.
    ///
    /// Returns `Err` only when the run was cancelled; every other problem
    /// is isolated into a failed [`TournamentResult`].
    pub async fn run_direction(
        &self,
        direction_id: DirectionId,
        entrants: Vec<CompetingItem>,
    ) -> Result<DirectionOutcome, PipelineError> {
        let mut outcome = DirectionOutcome {
            result: TournamentResult::failed(direction_id.clone(), "not started"),
            failures: Vec::new(),
            low_confidence: 0,
        };

        let mut bracket = match Bracket::new(direction_id.clone(), &entrants) {
            Ok(bracket) => bracket,
            Err(e) => {
                warn!(direction = %direction_id, error = %e, "bracket could not be seeded");
                outcome.result = TournamentResult::failed(direction_id.clone(), e.to_string());
                outcome.failures.push(FailureRecord::direction(
                    self.phase,
                    direction_id,
                    e.to_string(),
                ));
                return Ok(outcome);
            }
        };

        match self.play(&mut bracket, &entrants, &mut outcome).await {
            Ok(()) => {}
            Err(BracketRunError::Oracle(OracleError::Cancelled)) => {
                return Err(PipelineError::Cancelled);
            }
            Err(e) => {
                warn!(
                    direction = %direction_id,
                    round = bracket.round(),
                    error = %e,
                    "direction bracket failed"
                );
                if let Err(fail_err) = bracket.fail(e.to_string()) {
                    warn!(direction = %direction_id, error = %fail_err, "could not mark bracket failed");
                }
                outcome.failures.push(FailureRecord::direction(
                    self.phase,
                    direction_id.clone(),
                    e.to_string(),
                ));
            }
        }

        outcome.result = bracket.into_result();
        info!("{}", outcome.result.summary_line());
        Ok(outcome)
    }

    async fn play(
        &self,
        bracket: &mut Bracket,
        entrants: &[CompetingItem],
        outcome: &mut DirectionOutcome,
    ) -> Result<(), BracketRunError> {
        {
            let mut tracker = self.lock_tracker()?;
            for item in entrants {
                tracker.register(item);
            }
        }

        let contents: Arc<HashMap<ItemId, String>> = Arc::new(
            entrants
                .iter()
                .map(|i| (i.item_id.clone(), i.content.clone()))
                .collect(),
        );
        let context: Arc<str> = self
            .contexts
            .get(bracket.direction_id())
            .map(|c| c.render())
            .unwrap_or_default()
            .into();

        while !bracket.is_terminal() {
            let round = bracket.round() + 1;
            let pairings = bracket.start_round()?;
            debug!(direction = %bracket.direction_id(), round, pairings = pairings.len(), "round started");

            let verdicts = self.compare_round(&pairings, &contents, &context).await?;

            let (low_confidence, failures) =
                self.apply_round(bracket, round, &pairings, &verdicts)?;
            outcome.low_confidence += low_confidence;
            outcome.failures.extend(failures);
        }
        Ok(())
    }

    /// Commit a drained round to the shared tracker and the bracket.
    ///
    /// The round is staged on a copy of the tracker; the shared tracker only
    /// changes once every update applied and the bracket accepted the round.
    fn apply_round(
        &self,
        bracket: &mut Bracket,
        round: u32,
        pairings: &[Pairing],
        verdicts: &HashMap<usize, Comparison>,
    ) -> Result<(usize, Vec<FailureRecord>), BracketRunError> {
        let mut tracker = self.lock_tracker()?;
        let mut staged = tracker.clone();
        let commit =
            self.commit_round(&mut staged, bracket.direction_id(), round, pairings, verdicts)?;
        bracket.record_round(commit.results)?;
        *tracker = staged;
        Ok((commit.low_confidence, commit.failures))
    }

    /// Apply a drained round's verdicts to `tracker` in pairing order.
    fn commit_round(
        &self,
        tracker: &mut EloTracker,
        direction_id: &str,
        round: u32,
        pairings: &[Pairing],
        verdicts: &HashMap<usize, Comparison>,
    ) -> Result<RoundCommit, BracketRunError> {
        let mut commit = RoundCommit {
            results: Vec::with_capacity(pairings.len()),
            low_confidence: 0,
            failures: Vec::new(),
        };
        for pairing in pairings {
            let result = match pairing {
                Pairing::Bye { item, .. } => {
                    let rating = tracker
                        .rating(item)
                        .ok_or_else(|| EloError::UnknownItem(item.clone()))?;
                    MatchResult::bye(round, item, rating)
                }
                Pairing::Match { index, a, b } => {
                    let comparison = verdicts
                        .get(index)
                        .ok_or(BracketError::UnexpectedResult(a.clone()))?;
                    let (winner, loser, low_confidence) = match comparison.verdict {
                        ComparisonVerdict::A => (a, b, false),
                        ComparisonVerdict::B => (b, a, false),
                        ComparisonVerdict::Unparseable => {
                            warn!(
                                direction = %direction_id,
                                round,
                                chars = comparison.reasoning.len(),
                                "comparator verdict unreadable, second item wins by default"
                            );
                            commit.low_confidence += 1;
                            commit.failures.push(FailureRecord::parse(
                                self.phase,
                                format!("{direction_id} round {round} match {index}"),
                                "comparator verdict unreadable, defaulted to second item",
                            ));
                            (b, a, true)
                        }
                    };
                    let update = tracker.update(winner, loser)?;
                    MatchResult::decided(
                        round,
                        a,
                        b,
                        &update,
                        comparison.reasoning.clone(),
                        low_confidence,
                    )
                }
            };
            commit.results.push(result);
        }
        Ok(commit)
    }

    /// Compare every match of a round concurrently and wait for all of them.
    async fn compare_round(
        &self,
        pairings: &[Pairing],
        contents: &Arc<HashMap<ItemId, String>>,
        context: &Arc<str>,
    ) -> Result<HashMap<usize, Comparison>, BracketRunError> {
        let mut join_set: JoinSet<(usize, Result<Comparison, OracleError>)> = JoinSet::new();
        for pairing in pairings {
            if let Pairing::Match { index, a, b } = pairing {
                let gate = self.gate.clone();
                let contents = contents.clone();
                let context = context.clone();
                let (index, a, b) = (*index, a.clone(), b.clone());
                join_set.spawn(async move {
                    let content_a = contents.get(&a).map(String::as_str).unwrap_or_default();
                    let content_b = contents.get(&b).map(String::as_str).unwrap_or_default();
                    (index, gate.compare(content_a, content_b, &context).await)
                });
            }
        }

        let mut verdicts = HashMap::new();
        let mut first_error: Option<OracleError> = None;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, Ok(comparison))) => {
                    verdicts.insert(index, comparison);
                }
                Ok((_, Err(e))) => {
                    if first_error.is_none() || e.is_cancelled() {
                        first_error = Some(e);
                    }
                }
                Err(e) => {
                    first_error.get_or_insert(OracleError::Request(format!(
                        "comparison worker panicked: {e}"
                    )));
                }
            }
        }
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(verdicts),
        }
    }

    fn lock_tracker(&self) -> Result<MutexGuard<'_, EloTracker>, BracketRunError> {
        self.tracker.lock().map_err(|_| BracketRunError::Poisoned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::MockContentOracle;
    use std::time::Duration;

    fn items(direction: &str, scores: &[u8]) -> Vec<CompetingItem> {
        scores
            .iter()
            .enumerate()
            .map(|(i, q)| {
                CompetingItem::with_id(format!("{direction}-{i}"), direction, "replica", format!("q{q}"))
                    .with_quality(*q)
            })
            .collect()
    }

    fn runner(mock: MockContentOracle, items: &[CompetingItem]) -> TournamentRunner {
        let gate = OracleGate::new(Arc::new(mock), 4, Duration::from_secs(5));
        let mut tracker = EloTracker::default();
        tracker.initialize(items, 0.6);
        TournamentRunner::new(gate, tracker.shared(), HashMap::new())
    }

    fn verdict(v: ComparisonVerdict) -> Comparison {
        Comparison {
            verdict: v,
            reasoning: "because".into(),
        }
    }

    #[tokio::test]
    async fn test_byes_consume_no_oracle_call() {
        let entrants = items("d1", &[90, 40, 60]);
        let mut mock = MockContentOracle::new();
        // 3 entrants: round 1 has one match and one bye, round 2 one match.
        mock.expect_compare()
            .times(2)
            .returning(|_, _, _| Ok(verdict(ComparisonVerdict::A)));

        let outcome = runner(mock, &entrants)
            .run_direction("d1".into(), entrants.clone())
            .await
            .unwrap();
        assert_eq!(outcome.result.total_rounds, 2);
        assert_eq!(outcome.result.bye_count(), 1);
        assert_eq!(outcome.result.winner_id.as_deref(), Some("d1-0"));
    }

    #[tokio::test]
    async fn test_unparseable_defaults_to_second_and_is_flagged() {
        let entrants = items("d1", &[90, 40]);
        let mut mock = MockContentOracle::new();
        mock.expect_compare()
            .times(1)
            .returning(|_, _, _| Ok(verdict(ComparisonVerdict::Unparseable)));

        let outcome = runner(mock, &entrants)
            .run_direction("d1".into(), entrants.clone())
            .await
            .unwrap();
        assert_eq!(outcome.result.winner_id.as_deref(), Some("d1-1"));
        assert_eq!(outcome.low_confidence, 1);
        assert!(outcome.result.all_matches[0].low_confidence);
        assert_eq!(outcome.failures.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_comparison_commits_nothing() {
        let entrants = items("d1", &[90, 40, 60, 20]);
        let mut mock = MockContentOracle::new();
        mock.expect_compare().returning(|a, _, _| {
            if a == "q90" {
                Ok(verdict(ComparisonVerdict::A))
            } else {
                Err(OracleError::Request("503".into()))
            }
        });

        let runner = runner(mock, &entrants);
        let outcome = runner
            .run_direction("d1".into(), entrants.clone())
            .await
            .unwrap();
        assert!(outcome.result.tournament_failed);
        assert!(outcome.result.winner_id.is_none());
        assert_eq!(outcome.result.seeds.len(), 4);
        assert!(outcome.result.all_matches.is_empty());
        assert_eq!(runner.tracker().lock().unwrap().updates_applied(), 0);
    }

    #[test]
    fn test_round_that_cannot_commit_leaves_tracker_untouched() {
        let entrants = items("d1", &[90, 60, 40, 20]);
        // d1-3 was never seeded, so the second match cannot be rated.
        let runner = runner(MockContentOracle::new(), &entrants[..3]);
        let before = runner.tracker().lock().unwrap().rating("d1-0");

        let mut bracket = Bracket::new("d1", &entrants).unwrap();
        let pairings = bracket.start_round().unwrap();
        let verdicts: HashMap<usize, Comparison> = [
            (0, verdict(ComparisonVerdict::Unparseable)),
            (1, verdict(ComparisonVerdict::A)),
        ]
        .into_iter()
        .collect();

        let err = runner
            .apply_round(&mut bracket, 1, &pairings, &verdicts)
            .unwrap_err();
        assert!(matches!(err, BracketRunError::Elo(EloError::UnknownItem(_))));

        let tracker = runner.tracker().lock().unwrap();
        assert_eq!(tracker.updates_applied(), 0);
        assert_eq!(tracker.rating("d1-0"), before);
        assert!(bracket.matches().is_empty());
    }

    #[tokio::test]
    async fn test_empty_direction_is_direction_failure() {
        let mock = MockContentOracle::new();
        let outcome = runner(mock, &[])
            .run_direction("d9".into(), Vec::new())
            .await
            .unwrap();
        assert!(outcome.result.tournament_failed);
        assert_eq!(outcome.failures.len(), 1);
    }
}
