//! Single-elimination bracket engine
//!
//! Seeding orders entrants by quality (descending, ties by item id). Each
//! round pairs the surviving order sequentially; an odd count gives the last
//! entrant a bye. A round is only closed once every pairing has an outcome.
//!
//! ```text
//! Seeded ──start_round──► InRound(1) ──record_round──► InRound(2) ─► ... ─► Complete
//!    │                        │
//!    └── single entrant ──────┴── fail(reason) ──► Failed
//! ```
//!
//! The bracket never talks to the oracle and never touches ratings: the
//! caller decides each match, applies the Elo update, and hands the
//! finished [`MatchResult`]s back through [`Bracket::record_round`].

pub mod results;
pub mod state;

pub use results::{MatchResult, RoundSummary, TournamentResult};
pub use state::{BracketMachine, BracketState, BracketTransition, TransitionError};

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{CompetingItem, DirectionId, ItemId};

/// Errors from bracket operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BracketError {
    #[error("Bracket for direction {0} has no entrants")]
    Empty(DirectionId),

    #[error("Entrant {0} appears more than once")]
    DuplicateEntrant(ItemId),

    #[error("No round in progress")]
    NoRoundInProgress,

    #[error("Round {0} still has unresolved pairings")]
    RoundInProgress(u32),

    #[error("Result for round {got} recorded during round {expected}")]
    WrongRound { expected: u32, got: u32 },

    #[error("Result does not match any pending pairing: {0}")]
    UnexpectedResult(String),

    #[error("Pairing {0} resolved more than once")]
    DuplicateResult(usize),

    #[error("{0} pairing(s) left unresolved")]
    Unresolved(usize),

    #[error("Winner {winner} did not play in pairing {index}")]
    InvalidWinner { index: usize, winner: ItemId },

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// One slot of a round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Pairing {
    Match { index: usize, a: ItemId, b: ItemId },
    Bye { index: usize, item: ItemId },
}

impl Pairing {
    pub fn index(&self) -> usize {
        match self {
            Self::Match { index, .. } | Self::Bye { index, .. } => *index,
        }
    }

    pub fn is_bye(&self) -> bool {
        matches!(self, Self::Bye { .. })
    }

    /// Whether `result` is an outcome of this pairing.
    fn accepts(&self, result: &MatchResult) -> bool {
        match self {
            Self::Match { a, b, .. } => {
                result.item_a_id == *a && result.item_b_id.as_deref() == Some(b.as_str())
            }
            Self::Bye { item, .. } => result.item_a_id == *item && result.item_b_id.is_none(),
        }
    }
}

/// Order entrants for round 1: quality descending, then item id.
///
/// Ratings are not consulted.
pub fn seed_order(items: &[CompetingItem]) -> Vec<ItemId> {
    let mut seeded: Vec<&CompetingItem> = items.iter().collect();
    seeded.sort_by(|a, b| {
        b.effective_quality()
            .cmp(&a.effective_quality())
            .then_with(|| a.item_id.cmp(&b.item_id))
    });
    seeded.into_iter().map(|i| i.item_id.clone()).collect()
}

/// Pair an ordered list sequentially (1v2, 3v4, ...); an odd tail gets a bye.
pub fn pair_round(order: &[ItemId]) -> Vec<Pairing> {
    order
        .chunks(2)
        .enumerate()
        .filter_map(|(index, chunk)| match chunk {
            [a, b] => Some(Pairing::Match {
                index,
                a: a.clone(),
                b: b.clone(),
            }),
            [item] => Some(Pairing::Bye {
                index,
                item: item.clone(),
            }),
            _ => None,
        })
        .collect()
}

/// Number of rounds needed to reduce `entrants` to one.
pub fn rounds_needed(entrants: usize) -> u32 {
    let mut remaining = entrants;
    let mut rounds = 0;
    while remaining > 1 {
        remaining = remaining.div_ceil(2);
        rounds += 1;
    }
    rounds
}

/// A bracket for one direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bracket {
    direction_id: DirectionId,
    machine: BracketMachine,
    round: u32,
    seeds: Vec<ItemId>,
    alive: Vec<ItemId>,
    progression: Vec<RoundSummary>,
    matches: Vec<MatchResult>,
    pending: Vec<Pairing>,
    failure_reason: Option<String>,
}

impl Bracket {
    /// Seed a bracket from the direction's entrants.
    ///
    /// A single entrant completes immediately with zero rounds.
    pub fn new(
        direction_id: impl Into<DirectionId>,
        entrants: &[CompetingItem],
    ) -> Result<Self, BracketError> {
        let direction_id = direction_id.into();
        if entrants.is_empty() {
            return Err(BracketError::Empty(direction_id));
        }
        let mut seen = HashSet::new();
        for item in entrants {
            if !seen.insert(item.item_id.as_str()) {
                return Err(BracketError::DuplicateEntrant(item.item_id.clone()));
            }
        }

        let seeds = seed_order(entrants);
        let mut bracket = Self {
            direction_id,
            machine: BracketMachine::default(),
            round: 0,
            alive: seeds.clone(),
            seeds,
            progression: Vec::new(),
            matches: Vec::new(),
            pending: Vec::new(),
            failure_reason: None,
        };
        if bracket.alive.len() == 1 {
            bracket
                .machine
                .transition(BracketState::Complete, 0, "single entrant")?;
        }
        debug!(
            direction = %bracket.direction_id,
            entrants = bracket.seeds.len(),
            "bracket seeded"
        );
        Ok(bracket)
    }

    pub fn direction_id(&self) -> &str {
        &self.direction_id
    }

    pub fn state(&self) -> BracketState {
        self.machine.state()
    }

    pub fn is_complete(&self) -> bool {
        self.machine.state() == BracketState::Complete
    }

    pub fn is_terminal(&self) -> bool {
        self.machine.state().is_terminal()
    }

    /// Current (or last played) round, 0 before round 1.
    pub fn round(&self) -> u32 {
        self.round
    }

    /// Entrants in seeded order.
    pub fn seeds(&self) -> &[ItemId] {
        &self.seeds
    }

    /// Entrants still in the bracket, in pairing order.
    pub fn alive(&self) -> &[ItemId] {
        &self.alive
    }

    pub fn matches(&self) -> &[MatchResult] {
        &self.matches
    }

    pub fn transitions(&self) -> &[BracketTransition] {
        self.machine.transitions()
    }

    /// Pairings of the round in progress.
    pub fn pairings(&self) -> &[Pairing] {
        &self.pending
    }

    /// The sole survivor, once complete.
    pub fn winner(&self) -> Option<&ItemId> {
        if self.is_complete() {
            self.alive.first()
        } else {
            None
        }
    }

    /// Open the next round and return its pairings.
    pub fn start_round(&mut self) -> Result<Vec<Pairing>, BracketError> {
        if !self.pending.is_empty() {
            return Err(BracketError::RoundInProgress(self.round));
        }
        let next = self.round + 1;
        self.machine
            .transition(BracketState::InRound, next, &format!("round {next}"))?;
        self.round = next;
        self.pending = pair_round(&self.alive);
        debug!(
            direction = %self.direction_id,
            round = self.round,
            entrants = self.alive.len(),
            pairings = self.pending.len(),
            "round started"
        );
        Ok(self.pending.clone())
    }

    /// Close the current round.
    ///
    /// Every pending pairing must be resolved exactly once. Results may
    /// arrive in any order; they are stored in pairing order. On error the
    /// bracket is left unchanged.
    pub fn record_round(&mut self, results: Vec<MatchResult>) -> Result<RoundSummary, BracketError> {
        if self.pending.is_empty() {
            return Err(BracketError::NoRoundInProgress);
        }

        let mut slots: Vec<Option<MatchResult>> = vec![None; self.pending.len()];
        for result in results {
            if result.round != self.round {
                return Err(BracketError::WrongRound {
                    expected: self.round,
                    got: result.round,
                });
            }
            let pairing = self
                .pending
                .iter()
                .find(|p| p.accepts(&result))
                .ok_or_else(|| {
                    BracketError::UnexpectedResult(format!(
                        "{} vs {}",
                        result.item_a_id,
                        result.item_b_id.as_deref().unwrap_or("bye")
                    ))
                })?;
            let index = pairing.index();
            if !result.involves(&result.winner_id) {
                return Err(BracketError::InvalidWinner {
                    index,
                    winner: result.winner_id,
                });
            }
            if slots[index].is_some() {
                return Err(BracketError::DuplicateResult(index));
            }
            slots[index] = Some(result);
        }

        let unresolved = slots.iter().filter(|s| s.is_none()).count();
        if unresolved > 0 {
            return Err(BracketError::Unresolved(unresolved));
        }

        let ordered: Vec<MatchResult> = slots.into_iter().flatten().collect();
        let advancing: Vec<ItemId> = ordered.iter().map(|r| r.winner_id.clone()).collect();
        let bye = self.pending.iter().find_map(|p| match p {
            Pairing::Bye { item, .. } => Some(item.clone()),
            Pairing::Match { .. } => None,
        });
        if let [winner] = advancing.as_slice() {
            self.machine.transition(
                BracketState::Complete,
                self.round,
                &format!("winner {winner}"),
            )?;
        }
        let summary = RoundSummary {
            round: self.round,
            entrants: std::mem::replace(&mut self.alive, advancing.clone()),
            advancing,
            bye,
        };
        self.matches.extend(ordered);
        self.progression.push(summary.clone());
        self.pending.clear();

        debug!(
            direction = %self.direction_id,
            round = summary.round,
            advancing = summary.advancing.len(),
            "round closed"
        );
        Ok(summary)
    }

    /// Mark the bracket failed. Completed rounds and entrants are kept.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), BracketError> {
        let reason = reason.into();
        self.machine
            .transition(BracketState::Failed, self.round, &reason)?;
        self.pending.clear();
        self.failure_reason = Some(reason);
        Ok(())
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    /// Finish into a [`TournamentResult`]. A non-complete bracket reports as failed.
    pub fn into_result(self) -> TournamentResult {
        let complete = self.is_complete();
        let winner_id = if complete {
            self.alive.first().cloned()
        } else {
            None
        };
        let failure_reason = if complete {
            None
        } else {
            Some(
                self.failure_reason
                    .unwrap_or_else(|| format!("bracket stopped in state {}", self.machine.state())),
            )
        };
        TournamentResult {
            direction_id: self.direction_id,
            winner_id,
            total_rounds: self.progression.len() as u32,
            seeds: self.seeds,
            round_progression: self.progression,
            all_matches: self.matches,
            tournament_failed: !complete,
            failure_reason,
        }
    }
}
