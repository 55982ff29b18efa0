//! Bracket state machine: phases, transitions, and transition history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Phase of a single-elimination bracket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BracketState {
    /// Entrants ordered, no round played yet.
    Seeded,
    /// A round is being played (or has just drained).
    InRound,
    /// Exactly one entrant remains.
    Complete,
    /// The bracket could not finish; entrants are kept as they were.
    Failed,
}

impl BracketState {
    /// Whether this is a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    /// Valid transitions from this state.
    pub fn valid_transitions(self) -> &'static [BracketState] {
        match self {
            Self::Seeded => &[Self::InRound, Self::Complete, Self::Failed],
            Self::InRound => &[Self::InRound, Self::Complete, Self::Failed],
            Self::Complete | Self::Failed => &[],
        }
    }
}

impl std::fmt::Display for BracketState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Seeded => write!(f, "seeded"),
            Self::InRound => write!(f, "in_round"),
            Self::Complete => write!(f, "complete"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A state transition record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BracketTransition {
    pub from: BracketState,
    pub to: BracketState,
    /// Round number at the time of the transition.
    pub round: u32,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

/// Error for invalid state transitions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid transition {from} → {to}: {reason}")]
pub struct TransitionError {
    pub from: BracketState,
    pub to: BracketState,
    pub reason: String,
}

/// Validated state holder with history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BracketMachine {
    state: BracketState,
    transitions: Vec<BracketTransition>,
}

impl Default for BracketMachine {
    fn default() -> Self {
        Self {
            state: BracketState::Seeded,
            transitions: Vec::new(),
        }
    }
}

impl BracketMachine {
    pub fn state(&self) -> BracketState {
        self.state
    }

    pub fn transitions(&self) -> &[BracketTransition] {
        &self.transitions
    }

    /// Move to `to`, recording why.
    pub fn transition(
        &mut self,
        to: BracketState,
        round: u32,
        reason: &str,
    ) -> Result<(), TransitionError> {
        if !self.state.valid_transitions().contains(&to) {
            return Err(TransitionError {
                from: self.state,
                to,
                reason: format!(
                    "not a valid transition (allowed: {:?})",
                    self.state.valid_transitions()
                ),
            });
        }
        self.transitions.push(BracketTransition {
            from: self.state,
            to,
            round,
            timestamp: Utc::now(),
            reason: reason.to_string(),
        });
        self.state = to;
        Ok(())
    }
}
