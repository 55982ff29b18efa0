//! Consensus resolution: typed expert signals and the winner precedence.
//!
//! Oracle text is parsed elsewhere; this module only sees the tagged
//! variants below.

use serde::{Deserialize, Serialize};

/// An expert's final pick between two finalists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalistChoice {
    /// The rank-1 finalist.
    First,
    Second,
    Unparseable,
}

impl FinalistChoice {
    pub fn is_interpretable(self) -> bool {
        !matches!(self, Self::Unparseable)
    }
}

/// Whether a meta-analysis turn closes the debate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebateSignal {
    Consensus,
    Continue,
}

/// Which precedence rule decided a tournament debate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPath {
    /// Both experts picked the same finalist.
    Consensus,
    /// Both interpretable but split; expert B spoke last.
    SplitLastSpeaker,
    /// Only expert B's verdict was interpretable.
    ExpertB,
    /// Only expert A's verdict was interpretable.
    ExpertA,
    /// Neither verdict was interpretable; rank-1 finalist by default.
    DefaultRankOne,
}

impl std::fmt::Display for ResolutionPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Consensus => write!(f, "consensus"),
            Self::SplitLastSpeaker => write!(f, "split_last_speaker"),
            Self::ExpertB => write!(f, "expert_b"),
            Self::ExpertA => write!(f, "expert_a"),
            Self::DefaultRankOne => write!(f, "default_rank_one"),
        }
    }
}

/// Outcome of a tournament debate. Always names a winner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebateVerdict {
    /// `First` or `Second`; never `Unparseable`.
    pub winner: FinalistChoice,
    pub path: ResolutionPath,
    /// No interpretable verdict existed; the default was applied.
    pub unresolved: bool,
}

impl DebateVerdict {
    pub fn picks_first(&self) -> bool {
        self.winner == FinalistChoice::First
    }
}

/// Resolve two final verdicts into a winner.
///
/// Precedence: agreement, then expert B, then expert A, then the rank-1
/// finalist with `unresolved = true`. When both are interpretable but
/// disagree, expert B's pick stands.
pub fn resolve_finalists(expert_a: FinalistChoice, expert_b: FinalistChoice) -> DebateVerdict {
    let (winner, path) = match (expert_a.is_interpretable(), expert_b.is_interpretable()) {
        (true, true) if expert_a == expert_b => (expert_a, ResolutionPath::Consensus),
        (true, true) => (expert_b, ResolutionPath::SplitLastSpeaker),
        (false, true) => (expert_b, ResolutionPath::ExpertB),
        (true, false) => (expert_a, ResolutionPath::ExpertA),
        (false, false) => (FinalistChoice::First, ResolutionPath::DefaultRankOne),
    };
    DebateVerdict {
        winner,
        path,
        unresolved: path == ResolutionPath::DefaultRankOne,
    }
}
