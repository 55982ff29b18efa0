//! Round and time guardrails for debate sessions.

use serde::{Deserialize, Serialize};

use super::consensus::DebateSignal;
use super::state::DebateSession;

/// Default number of debate rounds.
pub const DEFAULT_MAX_ROUNDS: u32 = 3;

/// Outcome of a guardrail check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GuardrailOutcome {
    /// No guardrail triggered; keep talking.
    Continue,
    /// The last speaker emitted a consensus marker.
    ConsensusReached,
    /// Round budget spent.
    MaxRoundsExceeded { rounds: u32 },
    /// Wall-clock budget spent.
    TimeoutExceeded { elapsed_ms: u64, budget_ms: u64 },
}

impl GuardrailOutcome {
    /// Whether the debate should stop.
    pub fn should_stop(&self) -> bool {
        !matches!(self, Self::Continue)
    }
}

impl std::fmt::Display for GuardrailOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Continue => write!(f, "continue"),
            Self::ConsensusReached => write!(f, "consensus_reached"),
            Self::MaxRoundsExceeded { rounds } => write!(f, "max_rounds_exceeded ({})", rounds),
            Self::TimeoutExceeded {
                elapsed_ms,
                budget_ms,
            } => write!(f, "timeout_exceeded ({}ms / {}ms)", elapsed_ms, budget_ms),
        }
    }
}

/// Configuration for debate guardrails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailConfig {
    /// Maximum total debate time in milliseconds (0 = unlimited).
    pub timeout_ms: u64,
    pub max_rounds: u32,
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 0,
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }
}

/// Evaluates guardrails against debate state.
#[derive(Debug, Clone)]
pub struct GuardrailEngine {
    config: GuardrailConfig,
}

impl GuardrailEngine {
    pub fn new(config: GuardrailConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GuardrailConfig {
        &self.config
    }

    /// Evaluate after a completed turn.
    ///
    /// A consensus marker wins over every limit: the turn that carried it
    /// has already been spoken.
    pub fn evaluate(
        &self,
        session: &DebateSession,
        last_signal: DebateSignal,
        elapsed_ms: u64,
    ) -> GuardrailOutcome {
        if last_signal == DebateSignal::Consensus {
            return GuardrailOutcome::ConsensusReached;
        }

        if self.config.timeout_ms > 0 && elapsed_ms >= self.config.timeout_ms {
            return GuardrailOutcome::TimeoutExceeded {
                elapsed_ms,
                budget_ms: self.config.timeout_ms,
            };
        }

        if session.current_round >= self.config.max_rounds {
            return GuardrailOutcome::MaxRoundsExceeded {
                rounds: session.current_round,
            };
        }

        GuardrailOutcome::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::super::state::{DebateKind, DebatePhase};
    use super::*;

    fn session_at_round(round: u32) -> DebateSession {
        let mut session = DebateSession::new("deb-1", DebateKind::MetaAnalysis, "brief", 3);
        session.start().unwrap();
        for _ in 1..round {
            session.transition(DebatePhase::ExpertBTurn, "b").unwrap();
            session.transition(DebatePhase::ExpertATurn, "a").unwrap();
        }
        session
    }

    #[test]
    fn test_continue_within_budget() {
        let engine = GuardrailEngine::new(GuardrailConfig::default());
        let outcome = engine.evaluate(&session_at_round(1), DebateSignal::Continue, 0);
        assert_eq!(outcome, GuardrailOutcome::Continue);
        assert!(!outcome.should_stop());
    }

    #[test]
    fn test_max_rounds_exceeded() {
        let engine = GuardrailEngine::new(GuardrailConfig::default());
        let outcome = engine.evaluate(&session_at_round(3), DebateSignal::Continue, 0);
        assert_eq!(outcome, GuardrailOutcome::MaxRoundsExceeded { rounds: 3 });
        assert!(outcome.should_stop());
    }

    #[test]
    fn test_consensus_beats_limits() {
        let engine = GuardrailEngine::new(GuardrailConfig {
            timeout_ms: 10,
            max_rounds: 1,
        });
        let outcome = engine.evaluate(&session_at_round(1), DebateSignal::Consensus, 50);
        assert_eq!(outcome, GuardrailOutcome::ConsensusReached);
    }

    #[test]
    fn test_timeout_before_rounds() {
        let engine = GuardrailEngine::new(GuardrailConfig {
            timeout_ms: 1000,
            max_rounds: 1,
        });
        let outcome = engine.evaluate(&session_at_round(1), DebateSignal::Continue, 2000);
        assert!(matches!(outcome, GuardrailOutcome::TimeoutExceeded { .. }));
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(GuardrailOutcome::Continue.to_string(), "continue");
        assert!(GuardrailOutcome::MaxRoundsExceeded { rounds: 4 }
            .to_string()
            .contains('4'));
    }
}
