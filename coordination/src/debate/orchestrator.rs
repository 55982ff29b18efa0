//! Debate orchestrator: drives the two-expert exchange turn by turn.
//!
//! The orchestrator never calls the oracle. The caller asks
//! [`DebateOrchestrator::next_action`] who speaks next, obtains the text,
//! parses it into a typed signal, and submits it back.
//!
//! Tournament protocol: A evaluates, B evaluates, then both give a final
//! verdict resolved by [`resolve_finalists`]. Meta-analysis protocol: A and
//! B alternate until one emits a consensus marker or the guardrails stop
//! the exchange.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::consensus::{resolve_finalists, DebateSignal, DebateVerdict, FinalistChoice};
use super::guardrails::{GuardrailConfig, GuardrailEngine, GuardrailOutcome};
use super::state::{
    DebateKind, DebatePhase, DebateSession, DebateTranscript, Speaker, TransitionError,
};

/// Error from the debate orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DebateError {
    #[error("transition failed: {0}")]
    Transition(#[from] TransitionError),

    #[error("debate already complete")]
    AlreadyComplete,

    #[error("expected phase {expected}, got {actual}")]
    InvalidPhase {
        expected: DebatePhase,
        actual: DebatePhase,
    },

    #[error("operation not available for a {0} debate")]
    WrongKind(DebateKind),
}

/// A consensus statement and who made it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusStatement {
    pub speaker: Speaker,
    pub round: u32,
    pub content: String,
}

/// What the orchestrator expects next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NextAction {
    /// Waiting for `speaker` to take a turn.
    AwaitTurn { speaker: Speaker, round: u32 },
    /// Waiting for both final verdicts (tournament only).
    AwaitVerdicts,
    /// Debate is complete: call `finish()`.
    Complete,
}

impl std::fmt::Display for NextAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AwaitTurn { speaker, round } => write!(f, "await_{speaker} (round {round})"),
            Self::AwaitVerdicts => write!(f, "await_verdicts"),
            Self::Complete => write!(f, "complete"),
        }
    }
}

/// Final result of a debate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateOutcome {
    pub transcript: DebateTranscript,
    pub terminal_phase: DebatePhase,
    /// Tournament verdict, when the verdict phase was reached.
    pub verdict: Option<DebateVerdict>,
    /// Meta-analysis consensus, when a marker was emitted.
    pub consensus: Option<ConsensusStatement>,
    /// Guardrail that stopped the exchange, if any.
    pub termination: Option<GuardrailOutcome>,
}

impl DebateOutcome {
    pub fn is_resolved(&self) -> bool {
        self.terminal_phase == DebatePhase::Resolved
    }

    /// Compact summary line.
    pub fn summary_line(&self) -> String {
        let status = match self.terminal_phase {
            DebatePhase::Resolved => "RESOLVED",
            DebatePhase::Unresolved => "UNRESOLVED",
            _ => "ABORTED",
        };
        format!(
            "[{}] {} | {} rounds | {} turns",
            status,
            self.transcript.kind,
            self.transcript.rounds,
            self.transcript.turns.len()
        )
    }
}

/// Drives one debate session.
///
/// Usage:
/// 1. Create with `new()` and call `start()`
/// 2. Loop on `next_action()`, calling `submit_turn()` or `submit_verdicts()`
/// 3. Call `finish()` once `is_complete()` returns true
pub struct DebateOrchestrator {
    session: DebateSession,
    engine: GuardrailEngine,
    verdict: Option<DebateVerdict>,
    consensus: Option<ConsensusStatement>,
    termination: Option<GuardrailOutcome>,
    abort_reason: Option<String>,
    start_time_ms: i64,
    elapsed_ms: u64,
}

impl DebateOrchestrator {
    pub fn new(debate_id: &str, kind: DebateKind, topic: &str, config: GuardrailConfig) -> Self {
        let max_rounds = config.max_rounds.max(1);
        let config = GuardrailConfig {
            max_rounds,
            ..config
        };
        Self {
            session: DebateSession::new(debate_id, kind, topic, max_rounds),
            engine: GuardrailEngine::new(config),
            verdict: None,
            consensus: None,
            termination: None,
            abort_reason: None,
            start_time_ms: 0,
            elapsed_ms: 0,
        }
    }

    pub fn kind(&self) -> DebateKind {
        self.session.kind
    }

    /// Start the debate: transitions from Idle to ExpertATurn.
    pub fn start(&mut self) -> Result<(), DebateError> {
        self.session.start()?;
        self.start_time_ms = Utc::now().timestamp_millis();
        Ok(())
    }

    /// What action is expected next.
    pub fn next_action(&self) -> NextAction {
        match self.session.phase {
            DebatePhase::Idle | DebatePhase::ExpertATurn => NextAction::AwaitTurn {
                speaker: Speaker::ExpertA,
                round: self.session.current_round.max(1),
            },
            DebatePhase::ExpertBTurn => NextAction::AwaitTurn {
                speaker: Speaker::ExpertB,
                round: self.session.current_round,
            },
            DebatePhase::Verdicts => NextAction::AwaitVerdicts,
            DebatePhase::Resolved | DebatePhase::Unresolved | DebatePhase::Aborted => {
                NextAction::Complete
            }
        }
    }

    /// Submit one expert turn.
    ///
    /// `signal` is ignored for tournament debates, where agreement is only
    /// judged from the final verdicts.
    pub fn submit_turn(
        &mut self,
        speaker: Speaker,
        content: &str,
        signal: DebateSignal,
    ) -> Result<NextAction, DebateError> {
        if self.session.is_complete() {
            return Err(DebateError::AlreadyComplete);
        }
        let expected = speaker.turn_phase();
        if self.session.phase != expected {
            return Err(DebateError::InvalidPhase {
                expected,
                actual: self.session.phase,
            });
        }

        self.session.record_turn(speaker, content);
        self.update_elapsed();
        debug!(
            debate = %self.session.id,
            %speaker,
            round = self.session.current_round,
            chars = content.len(),
            "debate turn recorded"
        );

        match self.session.kind {
            DebateKind::Tournament => self.advance_tournament(speaker),
            DebateKind::MetaAnalysis => self.advance_meta(speaker, content, signal),
        }
    }

    fn advance_tournament(&mut self, speaker: Speaker) -> Result<NextAction, DebateError> {
        match speaker {
            Speaker::ExpertA => self
                .session
                .transition(DebatePhase::ExpertBTurn, "expert a evaluated")?,
            Speaker::ExpertB => self
                .session
                .transition(DebatePhase::Verdicts, "both experts evaluated")?,
        }
        Ok(self.next_action())
    }

    fn advance_meta(
        &mut self,
        speaker: Speaker,
        content: &str,
        signal: DebateSignal,
    ) -> Result<NextAction, DebateError> {
        if signal == DebateSignal::Consensus {
            self.consensus = Some(ConsensusStatement {
                speaker,
                round: self.session.current_round,
                content: content.to_string(),
            });
            self.termination = Some(GuardrailOutcome::ConsensusReached);
            self.session
                .transition(DebatePhase::Resolved, &format!("{speaker} emitted consensus"))?;
            return Ok(NextAction::Complete);
        }

        match speaker {
            Speaker::ExpertA => {
                self.session
                    .transition(DebatePhase::ExpertBTurn, "proposal made")?;
            }
            Speaker::ExpertB => {
                let outcome = self
                    .engine
                    .evaluate(&self.session, signal, self.elapsed_ms);
                if outcome.should_stop() {
                    self.session
                        .transition(DebatePhase::Unresolved, &outcome.to_string())?;
                    self.termination = Some(outcome);
                } else {
                    self.session
                        .transition(DebatePhase::ExpertATurn, "critique given")?;
                }
            }
        }
        Ok(self.next_action())
    }

    /// Submit both final verdicts (tournament only) and resolve the winner.
    pub fn submit_verdicts(
        &mut self,
        expert_a: (&str, FinalistChoice),
        expert_b: (&str, FinalistChoice),
    ) -> Result<DebateVerdict, DebateError> {
        if self.session.kind != DebateKind::Tournament {
            return Err(DebateError::WrongKind(self.session.kind));
        }
        if self.session.phase != DebatePhase::Verdicts {
            return Err(DebateError::InvalidPhase {
                expected: DebatePhase::Verdicts,
                actual: self.session.phase,
            });
        }

        self.session.record_turn(Speaker::ExpertA, expert_a.0);
        self.session.record_turn(Speaker::ExpertB, expert_b.0);
        self.update_elapsed();

        let verdict = resolve_finalists(expert_a.1, expert_b.1);
        let phase = if verdict.unresolved {
            DebatePhase::Unresolved
        } else {
            DebatePhase::Resolved
        };
        self.session
            .transition(phase, &format!("resolved via {}", verdict.path))?;
        self.verdict = Some(verdict);
        Ok(verdict)
    }

    /// Abort the debate. Turns recorded so far are kept.
    pub fn abort(&mut self, reason: &str) -> Result<(), DebateError> {
        if self.session.is_complete() {
            return Err(DebateError::AlreadyComplete);
        }
        self.session.transition(DebatePhase::Aborted, reason)?;
        self.abort_reason = Some(reason.to_string());
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.session.is_complete()
    }

    pub fn session(&self) -> &DebateSession {
        &self.session
    }

    pub fn current_round(&self) -> u32 {
        self.session.current_round
    }

    /// Override elapsed time tracking.
    pub fn set_elapsed_ms(&mut self, elapsed_ms: u64) {
        self.elapsed_ms = elapsed_ms;
    }

    fn update_elapsed(&mut self) {
        if self.start_time_ms > 0 {
            let now = Utc::now().timestamp_millis();
            self.elapsed_ms = now.saturating_sub(self.start_time_ms).max(0) as u64;
        }
    }

    /// Freeze into the outcome. Returns `None` until the debate is complete.
    pub fn finish(self) -> Option<DebateOutcome> {
        if !self.session.is_complete() {
            return None;
        }
        let conclusion = self.conclusion();
        let terminal_phase = self.session.phase;
        let resolved = terminal_phase == DebatePhase::Resolved;
        Some(DebateOutcome {
            transcript: self.session.into_transcript(conclusion, resolved),
            terminal_phase,
            verdict: self.verdict,
            consensus: self.consensus,
            termination: self.termination,
        })
    }

    fn conclusion(&self) -> String {
        if let Some(reason) = &self.abort_reason {
            return format!("aborted: {reason}");
        }
        if let Some(verdict) = &self.verdict {
            let finalist = if verdict.picks_first() {
                "first finalist"
            } else {
                "second finalist"
            };
            return format!("{finalist} selected via {}", verdict.path);
        }
        if let Some(consensus) = &self.consensus {
            return consensus.content.clone();
        }
        match &self.termination {
            Some(outcome) => format!("no consensus: {outcome}"),
            None => "no consensus".to_string(),
        }
    }
}
