//! Debate engine: two independent expert sessions over the oracle.
//!
//! The state machine, guardrails and verdict precedence live in
//! [`coordination::debate`]; this module only speaks for the experts and
//! feeds typed signals back. An expert whose call fails loses that turn:
//! the transcript records it as unavailable and its verdict counts as
//! unparseable, so the debate still resolves.

use coordination::debate::{DebateError, GuardrailConfig};
use coordination::failure::{FailureRecord, Phase};
use coordination::{
    CompetingItem, DebateKind, DebateOrchestrator, DebateOutcome, DebateSignal, FinalistChoice,
    ItemId, NextAction, Speaker,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::{OracleError, PipelineError};
use crate::oracle::grammar::{parse_finalist, parse_signal};
use crate::oracle::{ConversationTurn, OracleGate};
use crate::prompts;

/// Result of the finalist debate.
#[derive(Debug, Clone)]
pub struct FinalDebate {
    pub outcome: DebateOutcome,
    pub winner_id: ItemId,
    pub failures: Vec<FailureRecord>,
}

/// Result of a meta-analysis debate. Resolution is in `outcome.consensus`.
#[derive(Debug, Clone)]
pub struct MetaDebate {
    pub outcome: DebateOutcome,
    pub failures: Vec<FailureRecord>,
}

/// Runs debates between two expert sessions.
#[derive(Debug, Clone)]
pub struct DebateEngine {
    gate: OracleGate,
    guardrails: GuardrailConfig,
}

impl DebateEngine {
    pub fn new(gate: OracleGate, max_rounds: u32) -> Self {
        Self {
            gate,
            guardrails: GuardrailConfig {
                timeout_ms: 0,
                max_rounds: max_rounds.max(1),
            },
        }
    }

    /// Wall-clock budget for meta-analysis debates (0 = unlimited).
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.guardrails.timeout_ms = timeout_ms;
        self
    }

    pub fn max_rounds(&self) -> u32 {
        self.guardrails.max_rounds
    }

    /// Pick a winner between two finalists. `first` is the rank-1 finalist
    /// and wins by default when neither verdict can be read.
    pub async fn final_debate(
        &self,
        first: &CompetingItem,
        second: &CompetingItem,
        context: &str,
    ) -> Result<FinalDebate, PipelineError> {
        let debate_id = format!("final-{}", Uuid::new_v4());
        let topic = format!("{} vs {}", first.item_id, second.item_id);
        let mut orchestrator = DebateOrchestrator::new(
            &debate_id,
            DebateKind::Tournament,
            &topic,
            self.guardrails.clone(),
        );
        orchestrator.start().map_err(internal)?;
        info!(debate = %debate_id, first = %first.item_id, second = %second.item_id, "final debate starting");

        let mut failures = Vec::new();
        let mut history_a: Vec<ConversationTurn> = Vec::new();
        let mut history_b: Vec<ConversationTurn> = Vec::new();

        let opening = prompts::finalist_opening(&first.content, &second.content, context);
        let reply = speak(&self.gate, &opening, &mut history_a).await;
        let evaluation_a = absorb(reply, Speaker::ExpertA, Phase::Debate, &debate_id, &mut failures)?;
        orchestrator
            .submit_turn(Speaker::ExpertA, &evaluation_a, DebateSignal::Continue)
            .map_err(internal)?;

        let response = prompts::finalist_response(&opening, &evaluation_a);
        let reply = speak(&self.gate, &response, &mut history_b).await;
        let evaluation_b = absorb(reply, Speaker::ExpertB, Phase::Debate, &debate_id, &mut failures)?;
        orchestrator
            .submit_turn(Speaker::ExpertB, &evaluation_b, DebateSignal::Continue)
            .map_err(internal)?;

        let verdict_prompt_a = prompts::finalist_verdict(&evaluation_b);
        let verdict_prompt_b = prompts::finalist_verdict(&evaluation_a);
        let (reply_a, reply_b) = tokio::join!(
            speak(&self.gate, &verdict_prompt_a, &mut history_a),
            speak(&self.gate, &verdict_prompt_b, &mut history_b),
        );
        let verdict_a = absorb(reply_a, Speaker::ExpertA, Phase::Debate, &debate_id, &mut failures)?;
        let verdict_b = absorb(reply_b, Speaker::ExpertB, Phase::Debate, &debate_id, &mut failures)?;

        let choice_a = read_verdict(&verdict_a, Speaker::ExpertA, &debate_id, &mut failures);
        let choice_b = read_verdict(&verdict_b, Speaker::ExpertB, &debate_id, &mut failures);
        let verdict = orchestrator
            .submit_verdicts((&verdict_a, choice_a), (&verdict_b, choice_b))
            .map_err(internal)?;
        if verdict.unresolved {
            warn!(debate = %debate_id, "no readable verdict, rank-1 finalist wins by default");
        }

        let winner_id = if verdict.picks_first() {
            first.item_id.clone()
        } else {
            second.item_id.clone()
        };
        let outcome = orchestrator
            .finish()
            .ok_or_else(|| anyhow::anyhow!("final debate {debate_id} did not complete"))?;
        info!(winner = %winner_id, path = %verdict.path, "{}", outcome.summary_line());

        Ok(FinalDebate {
            outcome,
            winner_id,
            failures,
        })
    }

    /// Alternate proposals and critiques until a consensus marker or the
    /// round limit. A failed turn aborts the debate; callers fall back.
    pub async fn meta_debate(
        &self,
        brief: &str,
        count: usize,
        phase: Phase,
    ) -> Result<MetaDebate, PipelineError> {
        let debate_id = format!("meta-{}", Uuid::new_v4());
        let mut orchestrator = DebateOrchestrator::new(
            &debate_id,
            DebateKind::MetaAnalysis,
            brief,
            self.guardrails.clone(),
        );
        orchestrator.start().map_err(internal)?;
        info!(debate = %debate_id, max_rounds = self.guardrails.max_rounds, "meta debate starting");

        let mut failures = Vec::new();
        let mut history_a: Vec<ConversationTurn> = Vec::new();
        let mut history_b: Vec<ConversationTurn> = Vec::new();
        let mut last_turn: Option<String> = None;

        loop {
            match orchestrator.next_action() {
                NextAction::AwaitTurn { speaker, round } => {
                    let prompt = match &last_turn {
                        None => prompts::planning_opening(brief, count),
                        Some(other) => prompts::planning_reply(other, count),
                    };
                    let history = match speaker {
                        Speaker::ExpertA => &mut history_a,
                        Speaker::ExpertB => &mut history_b,
                    };
                    match speak(&self.gate, &prompt, history).await {
                        Ok(text) => {
                            let signal = parse_signal(&text);
                            orchestrator
                                .submit_turn(speaker, &text, signal)
                                .map_err(internal)?;
                            last_turn = Some(text);
                        }
                        Err(OracleError::Cancelled) => return Err(PipelineError::Cancelled),
                        Err(e) => {
                            warn!(debate = %debate_id, %speaker, round, error = %e, "expert turn failed, aborting debate");
                            failures.push(FailureRecord::task(
                                phase,
                                format!("{debate_id} {speaker} round {round}"),
                                e.to_string(),
                            ));
                            orchestrator
                                .abort(&format!("{speaker} unavailable"))
                                .map_err(internal)?;
                        }
                    }
                }
                NextAction::AwaitVerdicts => {
                    orchestrator
                        .abort("verdicts requested in a meta debate")
                        .map_err(internal)?;
                }
                NextAction::Complete => break,
            }
        }

        let outcome = orchestrator
            .finish()
            .ok_or_else(|| anyhow::anyhow!("meta debate {debate_id} did not complete"))?;
        info!("{}", outcome.summary_line());
        Ok(MetaDebate { outcome, failures })
    }
}

/// One expert turn; the exchange is appended to the expert's own history.
async fn speak(
    gate: &OracleGate,
    prompt: &str,
    history: &mut Vec<ConversationTurn>,
) -> Result<String, OracleError> {
    let text = gate.converse(prompt, history).await?;
    history.push(ConversationTurn::user(prompt));
    history.push(ConversationTurn::assistant(text.clone()));
    Ok(text)
}

/// Turn a failed expert call into transcript text. Cancellation propagates.
fn absorb(
    reply: Result<String, OracleError>,
    speaker: Speaker,
    phase: Phase,
    debate_id: &str,
    failures: &mut Vec<FailureRecord>,
) -> Result<String, PipelineError> {
    match reply {
        Ok(text) => Ok(text),
        Err(OracleError::Cancelled) => Err(PipelineError::Cancelled),
        Err(e) => {
            warn!(debate = %debate_id, %speaker, error = %e, "expert call failed");
            failures.push(FailureRecord::task(
                phase,
                format!("{debate_id} {speaker}"),
                e.to_string(),
            ));
            Ok(format!("[{speaker} unavailable: {e}]"))
        }
    }
}

fn read_verdict(
    text: &str,
    speaker: Speaker,
    debate_id: &str,
    failures: &mut Vec<FailureRecord>,
) -> FinalistChoice {
    let choice = parse_finalist(text);
    if !choice.is_interpretable() {
        warn!(debate = %debate_id, %speaker, chars = text.len(), "final verdict unreadable");
        failures.push(FailureRecord::parse(
            Phase::Debate,
            format!("{debate_id} {speaker} verdict"),
            "no final verdict found",
        ));
    }
    choice
}

fn internal(e: DebateError) -> PipelineError {
    PipelineError::Internal(anyhow::Error::new(e))
}
