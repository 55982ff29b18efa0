//! Debate state machine: phases, transitions, and the verbatim transcript.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which protocol a session runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebateKind {
    /// Two experts pick a winner between two finalists.
    Tournament,
    /// Two experts converge on a set of directions.
    MetaAnalysis,
}

impl std::fmt::Display for DebateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tournament => write!(f, "tournament"),
            Self::MetaAnalysis => write!(f, "meta_analysis"),
        }
    }
}

/// Phase of a debate session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebatePhase {
    /// Session created but not started.
    Idle,
    /// Expert A is speaking.
    ExpertATurn,
    /// Expert B is speaking.
    ExpertBTurn,
    /// Both experts issue their final verdicts (tournament protocol).
    Verdicts,
    /// An outcome was agreed or interpreted.
    Resolved,
    /// Rounds exhausted or verdicts uninterpretable; fallback applies.
    Unresolved,
    /// Aborted by cancellation or oracle failure.
    Aborted,
}

impl DebatePhase {
    /// Whether this is a terminal phase.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved | Self::Unresolved | Self::Aborted)
    }

    /// Valid transitions from this phase.
    pub fn valid_transitions(self) -> &'static [DebatePhase] {
        match self {
            Self::Idle => &[Self::ExpertATurn, Self::Aborted],
            Self::ExpertATurn => &[Self::ExpertBTurn, Self::Resolved, Self::Aborted],
            Self::ExpertBTurn => &[
                Self::ExpertATurn,
                Self::Verdicts,
                Self::Resolved,
                Self::Unresolved,
                Self::Aborted,
            ],
            Self::Verdicts => &[Self::Resolved, Self::Unresolved, Self::Aborted],
            Self::Resolved | Self::Unresolved | Self::Aborted => &[],
        }
    }
}

impl std::fmt::Display for DebatePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::ExpertATurn => write!(f, "expert_a_turn"),
            Self::ExpertBTurn => write!(f, "expert_b_turn"),
            Self::Verdicts => write!(f, "verdicts"),
            Self::Resolved => write!(f, "resolved"),
            Self::Unresolved => write!(f, "unresolved"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// One of the two independent expert sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    ExpertA,
    ExpertB,
}

impl Speaker {
    pub fn other(self) -> Self {
        match self {
            Self::ExpertA => Self::ExpertB,
            Self::ExpertB => Self::ExpertA,
        }
    }

    /// The phase in which this speaker holds the floor.
    pub fn turn_phase(self) -> DebatePhase {
        match self {
            Self::ExpertA => DebatePhase::ExpertATurn,
            Self::ExpertB => DebatePhase::ExpertBTurn,
        }
    }
}

impl std::fmt::Display for Speaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExpertA => write!(f, "expert_a"),
            Self::ExpertB => write!(f, "expert_b"),
        }
    }
}

/// A single verbatim utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptTurn {
    pub speaker: Speaker,
    /// Round number (1-indexed).
    pub round: u32,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// A phase transition record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateTransition {
    pub from: DebatePhase,
    pub to: DebatePhase,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

/// Error for invalid state transitions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid transition {from} → {to}: {reason}")]
pub struct TransitionError {
    pub from: DebatePhase,
    pub to: DebatePhase,
    pub reason: String,
}

/// The finished record of a debate. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateTranscript {
    pub debate_id: String,
    pub kind: DebateKind,
    /// Every turn, in speaking order.
    pub turns: Vec<TranscriptTurn>,
    pub final_conclusion: String,
    pub resolved: bool,
    pub rounds: u32,
}

impl DebateTranscript {
    pub fn turns_by(&self, speaker: Speaker) -> impl Iterator<Item = &TranscriptTurn> {
        self.turns.iter().filter(move |t| t.speaker == speaker)
    }

    pub fn last_turn(&self) -> Option<&TranscriptTurn> {
        self.turns.last()
    }
}

/// A debate session tracking phase, rounds and turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateSession {
    pub id: String,
    pub kind: DebateKind,
    pub phase: DebatePhase,
    pub current_round: u32,
    pub max_rounds: u32,
    pub turns: Vec<TranscriptTurn>,
    pub transitions: Vec<DebateTransition>,
    pub created_at: DateTime<Utc>,
    /// What is being debated (finalist pair, brief).
    pub topic: String,
}

impl DebateSession {
    pub fn new(id: &str, kind: DebateKind, topic: &str, max_rounds: u32) -> Self {
        Self {
            id: id.to_string(),
            kind,
            phase: DebatePhase::Idle,
            current_round: 0,
            max_rounds,
            turns: Vec::new(),
            transitions: Vec::new(),
            created_at: Utc::now(),
            topic: topic.to_string(),
        }
    }

    /// Transition to a new phase with a reason.
    pub fn transition(&mut self, to: DebatePhase, reason: &str) -> Result<(), TransitionError> {
        if !self.phase.valid_transitions().contains(&to) {
            return Err(TransitionError {
                from: self.phase,
                to,
                reason: format!(
                    "not a valid transition (allowed: {:?})",
                    self.phase.valid_transitions()
                ),
            });
        }

        self.transitions.push(DebateTransition {
            from: self.phase,
            to,
            timestamp: Utc::now(),
            reason: reason.to_string(),
        });
        self.phase = to;

        // Expert A opens every round
        if to == DebatePhase::ExpertATurn {
            self.current_round += 1;
        }
        Ok(())
    }

    /// Start the debate (Idle → ExpertATurn).
    pub fn start(&mut self) -> Result<(), TransitionError> {
        self.transition(DebatePhase::ExpertATurn, "debate started")
    }

    /// Append a verbatim turn in the current round.
    pub fn record_turn(&mut self, speaker: Speaker, content: &str) {
        self.turns.push(TranscriptTurn {
            speaker,
            round: self.current_round,
            content: content.to_string(),
            timestamp: Utc::now(),
        });
    }

    pub fn is_complete(&self) -> bool {
        self.phase.is_terminal()
    }

    pub fn has_rounds_remaining(&self) -> bool {
        self.current_round < self.max_rounds
    }

    /// Freeze the session into its transcript.
    pub fn into_transcript(self, final_conclusion: String, resolved: bool) -> DebateTranscript {
        DebateTranscript {
            debate_id: self.id,
            kind: self.kind,
            turns: self.turns,
            final_conclusion,
            resolved,
            rounds: self.current_round,
        }
    }

    /// Compact status line.
    pub fn status_line(&self) -> String {
        format!(
            "[{}] {} round {}/{} | {} turns | topic={}",
            self.phase,
            self.kind,
            self.current_round,
            self.max_rounds,
            self.turns.len(),
            self.topic
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session() {
        let session = DebateSession::new("deb-1", DebateKind::Tournament, "a vs b", 3);
        assert_eq!(session.phase, DebatePhase::Idle);
        assert_eq!(session.current_round, 0);
        assert!(!session.is_complete());
    }

    #[test]
    fn test_rounds_advance_on_expert_a() {
        let mut session = DebateSession::new("deb-1", DebateKind::MetaAnalysis, "brief", 2);
        session.start().unwrap();
        assert_eq!(session.current_round, 1);
        session
            .transition(DebatePhase::ExpertBTurn, "critique")
            .unwrap();
        session
            .transition(DebatePhase::ExpertATurn, "revise")
            .unwrap();
        assert_eq!(session.current_round, 2);
        assert!(!session.has_rounds_remaining());
    }

    #[test]
    fn test_tournament_path_to_verdicts() {
        let mut session = DebateSession::new("deb-1", DebateKind::Tournament, "a vs b", 3);
        session.start().unwrap();
        session.transition(DebatePhase::ExpertBTurn, "b").unwrap();
        session.transition(DebatePhase::Verdicts, "final").unwrap();
        session.transition(DebatePhase::Unresolved, "none").unwrap();
        assert!(session.is_complete());
        assert_eq!(session.transitions.len(), 4);
    }

    #[test]
    fn test_invalid_transition() {
        let mut session = DebateSession::new("deb-1", DebateKind::Tournament, "a vs b", 3);
        let err = session
            .transition(DebatePhase::Verdicts, "skip")
            .unwrap_err();
        assert_eq!(err.from, DebatePhase::Idle);
        assert_eq!(err.to, DebatePhase::Verdicts);
    }

    #[test]
    fn test_terminal_no_transitions() {
        let mut session = DebateSession::new("deb-1", DebateKind::MetaAnalysis, "brief", 3);
        session.start().unwrap();
        session.transition(DebatePhase::Resolved, "agreed").unwrap();
        assert!(session
            .transition(DebatePhase::ExpertBTurn, "more")
            .is_err());
    }

    #[test]
    fn test_transcript_keeps_turns_verbatim() {
        let mut session = DebateSession::new("deb-1", DebateKind::MetaAnalysis, "brief", 3);
        session.start().unwrap();
        session.record_turn(Speaker::ExpertA, "  proposal\nwith spacing ");
        session.transition(DebatePhase::ExpertBTurn, "b").unwrap();
        session.record_turn(Speaker::ExpertB, "CONSENSUS REACHED");
        session.transition(DebatePhase::Resolved, "marker").unwrap();

        let transcript = session.into_transcript("agreed".into(), true);
        assert_eq!(transcript.turns.len(), 2);
        assert_eq!(transcript.turns[0].content, "  proposal\nwith spacing ");
        assert_eq!(transcript.turns_by(Speaker::ExpertB).count(), 1);
        assert_eq!(transcript.last_turn().unwrap().round, 1);
        assert!(transcript.resolved);
    }

    #[test]
    fn test_speaker_serde_and_other() {
        assert_eq!(
            serde_json::to_string(&Speaker::ExpertA).unwrap(),
            "\"expert_a\""
        );
        assert_eq!(Speaker::ExpertA.other(), Speaker::ExpertB);
        assert_eq!(Speaker::ExpertB.turn_phase(), DebatePhase::ExpertBTurn);
    }

    #[test]
    fn test_status_line() {
        let mut session = DebateSession::new("deb-1", DebateKind::Tournament, "a vs b", 3);
        session.start().unwrap();
        let line = session.status_line();
        assert!(line.contains("[expert_a_turn]"));
        assert!(line.contains("round 1/3"));
    }
}
