//! Failure taxonomy for a pipeline run.
//!
//! Every isolated failure is recorded here and surfaced in the final
//! result, even when the run as a whole succeeds. Only `FatalFailure`
//! aborts a phase.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity class of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A single oracle call failed; the phase continued.
    TaskFailure,
    /// A whole direction's bracket could not complete.
    DirectionFailure,
    /// Oracle text was not in the expected shape; a default was used.
    ParseFailure,
    /// Zero successes across a phase; the run aborted.
    FatalFailure,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TaskFailure => write!(f, "task_failure"),
            Self::DirectionFailure => write!(f, "direction_failure"),
            Self::ParseFailure => write!(f, "parse_failure"),
            Self::FatalFailure => write!(f, "fatal_failure"),
        }
    }
}

/// Pipeline phase a failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Planning,
    FanOut,
    Reflection,
    Tournament,
    Evolution,
    EvolutionTournament,
    Debate,
    MetaReview,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Planning => write!(f, "planning"),
            Self::FanOut => write!(f, "fan_out"),
            Self::Reflection => write!(f, "reflection"),
            Self::Tournament => write!(f, "tournament"),
            Self::Evolution => write!(f, "evolution"),
            Self::EvolutionTournament => write!(f, "evolution_tournament"),
            Self::Debate => write!(f, "debate"),
            Self::MetaReview => write!(f, "meta_review"),
        }
    }
}

/// One isolated failure with its cause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub kind: FailureKind,
    pub phase: Phase,
    /// What failed: task index, item id, direction id, strategy name.
    pub subject: String,
    pub cause: String,
    pub timestamp: DateTime<Utc>,
}

impl FailureRecord {
    pub fn new(
        kind: FailureKind,
        phase: Phase,
        subject: impl Into<String>,
        cause: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            phase,
            subject: subject.into(),
            cause: cause.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn task(phase: Phase, subject: impl Into<String>, cause: impl Into<String>) -> Self {
        Self::new(FailureKind::TaskFailure, phase, subject, cause)
    }

    pub fn parse(phase: Phase, subject: impl Into<String>, cause: impl Into<String>) -> Self {
        Self::new(FailureKind::ParseFailure, phase, subject, cause)
    }

    pub fn direction(phase: Phase, subject: impl Into<String>, cause: impl Into<String>) -> Self {
        Self::new(FailureKind::DirectionFailure, phase, subject, cause)
    }

    pub fn fatal(phase: Phase, subject: impl Into<String>, cause: impl Into<String>) -> Self {
        Self::new(FailureKind::FatalFailure, phase, subject, cause)
    }
}

impl std::fmt::Display for FailureRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {} {}: {}",
            self.kind, self.phase, self.subject, self.cause
        )
    }
}

/// Ordered collection of failures, appended at phase barriers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FailureLog {
    records: Vec<FailureRecord>,
}

impl FailureLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: FailureRecord) {
        self.records.push(record);
    }

    pub fn extend(&mut self, records: impl IntoIterator<Item = FailureRecord>) {
        self.records.extend(records);
    }

    pub fn records(&self) -> &[FailureRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn count(&self, kind: FailureKind) -> usize {
        self.records.iter().filter(|r| r.kind == kind).count()
    }

    pub fn in_phase(&self, phase: Phase) -> impl Iterator<Item = &FailureRecord> {
        self.records.iter().filter(move |r| r.phase == phase)
    }

    pub fn into_vec(self) -> Vec<FailureRecord> {
        self.records
    }
}
