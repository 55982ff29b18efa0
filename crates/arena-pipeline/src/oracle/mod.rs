//! Content Oracle boundary.
//!
//! The oracle is the only external capability the engine depends on. All
//! free-text parsing happens behind this trait (see [`grammar`]); callers
//! receive typed results only.
//!
//! ```text
//! phase ──► OracleGate ──(permit, timeout, retry, cancel)──► dyn ContentOracle
//!                                                              ├─ LlmOracle (rig)
//!                                                              └─ test doubles
//! ```

pub mod gate;
pub mod grammar;
pub mod llm;

use async_trait::async_trait;
use coordination::{Direction, QualityAssessment};
use serde::{Deserialize, Serialize};

use crate::errors::OracleError;

pub use gate::OracleGate;
pub use grammar::ComparisonVerdict;
pub use llm::LlmOracle;

/// What the oracle knows about the direction it is working in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectionContext {
    pub direction: Direction,
    /// Project-level context, passed through uninterpreted.
    pub project_context: Option<String>,
}

impl DirectionContext {
    pub fn new(direction: Direction, project_context: Option<String>) -> Self {
        Self {
            direction,
            project_context,
        }
    }

    /// Context for calls that are not tied to a direction (planning, review).
    pub fn detached(name: &str, subject: &str) -> Self {
        Self::new(Direction::new(name, name, subject, name), None)
    }

    /// Flatten into prompt text.
    pub fn render(&self) -> String {
        let mut text = format!(
            "Direction: {}\nCore assumption: {}\nFocus: {}",
            self.direction.name, self.direction.core_assumption, self.direction.focus
        );
        if let Some(project) = &self.project_context {
            text.push_str("\nProject context:\n");
            text.push_str(project);
        }
        text
    }
}

/// Result of a generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    pub content: String,
    /// Raw oracle output, kept for audit.
    pub raw_trace: String,
}

impl Generation {
    pub fn new(content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            raw_trace: content.clone(),
            content,
        }
    }
}

/// Result of a pairwise comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub verdict: ComparisonVerdict,
    pub reasoning: String,
}

/// Who said a line in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    /// Prompt sent to the expert.
    User,
    /// The expert's reply.
    Assistant,
}

/// One line of a multi-turn exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
        }
    }
}

/// The external generation/judgment capability.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContentOracle: Send + Sync {
    /// Generate content for a task within a direction.
    async fn generate(
        &self,
        task: &str,
        context: &DirectionContext,
    ) -> Result<Generation, OracleError>;

    /// Score content. Missing fields come back as neutral defaults with
    /// low confidence rather than as an error.
    async fn score(
        &self,
        content: &str,
        context: &DirectionContext,
    ) -> Result<QualityAssessment, OracleError>;

    /// Compare two items. An unreadable answer is `ComparisonVerdict::Unparseable`.
    async fn compare(
        &self,
        content_a: &str,
        content_b: &str,
        context: &str,
    ) -> Result<Comparison, OracleError>;

    /// One turn of a multi-turn exchange.
    async fn converse(
        &self,
        prompt: &str,
        history: &[ConversationTurn],
    ) -> Result<String, OracleError>;
}
