//! Debate Consensus Engine: two-expert structured negotiation
//!
//! Pure state: the oracle calls live in the pipeline crate, which feeds
//! typed signals into the orchestrator here.
//!
//! # Debate Flow
//!
//! ```text
//! Tournament:
//!   Idle → ExpertATurn → ExpertBTurn → Verdicts ─┬─ interpretable → Resolved
//!                                                └─ neither       → Unresolved (rank-1 default)
//!
//! Meta-analysis:
//!   Idle → ExpertATurn → ExpertBTurn → [consensus marker?]
//!            ▲    │            │            ├─ Yes → Resolved
//!            │    └─ marker ───┼──────────► │
//!            └─────────────────┘            └─ No, max rounds → Unresolved
//!              (rounds left)                   (caller falls back)
//!
//!   abort at any point → Aborted
//! ```

pub mod consensus;
pub mod guardrails;
pub mod orchestrator;
pub mod state;

pub use consensus::{
    resolve_finalists, DebateSignal, DebateVerdict, FinalistChoice, ResolutionPath,
};
pub use guardrails::{GuardrailConfig, GuardrailEngine, GuardrailOutcome, DEFAULT_MAX_ROUNDS};
pub use orchestrator::{
    ConsensusStatement, DebateError, DebateOrchestrator, DebateOutcome, NextAction,
};
pub use state::{
    DebateKind, DebatePhase, DebateSession, DebateTranscript, DebateTransition, Speaker,
    TranscriptTurn, TransitionError,
};
