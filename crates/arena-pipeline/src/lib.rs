//! Arena Pipeline
//!
//! Async orchestration of the competitive evaluation engine on top of the
//! deterministic core in `coordination`. Every oracle call goes through
//! [`oracle::OracleGate`]; every phase fans out with a `JoinSet` and joins
//! at an explicit barrier.
//!
//! # Flow
//!
//! ```text
//! directions ──► fanout ──► reflection ──► tournament ──► evolution
//!                (N×R)      (scores)       (per direction,  (strategies +
//!                                           shared Elo)      second bracket)
//!                                                               │
//!                 meta_review ◄── debate (top-2 finalists) ◄────┘
//!                      │
//!                      ▼
//!               PipelineResult (+ failures)
//! ```
//!
//! `planning` produces directions from a brief when none are supplied.

pub mod config;
pub mod debate;
pub mod errors;
pub mod evolution;
pub mod fanout;
pub mod meta_review;
pub mod oracle;
pub mod pipeline;
pub mod planning;
pub mod prompts;
pub mod reflection;
pub mod tournament;

pub use config::{ArenaConfig, OracleEndpointConfig, PipelineConfig};
pub use errors::{OracleError, PipelineError, RetryCategory};
pub use evolution::{EvolutionStrategy, WinnerType};
pub use oracle::{ContentOracle, LlmOracle, OracleGate};
pub use pipeline::{run_pipeline, Pipeline, PipelineResult};
pub use planning::{plan_directions, PlanSource, PlanningReport};
