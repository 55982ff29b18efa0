//! Pipeline error taxonomy with retry classification.
//!
//! Oracle errors carry a [`RetryCategory`] so the gate can decide whether to
//! retry without string matching. Pipeline errors are the only errors that
//! reach the caller; everything else is isolated into failure records.
//!
//! ## Retry categories
//!
//! | Category     | Retriable | Max retries |
//! |--------------|-----------|-------------|
//! | Transient    | yes       | configurable |
//! | RateLimit    | yes       | configurable with back-off |
//! | ParseFailure | yes       | 2 |
//! | Cancelled    | no        | none |

use std::fmt;

use coordination::failure::Phase;
use thiserror::Error;

/// Classification used by the oracle gate to decide whether to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryCategory {
    /// Network failure, timeout, or backend hiccup. Safe to retry.
    Transient,
    /// Provider rate limit. Retry with a longer back-off.
    RateLimit,
    /// The oracle answered in a shape the adapter could not use.
    ParseFailure,
    /// The run was cancelled. Terminal.
    Cancelled,
}

impl RetryCategory {
    pub fn is_retriable(self) -> bool {
        matches!(self, Self::Transient | Self::RateLimit | Self::ParseFailure)
    }

    /// Suggested max retry attempts for retriable categories.
    ///
    /// Returns `None` for non-retriable categories.
    pub fn default_max_retries(self) -> Option<u32> {
        match self {
            Self::Transient => Some(3),
            Self::RateLimit => Some(5),
            Self::ParseFailure => Some(2),
            Self::Cancelled => None,
        }
    }

    /// Multiplier applied to the gate's base back-off.
    pub fn backoff_factor(self) -> u32 {
        match self {
            Self::RateLimit => 4,
            _ => 1,
        }
    }
}

impl fmt::Display for RetryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::RateLimit => write!(f, "rate_limit"),
            Self::ParseFailure => write!(f, "parse_failure"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Error from a single content oracle call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    /// The request failed (network, backend crash, bad status).
    #[error("Oracle request failed: {0}")]
    Request(String),

    #[error("Oracle rate limited: {0}")]
    RateLimit(String),

    /// The call exceeded the per-call budget.
    #[error("Oracle call timed out after {0}s")]
    Timeout(u64),

    /// The response could not be used at all.
    #[error("Oracle response unusable: {0}")]
    Parse(String),

    /// The oracle cannot be reached or was never configured.
    #[error("Oracle unavailable: {0}")]
    Unavailable(String),

    #[error("Oracle call cancelled")]
    Cancelled,
}

impl OracleError {
    /// Classify this error for retry logic.
    pub fn retry_category(&self) -> RetryCategory {
        match self {
            Self::Request(_) | Self::Timeout(_) | Self::Unavailable(_) => RetryCategory::Transient,
            Self::RateLimit(_) => RetryCategory::RateLimit,
            Self::Parse(_) => RetryCategory::ParseFailure,
            Self::Cancelled => RetryCategory::Cancelled,
        }
    }

    /// Returns `true` if the gate may retry after this error.
    pub fn is_retriable(&self) -> bool {
        self.retry_category().is_retriable()
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Errors that abort a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Nothing to run.
    #[error("No directions supplied")]
    NoDirections,

    /// Zero successes across an entire phase.
    #[error("Fatal failure in {phase}: 0 of {attempted} succeeded ({cause})")]
    Fatal {
        phase: Phase,
        attempted: usize,
        cause: String,
    },

    /// The run's cancellation token fired.
    #[error("Pipeline run cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl PipelineError {
    /// Phase the run stopped in, when known.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            Self::Fatal { phase, .. } => Some(*phase),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retriable_categories() {
        assert!(RetryCategory::Transient.is_retriable());
        assert!(RetryCategory::RateLimit.is_retriable());
        assert!(RetryCategory::ParseFailure.is_retriable());
        assert!(!RetryCategory::Cancelled.is_retriable());
    }

    #[test]
    fn test_default_max_retries() {
        assert_eq!(RetryCategory::RateLimit.default_max_retries(), Some(5));
        assert_eq!(RetryCategory::Cancelled.default_max_retries(), None);
    }

    #[test]
    fn test_oracle_error_classification() {
        assert_eq!(
            OracleError::Timeout(30).retry_category(),
            RetryCategory::Transient
        );
        assert_eq!(
            OracleError::RateLimit("429".into()).retry_category(),
            RetryCategory::RateLimit
        );
        assert_eq!(
            OracleError::Parse("empty".into()).retry_category(),
            RetryCategory::ParseFailure
        );
        assert!(!OracleError::Cancelled.is_retriable());
        assert!(OracleError::Cancelled.is_cancelled());
    }

    #[test]
    fn test_fatal_display_names_phase() {
        let err = PipelineError::Fatal {
            phase: Phase::FanOut,
            attempted: 6,
            cause: "connection refused".into(),
        };
        assert_eq!(
            err.to_string(),
            "Fatal failure in fan_out: 0 of 6 succeeded (connection refused)"
        );
        assert_eq!(err.phase(), Some(Phase::FanOut));
    }

    #[test]
    fn test_internal_from_anyhow() {
        let err: PipelineError = anyhow::anyhow!("boom").into();
        assert!(matches!(err, PipelineError::Internal(_)));
        assert!(err.phase().is_none());
    }
}
