//! Oracle gate: every oracle call in a run goes through here.
//!
//! The gate bounds concurrency with a semaphore, applies a per-call timeout,
//! retries retriable errors with exponential back-off, and races each
//! attempt against the run's cancellation token. A cancelled call returns
//! [`OracleError::Cancelled`]; callers commit nothing for it.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use coordination::QualityAssessment;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{Comparison, ContentOracle, ConversationTurn, DirectionContext, Generation};
use crate::config::PipelineConfig;
use crate::errors::OracleError;

/// Shared, cloneable handle in front of a [`ContentOracle`].
#[derive(Clone)]
pub struct OracleGate {
    oracle: Arc<dyn ContentOracle>,
    permits: Arc<Semaphore>,
    timeout: Duration,
    retries: u32,
    backoff: Duration,
    cancel: CancellationToken,
    attempts: Arc<AtomicU64>,
}

impl OracleGate {
    pub fn new(oracle: Arc<dyn ContentOracle>, max_parallel: usize, timeout: Duration) -> Self {
        Self {
            oracle,
            permits: Arc::new(Semaphore::new(max_parallel.max(1))),
            timeout,
            retries: 0,
            backoff: Duration::from_secs(2),
            cancel: CancellationToken::new(),
            attempts: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Build from run configuration.
    pub fn from_config(oracle: Arc<dyn ContentOracle>, config: &PipelineConfig) -> Self {
        Self::new(
            oracle,
            config.max_parallel_calls,
            Duration::from_secs(config.oracle_timeout_secs),
        )
        .with_retries(config.oracle_retries)
        .with_backoff(Duration::from_millis(config.retry_backoff_ms))
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Tie the gate to an outer cancellation token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Oracle attempts started so far, retries included.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn generate(
        &self,
        task: &str,
        context: &DirectionContext,
    ) -> Result<Generation, OracleError> {
        let oracle = &self.oracle;
        self.call("generate", move || oracle.generate(task, context))
            .await
    }

    pub async fn score(
        &self,
        content: &str,
        context: &DirectionContext,
    ) -> Result<QualityAssessment, OracleError> {
        let oracle = &self.oracle;
        self.call("score", move || oracle.score(content, context))
            .await
    }

    pub async fn compare(
        &self,
        content_a: &str,
        content_b: &str,
        context: &str,
    ) -> Result<Comparison, OracleError> {
        let oracle = &self.oracle;
        self.call("compare", move || oracle.compare(content_a, content_b, context))
            .await
    }

    pub async fn converse(
        &self,
        prompt: &str,
        history: &[ConversationTurn],
    ) -> Result<String, OracleError> {
        let oracle = &self.oracle;
        self.call("converse", move || oracle.converse(prompt, history))
            .await
    }

    /// Run one logical call: permit, timeout, retries, cancellation.
    async fn call<T, F, Fut>(&self, operation: &'static str, mut attempt: F) -> Result<T, OracleError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, OracleError>>,
    {
        let mut tries = 0u32;
        loop {
            if self.cancel.is_cancelled() {
                return Err(OracleError::Cancelled);
            }

            let result = {
                let _permit = tokio::select! {
                    _ = self.cancel.cancelled() => return Err(OracleError::Cancelled),
                    permit = self.permits.acquire() => permit
                        .map_err(|_| OracleError::Unavailable("oracle gate closed".into()))?,
                };
                self.attempts.fetch_add(1, Ordering::Relaxed);
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => Err(OracleError::Cancelled),
                    outcome = tokio::time::timeout(self.timeout, attempt()) => match outcome {
                        Ok(result) => result,
                        Err(_) => Err(OracleError::Timeout(self.timeout.as_secs())),
                    },
                }
            };

            match result {
                Ok(value) => {
                    debug!(operation, tries, "oracle call succeeded");
                    return Ok(value);
                }
                Err(e) if e.is_retriable() && tries < self.retries => {
                    let category = e.retry_category();
                    let backoff =
                        self.backoff * category.backoff_factor() * 2u32.saturating_pow(tries);
                    warn!(
                        operation,
                        attempt = tries + 1,
                        max_retries = self.retries,
                        backoff_ms = backoff.as_millis() as u64,
                        %category,
                        error = %e,
                        "retriable oracle error, retrying"
                    );
                    tries += 1;
                    tokio::select! {
                        _ = self.cancel.cancelled() => return Err(OracleError::Cancelled),
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl std::fmt::Debug for OracleGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OracleGate")
            .field("available_permits", &self.permits.available_permits())
            .field("timeout", &self.timeout)
            .field("retries", &self.retries)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::MockContentOracle;
    use coordination::Direction;

    fn ctx() -> DirectionContext {
        DirectionContext::new(Direction::new("d1", "n", "a", "f"), None)
    }

    fn gate(mock: MockContentOracle, retries: u32) -> OracleGate {
        OracleGate::new(Arc::new(mock), 2, Duration::from_secs(5))
            .with_retries(retries)
            .with_backoff(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let mut mock = MockContentOracle::new();
        let mut seq = mockall::Sequence::new();
        mock.expect_generate()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(OracleError::Request("502".into())));
        mock.expect_generate()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(Generation::new("text")));

        let gate = gate(mock, 2);
        let out = gate.generate("task", &ctx()).await.unwrap();
        assert_eq!(out.content, "text");
        assert_eq!(gate.attempts(), 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_retry_budget() {
        let mut mock = MockContentOracle::new();
        mock.expect_generate()
            .times(2)
            .returning(|_, _| Err(OracleError::RateLimit("429".into())));

        let err = gate(mock, 1).generate("task", &ctx()).await.unwrap_err();
        assert!(matches!(err, OracleError::RateLimit(_)));
    }

    #[tokio::test]
    async fn test_non_retriable_fails_immediately() {
        let mut mock = MockContentOracle::new();
        mock.expect_converse()
            .times(1)
            .returning(|_, _| Err(OracleError::Cancelled));

        let err = gate(mock, 3).converse("hi", &[]).await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_gate_makes_no_calls() {
        let mut mock = MockContentOracle::new();
        mock.expect_compare().times(0);

        let gate = gate(mock, 0);
        gate.cancellation().cancel();
        let err = gate.compare("a", "b", "").await.unwrap_err();
        assert_eq!(err, OracleError::Cancelled);
        assert_eq!(gate.attempts(), 0);
    }

    struct SlowOracle;

    #[async_trait::async_trait]
    impl ContentOracle for SlowOracle {
        async fn generate(
            &self,
            _task: &str,
            _context: &DirectionContext,
        ) -> Result<Generation, OracleError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Generation::new("late"))
        }

        async fn score(
            &self,
            _content: &str,
            _context: &DirectionContext,
        ) -> Result<QualityAssessment, OracleError> {
            Ok(QualityAssessment::neutral())
        }

        async fn compare(
            &self,
            _a: &str,
            _b: &str,
            _context: &str,
        ) -> Result<Comparison, OracleError> {
            Err(OracleError::Unavailable("unused".into()))
        }

        async fn converse(
            &self,
            _prompt: &str,
            _history: &[ConversationTurn],
        ) -> Result<String, OracleError> {
            Err(OracleError::Unavailable("unused".into()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_an_ordinary_failure() {
        let gate = OracleGate::new(Arc::new(SlowOracle), 1, Duration::from_secs(3));
        let err = gate.generate("task", &ctx()).await.unwrap_err();
        assert_eq!(err, OracleError::Timeout(3));
        assert!(err.is_retriable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_in_flight_call() {
        let gate = OracleGate::new(Arc::new(SlowOracle), 1, Duration::from_secs(600));
        let token = gate.cancellation().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            token.cancel();
        });
        let err = gate.generate("task", &ctx()).await.unwrap_err();
        assert!(err.is_cancelled());
    }
}
