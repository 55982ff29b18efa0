//! Generation fan-out: one task per (direction × replica).
//!
//! Tasks run concurrently with no ordering between them. A failed task is
//! recorded and its siblings continue; only zero successes out of a
//! non-empty task set is fatal.

use coordination::failure::{FailureRecord, Phase};
use coordination::{CompetingItem, Direction};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::errors::{OracleError, PipelineError};
use crate::oracle::{DirectionContext, Generation, OracleGate};
use crate::prompts;

/// One unit of generation work.
#[derive(Debug, Clone)]
pub struct GenerationTask {
    /// Position in the task set, direction-major.
    pub index: usize,
    pub direction: Direction,
    pub replica: u32,
}

impl GenerationTask {
    pub fn producer_id(&self) -> String {
        format!("replica-{}", self.replica)
    }
}

/// Outcome of the fan-out phase.
#[derive(Debug, Clone, Default)]
pub struct FanOutReport {
    /// Successful items, in task order.
    pub items: Vec<CompetingItem>,
    pub failures: Vec<FailureRecord>,
    pub attempted: usize,
}

/// Expand directions into tasks, direction-major.
pub fn plan_tasks(directions: &[Direction], replicas: u32) -> Vec<GenerationTask> {
    directions
        .iter()
        .flat_map(|d| (0..replicas).map(move |r| (d, r)))
        .enumerate()
        .map(|(index, (direction, replica))| GenerationTask {
            index,
            direction: direction.clone(),
            replica,
        })
        .collect()
}

/// Run every generation task and collect successes and failures.
pub async fn fan_out(
    gate: &OracleGate,
    directions: &[Direction],
    replicas: u32,
    project_context: Option<&str>,
) -> Result<FanOutReport, PipelineError> {
    let tasks = plan_tasks(directions, replicas);
    let attempted = tasks.len();
    info!(
        directions = directions.len(),
        replicas,
        tasks = attempted,
        "fan-out starting"
    );

    let mut join_set: JoinSet<(GenerationTask, Result<Generation, OracleError>)> = JoinSet::new();
    for task in tasks {
        let gate = gate.clone();
        let context = DirectionContext::new(
            task.direction.clone(),
            project_context.map(str::to_string),
        );
        join_set.spawn(async move {
            let prompt = prompts::generation_task(&task.direction, task.replica, replicas);
            let result = gate.generate(&prompt, &context).await;
            (task, result)
        });
    }

    let mut successes: Vec<(usize, CompetingItem)> = Vec::new();
    let mut failures: Vec<(usize, FailureRecord)> = Vec::new();
    let mut cancelled = false;
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((task, Ok(generation))) => {
                debug!(task = task.index, direction = %task.direction.id, "generation succeeded");
                let item = CompetingItem::new(
                    task.direction.id.clone(),
                    task.producer_id(),
                    generation.content,
                );
                successes.push((task.index, item));
            }
            Ok((task, Err(e))) => {
                cancelled |= e.is_cancelled();
                warn!(task = task.index, direction = %task.direction.id, error = %e, "generation task failed");
                failures.push((
                    task.index,
                    FailureRecord::task(
                        Phase::FanOut,
                        format!("task {} ({} replica {})", task.index, task.direction.id, task.replica),
                        e.to_string(),
                    ),
                ));
            }
            Err(e) => {
                warn!(error = %e, "generation worker panicked");
                failures.push((
                    usize::MAX,
                    FailureRecord::task(Phase::FanOut, "worker", e.to_string()),
                ));
            }
        }
    }

    if cancelled || gate.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }

    successes.sort_by_key(|(index, _)| *index);
    failures.sort_by_key(|(index, _)| *index);
    let failures: Vec<FailureRecord> = failures.into_iter().map(|(_, f)| f).collect();

    if attempted > 0 && successes.is_empty() {
        let cause = failures
            .first()
            .map(|f| f.cause.clone())
            .unwrap_or_else(|| "no task produced content".into());
        return Err(PipelineError::Fatal {
            phase: Phase::FanOut,
            attempted,
            cause,
        });
    }

    info!(
        succeeded = successes.len(),
        failed = failures.len(),
        "fan-out complete"
    );
    Ok(FanOutReport {
        items: successes.into_iter().map(|(_, item)| item).collect(),
        failures,
        attempted,
    })
}
