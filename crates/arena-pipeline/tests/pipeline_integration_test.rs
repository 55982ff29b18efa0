//! Whole-pipeline runs against the scripted oracle.

mod common;

use std::sync::Arc;
use std::time::Duration;

use arena_pipeline::fanout::fan_out;
use arena_pipeline::{
    plan_directions, run_pipeline, OracleGate, PipelineConfig, PipelineError, PipelineResult,
    PlanSource, WinnerType,
};
use common::{directions, init_tracing, ScriptedOracle};
use coordination::analytics::{verify_replay, REPLAY_TOLERANCE};
use coordination::debate::ResolutionPath;
use coordination::{FailureKind, Phase, Recommendation};
use tokio_util::sync::CancellationToken;

fn config() -> PipelineConfig {
    PipelineConfig {
        replica_count: 3,
        oracle_retries: 0,
        retry_backoff_ms: 0,
        ..Default::default()
    }
}

fn example_oracle() -> ScriptedOracle {
    ScriptedOracle::new(&[("d1", &[90, 40, 60]), ("d2", &[55, 80, 20])])
}

async fn run(oracle: Arc<ScriptedOracle>, ids: &[&str], config: PipelineConfig) -> PipelineResult {
    run_pipeline(oracle, directions(ids), config, CancellationToken::new())
        .await
        .unwrap()
}

fn content_of<'a>(result: &'a PipelineResult, item_id: &str) -> &'a str {
    result
        .items
        .iter()
        .find(|i| i.item_id == item_id)
        .map(|i| i.content.as_str())
        .unwrap()
}

// ── Example scenario: 2 directions × 3 replicas ────────────────────

#[tokio::test]
async fn test_example_run_end_to_end() {
    init_tracing();
    let oracle = Arc::new(example_oracle());
    let result = run(oracle.clone(), &["d1", "d2"], config()).await;

    // 6 generated + 3 evolved variants per direction
    assert_eq!(result.items.len(), 12);
    assert!(result.failures.is_empty(), "{:?}", result.failures);

    assert_eq!(result.tournaments.len(), 2);
    for tournament in &result.tournaments {
        assert!(!tournament.tournament_failed);
        assert_eq!(tournament.total_rounds, 2);
        assert_eq!(tournament.bye_count(), 1);
    }
    let d1 = &result.tournaments[0];
    assert_eq!(content_of(&result, d1.winner_id.as_deref().unwrap()), "d1#0 score=90");
    assert_eq!(content_of(&result, &d1.seeds[0]), "d1#0 score=90");
    assert_eq!(content_of(&result, &d1.seeds[2]), "d1#1 score=40");
    let d2 = &result.tournaments[1];
    assert_eq!(content_of(&result, d2.winner_id.as_deref().unwrap()), "d2#1 score=80");

    // Variants score lower, so every champion survives its evolution bracket.
    assert_eq!(result.evolution_results.len(), 2);
    for evolution in &result.evolution_results {
        assert_eq!(evolution.attempts.len(), 3);
        assert_eq!(evolution.winner_type, WinnerType::Original);
        assert_eq!(evolution.bracket.as_ref().unwrap().total_rounds, 2);
    }

    assert_eq!(result.direction_winners.len(), 2);
    assert!(result.direction_winners[0].elo_rating >= result.direction_winners[1].elo_rating);
    let verdict = result.debate_verdict.unwrap();
    assert_eq!(verdict.path, ResolutionPath::Consensus);
    assert_eq!(
        result.overall_champion.as_deref(),
        Some(result.direction_winners[0].item_id.as_str())
    );
    assert_eq!(result.debate_transcript.as_ref().unwrap().turns.len(), 4);

    assert_eq!(result.leaderboard.len(), 12);
    assert_eq!(result.meta_review.champions.len(), 2);
    assert_eq!(result.meta_review.insights.len(), 2);

    // 2 + 2 initial matches, 3 + 3 evolution matches
    assert_eq!(oracle.calls(&oracle.compare_calls), 10);
    assert_eq!(oracle.calls(&oracle.score_calls), 12);
    assert_eq!(oracle.calls(&oracle.generate_calls), 13);
    assert_eq!(oracle.calls(&oracle.converse_calls), 4);
}

#[tokio::test]
async fn test_ratings_are_zero_sum_and_replayable() {
    let result = run(Arc::new(example_oracle()), &["d1", "d2"], config()).await;

    for m in &result.rating_history.matches {
        match (m.elo_before_b, m.elo_after_b) {
            (Some(before_b), Some(after_b)) => {
                let before = m.elo_before_a + before_b;
                let after = m.elo_after_a + after_b;
                assert!((before - after).abs() < 1e-9);
                let gain_a = m.elo_after_a - m.elo_before_a;
                let gain_b = after_b - before_b;
                assert!((gain_a.abs() - gain_b.abs()).abs() < 1e-9);
            }
            _ => assert_eq!(m.elo_before_a, m.elo_after_a, "bye moved a rating"),
        }
    }

    let replayed = result.rating_history.replay().unwrap();
    for entry in &result.leaderboard {
        let rating = replayed.rating(&entry.item_id).unwrap();
        assert!((rating - entry.final_elo).abs() <= REPLAY_TOLERANCE);
    }
    let json = result.rating_history.to_json().unwrap();
    let restored = coordination::MatchHistory::from_json(&json).unwrap();
    let snapshot = restored.replay().unwrap().snapshot();
    assert!(verify_replay(&snapshot, &replayed, REPLAY_TOLERANCE).is_empty());
}

#[tokio::test]
async fn test_bracket_outcome_is_deterministic() {
    let summarize = |result: &PipelineResult| -> Vec<(String, u32)> {
        result
            .tournaments
            .iter()
            .map(|t| {
                (
                    content_of(result, t.winner_id.as_deref().unwrap()).to_string(),
                    t.total_rounds,
                )
            })
            .collect()
    };
    let first = run(Arc::new(example_oracle()), &["d1", "d2"], config()).await;
    let second = run(Arc::new(example_oracle()), &["d1", "d2"], config()).await;
    assert_eq!(summarize(&first), summarize(&second));
}

#[tokio::test]
async fn test_evolved_variant_can_take_the_direction() {
    let oracle = Arc::new(example_oracle().with_evolution_delta(5));
    let result = run(oracle, &["d1", "d2"], config()).await;
    for evolution in &result.evolution_results {
        assert_eq!(evolution.winner_type, WinnerType::Evolved);
        assert_ne!(evolution.final_winner_id, evolution.original_champion_id);
    }
    assert!(result
        .direction_winners
        .iter()
        .all(|w| w.winner_type == WinnerType::Evolved));
    let original = result
        .items
        .iter()
        .find(|i| i.item_id == result.evolution_results[0].original_champion_id)
        .unwrap();
    assert_eq!(original.content, "d1#0 score=90", "source must never be mutated");
}

// ── Failure isolation ──────────────────────────────────────────────

#[tokio::test]
async fn test_fan_out_isolates_one_failing_task() {
    let ids: Vec<String> = (1..=10).map(|i| format!("d{i}")).collect();
    let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
    let oracle = Arc::new(ScriptedOracle::new(&[]).failing_generation("d7"));
    let gate = OracleGate::new(oracle, 4, Duration::from_secs(5));

    let report = fan_out(&gate, &directions(&ids), 1, None).await.unwrap();
    assert_eq!(report.items.len(), 9);
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].subject.contains("d7"));
    assert!(report.items.iter().all(|i| i.direction_id != "d7"));
}

#[tokio::test]
async fn test_unscored_items_record_neutral_defaults() {
    let oracle = Arc::new(example_oracle().failing_scoring("d2"));
    let result = run(oracle, &["d1", "d2"], config()).await;

    assert_eq!(result.failures.in_phase(Phase::Reflection).count(), 3);
    let d2_items: Vec<_> = result
        .items
        .iter()
        .filter(|i| i.direction_id == "d2")
        .collect();
    assert!(!d2_items.is_empty());
    for item in d2_items {
        assert_eq!(item.quality_score, Some(50));
        assert_eq!(item.advancement_recommendation, Some(Recommendation::Revise));
        assert!(item.quality_confidence.is_none());
    }
    assert!(result.items.iter().all(|i| i.quality_score.is_some()));
}

#[tokio::test]
async fn test_direction_without_items_fails_alone() {
    let oracle = Arc::new(example_oracle().failing_generation("d2"));
    let result = run(oracle, &["d1", "d2"], config()).await;

    assert_eq!(result.failed_directions(), vec!["d2"]);
    assert_eq!(result.failures.count(FailureKind::TaskFailure), 3);
    assert_eq!(result.failures.count(FailureKind::DirectionFailure), 1);
    assert_eq!(result.direction_winners.len(), 1);
    assert!(result.debate_transcript.is_none());
    assert_eq!(
        result.overall_champion.as_deref(),
        Some(result.direction_winners[0].item_id.as_str())
    );
}

#[tokio::test]
async fn test_failed_bracket_keeps_items_and_other_directions() {
    let oracle = Arc::new(example_oracle().failing_comparison("d2"));
    let result = run(oracle, &["d1", "d2"], config()).await;

    let d2 = &result.tournaments[1];
    assert!(d2.tournament_failed);
    assert!(d2.winner_id.is_none());
    assert_eq!(d2.seeds.len(), 3);
    assert!(d2.all_matches.is_empty());
    assert_eq!(result.items.iter().filter(|i| i.direction_id == "d2").count(), 3);

    assert!(!result.tournaments[0].tournament_failed);
    let direction_failures: Vec<_> = result
        .failures
        .in_phase(Phase::Tournament)
        .filter(|f| f.kind == FailureKind::DirectionFailure)
        .collect();
    assert_eq!(direction_failures.len(), 1);
    assert_eq!(direction_failures[0].subject, "d2");
}

#[tokio::test]
async fn test_every_bracket_failing_is_fatal() {
    let oracle = Arc::new(
        example_oracle()
            .failing_comparison("d1")
            .failing_comparison("d2"),
    );
    let err = run_pipeline(oracle, directions(&["d1", "d2"]), config(), CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.phase(), Some(Phase::Tournament));
}

#[tokio::test]
async fn test_unreachable_oracle_is_fatal_in_fan_out() {
    let oracle = Arc::new(
        example_oracle()
            .failing_generation("d1")
            .failing_generation("d2"),
    );
    let err = run_pipeline(oracle, directions(&["d1", "d2"]), config(), CancellationToken::new())
        .await
        .unwrap_err();
    match err {
        PipelineError::Fatal { phase, attempted, .. } => {
            assert_eq!(phase, Phase::FanOut);
            assert_eq!(attempted, 6);
        }
        other => panic!("expected fatal, got {other:?}"),
    }
}

// ── Debate and planning fallbacks ──────────────────────────────────

#[tokio::test]
async fn test_debate_without_verdict_defaults_to_rank_one() {
    let oracle = Arc::new(
        example_oracle().with_converse(|_| Ok("Both have merit; I cannot choose.".to_string())),
    );
    let result = run(oracle, &["d1", "d2"], config()).await;

    let verdict = result.debate_verdict.unwrap();
    assert!(verdict.unresolved);
    assert_eq!(verdict.path, ResolutionPath::DefaultRankOne);
    assert_eq!(
        result.overall_champion.as_deref(),
        Some(result.direction_winners[0].item_id.as_str())
    );
    assert!(!result.debate_transcript.unwrap().resolved);
    assert_eq!(result.failures.count(FailureKind::ParseFailure), 2);
}

#[tokio::test]
async fn test_no_debate_uses_rank_one() {
    let oracle = Arc::new(example_oracle());
    let config = PipelineConfig {
        use_debate: false,
        evolution_strategies: Vec::new(),
        ..config()
    };
    let result = run(oracle.clone(), &["d1", "d2"], config).await;
    assert!(result.debate_transcript.is_none());
    assert!(result.evolution_results.is_empty());
    assert_eq!(result.items.len(), 6);
    assert_eq!(oracle.calls(&oracle.converse_calls), 0);
    assert_eq!(
        result.overall_champion.as_deref(),
        Some(result.direction_winners[0].item_id.as_str())
    );
}

#[tokio::test]
async fn test_planning_falls_back_to_single_oracle() {
    let oracle = Arc::new(ScriptedOracle::new(&[]));
    let gate = OracleGate::new(oracle.clone(), 2, Duration::from_secs(5));
    let report = plan_directions(&gate, "energy in 2040", 2, 2).await.unwrap();

    assert_eq!(report.source, PlanSource::SingleOracle);
    let names: Vec<&str> = report.directions.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["Grid", "Policy"]);
    assert_eq!(report.transcript.unwrap().turns.len(), 4);
    assert_eq!(oracle.calls(&oracle.converse_calls), 4);
}

// ── Cancellation ───────────────────────────────────────────────────

#[tokio::test]
async fn test_cancellation_mid_run_commits_nothing() {
    let cancel = CancellationToken::new();
    let oracle = Arc::new(example_oracle().cancelling_on_score(cancel.clone()));
    let err = run_pipeline(oracle.clone(), directions(&["d1", "d2"]), config(), cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Cancelled));
    assert_eq!(oracle.calls(&oracle.compare_calls), 0);
    assert_eq!(oracle.calls(&oracle.generate_calls), 6);
}

#[tokio::test]
async fn test_result_serializes_for_persistence() {
    let result = run(Arc::new(example_oracle()), &["d1"], config()).await;
    let json = serde_json::to_value(&result).unwrap();
    assert!(json["failures"].is_array());
    assert!(json["rating_history"]["matches"].is_array());
    let restored: PipelineResult = serde_json::from_value(json).unwrap();
    assert_eq!(restored.run_id, result.run_id);
}
