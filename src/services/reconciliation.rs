//! Result-setting and rescoring for one fixture.
//!
//! Every code path that changes a prediction's stored points computes and
//! applies the matching per-user delta in the same atomic group, so the
//! `total_points` cache stays equal to the sum of the user's scored
//! predictions without ever rescanning their history.

use std::collections::BTreeMap;

use chrono::Utc;
use sqlx::SqlitePool;

use crate::db;
use crate::db::batch::{WriteBatch, WriteOp, MAX_BATCH_OPS};
use crate::error::{EngineError, Result};
use crate::models::FixtureResult;
use crate::services::scoring::{calculate_points, PredictionCounts};

struct UserStage {
    ops: Vec<WriteOp>,
    points_delta: i64,
    scorer_match_delta: i64,
}

pub struct ReconciliationEngine {
    chunk_limit: usize,
}

impl ReconciliationEngine {
    pub fn new() -> Self {
        Self {
            chunk_limit: MAX_BATCH_OPS,
        }
    }

    pub fn with_chunk_limit(chunk_limit: usize) -> Self {
        Self { chunk_limit }
    }

    /// Record a fixture's result and award points to every prediction.
    /// Safe to call again with a corrected result: each prediction's stored
    /// previous value is diffed against the fresh computation and only the
    /// difference reaches the user counters.
    pub async fn set_result(
        &self,
        pool: &SqlitePool,
        fixture_id: &str,
        result: &FixtureResult,
    ) -> Result<()> {
        validate_result(result)?;

        let fixture = db::get_fixture_by_id(pool, fixture_id)
            .await?
            .ok_or_else(|| EngineError::Precondition(format!("fixture {} not found", fixture_id)))?;

        db::set_fixture_result(pool, &fixture.id, result).await?;
        tracing::info!(
            "Result set for fixture {} ({}-{}), scoring predictions",
            fixture.id,
            result.actual_score.home,
            result.actual_score.away
        );

        self.apply_scoring(pool, &fixture.id, result).await
    }

    /// Re-derive every prediction's points from the result already stored on
    /// the fixture. Used after fixture metadata changes; with unchanged data
    /// every delta comes out zero.
    pub async fn recalculate(&self, pool: &SqlitePool, fixture_id: &str) -> Result<()> {
        let fixture = db::get_fixture_by_id(pool, fixture_id)
            .await?
            .ok_or_else(|| EngineError::Precondition(format!("fixture {} not found", fixture_id)))?;

        let result = fixture.result().ok_or_else(|| {
            EngineError::Precondition(format!("fixture {} has no stored result", fixture_id))
        })?;

        tracing::info!("Recalculating points for fixture {}", fixture.id);
        self.apply_scoring(pool, &fixture.id, &result).await
    }

    async fn apply_scoring(
        &self,
        pool: &SqlitePool,
        fixture_id: &str,
        result: &FixtureResult,
    ) -> Result<()> {
        let predictions = db::get_fixture_predictions(pool, fixture_id).await?;
        if predictions.is_empty() {
            tracing::info!("Fixture {} has no predictions to score", fixture_id);
            return Ok(());
        }

        // Frequency snapshot over the whole pool before any single
        // prediction is scored; uniqueness tiers depend on it.
        let counts = PredictionCounts::build(
            predictions
                .iter()
                .map(|p| (&p.predicted_score, p.predicted_player.as_deref())),
        );

        let now = Utc::now().to_rfc3339();
        let mut stages: BTreeMap<String, UserStage> = BTreeMap::new();

        for prediction in &predictions {
            let old_points = prediction.points_earned.unwrap_or(0);
            let had_scorer_match = prediction
                .breakdown
                .as_ref()
                .is_some_and(|b| b.has_scorer_match());

            let (new_points, breakdown) = calculate_points(
                &prediction.predicted_score,
                prediction.predicted_player.as_deref(),
                result,
                &counts,
            );

            // A correction, not an accumulation: at most one active
            // scorer-match credit per prediction.
            let scorer_match_delta = match (had_scorer_match, breakdown.has_scorer_match()) {
                (false, true) => 1,
                (true, false) => -1,
                _ => 0,
            };

            let stage = stages
                .entry(prediction.user_id.clone())
                .or_insert_with(|| UserStage {
                    ops: Vec::new(),
                    points_delta: 0,
                    scorer_match_delta: 0,
                });
            stage.points_delta += new_points - old_points;
            stage.scorer_match_delta += scorer_match_delta;
            stage.ops.push(WriteOp::UpdatePredictionScore {
                prediction_id: prediction.id.clone(),
                points: new_points,
                breakdown_json: serde_json::to_string(&breakdown)?,
                calculated_at: now.clone(),
            });
        }

        let mut batch = WriteBatch::with_chunk_limit(self.chunk_limit);
        let mut users_touched = 0;
        for (user_id, mut stage) in stages {
            if stage.points_delta != 0 || stage.scorer_match_delta != 0 {
                users_touched += 1;
                stage.ops.push(WriteOp::IncrementUserTotals {
                    user_id,
                    points_delta: stage.points_delta,
                    scorer_match_delta: stage.scorer_match_delta,
                    last_updated: now.clone(),
                });
            }
            batch.stage(stage.ops);
        }

        tracing::info!(
            "Scored {} predictions for fixture {}, {} users with nonzero deltas",
            predictions.len(),
            fixture_id,
            users_touched
        );

        batch.commit(pool).await
    }
}

impl Default for ReconciliationEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_result(result: &FixtureResult) -> Result<()> {
    if result.actual_score.home < 0 || result.actual_score.away < 0 {
        return Err(EngineError::Validation(
            "actual score must be non-negative".to_string(),
        ));
    }
    for name in result
        .actual_scorers
        .iter()
        .chain(result.actual_assists.iter())
    {
        if name.trim().is_empty() {
            return Err(EngineError::Validation(
                "scorer and assist names must not be blank".to_string(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Fixture, Prediction, Score, Season, User};
    use chrono::Utc;

    async fn seed_user(pool: &SqlitePool, id: &str) {
        let user = User {
            id: id.to_string(),
            username: id.to_string(),
            display_name: id.to_uppercase(),
            is_admin: false,
            total_points: 0,
            scorer_match_count: 0,
            created_at: Utc::now(),
            last_updated: None,
        };
        db::insert_user(pool, &user).await.unwrap();
    }

    async fn seed_fixture(pool: &SqlitePool, id: &str) {
        let season = Season {
            id: "s1".to_string(),
            name: "2026".to_string(),
            start_date: Utc::now(),
            end_date: None,
            status: "active".to_string(),
            final_rankings: None,
            created_at: Utc::now(),
        };
        db::insert_season(pool, &season).await.unwrap();

        let fixture = Fixture {
            id: id.to_string(),
            season_id: "s1".to_string(),
            opponent: "Fortaleza".to_string(),
            kickoff: Utc::now(),
            status: "locked".to_string(),
            actual_score: None,
            actual_scorers: None,
            actual_assists: None,
            results_set_at: None,
            total_predictions: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        db::insert_fixture(pool, &fixture).await.unwrap();
    }

    async fn seed_prediction(
        pool: &SqlitePool,
        id: &str,
        user_id: &str,
        score: Score,
        player: Option<&str>,
    ) {
        let prediction = Prediction {
            id: id.to_string(),
            fixture_id: "f1".to_string(),
            user_id: user_id.to_string(),
            predicted_score: score,
            predicted_player: player.map(str::to_string),
            points_earned: None,
            breakdown: None,
            calculated_at: None,
            created_at: Utc::now(),
            updated_at: None,
        };
        db::insert_prediction(pool, &prediction).await.unwrap();
    }

    fn result(home: i64, away: i64, scorers: &[&str], assists: &[&str]) -> FixtureResult {
        FixtureResult {
            actual_score: Score { home, away },
            actual_scorers: scorers.iter().map(|s| s.to_string()).collect(),
            actual_assists: assists.iter().map(|s| s.to_string()).collect(),
        }
    }

    async fn assert_conservation(pool: &SqlitePool) {
        let user_sum: i64 = sqlx::query_scalar("SELECT COALESCE(SUM(total_points), 0) FROM users")
            .fetch_one(pool)
            .await
            .unwrap();
        let prediction_sum: i64 =
            sqlx::query_scalar("SELECT COALESCE(SUM(points_earned), 0) FROM predictions")
                .fetch_one(pool)
                .await
                .unwrap();
        assert_eq!(user_sum, prediction_sum);
    }

    #[tokio::test]
    async fn set_result_awards_points_and_updates_totals() {
        let pool = db::create_test_pool().await.unwrap();
        seed_fixture(&pool, "f1").await;
        seed_user(&pool, "ana").await;
        seed_user(&pool, "bia").await;
        seed_user(&pool, "caio").await;
        // ana alone on the exact score, bia and caio share an outcome hit
        seed_prediction(&pool, "p1", "ana", Score { home: 2, away: 1 }, Some("Vina")).await;
        seed_prediction(&pool, "p2", "bia", Score { home: 1, away: 0 }, None).await;
        seed_prediction(&pool, "p3", "caio", Score { home: 3, away: 0 }, None).await;

        let engine = ReconciliationEngine::new();
        engine
            .set_result(&pool, "f1", &result(2, 1, &["Vina", "Richard"], &[]))
            .await
            .unwrap();

        let ana = db::get_user_by_id(&pool, "ana").await.unwrap().unwrap();
        // exact alone (4) + lone scorer pick, one goal (4)
        assert_eq!(ana.total_points, 8);
        assert_eq!(ana.scorer_match_count, 1);

        let bia = db::get_user_by_id(&pool, "bia").await.unwrap().unwrap();
        assert_eq!(bia.total_points, 1);

        let p1 = db::get_prediction_by_id(&pool, "p1").await.unwrap().unwrap();
        assert_eq!(p1.points_earned, Some(8));
        let breakdown = p1.breakdown.unwrap();
        assert_eq!(breakdown.exact_score_alone, Some(4));
        assert_eq!(breakdown.matched_scorer_alone, Some(4));
        assert!(p1.calculated_at.is_some());

        let fixture = db::get_fixture_by_id(&pool, "f1").await.unwrap().unwrap();
        assert_eq!(fixture.status, "finished");
        assert_eq!(fixture.actual_score, Some(Score { home: 2, away: 1 }));

        assert_conservation(&pool).await;
    }

    #[tokio::test]
    async fn rerunning_with_unchanged_result_is_idempotent() {
        let pool = db::create_test_pool().await.unwrap();
        seed_fixture(&pool, "f1").await;
        seed_user(&pool, "ana").await;
        seed_prediction(&pool, "p1", "ana", Score { home: 2, away: 0 }, Some("Vina")).await;

        let engine = ReconciliationEngine::new();
        let res = result(2, 0, &["Vina"], &["Erick"]);
        engine.set_result(&pool, "f1", &res).await.unwrap();
        let first = db::get_user_by_id(&pool, "ana").await.unwrap().unwrap();

        engine.set_result(&pool, "f1", &res).await.unwrap();
        engine.recalculate(&pool, "f1").await.unwrap();

        let after = db::get_user_by_id(&pool, "ana").await.unwrap().unwrap();
        assert_eq!(after.total_points, first.total_points);
        assert_eq!(after.scorer_match_count, first.scorer_match_count);
        assert_conservation(&pool).await;
    }

    #[tokio::test]
    async fn corrected_result_applies_only_the_difference() {
        let pool = db::create_test_pool().await.unwrap();
        seed_fixture(&pool, "f1").await;
        seed_user(&pool, "ana").await;
        seed_prediction(&pool, "p1", "ana", Score { home: 2, away: 1 }, Some("Vina")).await;

        let engine = ReconciliationEngine::new();
        engine
            .set_result(&pool, "f1", &result(2, 1, &["Vina"], &[]))
            .await
            .unwrap();
        let scored = db::get_user_by_id(&pool, "ana").await.unwrap().unwrap();
        assert_eq!(scored.total_points, 8);
        assert_eq!(scored.scorer_match_count, 1);

        // Correction: different scoreline, goal credited to someone else
        engine
            .set_result(&pool, "f1", &result(3, 1, &["Richard"], &[]))
            .await
            .unwrap();

        let corrected = db::get_user_by_id(&pool, "ana").await.unwrap().unwrap();
        // down to the outcome-category point, scorer credit revoked
        assert_eq!(corrected.total_points, 1);
        assert_eq!(corrected.scorer_match_count, 0);
        assert_conservation(&pool).await;
    }

    #[tokio::test]
    async fn shared_tiers_come_from_the_population_snapshot() {
        let pool = db::create_test_pool().await.unwrap();
        seed_fixture(&pool, "f1").await;
        for user in ["ana", "bia", "caio"] {
            seed_user(&pool, user).await;
        }
        seed_prediction(&pool, "p1", "ana", Score { home: 2, away: 1 }, None).await;
        seed_prediction(&pool, "p2", "bia", Score { home: 2, away: 1 }, None).await;
        seed_prediction(&pool, "p3", "caio", Score { home: 2, away: 1 }, None).await;

        ReconciliationEngine::new()
            .set_result(&pool, "f1", &result(2, 1, &[], &[]))
            .await
            .unwrap();

        for user in ["ana", "bia", "caio"] {
            let stored = db::get_user_by_id(&pool, user).await.unwrap().unwrap();
            assert_eq!(stored.total_points, 2);
        }
        assert_conservation(&pool).await;
    }

    #[tokio::test]
    async fn small_chunk_limit_still_reconciles_consistently() {
        let pool = db::create_test_pool().await.unwrap();
        seed_fixture(&pool, "f1").await;
        for n in 0..7 {
            let user = format!("user{}", n);
            seed_user(&pool, &user).await;
            seed_prediction(
                &pool,
                &format!("p{}", n),
                &user,
                Score { home: 1, away: 0 },
                None,
            )
            .await;
        }

        ReconciliationEngine::with_chunk_limit(3)
            .set_result(&pool, "f1", &result(1, 0, &[], &[]))
            .await
            .unwrap();

        for n in 0..7 {
            let stored = db::get_user_by_id(&pool, &format!("user{}", n))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(stored.total_points, 2);
        }
        assert_conservation(&pool).await;
    }

    #[tokio::test]
    async fn recalculate_without_stored_result_is_a_precondition_error() {
        let pool = db::create_test_pool().await.unwrap();
        seed_fixture(&pool, "f1").await;

        let err = ReconciliationEngine::new()
            .recalculate(&pool, "f1")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Precondition(_)));

        let missing = ReconciliationEngine::new()
            .recalculate(&pool, "nope")
            .await
            .unwrap_err();
        assert!(matches!(missing, EngineError::Precondition(_)));
    }

    #[tokio::test]
    async fn negative_score_is_rejected_before_any_write() {
        let pool = db::create_test_pool().await.unwrap();
        seed_fixture(&pool, "f1").await;
        seed_user(&pool, "ana").await;
        seed_prediction(&pool, "p1", "ana", Score { home: 1, away: 0 }, None).await;

        let err = ReconciliationEngine::new()
            .set_result(&pool, "f1", &result(-1, 0, &[], &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let fixture = db::get_fixture_by_id(&pool, "f1").await.unwrap().unwrap();
        assert_eq!(fixture.status, "locked");
        assert!(fixture.actual_score.is_none());
        let p1 = db::get_prediction_by_id(&pool, "p1").await.unwrap().unwrap();
        assert!(p1.points_earned.is_none());
    }
}
