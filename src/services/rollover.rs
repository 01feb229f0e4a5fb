//! Fixture deletion, season closure and season deletion.
//!
//! Deletion is the ledger run in reverse: previously applied point sums are
//! reversed in the same atomic groups that remove the predictions, so the
//! user counters never drift from the surviving predictions. Closure
//! snapshots the standings once, then zeroes the running totals in bounded
//! chunks. Both paths are safe to re-run after a partial failure.

use std::collections::BTreeMap;

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db;
use crate::db::batch::{WriteBatch, WriteOp};
use crate::error::{EngineError, Result};
use crate::models::{FinalRanking, Season, SeasonInput};

/// Delete a fixture and its predictions, reversing every point and
/// scorer-match credit those predictions had earned. Groups commit per
/// user; on retry, already-deleted predictions contribute nothing, so the
/// reversal never double-applies.
pub async fn delete_fixture(pool: &SqlitePool, fixture_id: &str) -> Result<()> {
    let fixture = db::get_fixture_by_id(pool, fixture_id)
        .await?
        .ok_or_else(|| EngineError::Precondition(format!("fixture {} not found", fixture_id)))?;

    let predictions = db::get_fixture_predictions(pool, &fixture.id).await?;
    let mut batch = WriteBatch::new();

    if predictions.is_empty() {
        batch.stage(vec![WriteOp::DeleteFixture {
            fixture_id: fixture.id.clone(),
        }]);
        tracing::info!("Deleting fixture {} (no predictions)", fixture.id);
        return batch.commit(pool).await;
    }

    let now = Utc::now().to_rfc3339();
    let mut by_user: BTreeMap<String, (Vec<WriteOp>, i64, i64)> = BTreeMap::new();

    for prediction in &predictions {
        let (ops, points, scorer_matches) = by_user
            .entry(prediction.user_id.clone())
            .or_insert_with(|| (Vec::new(), 0, 0));
        ops.push(WriteOp::DeletePrediction {
            prediction_id: prediction.id.clone(),
        });
        if let Some(earned) = prediction.points_earned {
            *points += earned;
        }
        if prediction
            .breakdown
            .as_ref()
            .is_some_and(|b| b.has_scorer_match())
        {
            *scorer_matches += 1;
        }
    }

    for (user_id, (mut ops, points, scorer_matches)) in by_user {
        if points != 0 || scorer_matches != 0 {
            ops.push(WriteOp::IncrementUserTotals {
                user_id,
                points_delta: -points,
                scorer_match_delta: -scorer_matches,
                last_updated: now.clone(),
            });
        }
        batch.stage(ops);
    }

    // The fixture goes last so a retried run still finds it.
    batch.stage(vec![WriteOp::DeleteFixture {
        fixture_id: fixture.id.clone(),
    }]);

    tracing::info!(
        "Deleting fixture {} with {} predictions, reversing applied points",
        fixture.id,
        predictions.len()
    );
    batch.commit(pool).await
}

/// Current standings: points descending, username ascending on ties,
/// 1-based ranks.
pub async fn compute_final_rankings(pool: &SqlitePool) -> Result<Vec<FinalRanking>> {
    let users = db::get_users_ranked(pool).await?;
    Ok(users
        .into_iter()
        .enumerate()
        .map(|(index, user)| FinalRanking {
            user_id: user.id,
            username: user.username,
            total_points: user.total_points,
            rank: index as i64 + 1,
        })
        .collect())
}

/// Close a season: persist the immutable standings snapshot, then zero
/// every user's running total in bounded chunks. Lifetime counters
/// (`scorer_match_count`) are untouched.
///
/// Re-runnable: if a prior call crashed between the snapshot and the reset,
/// calling again skips the snapshot write and finishes the reset.
pub async fn end_season(
    pool: &SqlitePool,
    season_id: &str,
    final_rankings: &[FinalRanking],
) -> Result<()> {
    let season = db::get_season_by_id(pool, season_id)
        .await?
        .ok_or_else(|| EngineError::Precondition(format!("season {} not found", season_id)))?;

    if season.status == "active" {
        db::mark_season_ended(pool, &season.id, final_rankings).await?;
        tracing::info!(
            "Season {} ended, snapshotted {} ranking entries",
            season.id,
            final_rankings.len()
        );
    } else {
        tracing::info!("Season {} already ended, resuming point reset", season.id);
    }

    let users = db::get_all_users(pool).await?;
    let now = Utc::now().to_rfc3339();
    let mut batch = WriteBatch::new();
    for user in &users {
        batch.stage(vec![WriteOp::ResetUserPoints {
            user_id: user.id.clone(),
            last_updated: now.clone(),
        }]);
    }

    tracing::info!("Resetting running totals for {} users", users.len());
    batch.commit(pool).await
}

/// Delete a season and everything under it. Each fixture goes through the
/// reversing deletion above, so user totals stay consistent throughout; a
/// failure partway leaves a shorter fixture list for the retry.
pub async fn delete_season(pool: &SqlitePool, season_id: &str) -> Result<()> {
    let season = db::get_season_by_id(pool, season_id)
        .await?
        .ok_or_else(|| EngineError::Precondition(format!("season {} not found", season_id)))?;

    let fixtures = db::get_fixtures_by_season(pool, &season.id).await?;
    tracing::info!(
        "Deleting season {} with {} fixtures",
        season.id,
        fixtures.len()
    );

    for fixture in &fixtures {
        delete_fixture(pool, &fixture.id).await?;
    }

    db::delete_season_record(pool, &season.id).await?;
    tracing::info!("Season {} deleted", season.id);
    Ok(())
}

/// Create a season. At most one season may be active system-wide.
pub async fn create_season(pool: &SqlitePool, input: &SeasonInput) -> Result<Season> {
    if input.name.trim().is_empty() {
        return Err(EngineError::Validation(
            "season name must not be empty".to_string(),
        ));
    }

    if let Some(active) = db::get_active_season(pool).await? {
        return Err(EngineError::Precondition(format!(
            "season {} ({}) is still active; end or delete it first",
            active.name, active.id
        )));
    }

    let season = Season {
        id: Uuid::new_v4().to_string(),
        name: input.name.trim().to_string(),
        start_date: input.start_date,
        end_date: None,
        status: "active".to_string(),
        final_rankings: None,
        created_at: Utc::now(),
    };
    db::insert_season(pool, &season).await?;
    tracing::info!("Created season {} ({})", season.name, season.id);
    Ok(season)
}
