//! Prediction submission and editing.
//!
//! Both paths are gated on the fixture still accepting predictions; once a
//! fixture locks, the reconciliation engine owns every further mutation of
//! prediction state.

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db;
use crate::error::{EngineError, Result};
use crate::models::{Fixture, Prediction, PredictionInput};
use crate::utils::validate_predicted_score;

fn ensure_open(fixture: &Fixture) -> Result<()> {
    if fixture.status != "open" || fixture.kickoff <= Utc::now() {
        return Err(EngineError::Precondition(format!(
            "fixture {} is no longer accepting predictions",
            fixture.id
        )));
    }
    Ok(())
}

fn normalized_player(player: Option<&str>) -> Option<String> {
    player
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
}

/// Place a prediction. One per user per fixture; the home side may only be
/// predicted to win or draw.
pub async fn place_prediction(pool: &SqlitePool, input: &PredictionInput) -> Result<Prediction> {
    validate_predicted_score(&input.predicted_score)?;

    let fixture = db::get_fixture_by_id(pool, &input.fixture_id)
        .await?
        .ok_or_else(|| {
            EngineError::Precondition(format!("fixture {} not found", input.fixture_id))
        })?;
    ensure_open(&fixture)?;

    db::get_user_by_id(pool, &input.user_id)
        .await?
        .ok_or_else(|| EngineError::Precondition(format!("user {} not found", input.user_id)))?;

    if db::get_user_prediction_for_fixture(pool, &input.user_id, &input.fixture_id)
        .await?
        .is_some()
    {
        return Err(EngineError::Precondition(format!(
            "user {} already has a prediction for fixture {}",
            input.user_id, input.fixture_id
        )));
    }

    let prediction = Prediction {
        id: Uuid::new_v4().to_string(),
        fixture_id: input.fixture_id.clone(),
        user_id: input.user_id.clone(),
        predicted_score: input.predicted_score,
        predicted_player: normalized_player(input.predicted_player.as_deref()),
        points_earned: None,
        breakdown: None,
        calculated_at: None,
        created_at: Utc::now(),
        updated_at: None,
    };
    db::insert_prediction(pool, &prediction).await?;
    db::increment_fixture_prediction_count(pool, &fixture.id).await?;

    tracing::info!(
        "Prediction {} placed by {} on fixture {}",
        prediction.id,
        prediction.user_id,
        prediction.fixture_id
    );
    Ok(prediction)
}

/// Edit an existing prediction while its fixture is still open.
pub async fn update_prediction(
    pool: &SqlitePool,
    prediction_id: &str,
    input: &PredictionInput,
) -> Result<()> {
    validate_predicted_score(&input.predicted_score)?;

    let prediction = db::get_prediction_by_id(pool, prediction_id)
        .await?
        .ok_or_else(|| {
            EngineError::Precondition(format!("prediction {} not found", prediction_id))
        })?;

    if prediction.user_id != input.user_id {
        return Err(EngineError::Precondition(format!(
            "prediction {} does not belong to user {}",
            prediction_id, input.user_id
        )));
    }

    let fixture = db::get_fixture_by_id(pool, &prediction.fixture_id)
        .await?
        .ok_or_else(|| {
            EngineError::Precondition(format!("fixture {} not found", prediction.fixture_id))
        })?;
    ensure_open(&fixture)?;

    db::update_prediction_pick(
        pool,
        prediction_id,
        &input.predicted_score,
        normalized_player(input.predicted_player.as_deref()).as_deref(),
    )
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Score, Season, User};
    use chrono::Duration;

    async fn seed_base(pool: &SqlitePool, kickoff_offset_hours: i64, status: &str) {
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
            id: "f1".to_string(),
            season_id: "s1".to_string(),
            opponent: "Fortaleza".to_string(),
            kickoff: Utc::now() + Duration::hours(kickoff_offset_hours),
            status: status.to_string(),
            actual_score: None,
            actual_scorers: None,
            actual_assists: None,
            results_set_at: None,
            total_predictions: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        db::insert_fixture(pool, &fixture).await.unwrap();

        let user = User {
            id: "ana".to_string(),
            username: "ana".to_string(),
            display_name: "Ana".to_string(),
            is_admin: false,
            total_points: 0,
            scorer_match_count: 0,
            created_at: Utc::now(),
            last_updated: None,
        };
        db::insert_user(pool, &user).await.unwrap();
    }

    fn input(home: i64, away: i64, player: Option<&str>) -> PredictionInput {
        PredictionInput {
            fixture_id: "f1".to_string(),
            user_id: "ana".to_string(),
            predicted_score: Score { home, away },
            predicted_player: player.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn placing_a_prediction_bumps_the_fixture_counter() {
        let pool = db::create_test_pool().await.unwrap();
        seed_base(&pool, 24, "open").await;

        let prediction = place_prediction(&pool, &input(2, 1, Some("  Vina  ")))
            .await
            .unwrap();
        assert_eq!(prediction.predicted_player.as_deref(), Some("Vina"));
        assert!(prediction.points_earned.is_none());

        let fixture = db::get_fixture_by_id(&pool, "f1").await.unwrap().unwrap();
        assert_eq!(fixture.total_predictions, 1);
    }

    #[tokio::test]
    async fn home_side_must_win_or_draw() {
        let pool = db::create_test_pool().await.unwrap();
        seed_base(&pool, 24, "open").await;

        let err = place_prediction(&pool, &input(0, 1, None)).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let err = place_prediction(&pool, &input(-1, -1, None)).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn one_prediction_per_user_per_fixture() {
        let pool = db::create_test_pool().await.unwrap();
        seed_base(&pool, 24, "open").await;

        place_prediction(&pool, &input(1, 0, None)).await.unwrap();
        let err = place_prediction(&pool, &input(2, 0, None)).await.unwrap_err();
        assert!(matches!(err, EngineError::Precondition(_)));
    }

    #[tokio::test]
    async fn closed_or_started_fixtures_reject_predictions() {
        let pool = db::create_test_pool().await.unwrap();
        seed_base(&pool, -1, "open").await; // kicked off an hour ago

        let err = place_prediction(&pool, &input(1, 0, None)).await.unwrap_err();
        assert!(matches!(err, EngineError::Precondition(_)));
    }

    #[tokio::test]
    async fn editing_keeps_the_same_gates() {
        let pool = db::create_test_pool().await.unwrap();
        seed_base(&pool, 24, "open").await;

        let prediction = place_prediction(&pool, &input(1, 0, None)).await.unwrap();
        update_prediction(&pool, &prediction.id, &input(3, 1, Some("Vina")))
            .await
            .unwrap();

        let stored = db::get_prediction_by_id(&pool, &prediction.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.predicted_score, Score { home: 3, away: 1 });
        assert_eq!(stored.predicted_player.as_deref(), Some("Vina"));
        assert!(stored.updated_at.is_some());

        db::update_fixture_status(&pool, "f1", "locked").await.unwrap();
        let err = update_prediction(&pool, &prediction.id, &input(1, 1, None))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Precondition(_)));
    }
}
