use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post, put},
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use sqlx::SqlitePool;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::db;
use crate::error::EngineError;
use crate::models::{
    ApiResponse, FinalRanking, Fixture, FixtureInput, FixtureResult, Prediction, PredictionInput,
    Season, SeasonInput,
};
use crate::services::{predictions, rollover, ReconciliationEngine};

type ApiError = (StatusCode, Json<ApiResponse<()>>);

pub async fn serve(port: u16) -> anyhow::Result<()> {
    let pool = db::create_pool().await?;
    db::init_database_with_pool(&pool).await?;

    let app = create_router().with_state(pool);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    tracing::info!("Goalpool API server listening on port {}", port);

    axum::serve(listener, app).await?;
    Ok(())
}

fn create_router() -> Router<SqlitePool> {
    Router::new()
        .route("/health", get(health_check))
        .route("/fixtures", get(list_fixtures_handler).post(create_fixture_handler))
        .route("/fixtures/upcoming", get(upcoming_fixtures_handler))
        .route(
            "/fixtures/{id}",
            get(get_fixture_handler).delete(delete_fixture_handler),
        )
        .route("/fixtures/{id}/status", put(update_fixture_status_handler))
        .route("/fixtures/{id}/result", post(set_result_handler))
        .route("/fixtures/{id}/recalculate", post(recalculate_handler))
        .route("/fixtures/{id}/predictions", get(fixture_predictions_handler))
        .route("/predictions", post(place_prediction_handler))
        .route("/predictions/{id}", put(update_prediction_handler))
        .route("/seasons", get(list_seasons_handler).post(create_season_handler))
        .route("/seasons/{id}/end", post(end_season_handler))
        .route("/seasons/{id}", delete(delete_season_handler))
        .route("/rankings", get(rankings_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

fn engine_error(operation: &str, err: EngineError) -> ApiError {
    tracing::error!(
        "{} failed (retryable: {}): {}",
        operation,
        err.is_retryable(),
        err
    );
    let status = match &err {
        EngineError::Validation(_) => StatusCode::BAD_REQUEST,
        EngineError::Precondition(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ApiResponse::error(err.to_string())))
}

// Health check endpoint
async fn health_check() -> Json<ApiResponse<&'static str>> {
    Json(ApiResponse::success("Goalpool API is running"))
}

// GET /fixtures - all fixtures, most recent kickoff first
async fn list_fixtures_handler(
    State(pool): State<SqlitePool>,
) -> Result<Json<ApiResponse<Vec<Fixture>>>, ApiError> {
    let fixtures = db::get_all_fixtures(&pool)
        .await
        .map_err(|e| engine_error("list fixtures", e))?;
    Ok(Json(ApiResponse::success(fixtures)))
}

// GET /fixtures/upcoming
async fn upcoming_fixtures_handler(
    State(pool): State<SqlitePool>,
) -> Result<Json<ApiResponse<Vec<Fixture>>>, ApiError> {
    let fixtures = db::get_upcoming_fixtures(&pool)
        .await
        .map_err(|e| engine_error("list upcoming fixtures", e))?;
    Ok(Json(ApiResponse::success(fixtures)))
}

// GET /fixtures/{id}
async fn get_fixture_handler(
    State(pool): State<SqlitePool>,
    Path(fixture_id): Path<String>,
) -> Result<Json<ApiResponse<Fixture>>, StatusCode> {
    match db::get_fixture_by_id(&pool, &fixture_id).await {
        Ok(Some(fixture)) => Ok(Json(ApiResponse::success(fixture))),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            tracing::error!("Failed to fetch fixture {}: {}", fixture_id, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

// POST /fixtures - create a fixture in the active season
async fn create_fixture_handler(
    State(pool): State<SqlitePool>,
    Json(input): Json<FixtureInput>,
) -> Result<Json<ApiResponse<Fixture>>, ApiError> {
    let fixture = create_fixture(&pool, input)
        .await
        .map_err(|e| engine_error("create fixture", e))?;
    Ok(Json(ApiResponse::success(fixture)))
}

// PUT /fixtures/{id}/status - admin lock/reopen
#[derive(Deserialize)]
struct StatusUpdate {
    status: String,
}

async fn update_fixture_status_handler(
    State(pool): State<SqlitePool>,
    Path(fixture_id): Path<String>,
    Json(update): Json<StatusUpdate>,
) -> Result<Json<ApiResponse<&'static str>>, ApiError> {
    if !matches!(update.status.as_str(), "open" | "locked" | "finished") {
        return Err(engine_error(
            "update fixture status",
            EngineError::Validation(format!("unknown fixture status '{}'", update.status)),
        ));
    }
    db::get_fixture_by_id(&pool, &fixture_id)
        .await
        .map_err(|e| engine_error("update fixture status", e))?
        .ok_or_else(|| {
            engine_error(
                "update fixture status",
                EngineError::Precondition(format!("fixture {} not found", fixture_id)),
            )
        })?;
    db::update_fixture_status(&pool, &fixture_id, &update.status)
        .await
        .map_err(|e| engine_error("update fixture status", e))?;
    Ok(Json(ApiResponse::success("Fixture status updated")))
}

// POST /fixtures/{id}/result - set the result and score every prediction
async fn set_result_handler(
    State(pool): State<SqlitePool>,
    Path(fixture_id): Path<String>,
    Json(result): Json<FixtureResult>,
) -> Result<Json<ApiResponse<&'static str>>, ApiError> {
    ReconciliationEngine::new()
        .set_result(&pool, &fixture_id, &result)
        .await
        .map_err(|e| engine_error("set result", e))?;
    Ok(Json(ApiResponse::success("Result set and predictions scored")))
}

// POST /fixtures/{id}/recalculate - rescore against the stored result
async fn recalculate_handler(
    State(pool): State<SqlitePool>,
    Path(fixture_id): Path<String>,
) -> Result<Json<ApiResponse<&'static str>>, ApiError> {
    ReconciliationEngine::new()
        .recalculate(&pool, &fixture_id)
        .await
        .map_err(|e| engine_error("recalculate", e))?;
    Ok(Json(ApiResponse::success("Predictions recalculated")))
}

// DELETE /fixtures/{id} - delete fixture and predictions, reversing points
async fn delete_fixture_handler(
    State(pool): State<SqlitePool>,
    Path(fixture_id): Path<String>,
) -> Result<Json<ApiResponse<&'static str>>, ApiError> {
    rollover::delete_fixture(&pool, &fixture_id)
        .await
        .map_err(|e| engine_error("delete fixture", e))?;
    Ok(Json(ApiResponse::success("Fixture deleted")))
}

// GET /fixtures/{id}/predictions
async fn fixture_predictions_handler(
    State(pool): State<SqlitePool>,
    Path(fixture_id): Path<String>,
) -> Result<Json<ApiResponse<Vec<Prediction>>>, ApiError> {
    let predictions = db::get_fixture_predictions(&pool, &fixture_id)
        .await
        .map_err(|e| engine_error("list fixture predictions", e))?;
    Ok(Json(ApiResponse::success(predictions)))
}

// POST /predictions
async fn place_prediction_handler(
    State(pool): State<SqlitePool>,
    Json(input): Json<PredictionInput>,
) -> Result<Json<ApiResponse<Prediction>>, ApiError> {
    let prediction = predictions::place_prediction(&pool, &input)
        .await
        .map_err(|e| engine_error("place prediction", e))?;
    Ok(Json(ApiResponse::success(prediction)))
}

// PUT /predictions/{id}
async fn update_prediction_handler(
    State(pool): State<SqlitePool>,
    Path(prediction_id): Path<String>,
    Json(input): Json<PredictionInput>,
) -> Result<Json<ApiResponse<&'static str>>, ApiError> {
    predictions::update_prediction(&pool, &prediction_id, &input)
        .await
        .map_err(|e| engine_error("update prediction", e))?;
    Ok(Json(ApiResponse::success("Prediction updated")))
}

// GET /seasons
async fn list_seasons_handler(
    State(pool): State<SqlitePool>,
) -> Result<Json<ApiResponse<Vec<Season>>>, ApiError> {
    let seasons = db::get_all_seasons(&pool)
        .await
        .map_err(|e| engine_error("list seasons", e))?;
    Ok(Json(ApiResponse::success(seasons)))
}

// POST /seasons
async fn create_season_handler(
    State(pool): State<SqlitePool>,
    Json(input): Json<SeasonInput>,
) -> Result<Json<ApiResponse<Season>>, ApiError> {
    let season = rollover::create_season(&pool, &input)
        .await
        .map_err(|e| engine_error("create season", e))?;
    Ok(Json(ApiResponse::success(season)))
}

// POST /seasons/{id}/end - snapshot standings, close season, reset totals
async fn end_season_handler(
    State(pool): State<SqlitePool>,
    Path(season_id): Path<String>,
) -> Result<Json<ApiResponse<Vec<FinalRanking>>>, ApiError> {
    let rankings = rollover::compute_final_rankings(&pool)
        .await
        .map_err(|e| engine_error("compute rankings", e))?;
    rollover::end_season(&pool, &season_id, &rankings)
        .await
        .map_err(|e| engine_error("end season", e))?;
    Ok(Json(ApiResponse::success(rankings)))
}

// DELETE /seasons/{id}
async fn delete_season_handler(
    State(pool): State<SqlitePool>,
    Path(season_id): Path<String>,
) -> Result<Json<ApiResponse<&'static str>>, ApiError> {
    rollover::delete_season(&pool, &season_id)
        .await
        .map_err(|e| engine_error("delete season", e))?;
    Ok(Json(ApiResponse::success("Season deleted")))
}

// GET /rankings - current standings
#[derive(Deserialize)]
struct RankingsQuery {
    limit: Option<usize>,
}

async fn rankings_handler(
    State(pool): State<SqlitePool>,
    Query(params): Query<RankingsQuery>,
) -> Result<Json<ApiResponse<Vec<FinalRanking>>>, ApiError> {
    let mut rankings = rollover::compute_final_rankings(&pool)
        .await
        .map_err(|e| engine_error("compute rankings", e))?;
    if let Some(limit) = params.limit {
        rankings.truncate(limit);
    }
    Ok(Json(ApiResponse::success(rankings)))
}

// Helper: fixtures are always created in the active season.
async fn create_fixture(
    pool: &SqlitePool,
    input: FixtureInput,
) -> Result<Fixture, EngineError> {
    if input.opponent.trim().is_empty() {
        return Err(EngineError::Validation(
            "opponent name must not be empty".to_string(),
        ));
    }

    let season = db::get_active_season(pool).await?.ok_or_else(|| {
        EngineError::Precondition(
            "no active season; create a season before creating a fixture".to_string(),
        )
    })?;

    let now = Utc::now();
    let fixture = Fixture {
        id: Uuid::new_v4().to_string(),
        season_id: season.id,
        opponent: input.opponent.trim().to_string(),
        kickoff: input.kickoff,
        status: "open".to_string(),
        actual_score: None,
        actual_scorers: None,
        actual_assists: None,
        results_set_at: None,
        total_predictions: 0,
        created_at: now,
        updated_at: now,
    };
    db::insert_fixture(pool, &fixture).await?;
    Ok(fixture)
}
