pub mod batch;
pub mod seed;
pub use seed::seed_data;

use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteConnectOptions, Row, SqlitePool};
use std::env;
use std::str::FromStr;

use crate::error::Result;
use crate::models::*;

pub async fn create_pool() -> Result<SqlitePool> {
    let database_url =
        env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:data/goalpool.db".to_string());

    // Strip the "sqlite:" prefix to get the file path, create parent dir if needed
    let file_path = database_url
        .strip_prefix("sqlite:///")
        .or_else(|| database_url.strip_prefix("sqlite://"))
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(&database_url);

    if let Some(parent) = std::path::Path::new(file_path).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.ok();
        }
    }

    let options = SqliteConnectOptions::from_str(&database_url)?.create_if_missing(true);

    let pool = SqlitePool::connect_with(options).await?;
    Ok(pool)
}

/// Called from the CLI where no pool exists yet.
pub async fn init_database() -> Result<()> {
    let pool = create_pool().await?;
    init_database_with_pool(&pool).await
}

/// Called from the server so schema creation shares the main pool.
pub async fn init_database_with_pool(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            display_name TEXT NOT NULL,
            is_admin INTEGER NOT NULL DEFAULT 0,
            total_points INTEGER NOT NULL DEFAULT 0,
            scorer_match_count INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            last_updated TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS seasons (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            start_date TEXT NOT NULL,
            end_date TEXT,
            status TEXT NOT NULL DEFAULT 'active',
            final_rankings TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS fixtures (
            id TEXT PRIMARY KEY,
            season_id TEXT NOT NULL,
            opponent TEXT NOT NULL,
            kickoff TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'open',
            home_goals INTEGER,
            away_goals INTEGER,
            scorers TEXT,
            assists TEXT,
            results_set_at TEXT,
            total_predictions INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY (season_id) REFERENCES seasons (id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS predictions (
            id TEXT PRIMARY KEY,
            fixture_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            predicted_home INTEGER NOT NULL,
            predicted_away INTEGER NOT NULL,
            predicted_player TEXT,
            points_earned INTEGER,
            breakdown TEXT,
            calculated_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT,
            UNIQUE (fixture_id, user_id),
            FOREIGN KEY (fixture_id) REFERENCES fixtures (id),
            FOREIGN KEY (user_id) REFERENCES users (id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_predictions_fixture ON predictions(fixture_id)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_predictions_user ON predictions(user_id)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_fixtures_season ON fixtures(season_id)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_fixtures_kickoff ON fixtures(kickoff)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_seasons_status ON seasons(status)")
        .execute(pool)
        .await?;

    tracing::info!("Database initialized successfully");
    Ok(())
}

fn parse_ts(value: String) -> Result<DateTime<Utc>> {
    Ok(chrono::DateTime::parse_from_rfc3339(&value)?.with_timezone(&Utc))
}

fn parse_ts_opt(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value.map(parse_ts).transpose()
}

fn parse_json_opt<T: serde::de::DeserializeOwned>(value: Option<String>) -> Result<Option<T>> {
    Ok(value.as_deref().map(serde_json::from_str).transpose()?)
}

// User operations

pub async fn insert_user(pool: &SqlitePool, user: &User) -> Result<()> {
    sqlx::query(
        r#"
        INSERT OR REPLACE INTO users
        (id, username, display_name, is_admin, total_points, scorer_match_count, created_at, last_updated)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.id)
    .bind(&user.username)
    .bind(&user.display_name)
    .bind(user.is_admin)
    .bind(user.total_points)
    .bind(user.scorer_match_count)
    .bind(user.created_at.to_rfc3339())
    .bind(user.last_updated.map(|t| t.to_rfc3339()))
    .execute(pool)
    .await?;

    Ok(())
}

fn user_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    Ok(User {
        id: row.get("id"),
        username: row.get("username"),
        display_name: row.get("display_name"),
        is_admin: row.get("is_admin"),
        total_points: row.get("total_points"),
        scorer_match_count: row.get("scorer_match_count"),
        created_at: parse_ts(row.get("created_at"))?,
        last_updated: parse_ts_opt(row.get("last_updated"))?,
    })
}

pub async fn get_user_by_id(pool: &SqlitePool, user_id: &str) -> Result<Option<User>> {
    let row = sqlx::query("SELECT * FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(user_from_row).transpose()
}

pub async fn get_all_users(pool: &SqlitePool) -> Result<Vec<User>> {
    let rows = sqlx::query("SELECT * FROM users ORDER BY created_at ASC")
        .fetch_all(pool)
        .await?;

    rows.iter().map(user_from_row).collect()
}

/// Users ordered for the standings table: points descending, username
/// ascending as the stable tie-break.
pub async fn get_users_ranked(pool: &SqlitePool) -> Result<Vec<User>> {
    let rows = sqlx::query("SELECT * FROM users ORDER BY total_points DESC, username ASC")
        .fetch_all(pool)
        .await?;

    rows.iter().map(user_from_row).collect()
}

// Season operations

pub async fn insert_season(pool: &SqlitePool, season: &Season) -> Result<()> {
    let rankings_json = season
        .final_rankings
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    sqlx::query(
        r#"
        INSERT OR REPLACE INTO seasons
        (id, name, start_date, end_date, status, final_rankings, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&season.id)
    .bind(&season.name)
    .bind(season.start_date.to_rfc3339())
    .bind(season.end_date.map(|t| t.to_rfc3339()))
    .bind(&season.status)
    .bind(rankings_json)
    .bind(season.created_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

fn season_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Season> {
    Ok(Season {
        id: row.get("id"),
        name: row.get("name"),
        start_date: parse_ts(row.get("start_date"))?,
        end_date: parse_ts_opt(row.get("end_date"))?,
        status: row.get("status"),
        final_rankings: parse_json_opt(row.get("final_rankings"))?,
        created_at: parse_ts(row.get("created_at"))?,
    })
}

pub async fn get_season_by_id(pool: &SqlitePool, season_id: &str) -> Result<Option<Season>> {
    let row = sqlx::query("SELECT * FROM seasons WHERE id = ?")
        .bind(season_id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(season_from_row).transpose()
}

pub async fn get_active_season(pool: &SqlitePool) -> Result<Option<Season>> {
    let row = sqlx::query(
        "SELECT * FROM seasons WHERE status = 'active' ORDER BY start_date DESC LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(season_from_row).transpose()
}

pub async fn get_all_seasons(pool: &SqlitePool) -> Result<Vec<Season>> {
    let rows = sqlx::query("SELECT * FROM seasons ORDER BY start_date DESC")
        .fetch_all(pool)
        .await?;

    rows.iter().map(season_from_row).collect()
}

/// Close a season: status, end date and the immutable standings snapshot in
/// one write.
pub async fn mark_season_ended(
    pool: &SqlitePool,
    season_id: &str,
    final_rankings: &[FinalRanking],
) -> Result<()> {
    let rankings_json = serde_json::to_string(final_rankings)?;

    sqlx::query(
        "UPDATE seasons SET status = 'ended', end_date = ?, final_rankings = ? WHERE id = ?",
    )
    .bind(Utc::now().to_rfc3339())
    .bind(rankings_json)
    .bind(season_id)
    .execute(pool)
    .await?;

    Ok(())
}

// Fixture operations

pub async fn insert_fixture(pool: &SqlitePool, fixture: &Fixture) -> Result<()> {
    let scorers_json = fixture
        .actual_scorers
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    let assists_json = fixture
        .actual_assists
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    sqlx::query(
        r#"
        INSERT OR REPLACE INTO fixtures
        (id, season_id, opponent, kickoff, status, home_goals, away_goals,
         scorers, assists, results_set_at, total_predictions, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&fixture.id)
    .bind(&fixture.season_id)
    .bind(&fixture.opponent)
    .bind(fixture.kickoff.to_rfc3339())
    .bind(&fixture.status)
    .bind(fixture.actual_score.map(|s| s.home))
    .bind(fixture.actual_score.map(|s| s.away))
    .bind(scorers_json)
    .bind(assists_json)
    .bind(fixture.results_set_at.map(|t| t.to_rfc3339()))
    .bind(fixture.total_predictions)
    .bind(fixture.created_at.to_rfc3339())
    .bind(fixture.updated_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

fn fixture_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Fixture> {
    let home_goals: Option<i64> = row.get("home_goals");
    let away_goals: Option<i64> = row.get("away_goals");
    let actual_score = match (home_goals, away_goals) {
        (Some(home), Some(away)) => Some(Score { home, away }),
        _ => None,
    };

    Ok(Fixture {
        id: row.get("id"),
        season_id: row.get("season_id"),
        opponent: row.get("opponent"),
        kickoff: parse_ts(row.get("kickoff"))?,
        status: row.get("status"),
        actual_score,
        actual_scorers: parse_json_opt(row.get("scorers"))?,
        actual_assists: parse_json_opt(row.get("assists"))?,
        results_set_at: parse_ts_opt(row.get("results_set_at"))?,
        total_predictions: row.get("total_predictions"),
        created_at: parse_ts(row.get("created_at"))?,
        updated_at: parse_ts(row.get("updated_at"))?,
    })
}

pub async fn get_fixture_by_id(pool: &SqlitePool, fixture_id: &str) -> Result<Option<Fixture>> {
    let row = sqlx::query("SELECT * FROM fixtures WHERE id = ?")
        .bind(fixture_id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(fixture_from_row).transpose()
}

pub async fn get_all_fixtures(pool: &SqlitePool) -> Result<Vec<Fixture>> {
    let rows = sqlx::query("SELECT * FROM fixtures ORDER BY kickoff DESC")
        .fetch_all(pool)
        .await?;

    rows.iter().map(fixture_from_row).collect()
}

pub async fn get_upcoming_fixtures(pool: &SqlitePool) -> Result<Vec<Fixture>> {
    let rows = sqlx::query("SELECT * FROM fixtures WHERE kickoff > ? ORDER BY kickoff ASC")
        .bind(Utc::now().to_rfc3339())
        .fetch_all(pool)
        .await?;

    rows.iter().map(fixture_from_row).collect()
}

pub async fn get_fixtures_by_season(pool: &SqlitePool, season_id: &str) -> Result<Vec<Fixture>> {
    let rows = sqlx::query("SELECT * FROM fixtures WHERE season_id = ? ORDER BY kickoff DESC")
        .bind(season_id)
        .fetch_all(pool)
        .await?;

    rows.iter().map(fixture_from_row).collect()
}

pub async fn update_fixture_status(
    pool: &SqlitePool,
    fixture_id: &str,
    status: &str,
) -> Result<()> {
    sqlx::query("UPDATE fixtures SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status)
        .bind(Utc::now().to_rfc3339())
        .bind(fixture_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Record the final outcome on the fixture and mark it finished.
pub async fn set_fixture_result(
    pool: &SqlitePool,
    fixture_id: &str,
    result: &FixtureResult,
) -> Result<()> {
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        UPDATE fixtures
        SET home_goals = ?, away_goals = ?, scorers = ?, assists = ?,
            status = 'finished', results_set_at = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(result.actual_score.home)
    .bind(result.actual_score.away)
    .bind(serde_json::to_string(&result.actual_scorers)?)
    .bind(serde_json::to_string(&result.actual_assists)?)
    .bind(&now)
    .bind(&now)
    .bind(fixture_id)
    .execute(pool)
    .await?;

    Ok(())
}

// Prediction operations

pub async fn insert_prediction(pool: &SqlitePool, prediction: &Prediction) -> Result<()> {
    let breakdown_json = prediction
        .breakdown
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    sqlx::query(
        r#"
        INSERT OR REPLACE INTO predictions
        (id, fixture_id, user_id, predicted_home, predicted_away, predicted_player,
         points_earned, breakdown, calculated_at, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&prediction.id)
    .bind(&prediction.fixture_id)
    .bind(&prediction.user_id)
    .bind(prediction.predicted_score.home)
    .bind(prediction.predicted_score.away)
    .bind(&prediction.predicted_player)
    .bind(prediction.points_earned)
    .bind(breakdown_json)
    .bind(prediction.calculated_at.map(|t| t.to_rfc3339()))
    .bind(prediction.created_at.to_rfc3339())
    .bind(prediction.updated_at.map(|t| t.to_rfc3339()))
    .execute(pool)
    .await?;

    Ok(())
}

fn prediction_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Prediction> {
    Ok(Prediction {
        id: row.get("id"),
        fixture_id: row.get("fixture_id"),
        user_id: row.get("user_id"),
        predicted_score: Score {
            home: row.get("predicted_home"),
            away: row.get("predicted_away"),
        },
        predicted_player: row.get("predicted_player"),
        points_earned: row.get("points_earned"),
        breakdown: parse_json_opt(row.get("breakdown"))?,
        calculated_at: parse_ts_opt(row.get("calculated_at"))?,
        created_at: parse_ts(row.get("created_at"))?,
        updated_at: parse_ts_opt(row.get("updated_at"))?,
    })
}

pub async fn get_prediction_by_id(
    pool: &SqlitePool,
    prediction_id: &str,
) -> Result<Option<Prediction>> {
    let row = sqlx::query("SELECT * FROM predictions WHERE id = ?")
        .bind(prediction_id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(prediction_from_row).transpose()
}

pub async fn get_user_prediction_for_fixture(
    pool: &SqlitePool,
    user_id: &str,
    fixture_id: &str,
) -> Result<Option<Prediction>> {
    let row = sqlx::query("SELECT * FROM predictions WHERE user_id = ? AND fixture_id = ?")
        .bind(user_id)
        .bind(fixture_id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(prediction_from_row).transpose()
}

/// The full prediction set for one fixture. The reconciliation engine feeds
/// this snapshot through the frequency aggregator before scoring anything.
pub async fn get_fixture_predictions(
    pool: &SqlitePool,
    fixture_id: &str,
) -> Result<Vec<Prediction>> {
    let rows = sqlx::query("SELECT * FROM predictions WHERE fixture_id = ? ORDER BY created_at ASC")
        .bind(fixture_id)
        .fetch_all(pool)
        .await?;

    rows.iter().map(prediction_from_row).collect()
}

pub async fn update_prediction_pick(
    pool: &SqlitePool,
    prediction_id: &str,
    predicted_score: &Score,
    predicted_player: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE predictions
        SET predicted_home = ?, predicted_away = ?, predicted_player = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(predicted_score.home)
    .bind(predicted_score.away)
    .bind(predicted_player)
    .bind(Utc::now().to_rfc3339())
    .bind(prediction_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Denormalized participation counter on the fixture card.
pub async fn increment_fixture_prediction_count(
    pool: &SqlitePool,
    fixture_id: &str,
) -> Result<()> {
    sqlx::query(
        "UPDATE fixtures SET total_predictions = total_predictions + 1, updated_at = ? WHERE id = ?",
    )
    .bind(Utc::now().to_rfc3339())
    .bind(fixture_id)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn delete_season_record(pool: &SqlitePool, season_id: &str) -> Result<()> {
    sqlx::query("DELETE FROM seasons WHERE id = ?")
        .bind(season_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// In-memory database for tests. A single connection, otherwise every
/// checkout of the pool would see its own empty `:memory:` database.
#[cfg(test)]
pub async fn create_test_pool() -> Result<SqlitePool> {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    init_database_with_pool(&pool).await?;
    Ok(pool)
}
