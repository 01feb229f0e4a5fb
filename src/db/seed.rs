use anyhow::Result;
use chrono::{Duration, Utc};
use rand::RngExt;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db;
use crate::models::{Fixture, FixtureResult, Prediction, Score, Season, User};
use crate::services::ReconciliationEngine;

pub async fn seed_data(pool: &SqlitePool) -> Result<()> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;

    if count > 0 {
        tracing::info!("Database already seeded ({} users found), skipping.", count);
        return Ok(());
    }

    tracing::info!("Seeding database with a demo season...");

    let now = Utc::now();

    let season = Season {
        id: "season_2026".to_string(),
        name: "Temporada 2026".to_string(),
        start_date: now - Duration::days(30),
        end_date: None,
        status: "active".to_string(),
        final_rankings: None,
        created_at: now,
    };
    db::insert_season(pool, &season).await?;

    // (id, username, display name, admin)
    let users: Vec<(&str, &str, &str, bool)> = vec![
        ("user_1", "ana", "Ana Beatriz", true),
        ("user_2", "bruno", "Bruno Castro", false),
        ("user_3", "carla", "Carla Dias", false),
        ("user_4", "diego", "Diego Enes", false),
        ("user_5", "elisa", "Elisa Franco", false),
        ("user_6", "fabio", "Fábio Gomes", false),
    ];

    for (id, username, display_name, is_admin) in &users {
        let user = User {
            id: id.to_string(),
            username: username.to_string(),
            display_name: display_name.to_string(),
            is_admin: *is_admin,
            total_points: 0,
            scorer_match_count: 0,
            created_at: now,
            last_updated: None,
        };
        db::insert_user(pool, &user).await?;
    }

    // (id, opponent, kickoff offset in days, status)
    let fixtures: Vec<(&str, &str, i64, &str)> = vec![
        ("fixture_1", "Fortaleza", -14, "locked"),
        ("fixture_2", "Sport", -7, "locked"),
        ("fixture_3", "Bahia", 7, "open"),
    ];

    for (id, opponent, offset, status) in &fixtures {
        let fixture = Fixture {
            id: id.to_string(),
            season_id: season.id.clone(),
            opponent: opponent.to_string(),
            kickoff: now + Duration::days(*offset),
            status: status.to_string(),
            actual_score: None,
            actual_scorers: None,
            actual_assists: None,
            results_set_at: None,
            total_predictions: 0,
            created_at: now,
            updated_at: now,
        };
        db::insert_fixture(pool, &fixture).await?;
    }

    let player_pool = ["Vina", "Erick Pulga", "Pedro Henrique", "Zanocello"];
    let mut rng = rand::rng();

    for (fixture_id, _, offset, _) in &fixtures {
        if *offset > 0 {
            continue; // no demo predictions on upcoming fixtures
        }
        for (user_id, _, _, _) in &users {
            let home = rng.random_range(0..4);
            let away = rng.random_range(0..=home);
            let predicted_player = if rng.random_range(0..3) > 0 {
                Some(player_pool[rng.random_range(0..player_pool.len())].to_string())
            } else {
                None
            };

            let prediction = Prediction {
                id: Uuid::new_v4().to_string(),
                fixture_id: fixture_id.to_string(),
                user_id: user_id.to_string(),
                predicted_score: Score { home, away },
                predicted_player,
                points_earned: None,
                breakdown: None,
                calculated_at: None,
                created_at: now,
                updated_at: None,
            };
            db::insert_prediction(pool, &prediction).await?;
            db::increment_fixture_prediction_count(pool, fixture_id).await?;
        }
    }

    // Score the oldest fixture so the demo standings are non-trivial.
    let result = FixtureResult {
        actual_score: Score { home: 2, away: 1 },
        actual_scorers: vec!["Vina".to_string(), "Erick Pulga".to_string()],
        actual_assists: vec!["Pedro Henrique".to_string()],
    };
    ReconciliationEngine::new()
        .set_result(pool, "fixture_1", &result)
        .await?;

    tracing::info!("Database seeded successfully.");
    Ok(())
}
