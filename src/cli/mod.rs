use anyhow::Result;

use crate::db;
use crate::services::{rollover, ReconciliationEngine};
use crate::utils::format_score;

pub async fn show_standings() -> Result<()> {
    let pool = db::create_pool().await?;

    match db::get_active_season(&pool).await? {
        Some(season) => println!("🏆 Standings — {}\n", season.name),
        None => println!("🏆 Standings (no active season)\n"),
    }

    let rankings = rollover::compute_final_rankings(&pool).await?;

    if rankings.is_empty() {
        println!("📭 No users found. Try seeding first with: goalpool seed");
        return Ok(());
    }

    for entry in &rankings {
        println!(
            "{:>3}. {:<20} {:>4} pts",
            entry.rank, entry.username, entry.total_points
        );
    }

    Ok(())
}

pub async fn show_fixtures() -> Result<()> {
    let pool = db::create_pool().await?;

    let fixtures = db::get_all_fixtures(&pool).await?;

    if fixtures.is_empty() {
        println!("📭 No fixtures found. Try seeding first with: goalpool seed");
        return Ok(());
    }

    println!("📅 Fixtures:\n");
    for fixture in &fixtures {
        let result = match &fixture.actual_score {
            Some(score) => format!("({})", format_score(score)),
            None => "(TBD)".to_string(),
        };

        println!(
            "   {} vs {} {} — {} [{} predictions]",
            fixture.kickoff.format("%Y-%m-%d %H:%M"),
            fixture.opponent,
            result,
            fixture.status,
            fixture.total_predictions
        );

        if let Some(scorers) = &fixture.actual_scorers {
            if !scorers.is_empty() {
                println!("      ⚽ {}", scorers.join(", "));
            }
        }
    }

    Ok(())
}

pub async fn recalculate_fixture(fixture_id: &str) -> Result<()> {
    let pool = db::create_pool().await?;

    println!("🔄 Recalculating points for fixture {}...", fixture_id);
    ReconciliationEngine::new()
        .recalculate(&pool, fixture_id)
        .await?;
    println!("✅ Points recalculated!");

    Ok(())
}
