//! Pure point calculation for one fixture's prediction pool.
//!
//! Nothing in here touches the database. The reconciliation engine feeds a
//! closed snapshot of a fixture's predictions through `PredictionCounts`
//! and then scores each prediction against the same snapshot, so uniqueness
//! tiers are stable no matter the iteration order.

use std::collections::HashMap;

use crate::models::{FixtureResult, PointsBreakdown, Score};

/// Outcome of a scoreline relative to the home side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Win,
    Draw,
    Loss,
}

pub fn outcome(score: &Score) -> Outcome {
    if score.home > score.away {
        Outcome::Win
    } else if score.home == score.away {
        Outcome::Draw
    } else {
        Outcome::Loss
    }
}

/// Map known alternate spellings of a player's name to the reference
/// spelling. Unknown names pass through unchanged, original casing intact.
pub fn canonicalize(name: &str) -> String {
    match name.trim().to_lowercase().as_str() {
        "vinicius goes" | "vinícius góes" | "vinicius góes" | "vinicius" | "vinícius" => {
            "Vina".to_string()
        }
        "ph" => "Pedro Henrique".to_string(),
        "vinicius zanocelo" | "vinicius zanocello" | "vinícius zanocelo"
        | "vinícius zanocello" | "zanocelo" => "Zanocello".to_string(),
        _ => name.to_string(),
    }
}

/// Normalized key a player name is counted and compared under: canonical
/// spelling, case-folded. `None` for empty or whitespace-only names.
///
/// Both predicted names and actual-result names go through this, so a user
/// who typed an alias shares one frequency bucket with users who typed the
/// reference spelling and matches the same goals.
pub fn player_key(name: &str) -> Option<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(canonicalize(trimmed).to_lowercase())
}

/// Key a predicted scoreline is counted under.
pub fn score_key(score: &Score) -> String {
    format!("{}-{}", score.home, score.away)
}

/// Population frequencies over one fixture's full prediction set. Bonus
/// tiers depend on this global snapshot, never on cumulative state.
#[derive(Debug, Default)]
pub struct PredictionCounts {
    scores: HashMap<String, u32>,
    players: HashMap<String, u32>,
}

impl PredictionCounts {
    pub fn build<'a, I>(predictions: I) -> Self
    where
        I: IntoIterator<Item = (&'a Score, Option<&'a str>)>,
    {
        let mut counts = Self::default();
        for (score, player) in predictions {
            *counts.scores.entry(score_key(score)).or_insert(0) += 1;
            if let Some(key) = player.and_then(player_key) {
                *counts.players.entry(key).or_insert(0) += 1;
            }
        }
        counts
    }

    fn score_is_unique(&self, score: &Score) -> bool {
        self.scores.get(&score_key(score)).copied() == Some(1)
    }

    fn player_is_unique(&self, key: &str) -> bool {
        self.players.get(key).copied() == Some(1)
    }
}

/// Points for one prediction against the recorded result and the population
/// frequencies. Deterministic and side-effect free.
pub fn calculate_points(
    predicted_score: &Score,
    predicted_player: Option<&str>,
    result: &FixtureResult,
    counts: &PredictionCounts,
) -> (i64, PointsBreakdown) {
    let mut breakdown = PointsBreakdown::default();

    // 1. Score accuracy: exact scoreline, else matching outcome category.
    if *predicted_score == result.actual_score {
        if counts.score_is_unique(predicted_score) {
            breakdown.exact_score_alone = Some(4);
        } else {
            breakdown.exact_score = Some(2);
        }
    } else if outcome(predicted_score) == outcome(&result.actual_score) {
        breakdown.win_or_draw = Some(1);
    }

    // 2/3. Scorer and assist bonuses, one entry per goal in the result
    // lists. Uniqueness is decided once from the population snapshot and
    // shared by both checks.
    if let Some(key) = predicted_player.and_then(player_key) {
        if !result.actual_scorers.is_empty() || !result.actual_assists.is_empty() {
            let is_only_one = counts.player_is_unique(&key);

            let goals = count_occurrences(&result.actual_scorers, &key);
            if goals > 0 {
                let rate = if is_only_one { 4 } else { 2 };
                if is_only_one {
                    breakdown.matched_scorer_alone = Some(rate * goals);
                } else {
                    breakdown.matched_scorer = Some(rate * goals);
                }
            }

            let assists = count_occurrences(&result.actual_assists, &key);
            if assists > 0 {
                let rate = if is_only_one { 2 } else { 1 };
                if is_only_one {
                    breakdown.matched_assist_alone = Some(rate * assists);
                } else {
                    breakdown.matched_assist = Some(rate * assists);
                }
            }
        }
    }

    (breakdown.total(), breakdown)
}

fn count_occurrences(names: &[String], key: &str) -> i64 {
    names
        .iter()
        .filter(|name| player_key(name).as_deref() == Some(key))
        .count() as i64
}
