use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A scoreline, always oriented home side first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub home: i64,
    pub away: i64,
}

/// Itemized bonus points for one scored prediction. Only tags that fired are
/// present; the wire names match the JSON the web client stores.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsBreakdown {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exact_score: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exact_score_alone: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub win_or_draw: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_scorer: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_scorer_alone: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_assist: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_assist_alone: Option<i64>,
}

impl PointsBreakdown {
    pub fn total(&self) -> i64 {
        [
            self.exact_score,
            self.exact_score_alone,
            self.win_or_draw,
            self.matched_scorer,
            self.matched_scorer_alone,
            self.matched_assist,
            self.matched_assist_alone,
        ]
        .iter()
        .flatten()
        .sum()
    }

    /// Whether this prediction earned a scorer bonus in either tier. Drives
    /// the lifetime scorer-match achievement counter.
    pub fn has_scorer_match(&self) -> bool {
        self.matched_scorer.is_some() || self.matched_scorer_alone.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub id: String,
    pub fixture_id: String,
    pub user_id: String,
    pub predicted_score: Score,
    pub predicted_player: Option<String>,
    // Set by the reconciliation engine once the fixture has a result
    pub points_earned: Option<i64>,
    pub breakdown: Option<PointsBreakdown>,
    pub calculated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionInput {
    pub fixture_id: String,
    pub user_id: String,
    pub predicted_score: Score,
    pub predicted_player: Option<String>,
}

/// Final outcome of a fixture as recorded by an administrator. Scorer and
/// assist lists are ordered and may repeat a name, one entry per goal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureResult {
    pub actual_score: Score,
    #[serde(default)]
    pub actual_scorers: Vec<String>,
    #[serde(default)]
    pub actual_assists: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fixture {
    pub id: String,
    pub season_id: String,
    pub opponent: String,
    pub kickoff: DateTime<Utc>,
    pub status: String, // "open", "locked", "finished"
    pub actual_score: Option<Score>,
    pub actual_scorers: Option<Vec<String>>,
    pub actual_assists: Option<Vec<String>>,
    pub results_set_at: Option<DateTime<Utc>>,
    pub total_predictions: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Fixture {
    /// The stored result, if one has been set.
    pub fn result(&self) -> Option<FixtureResult> {
        self.actual_score.map(|actual_score| FixtureResult {
            actual_score,
            actual_scorers: self.actual_scorers.clone().unwrap_or_default(),
            actual_assists: self.actual_assists.clone().unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureInput {
    pub opponent: String,
    pub kickoff: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub is_admin: bool,
    /// Running sum of points over the active season's scored predictions.
    /// A cache maintained by relative increments; predictions are the
    /// source of truth.
    pub total_points: i64,
    /// Lifetime count of predictions holding a scorer bonus. Survives
    /// season rollover.
    pub scorer_match_count: i64,
    pub created_at: DateTime<Utc>,
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalRanking {
    pub user_id: String,
    pub username: String,
    pub total_points: i64,
    pub rank: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Season {
    pub id: String,
    pub name: String,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub status: String, // "active", "ended"
    pub final_rankings: Option<Vec<FinalRanking>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeasonInput {
    pub name: String,
    pub start_date: DateTime<Utc>,
}

// API Response types
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breakdown_total_sums_only_fired_tags() {
        let breakdown = PointsBreakdown {
            exact_score_alone: Some(4),
            matched_assist: Some(1),
            ..Default::default()
        };
        assert_eq!(breakdown.total(), 5);
        assert!(!breakdown.has_scorer_match());
    }

    #[test]
    fn breakdown_serializes_camel_case_without_empty_tags() {
        let breakdown = PointsBreakdown {
            matched_scorer: Some(2),
            win_or_draw: Some(1),
            ..Default::default()
        };
        let json = serde_json::to_value(&breakdown).unwrap();
        assert_eq!(json["matchedScorer"], 2);
        assert_eq!(json["winOrDraw"], 1);
        assert!(json.get("exactScore").is_none());
    }
}
