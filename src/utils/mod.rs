use crate::error::{EngineError, Result};
use crate::models::Score;

/// A predicted scoreline must be non-negative integers with the home side
/// winning or drawing.
pub fn validate_predicted_score(score: &Score) -> Result<()> {
    if score.home < 0 || score.away < 0 {
        return Err(EngineError::Validation(
            "predicted score must be non-negative".to_string(),
        ));
    }
    if score.home < score.away {
        return Err(EngineError::Validation(
            "the home side may only be predicted to win or draw".to_string(),
        ));
    }
    Ok(())
}

/// Display form of a scoreline, e.g. "2-1".
pub fn format_score(score: &Score) -> String {
    format!("{}-{}", score.home, score.away)
}
