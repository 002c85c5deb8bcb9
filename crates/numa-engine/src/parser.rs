use numa_contracts::meals::{MealAnalysis, MealEstimate, MIN_CONFIDENCE};
use numa_contracts::AnalysisError;

use crate::vision::ChatCompletion;

/// Returns the span from the first `{` to the last `}`, or the trimmed input
/// when no such span exists. Tolerates commentary and code fences around the
/// JSON object.
pub fn extract_json_object(content: &str) -> &str {
    match (content.find('{'), content.rfind('}')) {
        (Some(start), Some(end)) if start < end => &content[start..=end],
        _ => content.trim(),
    }
}

pub fn parse_estimate(content: &str) -> Result<MealEstimate, AnalysisError> {
    let json = extract_json_object(content);
    let estimate: MealEstimate = serde_json::from_str(json).map_err(|err| {
        log::error!("failed to parse analysis response: {err}; JSON content: {json}");
        AnalysisError::InvalidResponse
    })?;
    if estimate.confidence < MIN_CONFIDENCE {
        log::info!(
            "rejecting estimate with confidence {:.2} (< {MIN_CONFIDENCE})",
            estimate.confidence
        );
        return Err(AnalysisError::NoFoodDetected);
    }
    Ok(estimate)
}

/// Turns the model's first reply into a meal record.
pub fn parse_completion(completion: &ChatCompletion) -> Result<MealAnalysis, AnalysisError> {
    let content = completion
        .choices
        .first()
        .map(|choice| choice.message.content.as_str())
        .ok_or(AnalysisError::InvalidResponse)?;
    parse_estimate(content).map(MealAnalysis::from_estimate)
}
