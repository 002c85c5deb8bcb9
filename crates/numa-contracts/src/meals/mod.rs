use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod insights;

pub use insights::{nutrition_score, personalized_tip, score_band, ScoreBand};

/// Estimates below this confidence are rejected instead of recorded.
pub const MIN_CONFIDENCE: f64 = 0.3;

/// Macro breakdown in grams.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Macros {
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
}

/// The nutrition estimate the vision model is asked to return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealEstimate {
    pub ingredients: Vec<String>,
    pub estimated_calories: i64,
    pub macros: Macros,
    pub confidence: f64,
    #[serde(default)]
    pub analysis_text: Option<String>,
}

/// One recorded vision-derived estimate, immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealAnalysis {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub ingredients: Vec<String>,
    pub estimated_calories: i64,
    pub macros: Macros,
    pub confidence: f64,
    #[serde(default)]
    pub analysis_text: Option<String>,
}

impl MealAnalysis {
    pub fn from_estimate(estimate: MealEstimate) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            ingredients: estimate.ingredients,
            estimated_calories: estimate.estimated_calories,
            macros: estimate.macros,
            confidence: estimate.confidence,
            analysis_text: estimate.analysis_text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MealHistorySummary {
    pub meal_count: usize,
    pub total_calories: i64,
    pub average_calories: i64,
}

impl MealHistorySummary {
    pub fn from_meals(meals: &[MealAnalysis]) -> Self {
        let total_calories = meals.iter().map(|meal| meal.estimated_calories).sum::<i64>();
        let average_calories = if meals.is_empty() {
            0
        } else {
            total_calories / meals.len() as i64
        };
        Self {
            meal_count: meals.len(),
            total_calories,
            average_calories,
        }
    }
}
