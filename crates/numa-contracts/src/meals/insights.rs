use serde::Serialize;

use super::MealAnalysis;
use crate::profile::Goal;

const NO_GOAL_SCORE: i64 = 75;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreBand {
    Good,
    Fair,
    Poor,
}

/// Rates a meal 30..=100 against the user's goal.
pub fn nutrition_score(meal: &MealAnalysis, goal: Option<Goal>) -> i64 {
    let Some(goal) = goal else {
        return NO_GOAL_SCORE;
    };

    let mut score = 50;
    let calories = meal.estimated_calories;
    if (300..=600).contains(&calories) {
        score += 20;
    } else if (200..=800).contains(&calories) {
        score += 10;
    }

    let protein = meal.macros.protein;
    if (15.0..=30.0).contains(&protein) {
        score += 15;
    } else if protein >= 10.0 {
        score += 8;
    }

    let carbs = meal.macros.carbs;
    let carbs_fit = match goal {
        Goal::LoseWeight => carbs <= 40.0,
        Goal::GainWeight => carbs >= 30.0,
        Goal::MaintainWeight => (20.0..=50.0).contains(&carbs),
    };
    if carbs_fit {
        score += 10;
    }

    let fat = meal.macros.fat;
    if (8.0..=20.0).contains(&fat) {
        score += 15;
    } else if fat >= 5.0 {
        score += 8;
    }

    score.clamp(30, 100)
}

pub fn score_band(score: i64) -> ScoreBand {
    if score >= 80 {
        ScoreBand::Good
    } else if score >= 60 {
        ScoreBand::Fair
    } else {
        ScoreBand::Poor
    }
}

pub fn personalized_tip(meal: &MealAnalysis, goal: Option<Goal>) -> &'static str {
    let protein = meal.macros.protein;
    let calories = meal.estimated_calories;
    match goal {
        None => "Keep tracking your meals for better insights!",
        Some(Goal::LoseWeight) => {
            if protein < 15.0 {
                "Add more protein to help maintain muscle while losing weight."
            } else if calories > 600 {
                "Consider smaller portions or lower-calorie options for weight loss."
            } else {
                "Great balance for weight loss! Keep up the good work."
            }
        }
        Some(Goal::GainWeight) => {
            if calories < 400 {
                "Try adding healthy fats or complex carbs to increase calories."
            } else if protein < 20.0 {
                "Add more protein sources to support muscle growth."
            } else {
                "Good calorie density! Perfect for healthy weight gain."
            }
        }
        Some(Goal::MaintainWeight) => {
            if protein < 15.0 {
                "Aim for more protein to maintain muscle mass."
            } else {
                "Well-balanced meal! Great for maintaining your current weight."
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meals::{Macros, MealEstimate};

    fn meal(calories: i64, protein: f64, carbs: f64, fat: f64) -> MealAnalysis {
        MealAnalysis::from_estimate(MealEstimate {
            ingredients: vec!["chicken".to_string(), "rice".to_string()],
            estimated_calories: calories,
            macros: Macros {
                protein,
                carbs,
                fat,
            },
            confidence: 0.8,
            analysis_text: None,
        })
    }

    #[test]
    fn balanced_meal_hits_the_cap() {
        let score = nutrition_score(&meal(450, 25.0, 35.0, 12.0), Some(Goal::LoseWeight));
        assert_eq!(score, 100);
        assert_eq!(score_band(score), ScoreBand::Good);
    }

    #[test]
    fn poor_meal_is_floored() {
        let score = nutrition_score(&meal(1500, 2.0, 10.0, 1.0), Some(Goal::GainWeight));
        assert_eq!(score, 50);
        assert_eq!(score_band(score), ScoreBand::Poor);
    }

    #[test]
    fn carbs_rule_follows_goal() {
        let heavy_carbs = meal(700, 12.0, 60.0, 6.0);
        // 50 + 10 (calories) + 8 (protein) + 8 (fat)
        assert_eq!(nutrition_score(&heavy_carbs, Some(Goal::LoseWeight)), 76);
        assert_eq!(nutrition_score(&heavy_carbs, Some(Goal::GainWeight)), 86);
        assert_eq!(nutrition_score(&heavy_carbs, Some(Goal::MaintainWeight)), 76);
    }

    #[test]
    fn missing_goal_uses_neutral_score_and_tip() {
        let sample = meal(450, 25.0, 35.0, 12.0);
        assert_eq!(nutrition_score(&sample, None), 75);
        assert_eq!(
            personalized_tip(&sample, None),
            "Keep tracking your meals for better insights!"
        );
    }

    #[test]
    fn tips_follow_goal_branches() {
        assert!(personalized_tip(&meal(450, 10.0, 30.0, 10.0), Some(Goal::LoseWeight))
            .starts_with("Add more protein"));
        assert!(personalized_tip(&meal(800, 20.0, 30.0, 10.0), Some(Goal::LoseWeight))
            .starts_with("Consider smaller portions"));
        assert!(personalized_tip(&meal(300, 30.0, 30.0, 10.0), Some(Goal::GainWeight))
            .starts_with("Try adding healthy fats"));
        assert!(
            personalized_tip(&meal(500, 20.0, 30.0, 10.0), Some(Goal::MaintainWeight))
                .starts_with("Well-balanced meal")
        );
    }
}
