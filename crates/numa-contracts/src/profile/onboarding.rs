use serde::{Deserialize, Serialize};

use super::{ActivityLevel, Gender, Goal, Profile};

/// Partial set of onboarding answers; `None` means "leave as is".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OnboardingUpdate {
    pub goal: Option<Goal>,
    pub current_weight: Option<f64>,
    pub target_weight: Option<f64>,
    pub height: Option<i64>,
    pub age: Option<i64>,
    pub gender: Option<Gender>,
    pub activity_level: Option<ActivityLevel>,
}

impl OnboardingUpdate {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnboardingField {
    Goal,
    CurrentWeight,
    TargetWeight,
    Height,
    Age,
    Gender,
    ActivityLevel,
}

impl OnboardingField {
    /// Required fields, in the order they are reported.
    pub const REQUIRED: [OnboardingField; 7] = [
        OnboardingField::Goal,
        OnboardingField::CurrentWeight,
        OnboardingField::TargetWeight,
        OnboardingField::Height,
        OnboardingField::Age,
        OnboardingField::Gender,
        OnboardingField::ActivityLevel,
    ];

    pub fn label(self) -> &'static str {
        match self {
            OnboardingField::Goal => "Goal",
            OnboardingField::CurrentWeight => "Current Weight",
            OnboardingField::TargetWeight => "Target Weight",
            OnboardingField::Height => "Height",
            OnboardingField::Age => "Age",
            OnboardingField::Gender => "Gender",
            OnboardingField::ActivityLevel => "Activity Level",
        }
    }

    pub fn is_set(self, profile: &Profile) -> bool {
        match self {
            OnboardingField::Goal => profile.goal.is_some(),
            OnboardingField::CurrentWeight => profile.current_weight.is_some(),
            OnboardingField::TargetWeight => profile.target_weight.is_some(),
            OnboardingField::Height => profile.height.is_some(),
            OnboardingField::Age => profile.age.is_some(),
            OnboardingField::Gender => profile.gender.is_some(),
            OnboardingField::ActivityLevel => profile.activity_level.is_some(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OnboardingStatus {
    pub is_complete: bool,
    pub missing_fields: Vec<String>,
}

impl OnboardingStatus {
    pub const NOT_INITIALIZED: &'static str = "User not initialized";

    pub fn not_initialized() -> Self {
        Self {
            is_complete: false,
            missing_fields: vec![Self::NOT_INITIALIZED.to_string()],
        }
    }
}
