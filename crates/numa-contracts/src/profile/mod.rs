use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

mod onboarding;

pub use onboarding::{OnboardingField, OnboardingStatus, OnboardingUpdate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Goal {
    LoseWeight,
    GainWeight,
    MaintainWeight,
}

impl Goal {
    pub const ALL: [Goal; 3] = [Goal::LoseWeight, Goal::GainWeight, Goal::MaintainWeight];

    pub fn as_str(self) -> &'static str {
        match self {
            Goal::LoseWeight => "lose_weight",
            Goal::GainWeight => "gain_weight",
            Goal::MaintainWeight => "maintain_weight",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub const ALL: [Gender; 2] = [Gender::Male, Gender::Female];

    pub fn as_str(self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
    Sedentary,
    Light,
    Moderate,
    Active,
    VeryActive,
}

impl ActivityLevel {
    pub const ALL: [ActivityLevel; 5] = [
        ActivityLevel::Sedentary,
        ActivityLevel::Light,
        ActivityLevel::Moderate,
        ActivityLevel::Active,
        ActivityLevel::VeryActive,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActivityLevel::Sedentary => "sedentary",
            ActivityLevel::Light => "light",
            ActivityLevel::Moderate => "moderate",
            ActivityLevel::Active => "active",
            ActivityLevel::VeryActive => "very_active",
        }
    }
}

/// Error for a categorical value outside its closed set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {field} '{value}' (expected one of: {expected})")]
pub struct UnknownVariant {
    pub field: &'static str,
    pub value: String,
    pub expected: String,
}

macro_rules! categorical {
    ($ty:ty, $field:literal) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = UnknownVariant;

            fn from_str(raw: &str) -> Result<Self, Self::Err> {
                let normalized = raw.trim().to_ascii_lowercase().replace('-', "_");
                <$ty>::ALL
                    .into_iter()
                    .find(|variant| variant.as_str() == normalized)
                    .ok_or_else(|| UnknownVariant {
                        field: $field,
                        value: raw.to_string(),
                        expected: <$ty>::ALL
                            .iter()
                            .map(|variant| variant.as_str())
                            .collect::<Vec<_>>()
                            .join(", "),
                    })
            }
        }
    };
}

categorical!(Goal, "goal");
categorical!(Gender, "gender");
categorical!(ActivityLevel, "activity level");

/// One end user's onboarding answers and account identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    #[serde(default)]
    pub goal: Option<Goal>,
    #[serde(default)]
    pub current_weight: Option<f64>,
    #[serde(default)]
    pub target_weight: Option<f64>,
    #[serde(default)]
    pub height: Option<i64>,
    #[serde(default)]
    pub age: Option<i64>,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub activity_level: Option<ActivityLevel>,
    #[serde(default)]
    pub onboarding_complete: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    /// A blank profile with a fresh random identifier.
    pub fn new() -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string())
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            goal: None,
            current_weight: None,
            target_weight: None,
            height: None,
            age: None,
            gender: None,
            activity_level: None,
            onboarding_complete: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Copies in only the fields the update carries.
    pub fn apply(&mut self, update: &OnboardingUpdate) {
        if let Some(goal) = update.goal {
            self.goal = Some(goal);
        }
        if let Some(weight) = update.current_weight {
            self.current_weight = Some(weight);
        }
        if let Some(weight) = update.target_weight {
            self.target_weight = Some(weight);
        }
        if let Some(height) = update.height {
            self.height = Some(height);
        }
        if let Some(age) = update.age {
            self.age = Some(age);
        }
        if let Some(gender) = update.gender {
            self.gender = Some(gender);
        }
        if let Some(level) = update.activity_level {
            self.activity_level = Some(level);
        }
    }

    pub fn missing_fields(&self) -> Vec<OnboardingField> {
        OnboardingField::REQUIRED
            .into_iter()
            .filter(|field| !field.is_set(self))
            .collect()
    }

    pub fn onboarding_status(&self) -> OnboardingStatus {
        let missing = self.missing_fields();
        OnboardingStatus {
            is_complete: missing.is_empty() && self.onboarding_complete,
            missing_fields: missing.iter().map(|field| field.label().to_string()).collect(),
        }
    }

    /// Multi-line dump of every field, "Not set" for absent ones.
    pub fn describe(&self) -> String {
        fn or_unset<T: ToString>(value: Option<T>) -> String {
            value
                .map(|inner| inner.to_string())
                .unwrap_or_else(|| "Not set".to_string())
        }

        let lines = [
            format!("ID: {}", self.id),
            format!("Goal: {}", or_unset(self.goal)),
            format!("Current Weight: {}", or_unset(self.current_weight)),
            format!("Target Weight: {}", or_unset(self.target_weight)),
            format!("Height: {}", or_unset(self.height)),
            format!("Age: {}", or_unset(self.age)),
            format!("Gender: {}", or_unset(self.gender)),
            format!("Activity Level: {}", or_unset(self.activity_level)),
            format!("Onboarding Complete: {}", self.onboarding_complete),
            format!("Created: {}", self.created_at.to_rfc3339()),
            format!("Updated: {}", self.updated_at.to_rfc3339()),
        ];
        lines.join("\n")
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;

    #[test]
    fn categorical_values_parse_wire_strings() {
        assert_eq!("lose_weight".parse::<Goal>(), Ok(Goal::LoseWeight));
        assert_eq!("Very-Active".parse::<ActivityLevel>(), Ok(ActivityLevel::VeryActive));
        assert_eq!(" female ".parse::<Gender>(), Ok(Gender::Female));

        let err = "shrink".parse::<Goal>().unwrap_err();
        assert_eq!(err.field, "goal");
        assert!(err.to_string().contains("maintain_weight"));
    }

    #[test]
    fn profile_serializes_with_snake_case_keys() -> anyhow::Result<()> {
        let mut profile = Profile::with_id("user-1");
        profile.goal = Some(Goal::GainWeight);
        profile.activity_level = Some(ActivityLevel::VeryActive);
        profile.current_weight = Some(70.5);

        let value = serde_json::to_value(&profile)?;
        assert_eq!(value["goal"], json!("gain_weight"));
        assert_eq!(value["activity_level"], json!("very_active"));
        assert_eq!(value["current_weight"], json!(70.5));
        assert_eq!(value["onboarding_complete"], json!(false));
        assert_eq!(value["target_weight"], Value::Null);
        assert!(value.get("created_at").is_some());

        let decoded: Profile = serde_json::from_value(value)?;
        assert_eq!(decoded, profile);
        Ok(())
    }

    #[test]
    fn apply_leaves_absent_fields_untouched() {
        let mut profile = Profile::with_id("user-1");
        profile.age = Some(30);
        profile.apply(&OnboardingUpdate {
            goal: Some(Goal::MaintainWeight),
            ..OnboardingUpdate::default()
        });
        assert_eq!(profile.goal, Some(Goal::MaintainWeight));
        assert_eq!(profile.age, Some(30));
        assert_eq!(profile.height, None);
    }

    #[test]
    fn describe_marks_unset_fields() {
        let mut profile = Profile::with_id("abc");
        profile.height = Some(180);
        let text = profile.describe();
        assert!(text.contains("ID: abc"));
        assert!(text.contains("Height: 180"));
        assert!(text.contains("Goal: Not set"));
    }

    #[test]
    fn new_profiles_get_distinct_ids() {
        assert_ne!(Profile::new().id, Profile::new().id);
    }
}
