mod local;

pub use local::LocalStore;

/// Keys of the on-device profile mirror.
pub mod keys {
    pub const ONBOARDING_COMPLETE: &str = "onboarding_complete";
    pub const USER_ID: &str = "numa_user_id";
    pub const GOAL: &str = "user_goal";
    pub const CURRENT_WEIGHT: &str = "user_weight_current";
    pub const TARGET_WEIGHT: &str = "user_weight_target";
    pub const HEIGHT: &str = "user_height";
    pub const AGE: &str = "user_age";
    pub const GENDER: &str = "user_gender";
    pub const ACTIVITY_LEVEL: &str = "user_activity_level";

    pub const ALL: [&str; 9] = [
        ONBOARDING_COMPLETE,
        USER_ID,
        GOAL,
        CURRENT_WEIGHT,
        TARGET_WEIGHT,
        HEIGHT,
        AGE,
        GENDER,
        ACTIVITY_LEVEL,
    ];
}
