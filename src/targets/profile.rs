//! User settings that seed a fresh set of targets.
//!
//! Energy needs use the Mifflin-St Jeor resting rate scaled by a standard
//! activity factor, then shifted by the goal's daily calorie adjustment.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::TargetError;
use crate::targets::derivation::{derive, DerivationContext, NutritionTargets, TargetChange};

/// Floor applied to the resting rate (kcal/day).
const MIN_BMR_KCAL: f64 = 1000.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Sex {
    Male,
    Female,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
    Sedentary,
    LightlyActive,
    ModeratelyActive,
    VeryActive,
    ExtraActive,
}

impl ActivityLevel {
    pub fn factor(self) -> f64 {
        match self {
            ActivityLevel::Sedentary => 1.2,
            ActivityLevel::LightlyActive => 1.375,
            ActivityLevel::ModeratelyActive => 1.55,
            ActivityLevel::VeryActive => 1.725,
            ActivityLevel::ExtraActive => 1.9,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GoalType {
    Lose,
    Maintain,
    Gain,
}

impl GoalType {
    /// Daily calorie adjustment relative to maintenance.
    pub fn calorie_adjustment(self) -> f64 {
        match self {
            GoalType::Lose => -500.0,
            GoalType::Maintain => 0.0,
            GoalType::Gain => 300.0,
        }
    }
}

/// Read-only settings owned by the profile store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserNutritionProfile {
    pub sex: Sex,
    pub age: u32,
    pub weight_kg: f64,
    pub height_cm: f64,
    pub activity_level: ActivityLevel,
    pub goal: GoalType,
    /// Share of calories from fat, 0-100.
    pub fat_percentage: f32,
    /// Protein grams per kilogram of body weight.
    pub protein_per_kg: f64,
}

impl UserNutritionProfile {
    /// # Errors
    /// Returns [`TargetError::InvalidProfile`] naming the first out-of-range field.
    pub fn validate(&self) -> Result<(), TargetError> {
        if !(self.weight_kg > 0.0 && self.weight_kg <= 300.0) {
            return Err(TargetError::InvalidProfile(
                "weight must be between 0 and 300 kg".to_string(),
            ));
        }
        if !(self.height_cm > 0.0 && self.height_cm <= 300.0) {
            return Err(TargetError::InvalidProfile(
                "height must be between 0 and 300 cm".to_string(),
            ));
        }
        if !(10..=120).contains(&self.age) {
            return Err(TargetError::InvalidProfile(
                "age must be between 10 and 120 years".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&self.fat_percentage) {
            return Err(TargetError::InvalidProfile(
                "fat percentage must be between 0 and 100".to_string(),
            ));
        }
        if !(0.0..=5.0).contains(&self.protein_per_kg) {
            return Err(TargetError::InvalidProfile(
                "protein per kg must be between 0 and 5 g".to_string(),
            ));
        }
        Ok(())
    }

    /// Mifflin-St Jeor resting energy expenditure (kcal/day).
    pub fn bmr(&self) -> f64 {
        let sex_constant = match self.sex {
            Sex::Male => 5.0,
            Sex::Female => -161.0,
        };
        let bmr = 10.0 * self.weight_kg + 6.25 * self.height_cm - 5.0 * f64::from(self.age) + sex_constant;
        bmr.max(MIN_BMR_KCAL)
    }

    /// Total daily energy expenditure adjusted for the goal.
    pub fn daily_calories(&self) -> i32 {
        let tdee = self.bmr() * self.activity_level.factor();
        (tdee + self.goal.calorie_adjustment()).round().max(0.0) as i32
    }

    pub fn protein_grams(&self) -> i32 {
        (self.weight_kg * self.protein_per_kg).round() as i32
    }
}

/// Builds targets from a profile by replaying the normal cascade:
/// calories, then protein, then the profile's fat share.
///
/// # Errors
/// Returns [`TargetError::InvalidProfile`] when the profile fails validation.
pub fn seed_targets(profile: &UserNutritionProfile) -> Result<NutritionTargets, TargetError> {
    profile.validate()?;

    let context = DerivationContext::with_fat_percentage(profile.fat_percentage);
    let mut targets = NutritionTargets::default();
    for change in [
        TargetChange::Calories(profile.daily_calories()),
        TargetChange::Protein(profile.protein_grams()),
        TargetChange::FatPercentage(profile.fat_percentage),
    ] {
        targets = derive(targets, change, &context)?;
    }

    info!(
        calories = targets.calories,
        protein_g = targets.protein_g,
        fat_g = targets.fat_g,
        carbs_g = targets.carbs_g,
        "Seeded nutrition targets from profile"
    );
    Ok(targets)
}
